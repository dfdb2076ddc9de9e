//! Ethereum light-client chain synchronizer core (§1-§2 of the design).
//!
//! Five cooperating pieces, wired together by [`Service`]:
//!
//! - [`multiplexer`] — peer event multiplexer (§4.A)
//! - [`correlator`] — request/reply correlator (§4.B)
//! - [`announcements`] — announcement processor (§4.C)
//! - [`sync`] — header synchronizer (§4.D)
//! - [`lookup`] — on-demand lookup API (§4.E)
//!
//! Everything this core talks to outside of those five pieces — the
//! transport, the header database, consensus validation, and Merkle-Patricia
//! proof verification — is an external collaborator represented here as a
//! trait ([`peer`], [`header_store`], [`validate`], [`trie_proof`]).

pub mod announcements;
pub mod cache;
pub mod config;
pub mod correlator;
pub mod error;
pub mod header_store;
pub mod lookup;
pub mod message;
pub mod multiplexer;
pub mod peer;
pub mod sync;
pub mod test_support;
pub mod trie_proof;
pub mod validate;

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::announcements::{Announcement, LastProcessedAnnouncements};
use crate::correlator::Correlator;
use crate::header_store::HeaderStore;
use crate::lookup::LookupApi;
use crate::multiplexer::InboundStream;
use crate::peer::{Peer, PeerPool};
use crate::sync::HeaderSynchronizer;
use crate::trie_proof::AccountProofVerifier;
use crate::validate::HeaderValidator;

/// The long-running service: owns the announcement processor worker, the
/// request/reply correlator, and the on-demand lookup API, and exposes the
/// lifecycle (`start`/`stop`) and peer connect/disconnect hooks described
/// in spec §6.
pub struct Service {
    correlator: Arc<Correlator>,
    last_processed: LastProcessedAnnouncements,
    peer_pool: Arc<dyn PeerPool>,
    lookup: Arc<LookupApi>,
    announcements_tx: mpsc::UnboundedSender<Announcement>,
    cancel: CancellationToken,
    processor_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Service {
    /// Wires up the service and spawns its single announcement processor
    /// worker. Peers are connected afterwards via [`Service::connect_peer`].
    pub fn start(
        header_store: Arc<dyn HeaderStore>,
        validator: Arc<dyn HeaderValidator>,
        proof_verifier: Arc<dyn AccountProofVerifier>,
        peer_pool: Arc<dyn PeerPool>,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let correlator = Arc::new(Correlator::new(cancel.clone()));
        let synchronizer = Arc::new(HeaderSynchronizer::new(
            header_store,
            validator,
            correlator.clone(),
        ));
        let last_processed = LastProcessedAnnouncements::new();
        let lookup = Arc::new(LookupApi::new(
            peer_pool.clone(),
            correlator.clone(),
            proof_verifier,
        ));
        let (announcements_tx, announcements_rx) = mpsc::unbounded_channel();

        let processor_handle = tokio::spawn(announcements::run(
            announcements_rx,
            synchronizer,
            last_processed.clone(),
            cancel.clone(),
        ));

        Arc::new(Self {
            correlator,
            last_processed,
            peer_pool,
            lookup,
            announcements_tx,
            cancel,
            processor_handle: Mutex::new(Some(processor_handle)),
        })
    }

    /// Registers a newly connected peer, synthesizes its "just connected"
    /// announcement (§4.A), and spawns its multiplexer task.
    pub async fn connect_peer(self: &Arc<Self>, peer: Arc<dyn Peer>, inbound: InboundStream) {
        self.peer_pool.register(peer.clone()).await;
        multiplexer::enqueue_on_connect(peer.clone(), &self.announcements_tx);

        let correlator = self.correlator.clone();
        let announcements_tx = self.announcements_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(multiplexer::run(
            peer,
            inbound,
            correlator,
            announcements_tx,
            cancel,
        ));
    }

    /// Peer lifecycle teardown: prunes the peer pool and
    /// `LastProcessedAnnouncements` no later than the peer's cancellation
    /// completing (§3 invariant 4).
    pub async fn disconnect_peer(&self, peer: &Arc<dyn Peer>) {
        let id = peer.id();
        peer.cancel();
        self.peer_pool.deregister(&id).await;
        self.last_processed.remove(&id).await;
    }

    /// The on-demand lookup API (§4.E): header/body/receipts/account/code.
    pub fn lookup(&self) -> &LookupApi {
        &self.lookup
    }

    /// Cancels the service: the announcement worker exits its loop, every
    /// suspended correlator waiter resolves with a cancellation error, and
    /// no further work is accepted. Peer transport teardown itself remains
    /// the peer pool's responsibility (`_cleanup` is a no-op in the core).
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.processor_handle.lock().await.take() {
            let _ = handle.await;
        }
        info!("service stopped");
    }
}
