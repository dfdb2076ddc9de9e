//! The seam between the synchronizer core and the (out-of-scope)
//! peer-to-peer transport. The core sees peers only through these traits:
//! an identity, a mutable `head_info` snapshot, a typed request sender, and
//! a cancellation/disconnect handle. How a `Peer` implementation actually
//! talks to a socket is entirely the transport layer's business.

use std::sync::Arc;

use async_trait::async_trait;
use lcsync_common::HeadInfo;

use crate::error::DisconnectReason;
use crate::message::HashOrNumber;

/// A peer's identity. Kept as an opaque displayable string (in a real
/// deployment this would be the peer's enode id / node public key) so the
/// core can use it as a map key and in log/error messages without needing
/// to know anything about how peers are addressed at the transport layer.
pub type PeerId = String;

/// Sender half of a peer's LES sub-protocol channel: dispatches one of the
/// five outbound request shapes the core ever issues.
#[async_trait]
pub trait SubProtocolSender: Send + Sync {
    async fn send_get_block_headers(
        &self,
        start: HashOrNumber,
        max_headers: u64,
        request_id: u64,
        reverse: bool,
    );

    async fn send_get_block_bodies(&self, hashes: Vec<ethereum_types::H256>, request_id: u64);

    async fn send_get_receipts(&self, block_hash: ethereum_types::H256, request_id: u64);

    async fn send_get_proof(
        &self,
        block_hash: ethereum_types::H256,
        account_key: Vec<u8>,
        key: Vec<u8>,
        from_level: u64,
        request_id: u64,
    );

    async fn send_get_contract_code(
        &self,
        block_hash: ethereum_types::H256,
        key: Vec<u8>,
        request_id: u64,
    );
}

/// A connected LES peer, as the core needs to see it.
pub trait Peer: Send + Sync + std::fmt::Debug {
    fn id(&self) -> PeerId;

    /// Current announced chain tip. Updated by the multiplexer on every
    /// `Announce` received from this peer.
    fn head_info(&self) -> HeadInfo;

    fn set_head_info(&self, info: HeadInfo);

    /// Upper bound on headers returnable in a single `GetBlockHeaders`
    /// reply from this peer.
    fn max_headers_fetch(&self) -> u64;

    fn sub_proto(&self) -> &dyn SubProtocolSender;

    /// Tell the transport layer to close this connection, citing `reason`.
    fn disconnect(&self, reason: DisconnectReason);

    /// Cancel any in-flight work associated with this peer (the transport
    /// layer's teardown, not the service's own cancellation token).
    fn cancel(&self);
}

/// The connected peer set, as the lookup API and multiplexer need it. Peer
/// discovery, scoring, and connection management all live outside this
/// trait's scope — it is deliberately narrow: "give me the best peer" and
/// "look a peer up by id".
#[async_trait]
pub trait PeerPool: Send + Sync {
    /// The peer currently advertising the greatest known total difficulty,
    /// or `None` if no peers are connected. This is the entire selection
    /// policy the on-demand lookup API uses (see spec §4.E); anything
    /// smarter (flow-control-aware round robin, failover) is a deliberate
    /// redesign left to a future `select_peer(request_kind)` abstraction.
    async fn highest_td_peer(&self) -> Option<Arc<dyn Peer>>;

    async fn get(&self, id: &PeerId) -> Option<Arc<dyn Peer>>;

    /// Adds a newly connected peer to the pool (§4.F supplement).
    async fn register(&self, peer: Arc<dyn Peer>);

    /// Removes a peer on disconnect. Paired with
    /// [`crate::announcements::LastProcessedAnnouncements::remove`] so both
    /// are pruned no later than the peer's cancellation completing.
    async fn deregister(&self, id: &PeerId);
}
