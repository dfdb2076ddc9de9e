//! Announcement processor: §4.C. A single worker drains the announcement
//! queue and serially drives the header synchronizer, translating its
//! errors into the disconnect-or-drop policy table from the spec. Grounded
//! on the teacher's `sync/full.rs` top-level loop shape (one sync cycle at
//! a time, logged at each step) plus `peer_handler.rs`'s pattern of calling
//! `peer.disconnect(reason)` on protocol violations.

use std::collections::HashMap;
use std::sync::Arc;

use lcsync_common::HeadInfo;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::peer::{Peer, PeerId};
use crate::sync::HeaderSynchronizer;

/// One dequeued `(peer, head_info)` pair, as pushed by the multiplexer.
pub struct Announcement {
    pub peer: Arc<dyn Peer>,
    pub head_info: HeadInfo,
}

/// `LastProcessedAnnouncements`: the most recent announcement from each
/// peer that was fully processed. Consulted by the synchronizer to choose
/// the next sync start, and pruned when a peer disconnects (§3 invariant
/// 4).
#[derive(Default, Clone)]
pub struct LastProcessedAnnouncements {
    inner: Arc<Mutex<HashMap<PeerId, HeadInfo>>>,
}

impl LastProcessedAnnouncements {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, peer: &PeerId) -> Option<HeadInfo> {
        self.inner.lock().await.get(peer).copied()
    }

    async fn set(&self, peer: PeerId, head_info: HeadInfo) {
        self.inner.lock().await.insert(peer, head_info);
    }

    /// Removes `peer`'s entry. Called from the peer lifecycle (disconnect)
    /// path, no later than the peer's cancellation completing.
    pub async fn remove(&self, peer: &PeerId) {
        self.inner.lock().await.remove(peer);
    }
}

/// Runs the announcement processor until the queue closes or `cancel`
/// fires. There is exactly one of these per service: announcements from
/// different peers are never synced concurrently (§4.C, a deliberate
/// simplification).
pub async fn run(
    mut queue: mpsc::UnboundedReceiver<Announcement>,
    synchronizer: Arc<HeaderSynchronizer>,
    last_processed: LastProcessedAnnouncements,
    cancel: CancellationToken,
) {
    loop {
        let announcement = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            announcement = queue.recv() => announcement,
        };

        let Some(Announcement { peer, head_info }) = announcement else {
            break;
        };

        let prior = last_processed.get(&peer.id()).await;

        match synchronizer
            .process_announcement(&peer, head_info, prior)
            .await
        {
            Ok(()) => {
                last_processed.set(peer.id(), head_info).await;
            }
            Err(err) if err.is_cancellation() => break,
            Err(err) => match err.disconnect_reason() {
                Some(reason) => {
                    warn!(peer = %peer.id(), error = %err, reason = ?reason, "disconnecting peer after announcement processing error");
                    peer.disconnect(reason);
                    last_processed.remove(&peer.id()).await;
                }
                None => {
                    warn!(peer = %peer.id(), error = %err, "dropping peer after unexpected announcement processing error");
                }
            },
        }
    }

    info!("announcement processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::Correlator;
    use crate::error::DisconnectReason;
    use crate::message::{Reply, Request};
    use crate::test_support::{FakePeer, FakeValidator, InMemoryHeaderStore};
    use ethereum_types::{H256, U256};
    use lcsync_common::BlockHeader;
    use tracing_test::{logs_contain, traced_test};

    fn genesis() -> BlockHeader {
        BlockHeader::new(0, H256::zero(), H256::zero(), H256::zero())
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn too_many_timeouts_disconnects_with_timeout_reason_and_prunes_last_processed() {
        let store = Arc::new(InMemoryHeaderStore::new());
        store.seed(genesis());
        let validator = Arc::new(FakeValidator::default());
        let correlator = Arc::new(Correlator::new(CancellationToken::new()));
        let synchronizer = Arc::new(HeaderSynchronizer::new(store, validator, correlator));

        let (fake_peer, _sent) = FakePeer::with_recorder("p1", 192);
        let fake_peer = Arc::new(fake_peer);
        let peer_id = fake_peer.id();
        let peer: Arc<dyn Peer> = fake_peer.clone();

        let last_processed = LastProcessedAnnouncements::new();
        last_processed
            .set(
                peer_id.clone(),
                HeadInfo {
                    block_hash: H256::from_low_u64_be(1),
                    block_number: 1,
                    total_difficulty: U256::from(1),
                    reorg_depth: 0,
                },
            )
            .await;

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Announcement {
            peer: peer.clone(),
            head_info: HeadInfo {
                block_hash: H256::from_low_u64_be(5),
                block_number: 5,
                total_difficulty: U256::from(2),
                reorg_depth: 0,
            },
        })
        .expect("queue accepts announcement");
        drop(tx);

        run(
            rx,
            synchronizer,
            last_processed.clone(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(fake_peer.disconnect_reason(), Some(DisconnectReason::Timeout));
        assert_eq!(last_processed.get(&peer_id).await, None);
        assert!(logs_contain("disconnecting peer"));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_sync_records_last_processed() {
        let store = Arc::new(InMemoryHeaderStore::new());
        store.seed(genesis());
        let validator = Arc::new(FakeValidator::default());
        let correlator = Arc::new(Correlator::new(CancellationToken::new()));
        let synchronizer = Arc::new(HeaderSynchronizer::new(
            store,
            validator,
            correlator.clone(),
        ));

        let (fake_peer, mut sent) = FakePeer::with_recorder("p1", 192);
        let peer: Arc<dyn Peer> = Arc::new(fake_peer);
        let peer_id = peer.id();

        // Must be at least 2 blocks above genesis: `get_sync_start_block`
        // returns `start = 1` for a genesis-only store, and `start = 1`
        // against `head_info.block_number == 1` makes the fetch loop's
        // `start < head_info.block_number` false before ever dispatching a
        // request, which would leave `responder` blocked on `sent.recv()`
        // forever.
        let head_info = HeadInfo {
            block_hash: H256::from_low_u64_be(2),
            block_number: 2,
            total_difficulty: U256::from(1),
            reorg_depth: 0,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Announcement {
            peer: peer.clone(),
            head_info,
        })
        .expect("queue accepts announcement");
        drop(tx);

        let last_processed = LastProcessedAnnouncements::new();

        let responder = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                let Request::GetBlockHeaders { request_id, .. } =
                    sent.recv().await.expect("request dispatched")
                else {
                    panic!("expected GetBlockHeaders");
                };
                let h1 = BlockHeader::new(1, H256::zero(), H256::zero(), H256::from_low_u64_be(1));
                let h2 = BlockHeader::new(2, h1.hash, H256::zero(), H256::from_low_u64_be(2));
                correlator
                    .deliver(Reply::BlockHeaders {
                        request_id,
                        headers: vec![h1, h2],
                    })
                    .await;
            })
        };

        run(
            rx,
            synchronizer,
            last_processed.clone(),
            CancellationToken::new(),
        )
        .await;
        responder.await.expect("responder task did not panic");

        assert_eq!(last_processed.get(&peer_id).await, Some(head_info));
    }
}
