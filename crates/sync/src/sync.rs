//! Header synchronizer: §4.D, the largest single component. Computes where
//! to resume fetching from, fetches batches, validates and persists each
//! header, and unwinds the fetch loop's retry policy. Grounded on the
//! teacher's `sync/full.rs::sync_cycle_full`, generalized from "download
//! full blocks and execute them" to "download headers and validate them
//! against an already-persisted parent".

use std::cmp::max;
use std::sync::Arc;

use lcsync_common::{BlockHeader, HeadInfo};
use tracing::{debug, info, warn};

use crate::config::{MAX_CONSECUTIVE_TIMEOUTS, TIMEOUT_RETRY_DELAY};
use crate::correlator::Correlator;
use crate::error::{AnnouncementError, CorrelatorError};
use crate::header_store::HeaderStore;
use crate::message::{HashOrNumber, Reply};
use crate::peer::Peer;
use crate::validate::HeaderValidator;

/// Drives header synchronization for one processed announcement. Stateless
/// across calls: the caller ([`crate::announcements`]) owns
/// `LastProcessedAnnouncements` and passes in whatever it has on file for
/// this peer.
pub struct HeaderSynchronizer {
    header_store: Arc<dyn HeaderStore>,
    validator: Arc<dyn HeaderValidator>,
    correlator: Arc<Correlator>,
}

impl HeaderSynchronizer {
    pub fn new(
        header_store: Arc<dyn HeaderStore>,
        validator: Arc<dyn HeaderValidator>,
        correlator: Arc<Correlator>,
    ) -> Self {
        Self {
            header_store,
            validator,
            correlator,
        }
    }

    /// Entry point, §4.D: skip if we already have `head_info.block_hash`,
    /// otherwise compute a start block and fetch forward from it until the
    /// announced head is reached.
    pub async fn process_announcement(
        &self,
        peer: &Arc<dyn Peer>,
        head_info: HeadInfo,
        last_processed: Option<HeadInfo>,
    ) -> Result<(), AnnouncementError> {
        if self.header_store.header_exists(head_info.block_hash).await {
            debug!(peer = %peer.id(), hash = %head_info.block_hash, "already have announced head, nothing to do");
            return Ok(());
        }

        let mut start = self
            .get_sync_start_block(peer, head_info, last_processed)
            .await?;

        while start < head_info.block_number {
            let headers = self.fetch_headers_starting_at(peer, start).await?;

            for header in &headers {
                self.validate_header(peer, header).await?;
                self.header_store.persist_header(header.clone()).await;
            }

            // `headers` is guaranteed non-empty: `fetch_headers_starting_at`
            // raises `EmptyHeadersReply` rather than returning one.
            let last_imported = headers
                .last()
                .map(|h| h.block_number)
                .unwrap_or(start);
            if last_imported == start {
                // The peer answered but didn't move us forward at all;
                // treat it the same as an empty reply rather than looping
                // forever re-requesting the same block.
                return Err(AnnouncementError::EmptyHeadersReply {
                    peer: peer.id(),
                    start_block: start,
                });
            }
            start = last_imported;
        }

        info!(peer = %peer.id(), head = %head_info.block_hash, number = head_info.block_number, "synced to announced head");
        Ok(())
    }

    /// §4.D step 2: `get_sync_start_block`.
    async fn get_sync_start_block(
        &self,
        peer: &Arc<dyn Peer>,
        head_info: HeadInfo,
        last_processed: Option<HeadInfo>,
    ) -> Result<u64, AnnouncementError> {
        let chain_head = self.header_store.get_canonical_head().await;

        let start = if chain_head.block_number == 0 {
            1
        } else if let Some(last_processed) = last_processed {
            // Saturating: a peer reporting a reorg deeper than what we've
            // actually synced with it just walks us back to genesis rather
            // than underflowing.
            last_processed
                .block_number
                .saturating_sub(head_info.reorg_depth)
        } else {
            // We have never processed an announcement from this peer: we
            // may be on a different fork. Reconcile by fetching forward
            // from the oldest block this peer can still answer for and
            // persisting whatever it returns (the persist layer resolves
            // any divergence from our current chain), then resume normal
            // sync from our own chain head.
            let oldest_ancestor = max(
                1,
                chain_head
                    .block_number
                    .saturating_sub(peer.max_headers_fetch())
                    .saturating_add(1),
            );
            let headers = self
                .fetch_headers_starting_at(peer, oldest_ancestor)
                .await
                .map_err(|err| match err {
                    AnnouncementError::EmptyHeadersReply { peer, .. } => {
                        AnnouncementError::NoCommonAncestor { peer }
                    }
                    other => other,
                })?;

            for header in &headers {
                self.header_store.persist_header(header.clone()).await;
            }

            chain_head.block_number
        };

        Ok(max(start, 1))
    }

    /// §4.D `_validate_header`.
    async fn validate_header(
        &self,
        peer: &Arc<dyn Peer>,
        header: &BlockHeader,
    ) -> Result<(), AnnouncementError> {
        if header.is_genesis() {
            return Err(AnnouncementError::InvalidHeader {
                peer: peer.id(),
                header: Box::new(header.clone()),
                source: crate::error::ValidationError::UnexpectedGenesis,
            });
        }

        let parent = self
            .header_store
            .get_block_header_by_hash(header.parent_hash)
            .await
            .map_err(|_| AnnouncementError::OutOfOrderBatch {
                peer: peer.id(),
                block_number: header.block_number,
                parent_hash: header.parent_hash,
            })?;

        self.validator
            .validate_header(header, &parent)
            .map_err(|source| AnnouncementError::InvalidHeader {
                peer: peer.id(),
                header: Box::new(header.clone()),
                source,
            })
    }

    /// §4.D `_fetch_headers_starting_at`: issues `GetBlockHeaders(start,
    /// max=peer.max_headers_fetch, reverse=false)`, retrying timeouts up to
    /// `MAX_CONSECUTIVE_TIMEOUTS` times with `TIMEOUT_RETRY_DELAY` between
    /// attempts. Returns headers in ascending block-number order.
    async fn fetch_headers_starting_at(
        &self,
        peer: &Arc<dyn Peer>,
        start: u64,
    ) -> Result<Vec<BlockHeader>, AnnouncementError> {
        let max_headers = peer.max_headers_fetch();

        for attempt in 0..MAX_CONSECUTIVE_TIMEOUTS {
            let correlator = &self.correlator;
            let sub_proto = peer.sub_proto();
            let outcome = correlator
                .send_and_wait(|request_id| {
                    sub_proto.send_get_block_headers(
                        HashOrNumber::Number(start),
                        max_headers,
                        request_id,
                        false,
                    )
                })
                .await;

            match outcome {
                Ok(Reply::BlockHeaders { headers, .. }) => {
                    if headers.is_empty() {
                        return Err(AnnouncementError::EmptyHeadersReply {
                            peer: peer.id(),
                            start_block: start,
                        });
                    }
                    let mut headers = headers;
                    headers.sort_by_key(|h| h.block_number);
                    return Ok(headers);
                }
                Ok(_unexpected) => {
                    return Err(AnnouncementError::UnexpectedReply { peer: peer.id() });
                }
                Err(CorrelatorError::Cancelled { .. }) => {
                    return Err(AnnouncementError::Cancelled);
                }
                Err(CorrelatorError::Timeout { .. }) | Err(CorrelatorError::SlotDropped { .. }) => {
                    warn!(
                        peer = %peer.id(),
                        start,
                        attempt = attempt + 1,
                        "timed out waiting for GetBlockHeaders reply, retrying"
                    );
                    if attempt + 1 < MAX_CONSECUTIVE_TIMEOUTS {
                        tokio::time::sleep(TIMEOUT_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(AnnouncementError::TooManyTimeouts { peer: peer.id() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakePeer, FakeValidator, InMemoryHeaderStore};
    use ethereum_types::{H256, U256};
    use tokio_util::sync::CancellationToken;

    fn header(n: u64, parent: H256) -> BlockHeader {
        let hash = H256::from_low_u64_be(n);
        BlockHeader::new(n, parent, H256::zero(), hash)
    }

    fn genesis() -> BlockHeader {
        header(0, H256::zero())
    }

    #[tokio::test]
    async fn fresh_sync_imports_every_header_in_order() {
        let store = Arc::new(InMemoryHeaderStore::new());
        store.seed(genesis());
        let validator = Arc::new(FakeValidator::default());
        let correlator = Arc::new(Correlator::new(CancellationToken::new()));
        let sync = HeaderSynchronizer::new(store.clone(), validator, correlator.clone());

        let (peer, mut sent) = FakePeer::with_recorder("p1", 192);
        let peer: Arc<dyn Peer> = Arc::new(peer);

        let head_info = HeadInfo {
            block_hash: H256::from_low_u64_be(5),
            block_number: 5,
            total_difficulty: U256::from(1),
            reorg_depth: 0,
        };

        let responder = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                let request = sent.recv().await.expect("request dispatched");
                let crate::message::Request::GetBlockHeaders { request_id, start, .. } = request else {
                    panic!("expected GetBlockHeaders");
                };
                assert_eq!(start, HashOrNumber::Number(1));
                let mut prev = H256::zero();
                let headers: Vec<BlockHeader> = (1..=5)
                    .map(|n| {
                        let h = header(n, prev);
                        prev = h.hash;
                        h
                    })
                    .collect();
                correlator
                    .deliver(Reply::BlockHeaders { request_id, headers })
                    .await;
            })
        };

        sync.process_announcement(&peer, head_info, None)
            .await
            .expect("sync succeeds");
        responder.await.expect("responder task did not panic");

        for n in 1..=5 {
            assert!(store.header_exists(H256::from_low_u64_be(n)).await);
        }
    }

    #[tokio::test]
    async fn incremental_sync_refetches_last_synced_block() {
        let store = Arc::new(InMemoryHeaderStore::new());
        store.seed(genesis());
        let mut prev = H256::zero();
        for n in 1..=5 {
            let h = header(n, prev);
            prev = h.hash;
            store.seed(h);
        }
        let validator = Arc::new(FakeValidator::default());
        let correlator = Arc::new(Correlator::new(CancellationToken::new()));
        let sync = HeaderSynchronizer::new(store.clone(), validator, correlator.clone());

        let (peer, mut sent) = FakePeer::with_recorder("p1", 192);
        let peer: Arc<dyn Peer> = Arc::new(peer);

        let last_processed = HeadInfo {
            block_hash: H256::from_low_u64_be(5),
            block_number: 5,
            total_difficulty: U256::from(1),
            reorg_depth: 0,
        };
        let head_info = HeadInfo {
            block_hash: H256::from_low_u64_be(7),
            block_number: 7,
            total_difficulty: U256::from(2),
            reorg_depth: 0,
        };

        let responder = {
            let correlator = correlator.clone();
            let h5 = header(5, H256::from_low_u64_be(4));
            tokio::spawn(async move {
                let request = sent.recv().await.expect("request dispatched");
                let crate::message::Request::GetBlockHeaders { request_id, start, .. } = request else {
                    panic!("expected GetBlockHeaders");
                };
                // Deliberate off-by-one: re-requests block 5, not 6.
                assert_eq!(start, HashOrNumber::Number(5));
                let h6 = header(6, h5.hash);
                let h7 = header(7, h6.hash);
                correlator
                    .deliver(Reply::BlockHeaders {
                        request_id,
                        headers: vec![h5, h6, h7],
                    })
                    .await;
            })
        };

        sync.process_announcement(&peer, head_info, Some(last_processed))
            .await
            .expect("sync succeeds");
        responder.await.expect("responder task did not panic");

        assert!(store.header_exists(H256::from_low_u64_be(6)).await);
        assert!(store.header_exists(H256::from_low_u64_be(7)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_timeouts_surfaces_as_too_many_timeouts() {
        let store = Arc::new(InMemoryHeaderStore::new());
        store.seed(genesis());
        let validator = Arc::new(FakeValidator::default());
        let correlator = Arc::new(Correlator::new(CancellationToken::new()));
        let sync = HeaderSynchronizer::new(store, validator, correlator);

        // No one ever answers: every attempt in the retry loop is going to
        // time out against the real `REPLY_TIMEOUT`, which would make this
        // test slow without pausing time.
        let (peer, _sent) = FakePeer::with_recorder("p1", 192);
        let peer: Arc<dyn Peer> = Arc::new(peer);
        let head_info = HeadInfo {
            block_hash: H256::from_low_u64_be(5),
            block_number: 5,
            total_difficulty: U256::from(1),
            reorg_depth: 0,
        };

        let result = sync.process_announcement(&peer, head_info, None).await;
        assert!(matches!(
            result,
            Err(AnnouncementError::TooManyTimeouts { .. })
        ));
    }
}
