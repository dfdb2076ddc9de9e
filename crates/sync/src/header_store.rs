//! The header database, as an external async collaborator. A real
//! implementation persists headers to disk keyed by hash and by canonical
//! number; this crate only needs the four operations below, each named
//! after its Python-source `coro_*` counterpart to keep the mapping from
//! spec to code obvious.

use async_trait::async_trait;
use ethereum_types::H256;
use lcsync_common::BlockHeader;

use crate::error::HeaderStoreError;

#[async_trait]
pub trait HeaderStore: Send + Sync {
    /// The current canonical chain head.
    async fn get_canonical_head(&self) -> BlockHeader;

    async fn header_exists(&self, hash: H256) -> bool;

    /// # Errors
    /// Returns [`HeaderStoreError::HeaderNotFound`] if no header with this
    /// hash has been persisted.
    async fn get_block_header_by_hash(&self, hash: H256) -> Result<BlockHeader, HeaderStoreError>;

    /// Persist `header`. Must be idempotent, and must handle reorgs:
    /// accepting a header that supersedes the current canonical header at
    /// its block number.
    async fn persist_header(&self, header: BlockHeader);
}
