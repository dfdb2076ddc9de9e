use ethereum_types::H256;

use crate::GENESIS_BLOCK_NUMBER;

/// A block header as seen by the light client.
///
/// The core never decodes headers off the wire itself — that is the job of
/// the (out-of-scope) RLP codec sitting between the transport and this type.
/// By the time a `BlockHeader` reaches the synchronizer its `hash` has
/// already been derived from its RLP encoding by that layer, so this type
/// only needs to carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_number: u64,
    pub parent_hash: H256,
    pub state_root: H256,
    pub hash: H256,
}

impl BlockHeader {
    pub fn new(block_number: u64, parent_hash: H256, state_root: H256, hash: H256) -> Self {
        Self {
            block_number,
            parent_hash,
            state_root,
            hash,
        }
    }

    /// True for the block at height zero. The core never requests this
    /// header from a peer; it must already be present in the local database
    /// before synchronization starts.
    pub fn is_genesis(&self) -> bool {
        self.block_number == GENESIS_BLOCK_NUMBER
    }
}
