use ethereum_types::{H256, U256};

/// A peer-announced chain tip, carried in an LES `Announce` message.
///
/// `reorg_depth` is the number of blocks that, according to the announcing
/// peer, have been rolled back since its previous announcement. It is the
/// peer's own accounting and is trusted as a hint for where to resume
/// synchronization, not verified independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadInfo {
    pub block_hash: H256,
    pub block_number: u64,
    pub total_difficulty: U256,
    pub reorg_depth: u64,
}

/// A block body as returned by `GetBlockBodies`. The core does not parse
/// transactions or ommers out of it; it is opaque payload handed back to the
/// caller of [`crate::BlockBody`] lookups as-is, modulo the (acceptable,
/// unimplemented) enhancement of checking it against `transactions_root`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockBody {
    pub raw: Vec<u8>,
}

/// A single transaction receipt. Same trust model as [`BlockBody`]: the core
/// hands back whatever the peer sent without checking it against
/// `receipts_root`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Receipt {
    pub raw: Vec<u8>,
}

/// A decoded Ethereum account as stored in the state trie leaf. Unlike
/// bodies and receipts, this one IS verified: account lookups check the
/// supplied Merkle-Patricia proof against the header's `state_root` before
/// decoding this value out of the proof's terminal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: H256,
    pub code_hash: H256,
}
