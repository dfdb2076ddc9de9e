//! Shared data model for the light-client chain synchronizer.
//!
//! Mirrors the split between wire/domain types and storage in the full-node
//! crates this workspace descends from: this crate knows nothing about how a
//! header is fetched or persisted, only what one looks like.

pub mod header;
pub mod keccak;
pub mod types;

pub use ethereum_types::{Address, H256, U256};
pub use header::BlockHeader;
pub use keccak::{account_trie_key, keccak256};
pub use types::{Account, BlockBody, HeadInfo, Receipt};

/// Block number of the genesis block. A header is the genesis header iff its
/// `block_number` equals this constant.
pub const GENESIS_BLOCK_NUMBER: u64 = 0;
