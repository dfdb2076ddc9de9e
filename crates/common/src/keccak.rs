//! Keccak-256, the hash function Ethereum uses for trie keys and block
//! hashes alike. The core needs exactly one use of it outside the
//! out-of-scope RLP/trie collaborators: deriving the `keccak(address)` trie
//! key that goes on the wire in a `GetProof` request (the proof
//! verification itself, trie-walk and RLP decode included, stays behind the
//! [`crate`]-external `AccountProofVerifier` trait).

use ethereum_types::{Address, H256};
use sha3::{Digest, Keccak256};

/// Computes the Keccak-256 hash of `bytes`.
pub fn keccak256(bytes: &[u8]) -> H256 {
    H256::from_slice(&Keccak256::digest(bytes))
}

/// Computes the trie key for an account: `keccak(address)`.
pub fn account_trie_key(address: Address) -> H256 {
    keccak256(address.as_bytes())
}
