//! Merkle-Patricia proof verification, as an external collaborator. The
//! core never walks trie nodes itself; it hands a claimed root, an account
//! address and the proof nodes a peer returned to this trait and trusts the
//! `Account` it gets back — or the error if the proof doesn't check out.
//!
//! This intentionally folds two of the Python source's separate steps
//! (`HexaryTrie.get_from_proof` then `rlp.decode(..., sedes=Account)`) into
//! one call: both the trie-walk and the RLP decode are out-of-scope
//! primitives, and nothing downstream needs the undecoded bytes.

use ethereum_types::{Address, H256};
use lcsync_common::Account;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProofVerificationError {
    #[error("proof nodes do not resolve to the claimed root")]
    RootMismatch,

    #[error("proof does not contain a leaf for the requested key")]
    KeyNotInProof,

    #[error("leaf value did not RLP-decode as an Account: {0}")]
    Malformed(String),
}

pub trait AccountProofVerifier: Send + Sync {
    /// Verifies `proof` against `state_root` for `address`, and decodes the
    /// resulting leaf value as an [`Account`].
    fn verify_account(
        &self,
        state_root: H256,
        address: Address,
        proof: &[Vec<u8>],
    ) -> Result<Account, ProofVerificationError>;
}
