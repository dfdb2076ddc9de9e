//! On-demand lookup API: §4.E. Five proxy-and-verify operations, each
//! memoized in its own single-flight LRU. Grounded on the teacher's
//! `peer_handler.rs` (peer selection + request/reply plumbing for one-off
//! lookups like `get_block_header`) generalized with the verification step
//! the spec calls for on headers and accounts.

use std::sync::Arc;

use ethereum_types::{Address, H256};
use lcsync_common::{account_trie_key, Account, BlockBody, BlockHeader, Receipt};
use tracing::debug;

use crate::cache::SingleFlightCache;
use crate::config::LOOKUP_CACHE_CAPACITY;
use crate::correlator::Correlator;
use crate::error::LookupError;
use crate::message::{HashOrNumber, Reply};
use crate::peer::PeerPool;
use crate::trie_proof::AccountProofVerifier;

/// Key for the account cache: a lookup is only valid against the specific
/// block whose state root it was verified under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AccountKey {
    block_hash: H256,
    address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CodeKey {
    block_hash: H256,
    key: [u8; 32],
}

/// Implements the five lookup methods of §4.E against a peer pool, a
/// request/reply correlator, and an account-proof verifier. Every
/// successful result is memoized; failures, including not-found, are never
/// cached (§3 invariant 3, §8 property 5).
pub struct LookupApi {
    peer_pool: Arc<dyn PeerPool>,
    correlator: Arc<Correlator>,
    proof_verifier: Arc<dyn AccountProofVerifier>,
    headers: SingleFlightCache<H256, BlockHeader>,
    bodies: SingleFlightCache<H256, BlockBody>,
    receipts: SingleFlightCache<H256, Vec<Receipt>>,
    accounts: SingleFlightCache<AccountKey, Account>,
    codes: SingleFlightCache<CodeKey, Vec<u8>>,
}

impl LookupApi {
    pub fn new(
        peer_pool: Arc<dyn PeerPool>,
        correlator: Arc<Correlator>,
        proof_verifier: Arc<dyn AccountProofVerifier>,
    ) -> Self {
        Self {
            peer_pool,
            correlator,
            proof_verifier,
            headers: SingleFlightCache::new(LOOKUP_CACHE_CAPACITY),
            bodies: SingleFlightCache::new(LOOKUP_CACHE_CAPACITY),
            receipts: SingleFlightCache::new(LOOKUP_CACHE_CAPACITY),
            accounts: SingleFlightCache::new(LOOKUP_CACHE_CAPACITY),
            codes: SingleFlightCache::new(LOOKUP_CACHE_CAPACITY),
        }
    }

    async fn selected_peer(&self) -> Result<Arc<dyn crate::peer::Peer>, LookupError> {
        self.peer_pool
            .highest_td_peer()
            .await
            .ok_or(LookupError::NoPeersAvailable)
    }

    /// `get_block_header_by_hash`: requests a single header by hash and
    /// checks the returned header's own hash matches what was asked for
    /// before trusting (or caching) it.
    pub async fn get_block_header_by_hash(&self, hash: H256) -> Result<BlockHeader, LookupError> {
        self.headers
            .get_or_fill(hash, || async {
                let peer = self.selected_peer().await?;
                let reply = self
                    .correlator
                    .send_and_wait(|request_id| {
                        peer.sub_proto().send_get_block_headers(
                            HashOrNumber::Hash(hash),
                            1,
                            request_id,
                            false,
                        )
                    })
                    .await?;

                let Reply::BlockHeaders { headers, .. } = reply else {
                    return Err(LookupError::HeaderNotFound(hash));
                };
                let header = headers
                    .into_iter()
                    .next()
                    .ok_or(LookupError::HeaderNotFound(hash))?;
                if header.hash != hash {
                    return Err(LookupError::BadLesResponse {
                        requested: hash,
                        returned: header.hash,
                    });
                }
                Ok(header)
            })
            .await
    }

    /// `get_block_body_by_hash`: trusts the peer's reply (no in-core check
    /// against `transactions_root` — an acceptable, unimplemented
    /// enhancement per spec §9).
    pub async fn get_block_body_by_hash(&self, hash: H256) -> Result<BlockBody, LookupError> {
        self.bodies
            .get_or_fill(hash, || async {
                let peer = self.selected_peer().await?;
                let reply = self
                    .correlator
                    .send_and_wait(|request_id| {
                        peer.sub_proto()
                            .send_get_block_bodies(vec![hash], request_id)
                    })
                    .await?;

                let Reply::BlockBodies { bodies, .. } = reply else {
                    return Err(LookupError::BlockNotFound(hash));
                };
                bodies
                    .into_iter()
                    .next()
                    .ok_or(LookupError::BlockNotFound(hash))
            })
            .await
    }

    /// `get_receipts`. Preserves the spec-flagged quirk verbatim: the reply
    /// already carries `reply['receipts'][0]` pre-indexed (see
    /// [`crate::message::Reply::Receipts`]'s doc comment) rather than a
    /// list of per-block receipt lists; this method does not "fix" that.
    pub async fn get_receipts(&self, hash: H256) -> Result<Vec<Receipt>, LookupError> {
        self.receipts
            .get_or_fill(hash, || async {
                let peer = self.selected_peer().await?;
                let reply = self
                    .correlator
                    .send_and_wait(|request_id| {
                        peer.sub_proto().send_get_receipts(hash, request_id)
                    })
                    .await?;

                let Reply::Receipts { receipts, .. } = reply else {
                    return Err(LookupError::BlockNotFound(hash));
                };
                if receipts.is_empty() {
                    return Err(LookupError::BlockNotFound(hash));
                }
                Ok(receipts)
            })
            .await
    }

    /// `get_account`: composes a header-by-hash lookup (for `state_root`)
    /// with a `GetProof` round trip, then verifies the proof locally before
    /// trusting the decoded account.
    pub async fn get_account(
        &self,
        block_hash: H256,
        address: Address,
    ) -> Result<Account, LookupError> {
        let key = AccountKey {
            block_hash,
            address,
        };
        self.accounts
            .get_or_fill(key, || async {
                let header = self.get_block_header_by_hash(block_hash).await?;
                let peer = self.selected_peer().await?;
                let trie_key = account_trie_key(address);

                let reply = self
                    .correlator
                    .send_and_wait(|request_id| {
                        // Matches the original's `_get_proof(account_key=b'',
                        // key=keccak(address))`: `account_key` is the
                        // (unused, for this lookup) storage-trie account
                        // key, and `key` carries the state-trie key we're
                        // actually proving.
                        peer.sub_proto().send_get_proof(
                            block_hash,
                            Vec::new(),
                            trie_key.as_bytes().to_vec(),
                            0,
                            request_id,
                        )
                    })
                    .await?;

                let Reply::Proof { nodes, .. } = reply else {
                    return Err(LookupError::ProofVerificationFailed {
                        address,
                        state_root: header.state_root,
                        reason: "reply was not a Proof".to_string(),
                    });
                };

                self.proof_verifier
                    .verify_account(header.state_root, address, &nodes)
                    .map_err(|source| LookupError::ProofVerificationFailed {
                        address,
                        state_root: header.state_root,
                        reason: source.to_string(),
                    })
            })
            .await
    }

    /// `get_contract_code`: returns empty bytes if the reply lacks code —
    /// not an error, per spec §4.E.
    pub async fn get_contract_code(
        &self,
        block_hash: H256,
        key: H256,
    ) -> Result<Vec<u8>, LookupError> {
        let cache_key = CodeKey {
            block_hash,
            key: key.to_fixed_bytes(),
        };
        self.codes
            .get_or_fill(cache_key, || async {
                let peer = self.selected_peer().await?;
                let reply = self
                    .correlator
                    .send_and_wait(|request_id| {
                        peer.sub_proto().send_get_contract_code(
                            block_hash,
                            key.as_bytes().to_vec(),
                            request_id,
                        )
                    })
                    .await?;

                let Reply::Codes { codes, .. } = reply else {
                    debug!(%block_hash, "reply to GetContractCode was not Codes, treating as empty");
                    return Ok(Vec::new());
                };
                Ok(codes.into_iter().next().unwrap_or_default())
            })
            .await
    }
}
