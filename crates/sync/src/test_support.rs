//! Test fixtures shared by this crate's unit tests and its `tests/`
//! integration suite: an in-memory [`HeaderStore`], a scripted [`FakePeer`]
//! whose `sub_proto` records every outbound request so a test can answer it
//! by hand, and trivial [`HeaderValidator`]/[`AccountProofVerifier`]/
//! [`PeerPool`] fakes. Modeled on the teacher's
//! `networking/rpc/test_utils.rs`, which stands up an in-memory `Store`
//! rather than a real database for RPC handler tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethereum_types::{Address, H256};
use lcsync_common::{Account, BlockHeader, HeadInfo};
use tokio::sync::mpsc;

use crate::error::{DisconnectReason, HeaderStoreError, ValidationError};
use crate::header_store::HeaderStore;
use crate::message::{HashOrNumber, Request};
use crate::peer::{Peer, PeerId, PeerPool, SubProtocolSender};
use crate::trie_proof::{AccountProofVerifier, ProofVerificationError};
use crate::validate::HeaderValidator;

/// An in-memory header database keyed by hash, with a canonical-number
/// index — exactly the two indexes the spec's header database promises.
#[derive(Default)]
pub struct InMemoryHeaderStore {
    by_hash: Mutex<HashMap<H256, BlockHeader>>,
    canonical: Mutex<BTreeMap<u64, H256>>,
}

impl InMemoryHeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with `header` as canonical, without going through
    /// `persist_header`'s reorg bookkeeping. Used to set up fixtures.
    pub fn seed(&self, header: BlockHeader) {
        let mut canonical = self.canonical.lock().unwrap_or_else(|e| e.into_inner());
        canonical.insert(header.block_number, header.hash);
        let mut by_hash = self.by_hash.lock().unwrap_or_else(|e| e.into_inner());
        by_hash.insert(header.hash, header);
    }
}

#[async_trait]
impl HeaderStore for InMemoryHeaderStore {
    async fn get_canonical_head(&self) -> BlockHeader {
        let canonical = self.canonical.lock().unwrap_or_else(|e| e.into_inner());
        let by_hash = self.by_hash.lock().unwrap_or_else(|e| e.into_inner());
        let (_, hash) = canonical
            .iter()
            .next_back()
            .expect("store seeded with at least a genesis header");
        by_hash
            .get(hash)
            .cloned()
            .expect("canonical index points at a stored header")
    }

    async fn header_exists(&self, hash: H256) -> bool {
        self.by_hash
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&hash)
    }

    async fn get_block_header_by_hash(&self, hash: H256) -> Result<BlockHeader, HeaderStoreError> {
        self.by_hash
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&hash)
            .cloned()
            .ok_or(HeaderStoreError::HeaderNotFound(hash))
    }

    async fn persist_header(&self, header: BlockHeader) {
        let mut canonical = self.canonical.lock().unwrap_or_else(|e| e.into_inner());
        canonical.insert(header.block_number, header.hash);
        let mut by_hash = self.by_hash.lock().unwrap_or_else(|e| e.into_inner());
        by_hash.insert(header.hash, header);
    }
}

/// A `HeaderValidator` that accepts everything except headers whose number
/// is in `reject_numbers` — enough to script both the happy path and a
/// validation failure.
#[derive(Default)]
pub struct FakeValidator {
    pub reject_numbers: Vec<u64>,
}

impl HeaderValidator for FakeValidator {
    fn validate_header(
        &self,
        header: &BlockHeader,
        _parent: &BlockHeader,
    ) -> Result<(), ValidationError> {
        if header.is_genesis() {
            return Err(ValidationError::UnexpectedGenesis);
        }
        if self.reject_numbers.contains(&header.block_number) {
            return Err(ValidationError::Rejected(format!(
                "header #{} scripted to fail",
                header.block_number
            )));
        }
        Ok(())
    }
}

/// Records every request dispatched through it so a test can pop them off
/// and answer via the correlator, same pattern the spec's `sub_proto`
/// describes: a sender of typed LES requests, with the actual reply path
/// running back through the multiplexer/correlator, not through this type.
pub struct FakeSubProto {
    sent: mpsc::UnboundedSender<Request>,
}

impl FakeSubProto {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (sent, rx) = mpsc::unbounded_channel();
        (Self { sent }, rx)
    }
}

#[async_trait]
impl SubProtocolSender for FakeSubProto {
    async fn send_get_block_headers(
        &self,
        start: HashOrNumber,
        max_headers: u64,
        request_id: u64,
        reverse: bool,
    ) {
        let _ = self.sent.send(Request::GetBlockHeaders {
            request_id,
            start,
            max_headers,
            reverse,
        });
    }

    async fn send_get_block_bodies(&self, hashes: Vec<H256>, request_id: u64) {
        let _ = self
            .sent
            .send(Request::GetBlockBodies { request_id, hashes });
    }

    async fn send_get_receipts(&self, block_hash: H256, request_id: u64) {
        let _ = self.sent.send(Request::GetReceipts {
            request_id,
            block_hash,
        });
    }

    async fn send_get_proof(
        &self,
        block_hash: H256,
        account_key: Vec<u8>,
        key: Vec<u8>,
        from_level: u64,
        request_id: u64,
    ) {
        let _ = self.sent.send(Request::GetProof {
            request_id,
            block_hash,
            account_key,
            key,
            from_level,
        });
    }

    async fn send_get_contract_code(&self, block_hash: H256, key: Vec<u8>, request_id: u64) {
        let _ = self.sent.send(Request::GetContractCode {
            request_id,
            block_hash,
            key,
        });
    }
}

/// A scripted peer: records its disconnect/cancel calls so a test can
/// assert on them, and exposes whichever `FakeSubProto` it was built with so
/// the test can drain dispatched requests and answer them.
pub struct FakePeer {
    id: PeerId,
    head_info: Mutex<HeadInfo>,
    max_headers_fetch: u64,
    sub_proto: FakeSubProto,
    disconnected: Mutex<Option<DisconnectReason>>,
    cancelled: AtomicBool,
}

impl FakePeer {
    pub fn new(id: &str) -> Self {
        Self::with_max_headers_fetch(id, 192)
    }

    pub fn with_max_headers_fetch(id: &str, max_headers_fetch: u64) -> Self {
        let (sub_proto, _rx) = FakeSubProto::new();
        Self {
            id: id.to_string(),
            head_info: Mutex::new(HeadInfo {
                block_hash: H256::zero(),
                block_number: 0,
                total_difficulty: ethereum_types::U256::zero(),
                reorg_depth: 0,
            }),
            max_headers_fetch,
            sub_proto,
            disconnected: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Builds a peer together with the receiving end of its sub-protocol
    /// sender, so a test can drain requests it dispatches.
    pub fn with_recorder(id: &str, max_headers_fetch: u64) -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (sub_proto, rx) = FakeSubProto::new();
        let peer = Self {
            id: id.to_string(),
            head_info: Mutex::new(HeadInfo {
                block_hash: H256::zero(),
                block_number: 0,
                total_difficulty: ethereum_types::U256::zero(),
                reorg_depth: 0,
            }),
            max_headers_fetch,
            sub_proto,
            disconnected: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        };
        (peer, rx)
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.disconnected.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FakePeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakePeer").field("id", &self.id).finish()
    }
}

impl Peer for FakePeer {
    fn id(&self) -> PeerId {
        self.id.clone()
    }

    fn head_info(&self) -> HeadInfo {
        *self.head_info.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_head_info(&self, info: HeadInfo) {
        *self.head_info.lock().unwrap_or_else(|e| e.into_inner()) = info;
    }

    fn max_headers_fetch(&self) -> u64 {
        self.max_headers_fetch
    }

    fn sub_proto(&self) -> &dyn SubProtocolSender {
        &self.sub_proto
    }

    fn disconnect(&self, reason: DisconnectReason) {
        *self.disconnected.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// A proof verifier that checks the proof against an expected, exact byte
/// sequence and returns a fixed `Account` on match — enough to exercise the
/// "mutate one byte and verification fails" property from the spec without
/// a real trie implementation.
pub struct FakeProofVerifier {
    pub expected_proof: Vec<Vec<u8>>,
    pub account: Account,
}

impl AccountProofVerifier for FakeProofVerifier {
    fn verify_account(
        &self,
        _state_root: H256,
        _address: Address,
        proof: &[Vec<u8>],
    ) -> Result<Account, ProofVerificationError> {
        if proof == self.expected_proof.as_slice() {
            Ok(self.account)
        } else {
            Err(ProofVerificationError::RootMismatch)
        }
    }
}

/// A static pool of peers, selecting whichever was registered with the
/// greatest total difficulty — the entire policy §4.E asks for.
#[derive(Default)]
pub struct FakePeerPool {
    peers: Mutex<Vec<Arc<dyn Peer>>>,
}

impl FakePeerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, peer: Arc<dyn Peer>) {
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).push(peer);
    }
}

#[async_trait]
impl PeerPool for FakePeerPool {
    async fn highest_td_peer(&self) -> Option<Arc<dyn Peer>> {
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .max_by_key(|peer| peer.head_info().total_difficulty)
            .cloned()
    }

    async fn get(&self, id: &PeerId) -> Option<Arc<dyn Peer>> {
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|peer| &peer.id() == id)
            .cloned()
    }

    async fn register(&self, peer: Arc<dyn Peer>) {
        self.insert(peer);
    }

    async fn deregister(&self, id: &PeerId) {
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|peer| &peer.id() != id);
    }
}
