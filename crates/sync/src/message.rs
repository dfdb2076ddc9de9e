//! LES wire commands recognized by the core.
//!
//! These are plain decoded values: the framing, RLPx encryption and RLP
//! decoding that produce them are out of scope (the peer-to-peer transport
//! layer's job). The shapes mirror LES v2 as described in the spec, and the
//! `request_id` convention mirrors the teacher's own `RLPxMessage` dispatch
//! (`message.rs`'s per-variant `CODE`, generalized here to per-variant
//! `request_id()`).

use ethereum_types::H256;
use lcsync_common::{BlockBody, BlockHeader, HeadInfo, Receipt};

/// Either a block hash or a block number, as `GetBlockHeaders` accepts both
/// (a lookup-by-hash request for a single header, or a forward scan from a
/// number during sync).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashOrNumber {
    Hash(H256),
    Number(u64),
}

impl From<u64> for HashOrNumber {
    fn from(n: u64) -> Self {
        HashOrNumber::Number(n)
    }
}

impl From<H256> for HashOrNumber {
    fn from(h: H256) -> Self {
        HashOrNumber::Hash(h)
    }
}

/// An outbound LES request, about to be handed to a peer's `sub_proto`
/// sender. Each variant already carries the `request_id` the correlator
/// assigned it.
#[derive(Debug, Clone)]
pub enum Request {
    GetBlockHeaders {
        request_id: u64,
        start: HashOrNumber,
        max_headers: u64,
        reverse: bool,
    },
    GetBlockBodies {
        request_id: u64,
        hashes: Vec<H256>,
    },
    GetReceipts {
        request_id: u64,
        block_hash: H256,
    },
    GetProof {
        request_id: u64,
        block_hash: H256,
        account_key: Vec<u8>,
        key: Vec<u8>,
        from_level: u64,
    },
    GetContractCode {
        request_id: u64,
        block_hash: H256,
        key: Vec<u8>,
    },
}

impl Request {
    pub fn request_id(&self) -> u64 {
        match self {
            Request::GetBlockHeaders { request_id, .. }
            | Request::GetBlockBodies { request_id, .. }
            | Request::GetReceipts { request_id, .. }
            | Request::GetProof { request_id, .. }
            | Request::GetContractCode { request_id, .. } => *request_id,
        }
    }
}

/// A decoded reply to one of the five request kinds. Carries the
/// `request_id` it answers so the correlator can match it to a waiter.
#[derive(Debug, Clone)]
pub enum Reply {
    BlockHeaders {
        request_id: u64,
        headers: Vec<BlockHeader>,
    },
    BlockBodies {
        request_id: u64,
        bodies: Vec<BlockBody>,
    },
    Receipts {
        request_id: u64,
        /// Per the spec's flagged open question (not silently "fixed"):
        /// the original implementation indexes `reply['receipts'][0]` and
        /// returns it as the receipts of the requested block, even though
        /// the wire shape is "list of per-block receipt lists". We mirror
        /// that by storing the already-indexed single block's receipts
        /// here rather than `Vec<Vec<Receipt>>`.
        receipts: Vec<Receipt>,
    },
    Proof {
        request_id: u64,
        nodes: Vec<Vec<u8>>,
    },
    Codes {
        request_id: u64,
        codes: Vec<Vec<u8>>,
    },
}

impl Reply {
    pub fn request_id(&self) -> u64 {
        match self {
            Reply::BlockHeaders { request_id, .. }
            | Reply::BlockBodies { request_id, .. }
            | Reply::Receipts { request_id, .. }
            | Reply::Proof { request_id, .. }
            | Reply::Codes { request_id, .. } => *request_id,
        }
    }
}

/// Everything that can arrive on a peer's inbound message stream, already
/// classified by the shape the decoder gave it (but not yet by the
/// multiplexer — that's `InboundMessage`, see below).
#[derive(Debug, Clone)]
pub enum PeerMessage {
    /// Unsolicited chain-tip announcement.
    Announce(HeadInfo),
    /// A reply to one of our outstanding requests.
    Reply(Reply),
    /// Anything else (future LES message kinds, or kinds this core never
    /// requests). Logged at warn level and dropped by the multiplexer.
    Other,
}
