use ethereum_types::{Address, H256};

use lcsync_common::BlockHeader;

/// Reason broadcast to the peer layer when we drop a connection.
///
/// Only these two reasons originate from this crate; transport-level
/// disconnects (e.g. the peer closing the socket) are the peer layer's own
/// concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    SubprotocolError,
    Timeout,
}

/// Failure modes of a single request/reply round trip through the
/// correlator.
#[derive(Debug, thiserror::Error)]
pub enum CorrelatorError {
    #[error("timed out waiting for reply to request {request_id}")]
    Timeout { request_id: u64 },

    #[error("service was cancelled while waiting for request {request_id}")]
    Cancelled { request_id: u64 },

    #[error("reply delivery slot for request {request_id} was dropped without a reply")]
    SlotDropped { request_id: u64 },
}

/// Failures raised while processing a single peer announcement. A peer name
/// (its identity, as a string — the core doesn't know the type of peer
/// identities used by the transport layer) is attached wherever the spec
/// calls for the offending peer to be named in the disconnect log.
#[derive(Debug, thiserror::Error)]
pub enum AnnouncementError {
    #[error("peer {peer} sent invalid header #{} ({:#x}): {source}", header.block_number, header.hash)]
    InvalidHeader {
        peer: String,
        header: Box<BlockHeader>,
        #[source]
        source: ValidationError,
    },

    #[error("no common ancestors found between us and {peer}")]
    NoCommonAncestor { peer: String },

    #[error("empty GetBlockHeaders reply from {peer} for start_block={start_block}")]
    EmptyHeadersReply { peer: String, start_block: u64 },

    #[error("batch from {peer} was out of order: parent {parent_hash:#x} of header #{block_number} is not in the local header database")]
    OutOfOrderBatch {
        peer: String,
        block_number: u64,
        parent_hash: H256,
    },

    #[error("{peer} replied to GetBlockHeaders with an unexpected reply kind")]
    UnexpectedReply { peer: String },

    #[error("too many consecutive timeouts fetching headers from {peer}")]
    TooManyTimeouts { peer: String },

    #[error("invalid sync request: {0}")]
    InvalidRequest(ValidationError),

    #[error(transparent)]
    Correlator(#[from] CorrelatorError),

    #[error(transparent)]
    HeaderStore(#[from] HeaderStoreError),

    #[error("service was cancelled")]
    Cancelled,
}

impl AnnouncementError {
    /// Whether this error should cause the peer to be disconnected, and
    /// with what reason — the policy table from the announcement processor
    /// contract, expressed as a method so [`crate::announcements`] and its
    /// tests share one source of truth.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            AnnouncementError::InvalidHeader { .. }
            | AnnouncementError::NoCommonAncestor { .. }
            | AnnouncementError::EmptyHeadersReply { .. }
            | AnnouncementError::OutOfOrderBatch { .. }
            | AnnouncementError::UnexpectedReply { .. } => {
                Some(DisconnectReason::SubprotocolError)
            }
            AnnouncementError::TooManyTimeouts { .. } => Some(DisconnectReason::Timeout),
            AnnouncementError::InvalidRequest(_)
            | AnnouncementError::Correlator(_)
            | AnnouncementError::HeaderStore(_)
            | AnnouncementError::Cancelled => None,
        }
    }

    /// Whether this error means the service is shutting down, rather than
    /// the peer having misbehaved. The processor exits its loop on this
    /// instead of logging-and-dropping the peer.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            AnnouncementError::Cancelled
                | AnnouncementError::Correlator(CorrelatorError::Cancelled { .. })
        )
    }
}

/// Raised by `validate_header` (an external collaborator in the real
/// system; here represented as a trait the core calls through).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("peer sent a genesis header that we didn't ask for")]
    UnexpectedGenesis,

    #[error("header failed consensus validation against its parent: {0}")]
    Rejected(String),

    #[error("must not attempt to download the genesis header from a peer")]
    GenesisNotFetchable,
}

/// Raised by the (out-of-scope) header database collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HeaderStoreError {
    #[error("header {0:#x} not found")]
    HeaderNotFound(H256),
}

/// Errors surfaced to external callers of the on-demand lookup API.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no header with hash {0:#x}")]
    HeaderNotFound(H256),

    #[error("no block with hash {0:#x}")]
    BlockNotFound(H256),

    #[error(
        "peer returned header {returned:#x} in reply to a request for {requested:#x}"
    )]
    BadLesResponse { requested: H256, returned: H256 },

    #[error("proof verification failed for account {address:#x} at state root {state_root:#x}: {reason}")]
    ProofVerificationFailed {
        address: Address,
        state_root: H256,
        reason: String,
    },

    #[error(transparent)]
    Correlator(#[from] CorrelatorError),

    #[error("no peers available to service this request")]
    NoPeersAvailable,
}
