//! Tunable constants for the synchronizer, centralized the way the teacher's
//! `snap::constants` module centralizes `PEER_REPLY_TIMEOUT`,
//! `REQUEST_RETRY_ATTEMPTS` and friends.

use std::time::Duration;

/// How long [`crate::correlator::Correlator::send_and_wait`] waits for a
/// correlated reply before failing with a timeout.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive timeouts a single header batch fetch tolerates before the
/// synchronizer gives up and the peer is disconnected.
pub const MAX_CONSECUTIVE_TIMEOUTS: u32 = 5;

/// Delay between retries of a timed-out batch fetch.
pub const TIMEOUT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Capacity of each of the four on-demand lookup LRU caches (header, body,
/// receipts, account).
pub const LOOKUP_CACHE_CAPACITY: usize = 1024;
