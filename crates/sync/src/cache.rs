//! Content-addressed single-flight LRU cache used by every lookup in
//! [`crate::lookup`]. Grounded on the teacher's `storage/store.rs::CodeCache`
//! (an `lru::LruCache` wrapped in application logic), generalized here with
//! a single-flight layer so that two concurrent callers asking for the same
//! key only ever trigger one upstream fetch (spec §5, "at-most-one-
//! concurrent-fill per key").
//!
//! Failures are never cached: a failed fill only ever populates the slot for
//! the duration of the in-flight future, then the slot is removed whether
//! the fill succeeded or not (only success leaves a value behind, in the
//! LRU itself).

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use lru::LruCache;
use rustc_hash::FxBuildHasher;
use tokio::sync::{Mutex, Notify};

/// Per-key in-flight marker. Callers that find one already registered await
/// its `Notify` instead of starting a second upstream fetch.
struct InFlight {
    done: Arc<Notify>,
}

struct Inner<K, V> {
    lru: LruCache<K, V, FxBuildHasher>,
    in_flight: HashMap<K, InFlight>,
}

/// A content-addressed cache of capacity `LOOKUP_CACHE_CAPACITY` with
/// single-flight fills.
pub struct SingleFlightCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity).unwrap_or(std::num::NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::with_hasher(capacity, FxBuildHasher),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Returns the cached value for `key`, or runs `fill` to populate it.
    ///
    /// If `fill` fails the cache is left untouched (spec §3: "Failures are
    /// NOT cached"). If another caller is already filling the same key,
    /// this call waits for that fill to finish and then re-checks the LRU,
    /// rather than starting a second upstream request.
    pub async fn get_or_fill<F, Fut, E>(&self, key: K, fill: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        loop {
            let mut inner = self.inner.lock().await;
            if let Some(value) = inner.lru.get(&key) {
                return Ok(value.clone());
            }

            if let Some(in_flight) = inner.in_flight.get(&key) {
                // Build the `Notified` future and `enable()` it — registering
                // this waiter with the per-key `Notify` immediately rather
                // than on first poll — while we still hold `inner`. The
                // filler must take this same `self.inner` lock to reach
                // `notify_waiters()` below, so holding it across
                // registration guarantees our registration happens-before
                // any notification the filler sends. A bare
                // `clone-then-await` (registering only once `.notified()` is
                // polled) leaves a window after the guard is dropped where
                // the filler can finish and call `notify_waiters()` before
                // we've registered, and that call is a lost wakeup: nothing
                // is buffered for a waiter that shows up afterwards.
                let notify = in_flight.done.clone();
                let notified = notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                drop(inner);
                notified.await;
                // Someone else was already filling this key; loop back
                // around to check the LRU (or join the next flight, if
                // theirs failed too).
                continue;
            }

            inner.in_flight.insert(
                key.clone(),
                InFlight {
                    done: Arc::new(Notify::new()),
                },
            );
            drop(inner);

            // We are the single flight for this key.
            let result = fill().await;
            let mut inner = self.inner.lock().await;
            if let Ok(value) = &result {
                inner.lru.put(key.clone(), value.clone());
            }
            if let Some(in_flight) = inner.in_flight.remove(&key) {
                in_flight.done.notify_waiters();
            }
            return result;
        }
    }
}
