//! Request/reply correlation: §4.B of the design. One-shot delivery slots
//! keyed by request id, exactly mirroring the teacher's
//! `Established::current_requests: HashMap<u64, (String, oneshot::Sender<Message>)>`
//! plus `PeerConnection::outgoing_request`'s
//! `tokio::time::timeout(timeout, oneshot_rx)` pattern — generalized here to
//! race against a service-wide [`CancellationToken`] as well, since this
//! core (unlike a single connection actor) must resume every suspended
//! waiter on shutdown.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::REPLY_TIMEOUT;
use crate::error::CorrelatorError;
use crate::message::Reply;

#[derive(Default)]
struct PendingReplies {
    slots: HashMap<u64, oneshot::Sender<Reply>>,
}

/// Issues request ids, parks waiters, and delivers matching replies.
pub struct Correlator {
    pending: Mutex<PendingReplies>,
    cancel: CancellationToken,
}

impl Correlator {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            pending: Mutex::new(PendingReplies::default()),
            cancel,
        }
    }

    /// Issues a request id, registers a delivery slot for it, dispatches
    /// the request via `build_request`, then suspends until either the
    /// slot is fulfilled, `REPLY_TIMEOUT` elapses, or the service is
    /// cancelled.
    ///
    /// On timeout the slot is removed and a late-arriving reply is
    /// thereafter silently discarded by [`Self::deliver`]. On cancellation
    /// every suspended waiter resolves this way; no new request should be
    /// issued afterwards (callers are expected to check their own
    /// cancellation token before calling in, same as the rest of the
    /// service).
    pub async fn send_and_wait<F, Fut>(&self, build_request: F) -> Result<Reply, CorrelatorError>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()>,
    {
        let request_id = self.register_unique_id().await;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.slots.insert(request_id, tx);
        }

        build_request(request_id).await;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.pending.lock().await.slots.remove(&request_id);
                Err(CorrelatorError::Cancelled { request_id })
            }
            outcome = tokio::time::timeout(REPLY_TIMEOUT, rx) => {
                match outcome {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(_recv_error)) => Err(CorrelatorError::SlotDropped { request_id }),
                    Err(_elapsed) => {
                        self.pending.lock().await.slots.remove(&request_id);
                        Err(CorrelatorError::Timeout { request_id })
                    }
                }
            }
        }
    }

    /// Delivers a reply to its parked waiter, if any. Unknown request ids
    /// (the waiter already timed out, or this is a stray/duplicate reply)
    /// are logged and dropped — never treated as an error.
    pub async fn deliver(&self, reply: Reply) {
        let request_id = reply.request_id();
        let mut pending = self.pending.lock().await;
        match pending.slots.remove(&request_id) {
            Some(slot) => {
                // The receiver may already be gone (e.g. a timeout raced
                // with this delivery); that's fine, just drop the reply.
                let _ = slot.send(reply);
            }
            None => trace!(request_id, "dropping reply with no matching waiter"),
        }
    }

    /// Resolves every currently-parked waiter with a cancellation error.
    /// Called once, from the service's shutdown path.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn register_unique_id(&self) -> u64 {
        let pending = self.pending.lock().await;
        loop {
            let candidate: u64 = rand::random();
            if !pending.slots.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn reply(request_id: u64) -> Reply {
        Reply::BlockHeaders {
            request_id,
            headers: vec![],
        }
    }

    #[tokio::test]
    async fn delivers_reply_to_matching_waiter() {
        let correlator = Arc::new(Correlator::new(CancellationToken::new()));
        let c = correlator.clone();
        let result = c
            .send_and_wait(|request_id| {
                let correlator = correlator.clone();
                async move {
                    correlator.deliver(reply(request_id)).await;
                }
            })
            .await
            .expect("reply delivered");

        assert!(matches!(result, Reply::BlockHeaders { headers, .. } if headers.is_empty()));
    }

    #[tokio::test]
    async fn unknown_request_id_is_dropped_without_side_effects() {
        let correlator = Correlator::new(CancellationToken::new());
        // No waiter was ever registered for this id.
        correlator.deliver(reply(42)).await;
        assert!(correlator.pending.lock().await.slots.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_after_timeout_is_discarded() {
        let correlator = Arc::new(Correlator::new(CancellationToken::new()));
        let c = correlator.clone();
        let wait = tokio::spawn(async move { c.send_and_wait(|_id| async {}).await });

        tokio::time::advance(REPLY_TIMEOUT + Duration::from_millis(1)).await;
        let outcome = wait.await.expect("task did not panic");
        assert!(matches!(outcome, Err(CorrelatorError::Timeout { .. })));
        assert!(correlator.pending.lock().await.slots.is_empty());
    }

    #[tokio::test]
    async fn cancellation_resolves_parked_waiters() {
        let token = CancellationToken::new();
        let correlator = Arc::new(Correlator::new(token.clone()));
        let c = correlator.clone();
        let wait = tokio::spawn(async move { c.send_and_wait(|_id| async {}).await });

        // Give the spawned task a chance to register its slot before we cancel.
        tokio::task::yield_now().await;
        token.cancel();

        let outcome = wait.await.expect("task did not panic");
        assert!(matches!(outcome, Err(CorrelatorError::Cancelled { .. })));
    }
}
