//! Pending command correlation.
//!
//! Every outgoing command gets a fresh [`CommandId`] and a slot in the
//! registry. The slot is consumed exactly once: by a response, by the
//! command's timeout, or by [`CallRegistry::clear`] when the connection
//! goes away. Dropping the call future also frees the slot.
//!
//! The timeout runs from the moment the command is sent, not from the
//! first poll of the returned future.
//!
//! | Outcome | Result seen by the caller |
//! |---------|---------------------------|
//! | Success response | `Ok(result)` |
//! | Error response | [`Error::Protocol`] with `"{error} {message}"` text |
//! | No response in time | [`Error::Timeout`] |
//! | Connection closed | [`Error::ConnectionClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

// ============================================================================
// Types
// ============================================================================

/// One outstanding command.
struct PendingCall {
    /// Method name, kept for error reporting.
    method: String,
    /// Completion channel.
    tx: oneshot::Sender<Result<Value>>,
}

/// Frees a call's slot when its future goes away unsettled.
struct PendingGuard {
    registry: Arc<CallRegistry>,
    id: CommandId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.registry.pending.lock().remove(&self.id).is_some() {
            trace!(id = %self.id, "Call abandoned by caller");
        }
    }
}

// ============================================================================
// CallRegistry
// ============================================================================

/// Registry of in-flight commands keyed by ID.
pub struct CallRegistry {
    /// Last issued ID.
    last_id: AtomicU64,
    /// Outstanding calls.
    pending: Mutex<FxHashMap<CommandId, PendingCall>>,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self {
            last_id: AtomicU64::new(0),
            pending: Mutex::new(FxHashMap::default()),
        }
    }
}

impl std::fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRegistry")
            .field("last_id", &self.last_id.load(Ordering::Relaxed))
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl CallRegistry {
    /// Creates an empty registry. The first ID handed out is 1.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call and hands its ID to `send`.
    ///
    /// `send` runs synchronously, before this method returns, so IDs are
    /// assigned and messages queued in call order. If `send` fails the
    /// entry is removed and the returned future yields that error.
    ///
    /// A `timeout` of `None` or zero waits indefinitely.
    pub fn create<F>(
        self: &Arc<Self>,
        method: &str,
        timeout: Option<Duration>,
        send: F,
    ) -> BoxFuture<'static, Result<Value>>
    where
        F: FnOnce(CommandId) -> Result<()>,
    {
        let id = CommandId::new(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = oneshot::channel();

        self.pending.lock().insert(
            id,
            PendingCall {
                method: method.to_string(),
                tx,
            },
        );

        let sent = send(id);
        if sent.is_err() {
            self.pending.lock().remove(&id);
        }

        let guard = PendingGuard {
            registry: Arc::clone(self),
            id,
        };
        let method = method.to_string();
        let deadline = timeout
            .filter(|limit| !limit.is_zero())
            .map(|limit| (Instant::now() + limit, limit));

        async move {
            sent?;
            guard.registry.wait(id, method, deadline, rx).await
        }
        .boxed()
    }

    /// Waits for the call's outcome, enforcing the deadline.
    async fn wait(
        &self,
        id: CommandId,
        method: String,
        deadline: Option<(Instant, Duration)>,
        mut rx: oneshot::Receiver<Result<Value>>,
    ) -> Result<Value> {
        let Some((deadline, limit)) = deadline else {
            return rx.await.unwrap_or(Err(Error::ConnectionClosed));
        };

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(Error::ConnectionClosed)),
            Err(_) => {
                if self.pending.lock().remove(&id).is_some() {
                    debug!(%id, method = %method, "Command timed out");
                    return Err(Error::timeout(id, method, limit.as_millis() as u64));
                }

                // Settled between the deadline and the removal; the settler
                // sends right after taking the entry.
                rx.await.unwrap_or(Err(Error::ConnectionClosed))
            }
        }
    }

    /// Completes a call with a success value.
    ///
    /// Returns `false` for unknown or already-settled IDs.
    pub fn resolve(&self, id: CommandId, result: Value) -> bool {
        self.settle(id, |_| Ok(result))
    }

    /// Completes a call with an error message from the remote end.
    ///
    /// Returns `false` for unknown or already-settled IDs.
    pub fn reject(&self, id: CommandId, message: String) -> bool {
        self.settle(id, |method| Err(Error::protocol(method, message)))
    }

    /// Completes a call with a local error.
    pub fn fail(&self, id: CommandId, error: Error) -> bool {
        self.settle(id, |_| Err(error))
    }

    /// Rejects every pending call with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of calls rejected.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();

        for (_, call) in drained {
            let _ = call.tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands on close");
        }
        count
    }

    /// Returns the number of outstanding calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if the call is still outstanding.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, id: CommandId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    fn settle<F>(&self, id: CommandId, outcome: F) -> bool
    where
        F: FnOnce(String) -> Result<Value>,
    {
        let Some(call) = self.pending.lock().remove(&id) else {
            trace!(%id, "Outcome for unknown command");
            return false;
        };

        let _ = call.tx.send(outcome(call.method));
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn registry() -> Arc<CallRegistry> {
        Arc::new(CallRegistry::new())
    }

    #[tokio::test]
    async fn test_ids_are_sequential_from_one() {
        let registry = registry();
        let mut seen = Vec::new();
        let mut calls = Vec::new();

        for _ in 0..3 {
            calls.push(registry.create("m", None, |id| {
                seen.push(id.as_u64());
                Ok(())
            }));
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(registry.pending_count(), 3);
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let registry = registry();
        let first = registry.create("a.one", None, |_| Ok(()));
        let second = registry.create("a.two", None, |_| Ok(()));

        assert!(registry.resolve(CommandId::new(2), json!("two")));
        assert_eq!(second.await.expect("second"), json!("two"));
        assert!(registry.is_pending(CommandId::new(1)));

        assert!(registry.resolve(CommandId::new(1), json!("one")));
        assert_eq!(first.await.expect("first"), json!("one"));
    }

    #[tokio::test]
    async fn test_reject_carries_method_and_message() {
        let registry = registry();
        let call = registry.create("browsingContext.navigate", None, |_| Ok(()));

        registry.reject(CommandId::new(1), "unknown error boom".to_string());
        let err = call.await.expect_err("rejected");

        assert!(err.is_protocol_error());
        assert_eq!(
            err.to_string(),
            "Protocol error (browsingContext.navigate): unknown error boom"
        );
    }

    #[tokio::test]
    async fn test_send_failure_removes_entry() {
        let registry = registry();
        let call = registry.create("m", None, |_| Err(Error::ConnectionClosed));

        assert_eq!(registry.pending_count(), 0);
        assert!(matches!(call.await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response() {
        let registry = registry();
        let call = registry.create("slow.call", Some(Duration::from_millis(100)), |_| Ok(()));

        let err = call.await.expect_err("timed out");
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Command 1 (slow.call) timed out after 100ms"
        );
        assert_eq!(registry.pending_count(), 0);

        assert!(!registry.resolve(CommandId::new(1), json!({})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_waits() {
        let registry = registry();
        let call = tokio::spawn(registry.create("m", Some(Duration::ZERO), |_| Ok(())));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(registry.is_pending(CommandId::new(1)));

        registry.resolve(CommandId::new(1), json!(7));
        assert_eq!(call.await.expect("join").expect("ok"), json!(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_frees_slot() {
        let registry = registry();
        let call = registry.create("m", Some(Duration::from_millis(50)), |_| Ok(()));

        let outer = tokio::time::timeout(Duration::from_millis(10), call).await;
        assert!(outer.is_err());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(registry.pending_count(), 0);
        assert!(!registry.resolve(CommandId::new(1), json!({})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_without_timeout_frees_slot() {
        let registry = registry();
        let call = registry.create("m", None, |_| Ok(()));
        assert_eq!(registry.pending_count(), 1);

        drop(call);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_starts_at_send() {
        let registry = registry();
        let call = registry.create("idle.call", Some(Duration::from_millis(50)), |_| Ok(()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let awaited_at = Instant::now();

        let err = call.await.expect_err("timed out");
        assert!(err.is_timeout());
        assert_eq!(awaited_at.elapsed(), Duration::ZERO);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_rejects_all() {
        let registry = registry();
        let a = registry.create("a", None, |_| Ok(()));
        let b = registry.create("b", Some(Duration::from_secs(5)), |_| Ok(()));

        assert_eq!(registry.clear(), 2);
        assert!(matches!(a.await, Err(Error::ConnectionClosed)));
        assert!(matches!(b.await, Err(Error::ConnectionClosed)));
        assert_eq!(registry.clear(), 0);
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let registry = CallRegistry::new();
        assert!(!registry.resolve(CommandId::new(42), Value::Null));
        assert!(!registry.reject(CommandId::new(42), "x".to_string()));
    }
}
