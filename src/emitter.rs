//! Publish/subscribe channel shared by connections, contexts and pages.
//!
//! Each component that emits notifications owns its own [`EventBus`];
//! there is no shared emitter base. Handlers run synchronously on the
//! publishing task and must not block.
//!
//! # Example
//!
//! ```ignore
//! let bus: EventBus<String> = EventBus::new();
//! let id = bus.subscribe(|msg| println!("{msg}"));
//! bus.publish(&"hello".to_string());
//! bus.unsubscribe(id);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::identifiers::SubscriptionId;

// ============================================================================
// Types
// ============================================================================

/// Registered handler callback.
type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

// ============================================================================
// EventBus
// ============================================================================

/// A list of subscribers plus a `publish` operation.
pub struct EventBus<E> {
    /// Next subscription number.
    next_id: AtomicU64,
    /// Handlers in registration order.
    handlers: Mutex<Vec<(SubscriptionId, Handler<E>)>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<E> EventBus<E> {
    /// Creates an empty bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler and returns its subscription ID.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler.
    ///
    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Delivers an event to every handler registered at call time.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe while being called. Returns the number of handlers run.
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<Handler<E>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    /// Returns the number of registered handlers.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Removes every handler.
    ///
    /// Pending [`EventBus::once`] receivers observe a closed channel.
    pub fn clear(&self) {
        let drained: Vec<_> = self.handlers.lock().drain(..).collect();
        drop(drained);
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Registers a one-shot waiter for the first event matching `predicate`.
    ///
    /// The handler stays registered after firing; callers unsubscribe with
    /// the returned ID once the receiver resolves.
    pub fn once<P>(&self, predicate: P) -> (SubscriptionId, oneshot::Receiver<E>)
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        let id = self.subscribe(move |event| {
            if predicate(event)
                && let Some(tx) = slot.lock().take()
            {
                let _ = tx.send(event.clone());
            }
        });

        (id, rx)
    }
}

// ============================================================================
// Tests
// ============================================================================
