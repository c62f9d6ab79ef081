//! Context-scoped event routing.
//!
//! The router maps browsing context IDs to the per-context event bus and
//! keeps a secondary index from tunneled CDP session IDs to contexts.
//!
//! | Event shape | Delivered to |
//! |-------------|--------------|
//! | `params.context` set | that context |
//! | `params.source.context` set | that context |
//! | `cdp.eventReceived` with known session | owning context, inner event only |
//! | anything else | global listeners only |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::emitter::EventBus;
use crate::identifiers::{CdpSessionId, ContextId};
use crate::protocol::{Event, EventTarget};

// ============================================================================
// Delivery
// ============================================================================

/// Routing decision for one inbound event.
///
/// Computed while the router is locked and delivered after the lock is
/// released, so handlers may register or unregister contexts.
#[derive(Debug)]
pub enum Delivery {
    /// Publish the event on a context bus.
    Context {
        /// Target context.
        context: ContextId,
        /// Its bus.
        bus: Arc<EventBus<Event>>,
    },
    /// Publish an unwrapped CDP event on a context bus.
    Tunnel {
        /// Target context.
        context: ContextId,
        /// Its bus.
        bus: Arc<EventBus<Event>>,
        /// The CDP event inside the envelope.
        inner: Event,
    },
    /// No context-level delivery.
    Global,
}

impl Delivery {
    /// Publishes `event` according to the decision.
    ///
    /// Returns the number of context-level handlers run.
    pub fn deliver(&self, event: &Event) -> usize {
        match self {
            Self::Context { bus, .. } => bus.publish(event),
            Self::Tunnel { bus, inner, .. } => bus.publish(inner),
            Self::Global => 0,
        }
    }

    /// Returns the receiving context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&ContextId> {
        match self {
            Self::Context { context, .. } | Self::Tunnel { context, .. } => Some(context),
            Self::Global => None,
        }
    }
}

// ============================================================================
// EventRouter
// ============================================================================

/// Registry of live contexts for event delivery.
#[derive(Debug, Default)]
pub struct EventRouter {
    /// Live contexts.
    contexts: FxHashMap<ContextId, Arc<EventBus<Event>>>,
    /// CDP session to owning context.
    cdp_sessions: FxHashMap<CdpSessionId, ContextId>,
}

impl EventRouter {
    /// Creates an empty router.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a context bus, replacing any previous one for the ID.
    pub fn register(&mut self, context: ContextId, bus: Arc<EventBus<Event>>) {
        trace!(%context, "Context registered for routing");
        self.contexts.insert(context, bus);
    }

    /// Removes a context and every CDP session bound to it.
    ///
    /// Returns `false` if the context was not registered.
    pub fn unregister(&mut self, context: &ContextId) -> bool {
        self.cdp_sessions.retain(|_, owner| owner != context);
        self.contexts.remove(context).is_some()
    }

    /// Binds a CDP session to a registered context.
    ///
    /// Returns `false` if the context is unknown.
    pub fn bind_cdp_session(&mut self, context: &ContextId, session: CdpSessionId) -> bool {
        if !self.contexts.contains_key(context) {
            return false;
        }
        trace!(%context, %session, "CDP session bound");
        self.cdp_sessions.insert(session, context.clone());
        true
    }

    /// Decides where an event goes.
    #[must_use]
    pub fn route(&self, event: &Event) -> Delivery {
        match event.target() {
            EventTarget::Context(context) => match self.contexts.get(&context) {
                Some(bus) => Delivery::Context {
                    bus: Arc::clone(bus),
                    context,
                },
                None => {
                    trace!(%context, method = %event.method, "Event for unknown context");
                    Delivery::Global
                }
            },

            EventTarget::CdpSession { session, inner } => {
                let owner = self
                    .cdp_sessions
                    .get(&session)
                    .and_then(|context| self.contexts.get(context).map(|bus| (context, bus)));

                match owner {
                    Some((context, bus)) => Delivery::Tunnel {
                        context: context.clone(),
                        bus: Arc::clone(bus),
                        inner,
                    },
                    None => {
                        trace!(%session, "CDP event for unknown session");
                        Delivery::Global
                    }
                }
            }

            EventTarget::Global => Delivery::Global,
        }
    }

    /// Returns `true` if the context is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, context: &ContextId) -> bool {
        self.contexts.contains_key(context)
    }

    /// Returns the number of registered contexts.
    #[inline]
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.contexts.clear();
        self.cdp_sessions.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    fn counting_bus(counter: &Arc<AtomicUsize>) -> Arc<EventBus<Event>> {
        let bus = Arc::new(EventBus::new());
        let counter = Arc::clone(counter);
        bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus
    }

    #[test]
    fn test_routes_by_context() {
        let mut router = EventRouter::new();
        let x_hits = Arc::new(AtomicUsize::new(0));
        let y_hits = Arc::new(AtomicUsize::new(0));
        router.register(ContextId::new("X"), counting_bus(&x_hits));
        router.register(ContextId::new("Y"), counting_bus(&y_hits));

        let event = Event::new("browsingContext.load", json!({ "context": "X" }));
        let delivery = router.route(&event);
        assert_eq!(delivery.context().map(ContextId::as_str), Some("X"));
        delivery.deliver(&event);

        assert_eq!(x_hits.load(Ordering::SeqCst), 1);
        assert_eq!(y_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_routes_by_source_context() {
        let mut router = EventRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        router.register(ContextId::new("X"), counting_bus(&hits));

        let event = Event::new(
            "log.entryAdded",
            json!({ "source": { "realm": "r", "context": "X" } }),
        );
        router.route(&event).deliver(&event);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_context_is_global() {
        let router = EventRouter::new();
        let event = Event::new("browsingContext.load", json!({ "context": "Z" }));
        assert!(matches!(router.route(&event), Delivery::Global));
    }

    #[test]
    fn test_cdp_tunnel_delivers_inner_event() {
        let mut router = EventRouter::new();
        let bus: Arc<EventBus<Event>> = Arc::new(EventBus::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event: &Event| seen.lock().push(event.method.clone()));
        }

        let context = ContextId::new("X");
        router.register(context.clone(), bus);
        assert!(router.bind_cdp_session(&context, CdpSessionId::new("S1")));

        let event = Event::new(
            "cdp.eventReceived",
            json!({
                "cdpSession": "S1",
                "cdpMethod": "Tracing.tracingComplete",
                "cdpParams": { "stream": "h1" }
            }),
        );
        router.route(&event).deliver(&event);

        assert_eq!(*seen.lock(), vec!["Tracing.tracingComplete".to_string()]);
    }

    #[test]
    fn test_unregister_drops_sessions() {
        let mut router = EventRouter::new();
        let context = ContextId::new("X");
        router.register(context.clone(), Arc::new(EventBus::new()));
        router.bind_cdp_session(&context, CdpSessionId::new("S1"));

        assert!(router.unregister(&context));
        assert!(!router.unregister(&context));
        assert_eq!(router.context_count(), 0);

        let event = Event::new(
            "cdp.eventReceived",
            json!({ "cdpSession": "S1", "cdpMethod": "X.y", "cdpParams": {} }),
        );
        assert!(matches!(router.route(&event), Delivery::Global));
    }

    #[test]
    fn test_bind_requires_known_context() {
        let mut router = EventRouter::new();
        assert!(!router.bind_cdp_session(&ContextId::new("nope"), CdpSessionId::new("S")));
    }
}
