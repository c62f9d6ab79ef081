//! Connection and event loop.
//!
//! A [`Connection`] owns one [`Transport`] through a spawned event loop
//! task and exposes command send with response correlation plus event
//! subscription.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the remote end (responses, events)
//! - Outgoing commands queued by [`Connection::send`]
//! - Shutdown on [`Connection::dispose`] or transport close
//!
//! # Event Delivery
//!
//! Each inbound event is first published on the bus of the context it
//! targets (see [`EventRouter`]), then on the connection-wide bus.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace, warn};

use crate::emitter::EventBus;
use crate::error::{Error, Result};
use crate::identifiers::{CdpSessionId, CommandId, ContextId, SubscriptionId};
use crate::protocol::{Command, Event, EventKind, Incoming, Request};

use super::Transport;
use super::registry::CallRegistry;
use super::router::EventRouter;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(180);

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Connection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Per-command timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Pause before processing each inbound message.
    pub delay: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            delay: None,
        }
    }
}

impl ConnectionOptions {
    /// Creates options with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-command timeout. Zero disables it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Disables the per-command timeout.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets the inbound processing delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = (!delay.is_zero()).then_some(delay);
        self
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a serialized command.
    Send { id: CommandId, message: String },
    /// Close the transport and stop.
    Shutdown,
}

// ============================================================================
// ConnectionInner
// ============================================================================

/// State shared between handles and the event loop.
struct ConnectionInner {
    /// Channel to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// In-flight commands.
    registry: Arc<CallRegistry>,
    /// Context routing table.
    router: Mutex<EventRouter>,
    /// Connection-wide event bus.
    events: EventBus<Event>,
    /// Set once, on dispose or transport close.
    closed: AtomicBool,
    /// Close notification.
    closed_tx: watch::Sender<bool>,
    /// Tuning.
    options: ConnectionOptions,
}

impl ConnectionInner {
    /// Marks the connection closed and rejects pending calls.
    ///
    /// Returns `false` if it was already closed.
    fn teardown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.registry.clear();
        self.router.lock().clear();
        self.closed_tx.send_replace(true);
        true
    }

    /// Handles an inbound text message.
    fn handle_incoming_message(&self, text: &str) {
        match Incoming::parse(text) {
            Ok(Incoming::Response(response)) => {
                let id = response.id;
                match response.into_outcome() {
                    Ok(result) => {
                        self.registry.resolve(id, result);
                    }
                    Err(message) => {
                        self.registry.reject(id, message);
                    }
                }
            }

            Ok(Incoming::Event(event)) => self.dispatch_event(&event),

            Err(e) => warn!(error = %e, "Dropping malformed message"),
        }
    }

    /// Delivers an event to its context, then to global listeners.
    fn dispatch_event(&self, event: &Event) {
        let delivery = self.router.lock().route(event);
        let scoped = delivery.deliver(event);
        let global = self.events.publish(event);

        trace!(method = %event.method, scoped, global, "Event dispatched");
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Connection to a BiDi remote end.
///
/// Cheap to clone; every clone drives the same event loop.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_count())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Connection {
    /// Creates a connection over `transport`.
    ///
    /// Spawns the event loop task, so this must run inside a tokio runtime.
    pub fn new<T: Transport>(transport: T, options: ConnectionOptions) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);

        let inner = Arc::new(ConnectionInner {
            command_tx,
            registry: Arc::new(CallRegistry::new()),
            router: Mutex::new(EventRouter::new()),
            events: EventBus::new(),
            closed: AtomicBool::new(false),
            closed_tx,
            options,
        });

        tokio::spawn(run_event_loop(
            transport,
            command_rx,
            Arc::downgrade(&inner),
            options.delay,
        ));

        Self { inner }
    }

    /// Sends a command with the default timeout.
    ///
    /// The command ID is assigned and the message queued before this
    /// returns; the future only waits for the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is (or becomes) closed
    /// - [`Error::Timeout`] if no response arrives in time
    /// - [`Error::Protocol`] if the remote end answers with an error
    pub fn send(&self, method: &str, params: Value) -> BoxFuture<'static, Result<Value>> {
        self.send_with_timeout(method, params, self.inner.options.timeout)
    }

    /// Sends a command with an explicit timeout. `None` waits indefinitely.
    pub fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> BoxFuture<'static, Result<Value>> {
        let inner = &self.inner;

        inner.registry.create(method, timeout, |id| {
            if inner.closed.load(Ordering::Acquire) {
                return Err(Error::ConnectionClosed);
            }

            let message = serde_json::to_string(&Request::new(id, method, &params))?;
            trace!(%id, method, "Command queued");

            inner
                .command_tx
                .send(ConnectionCommand::Send { id, message })
                .map_err(|_| Error::ConnectionClosed)
        })
    }

    /// Sends a typed command.
    pub fn execute(&self, command: impl Into<Command>) -> BoxFuture<'static, Result<Value>> {
        match command.into().into_parts() {
            Ok((method, params)) => self.send(&method, params),
            Err(e) => async move { Err(e) }.boxed(),
        }
    }

    /// Subscribes to events of one kind on the connection-wide bus.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(move |event| {
            if event.kind() == kind {
                handler(event);
            }
        })
    }

    /// Subscribes to every event.
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    /// Removes a connection-wide subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Returns the connection-wide event bus.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventBus<Event> {
        &self.inner.events
    }

    /// Routes events for `context` to `bus`.
    pub fn register_context(&self, context: ContextId, bus: Arc<EventBus<Event>>) {
        self.inner.router.lock().register(context, bus);
    }

    /// Stops routing events for `context`.
    pub fn unregister_context(&self, context: &ContextId) -> bool {
        self.inner.router.lock().unregister(context)
    }

    /// Routes tunneled CDP events for `session` to `context`.
    pub fn bind_cdp_session(&self, context: &ContextId, session: CdpSessionId) -> bool {
        self.inner.router.lock().bind_cdp_session(context, session)
    }

    /// Returns `true` if events for `context` are routed.
    #[must_use]
    pub fn is_routed(&self, context: &ContextId) -> bool {
        self.inner.router.lock().contains(context)
    }

    /// Closes the connection.
    ///
    /// Pending commands fail with [`Error::ConnectionClosed`] and later
    /// sends fail fast. Idempotent.
    pub fn dispose(&self) {
        if self.inner.teardown() {
            let _ = self.inner.command_tx.send(ConnectionCommand::Shutdown);
            debug!("Connection disposed");
        }
    }

    /// Returns `true` once the connection is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolves when the connection closes, for any reason.
    pub fn wait_closed(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut closed_rx = self.inner.closed_tx.subscribe();
        async move {
            let _ = closed_rx.wait_for(|closed| *closed).await;
        }
    }

    /// Returns the number of in-flight commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.registry.pending_count()
    }

    /// Returns the connection options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that owns the transport.
///
/// Holds only a weak reference so dropping every [`Connection`] handle
/// ends the loop through the closed command channel.
async fn run_event_loop<T: Transport>(
    mut transport: T,
    mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    inner: Weak<ConnectionInner>,
    delay: Option<Duration>,
) {
    loop {
        tokio::select! {
            // Incoming messages from remote end
            message = transport.recv() => {
                match message {
                    Some(Ok(text)) => {
                        if let Some(delay) = delay {
                            tokio::time::sleep(delay).await;
                        }

                        let Some(inner) = inner.upgrade() else {
                            break;
                        };
                        inner.handle_incoming_message(&text);
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "Transport error");
                        break;
                    }

                    None => {
                        debug!("Transport closed by remote");
                        break;
                    }
                }
            }

            // Commands from Rust API
            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send { id, message }) => {
                        if let Err(e) = transport.send(message).await {
                            warn!(%id, error = %e, "Failed to write command");
                            if let Some(inner) = inner.upgrade() {
                                inner.registry.fail(id, Error::connection(e.to_string()));
                            }
                        }
                    }

                    Some(ConnectionCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        let _ = transport.close().await;
                        break;
                    }

                    None => {
                        debug!("Command channel closed");
                        let _ = transport.close().await;
                        break;
                    }
                }
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.teardown();
    }

    debug!("Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
