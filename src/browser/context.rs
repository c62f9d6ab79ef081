//! Browsing context handle.
//!
//! A [`BrowsingContext`] is one node of a page's frame tree: a top-level
//! tab or a nested frame. Each context owns an event bus that receives
//! every event the router addresses to it, including tunneled CDP events
//! once a CDP session is bound.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{OnceCell, oneshot};
use tracing::debug;

use crate::emitter::EventBus;
use crate::error::{Error, Result};
use crate::identifiers::{CdpSessionId, ContextId, SubscriptionId};
use crate::protocol::{
    BrowsingContextCommand, CdpCommand, ContextInfo, Event, EventKind, ScriptCommand, ScriptTarget,
};
use crate::transport::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Readiness state waited for by navigation commands.
const WAIT_COMPLETE: &str = "complete";

// ============================================================================
// BrowsingContext
// ============================================================================

/// A browsing context known to a page.
pub struct BrowsingContext {
    /// Stable context ID.
    id: ContextId,
    /// Parent context (None for top-level).
    parent: Option<ContextId>,
    /// Last known URL.
    url: Mutex<String>,
    /// Lazily acquired CDP session.
    cdp_session: OnceCell<CdpSessionId>,
    /// Events routed to this context.
    events: Arc<EventBus<Event>>,
    /// Owning connection.
    connection: Connection,
    /// Set once the context is detached.
    disposed: AtomicBool,
}

impl fmt::Debug for BrowsingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowsingContext")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("url", &*self.url.lock())
            .field("cdp_session", &self.cdp_session.get())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl BrowsingContext {
    /// Creates a context from its description.
    pub(crate) fn new(connection: Connection, info: &ContextInfo) -> Arc<Self> {
        Arc::new(Self {
            id: info.context.clone(),
            parent: info.parent.clone(),
            url: Mutex::new(info.url.clone()),
            cdp_session: OnceCell::new(),
            events: Arc::new(EventBus::new()),
            connection,
            disposed: AtomicBool::new(false),
        })
    }

    /// Marks the context detached, drops its listeners and stops routing.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.connection.unregister_context(&self.id);
        self.events.clear();
        debug!(context = %self.id, "Context disposed");
    }

    /// Records a new URL.
    pub(crate) fn set_url(&self, url: impl Into<String>) {
        *self.url.lock() = url.into();
    }
}

// ============================================================================
// BrowsingContext - Accessors
// ============================================================================

impl BrowsingContext {
    /// Returns the context ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Returns the parent context ID.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&ContextId> {
        self.parent.as_ref()
    }

    /// Returns `true` for top-level contexts.
    #[inline]
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns the last known URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.url.lock().clone()
    }

    /// Returns the CDP session, if one was acquired.
    #[must_use]
    pub fn cdp_session(&self) -> Option<&CdpSessionId> {
        self.cdp_session.get()
    }

    /// Returns `true` once the context was detached.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns the owning connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the context event bus.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus<Event>> {
        &self.events
    }

    /// Subscribes to events of one kind addressed to this context.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if event.kind() == kind {
                handler(event);
            }
        })
    }

    /// Waits for the next event with this method.
    ///
    /// Returns the subscription to remove once the receiver resolves.
    pub fn once(&self, method: &str) -> (SubscriptionId, oneshot::Receiver<Event>) {
        let method = method.to_string();
        self.events.once(move |event| event.method == method)
    }

    /// Removes a subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

// ============================================================================
// BrowsingContext - Commands
// ============================================================================

impl BrowsingContext {
    /// Navigates to `url` and waits for the load to complete.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!(context = %self.id, url, "Navigating");

        let result = self
            .connection
            .execute(BrowsingContextCommand::Navigate {
                context: self.id.clone(),
                url: url.to_string(),
                wait: Some(WAIT_COMPLETE.to_string()),
            })
            .await?;

        if let Some(url) = result.get("url").and_then(Value::as_str) {
            self.set_url(url);
        }
        Ok(())
    }

    /// Reloads the context.
    pub async fn reload(&self) -> Result<()> {
        debug!(context = %self.id, "Reloading");

        self.connection
            .execute(BrowsingContextCommand::Reload {
                context: self.id.clone(),
                ignore_cache: None,
                wait: Some(WAIT_COMPLETE.to_string()),
            })
            .await?;
        Ok(())
    }

    /// Evaluates an expression and returns its serialized remote value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the script throws.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .connection
            .execute(ScriptCommand::Evaluate {
                expression: expression.to_string(),
                target: ScriptTarget::context(self.id.clone()),
                await_promise: true,
            })
            .await?;

        script_result("script.evaluate", result)
    }

    /// Calls a function declaration with serialized arguments.
    pub async fn call_function(&self, declaration: &str, arguments: Vec<Value>) -> Result<Value> {
        let result = self
            .connection
            .execute(ScriptCommand::CallFunction {
                function_declaration: declaration.to_string(),
                target: ScriptTarget::context(self.id.clone()),
                await_promise: true,
                arguments,
                this: None,
            })
            .await?;

        script_result("script.callFunction", result)
    }

    /// Releases remote object handles.
    pub async fn disown(&self, handles: Vec<String>) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }

        self.connection
            .execute(ScriptCommand::Disown {
                handles,
                target: ScriptTarget::context(self.id.clone()),
            })
            .await?;
        Ok(())
    }

    /// Sends a CDP command through the tunnel.
    ///
    /// The first call acquires the context's CDP session with
    /// `cdp.getSession` and binds it for event routing.
    pub async fn send_cdp_command(&self, method: &str, params: Value) -> Result<Value> {
        let session = self
            .cdp_session
            .get_or_try_init(|| self.acquire_cdp_session())
            .await?
            .clone();

        let result = self
            .connection
            .execute(CdpCommand::SendCommand {
                method: method.to_string(),
                params,
                session: Some(session),
            })
            .await?;

        Ok(result.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn acquire_cdp_session(&self) -> Result<CdpSessionId> {
        let result = self
            .connection
            .execute(CdpCommand::GetSession {
                context: self.id.clone(),
            })
            .await?;

        let session = result
            .get("session")
            .or_else(|| result.get("cdpSession"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(CdpSessionId::new)
            .ok_or_else(|| Error::protocol("cdp.getSession", "response carries no session"))?;

        self.connection.bind_cdp_session(&self.id, session.clone());
        debug!(context = %self.id, %session, "CDP session acquired");

        Ok(session)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Unwraps a script evaluation result, turning exceptions into errors.
fn script_result(method: &str, mut result: Value) -> Result<Value> {
    if result.get("type").and_then(Value::as_str) == Some("exception") {
        let text = result
            .pointer("/exceptionDetails/text")
            .and_then(Value::as_str)
            .unwrap_or("script threw an exception");
        return Err(Error::protocol(method, text));
    }

    Ok(result
        .get_mut("result")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

// ============================================================================
// Tests
// ============================================================================
