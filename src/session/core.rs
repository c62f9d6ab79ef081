//! Session struct and bootstrap.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Child;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::Page;
use crate::emitter::EventBus;
use crate::error::{Error, Result};
use crate::identifiers::{ContextId, SubscriptionId};
use crate::protocol::{BrowsingContextCommand, SessionCommand};
use crate::transport::Connection;

use super::builder::SessionBuilder;
use super::options::SessionOptions;
use super::process::ProcessGuard;

// ============================================================================
// Types
// ============================================================================

/// Capabilities reported by `session.new`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Browser name, e.g. `firefox` or `chrome`.
    #[serde(default)]
    pub browser_name: String,
    /// Browser version.
    #[serde(default)]
    pub browser_version: String,
}

/// Notifications emitted on the session bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection closed or the browser process exited.
    Disconnected,
}

/// Internal shared state for a session.
struct SessionInner {
    /// Local identifier for logs.
    uuid: Uuid,
    /// Owned connection.
    connection: Connection,
    /// Negotiated capabilities.
    capabilities: Capabilities,
    /// Subscribed modules.
    modules: Vec<String>,
    /// Session event bus.
    events: EventBus<SessionEvent>,
    /// Set once `Disconnected` was emitted.
    disconnected: AtomicBool,
    /// Supervised browser process, if any.
    process: tokio::sync::Mutex<Option<ProcessGuard>>,
}

impl SessionInner {
    /// Emits `Disconnected` the first time it is called.
    fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(uuid = %self.uuid, "Session disconnected");
        self.events.publish(&SessionEvent::Disconnected);
    }
}

// ============================================================================
// Session
// ============================================================================

/// A negotiated browser session.
///
/// Cheap to clone; clones share the connection and event bus.
///
/// # Example
///
/// ```no_run
/// use bidi_webdriver::Session;
///
/// # async fn example() -> bidi_webdriver::Result<()> {
/// let session = Session::builder()
///     .websocket_url("ws://127.0.0.1:9222/session")
///     .build()
///     .await?;
///
/// println!("connected to {}", session.version());
/// let page = session.new_page().await?;
/// page.goto("https://example.com").await?;
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uuid", &self.inner.uuid)
            .field("browser", &self.version())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Bootstrap
// ============================================================================

impl Session {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Negotiates a session over an open connection.
    ///
    /// 1. `session.new`; a failure is logged and capabilities stay empty
    /// 2. `session.subscribe` to the default modules (no `cdp` for Firefox)
    ///
    /// # Errors
    ///
    /// Returns the error of `session.subscribe`.
    pub async fn create(connection: Connection, options: SessionOptions) -> Result<Self> {
        Self::bootstrap(connection, options, None).await
    }

    pub(crate) async fn bootstrap(
        connection: Connection,
        options: SessionOptions,
        process: Option<Child>,
    ) -> Result<Self> {
        let capabilities = negotiate(&connection, &options).await;
        let modules = options.subscribe_modules(&capabilities.browser_name);

        let subscribed = connection
            .execute(SessionCommand::Subscribe {
                events: modules.clone(),
                contexts: None,
            })
            .await;
        if let Err(e) = subscribed {
            connection.dispose();
            if let Some(mut child) = process
                && let Err(kill) = child.start_kill()
            {
                debug!(error = %kill, "Failed to kill browser process");
            }
            return Err(e);
        }

        let inner = Arc::new(SessionInner {
            uuid: Uuid::new_v4(),
            connection: connection.clone(),
            capabilities,
            modules,
            events: EventBus::new(),
            disconnected: AtomicBool::new(false),
            process: tokio::sync::Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let closed = connection.wait_closed();
        tokio::spawn(async move {
            closed.await;
            if let Some(inner) = weak.upgrade() {
                inner.disconnect();
            }
        });

        if let Some(child) = process {
            let weak = Arc::downgrade(&inner);
            let guard = ProcessGuard::spawn(child, async move {
                if let Some(inner) = weak.upgrade() {
                    inner.connection.dispose();
                    inner.disconnect();
                }
            });
            debug!(uuid = %inner.uuid, pid = guard.pid(), "Supervising browser process");
            *inner.process.lock().await = Some(guard);
        }

        info!(
            uuid = %inner.uuid,
            browser = %inner.capabilities.browser_name,
            version = %inner.capabilities.browser_version,
            modules = ?inner.modules,
            "Session established"
        );

        Ok(Self { inner })
    }
}

/// Sends `session.new`, falling back to empty capabilities.
async fn negotiate(connection: &Connection, options: &SessionOptions) -> Capabilities {
    let result = connection
        .execute(SessionCommand::New {
            capabilities: json!({
                "alwaysMatch": { "acceptInsecureCerts": options.accept_insecure_certs }
            }),
        })
        .await;

    match result {
        Ok(mut result) => {
            let capabilities = result.get_mut("capabilities").map(Value::take);
            capabilities
                .and_then(|value| serde_json::from_value(value).ok())
                .unwrap_or_default()
        }
        Err(e) => {
            warn!(error = %e, "session.new failed, continuing without capabilities");
            Capabilities::default()
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the local session identifier.
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> &Uuid {
        &self.inner.uuid
    }

    /// Returns the negotiated capabilities.
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    /// Returns `name/version` of the browser.
    #[must_use]
    pub fn version(&self) -> String {
        let caps = &self.inner.capabilities;
        format!("{}/{}", caps.browser_name, caps.browser_version)
    }

    /// Returns the subscribed event modules.
    #[inline]
    #[must_use]
    pub fn modules(&self) -> &[String] {
        &self.inner.modules
    }

    /// Returns `true` until the connection closes.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.inner.connection.is_closed()
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Subscribes to session events.
    pub fn on<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    /// Removes a session event subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }
}

// ============================================================================
// Session - Commands
// ============================================================================

impl Session {
    /// Opens a new tab and returns its page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response names no context.
    pub async fn new_page(&self) -> Result<Page> {
        let result = self
            .inner
            .connection
            .execute(BrowsingContextCommand::Create {
                context_type: "tab".to_string(),
                reference_context: None,
            })
            .await?;

        let context = result
            .get("context")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(ContextId::new)
            .ok_or_else(|| Error::protocol("browsingContext.create", "response has no context"))?;

        debug!(uuid = %self.inner.uuid, %context, "Page created");
        Ok(Page::new(self.inner.connection.clone(), context))
    }

    /// Subscribes to additional events or modules.
    pub async fn subscribe(&self, events: &[&str]) -> Result<()> {
        self.inner
            .connection
            .execute(SessionCommand::Subscribe {
                events: events.iter().map(|e| (*e).to_string()).collect(),
                contexts: None,
            })
            .await?;
        Ok(())
    }

    /// Unsubscribes from events or modules.
    pub async fn unsubscribe(&self, events: &[&str]) -> Result<()> {
        self.inner
            .connection
            .execute(SessionCommand::Unsubscribe {
                events: events.iter().map(|e| (*e).to_string()).collect(),
                contexts: None,
            })
            .await?;
        Ok(())
    }

    /// Queries `session.status`.
    pub async fn status(&self) -> Result<Value> {
        self.inner
            .connection
            .execute(SessionCommand::Status {})
            .await
    }

    /// Closes the connection and stops the owned browser process.
    ///
    /// Emits [`SessionEvent::Disconnected`] if it was not emitted yet.
    pub async fn close(&self) -> Result<()> {
        self.inner.connection.dispose();

        let process = self.inner.process.lock().await.take();
        if let Some(mut guard) = process {
            guard.kill().await;
        }

        self.inner.disconnect();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
