//! Event message types.
//!
//! Events are notifications sent from the remote end to the local end when
//! browser activity occurs. They carry no correlation ID.
//!
//! # Event Types
//!
//! | Module | Events |
//! |--------|--------|
//! | `browsingContext` | `contextCreated`, `contextDestroyed`, `navigationStarted`, `fragmentNavigated`, `domContentLoaded`, `load` |
//! | `log` | `entryAdded` |
//! | `network` | `beforeRequestSent`, `responseStarted`, `responseCompleted`, `fetchError` |
//! | `cdp` | `eventReceived` (tunnel envelope) |
//!
//! # Addressing
//!
//! [`Event::target`] decides where an event is delivered besides the
//! connection-wide bus: `params.context`, then `params.source.context`, then
//! the CDP session of a tunnel envelope.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::identifiers::{CdpSessionId, ContextId, StreamHandle};

// ============================================================================
// Event
// ============================================================================

/// An event notification from remote end to local end.
///
/// # Format
///
/// ```json
/// {
///   "method": "module.eventName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    /// Event name in `module.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Returns the module name from the method.
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split_once('.').map(|(_, name)| name).unwrap_or_default()
    }

    /// Returns the fixed kind of this event.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        EventKind::from_method(&self.method)
    }

    /// Returns the context this event is addressed to, if any.
    ///
    /// Checks `params.context` first, then `params.source.context`.
    #[must_use]
    pub fn context_id(&self) -> Option<ContextId> {
        non_empty_str(self.params.get("context"))
            .or_else(|| non_empty_str(self.params.get("source").and_then(|s| s.get("context"))))
            .map(ContextId::new)
    }

    /// Decides where this event is delivered besides the global bus.
    #[must_use]
    pub fn target(&self) -> EventTarget {
        if let Some(context) = self.context_id() {
            return EventTarget::Context(context);
        }

        if self.kind() == EventKind::CdpEventReceived
            && let Some(envelope) = CdpEnvelope::from_params(&self.params)
            && let Some(session) = envelope.session
        {
            return EventTarget::CdpSession {
                session,
                inner: Event::new(envelope.method, envelope.params),
            };
        }

        EventTarget::Global
    }

    /// Parses the event into a typed variant.
    ///
    /// Events whose params do not match the expected shape come back as
    /// [`ParsedEvent::Unknown`].
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        let parsed = match self.kind() {
            EventKind::ContextCreated => self.params_as().map(ParsedEvent::ContextCreated),
            EventKind::ContextDestroyed => self.params_as().map(ParsedEvent::ContextDestroyed),
            EventKind::NavigationStarted => self.params_as().map(ParsedEvent::NavigationStarted),
            EventKind::FragmentNavigated => self.params_as().map(ParsedEvent::FragmentNavigated),
            EventKind::DomContentLoaded => self.params_as().map(ParsedEvent::DomContentLoaded),
            EventKind::Load => self.params_as().map(ParsedEvent::Load),
            EventKind::LogEntryAdded => self.params_as().map(ParsedEvent::LogEntryAdded),
            EventKind::BeforeRequestSent
            | EventKind::ResponseStarted
            | EventKind::ResponseCompleted
            | EventKind::FetchError => Some(ParsedEvent::Network(NetworkEvent::from_event(self))),
            EventKind::CdpEventReceived => {
                CdpEnvelope::from_params(&self.params).map(ParsedEvent::CdpEventReceived)
            }
            EventKind::TracingComplete => Some(ParsedEvent::TracingComplete {
                stream: non_empty_str(self.params.get("stream")).map(StreamHandle::new),
            }),
            EventKind::Other => None,
        };

        parsed.unwrap_or_else(|| ParsedEvent::Unknown {
            method: self.method.clone(),
            params: self.params.clone(),
        })
    }

    /// Deserializes params into a typed payload.
    fn params_as<T: DeserializeOwned>(&self) -> Option<T> {
        T::deserialize(&self.params).ok()
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// The fixed set of event kinds the client reacts to.
///
/// Everything else is [`EventKind::Other`] and is still delivered to
/// wildcard listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `browsingContext.contextCreated`
    ContextCreated,
    /// `browsingContext.contextDestroyed`
    ContextDestroyed,
    /// `browsingContext.navigationStarted`
    NavigationStarted,
    /// `browsingContext.fragmentNavigated`
    FragmentNavigated,
    /// `browsingContext.domContentLoaded`
    DomContentLoaded,
    /// `browsingContext.load`
    Load,
    /// `log.entryAdded`
    LogEntryAdded,
    /// `network.beforeRequestSent`
    BeforeRequestSent,
    /// `network.responseStarted`
    ResponseStarted,
    /// `network.responseCompleted`
    ResponseCompleted,
    /// `network.fetchError`
    FetchError,
    /// `cdp.eventReceived`
    CdpEventReceived,
    /// `Tracing.tracingComplete` (delivered through the CDP tunnel)
    TracingComplete,
    /// Any other method.
    Other,
}

impl EventKind {
    /// Maps a method name to its kind.
    #[must_use]
    pub fn from_method(method: &str) -> Self {
        match method {
            "browsingContext.contextCreated" => Self::ContextCreated,
            "browsingContext.contextDestroyed" => Self::ContextDestroyed,
            "browsingContext.navigationStarted" => Self::NavigationStarted,
            "browsingContext.fragmentNavigated" => Self::FragmentNavigated,
            "browsingContext.domContentLoaded" => Self::DomContentLoaded,
            "browsingContext.load" => Self::Load,
            "log.entryAdded" => Self::LogEntryAdded,
            "network.beforeRequestSent" => Self::BeforeRequestSent,
            "network.responseStarted" => Self::ResponseStarted,
            "network.responseCompleted" => Self::ResponseCompleted,
            "network.fetchError" => Self::FetchError,
            "cdp.eventReceived" => Self::CdpEventReceived,
            "Tracing.tracingComplete" => Self::TracingComplete,
            _ => Self::Other,
        }
    }
}

// ============================================================================
// EventTarget
// ============================================================================

/// Where an event is delivered in addition to the connection-wide bus.
#[derive(Debug, Clone, PartialEq)]
pub enum EventTarget {
    /// The context with this ID receives the event itself.
    Context(ContextId),
    /// The context owning this CDP session receives the inner event.
    CdpSession {
        /// Tunnel session ID.
        session: CdpSessionId,
        /// Unwrapped CDP event.
        inner: Event,
    },
    /// Only global listeners see it.
    Global,
}

// ============================================================================
// Typed Payloads
// ============================================================================

/// Browsing context description (`contextCreated`, `contextDestroyed`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContextInfo {
    /// Context ID.
    pub context: ContextId,
    /// Parent context ID (absent for top-level contexts).
    #[serde(default)]
    pub parent: Option<ContextId>,
    /// Current URL.
    #[serde(default)]
    pub url: String,
    /// Nested children, when the remote end sends them.
    #[serde(default)]
    pub children: Option<Vec<ContextInfo>>,
}

/// Navigation notification payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NavigationInfo {
    /// Navigated context.
    pub context: ContextId,
    /// Navigation ID (absent for some same-document navigations).
    #[serde(default)]
    pub navigation: Option<String>,
    /// New URL.
    #[serde(default)]
    pub url: String,
}

/// Source of a log entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogSource {
    /// Context that produced the entry.
    #[serde(default)]
    pub context: Option<ContextId>,
    /// Realm that produced the entry.
    #[serde(default)]
    pub realm: Option<String>,
}

/// One frame of a remote stack trace.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    /// Script URL.
    #[serde(default)]
    pub url: String,
    /// Function name (empty for anonymous functions).
    #[serde(default)]
    pub function_name: String,
    /// Zero-based line.
    #[serde(default)]
    pub line_number: i64,
    /// Zero-based column.
    #[serde(default)]
    pub column_number: i64,
}

/// Remote stack trace.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    /// Frames, innermost first.
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
}

/// `log.entryAdded` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// `console`, `javascript`, or a vendor type.
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Severity.
    #[serde(default)]
    pub level: String,
    /// Entry text.
    #[serde(default)]
    pub text: Option<String>,
    /// Producing context/realm.
    pub source: LogSource,
    /// Console method (`log`, `warn`, ...).
    #[serde(default)]
    pub method: Option<String>,
    /// Serialized console arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Stack trace, if captured.
    #[serde(default)]
    pub stack_trace: Option<StackTrace>,
}

/// Network event summary.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEvent {
    /// Which network event this is.
    pub kind: EventKind,
    /// Context that issued the request.
    pub context: Option<ContextId>,
    /// Navigation the request belongs to.
    pub navigation: Option<String>,
    /// Request ID.
    pub request_id: String,
    /// Request URL.
    pub url: String,
    /// HTTP status, once known.
    pub status: Option<u16>,
    /// Response came from the cache.
    pub from_cache: bool,
    /// Failure text of a `fetchError`.
    pub error_text: Option<String>,
}

impl NetworkEvent {
    /// Extracts the summary fields from a network event.
    fn from_event(event: &Event) -> Self {
        let request = event.params.get("request");
        Self {
            kind: event.kind(),
            context: event.context_id(),
            navigation: non_empty_str(event.params.get("navigation")).map(str::to_string),
            request_id: request
                .and_then(|r| r.get("request"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            url: request
                .and_then(|r| r.get("url"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: event
                .params
                .get("response")
                .and_then(|r| r.get("status"))
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok()),
            from_cache: event
                .params
                .get("response")
                .and_then(|r| r.get("fromCache"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            error_text: non_empty_str(event.params.get("errorText")).map(str::to_string),
        }
    }
}

/// A CDP event tunneled through `cdp.eventReceived`.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEnvelope {
    /// Tunnel session ID.
    pub session: Option<CdpSessionId>,
    /// Inner CDP method.
    pub method: String,
    /// Inner CDP params.
    pub params: Value,
}

impl CdpEnvelope {
    /// Reads the envelope fields.
    ///
    /// Accepts both `session`/`event`/`params` and the older
    /// `cdpSession`/`cdpMethod`/`cdpParams` field names.
    #[must_use]
    pub fn from_params(params: &Value) -> Option<Self> {
        let field = |current: &str, legacy: &str| params.get(legacy).or_else(|| params.get(current));

        let method = field("event", "cdpMethod")?.as_str()?.to_string();
        let session = non_empty_str(field("session", "cdpSession")).map(CdpSessionId::new);
        let inner = field("params", "cdpParams").cloned().unwrap_or(Value::Null);

        Some(Self {
            session,
            method,
            params: inner,
        })
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// A context was attached.
    ContextCreated(ContextInfo),
    /// A context was detached.
    ContextDestroyed(ContextInfo),
    /// A navigation started.
    NavigationStarted(NavigationInfo),
    /// A navigation committed without a new document.
    FragmentNavigated(NavigationInfo),
    /// DOM content loaded.
    DomContentLoaded(NavigationInfo),
    /// Page load complete.
    Load(NavigationInfo),
    /// Console or JavaScript log entry.
    LogEntryAdded(LogEntry),
    /// Network activity.
    Network(NetworkEvent),
    /// Tunneled CDP event envelope.
    CdpEventReceived(CdpEnvelope),
    /// Trace collection finished.
    TracingComplete {
        /// Stream holding the trace data.
        stream: Option<StreamHandle>,
    },
    /// Unknown or unparseable event.
    Unknown {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns the string value if it is present and non-empty.
#[inline]
fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
