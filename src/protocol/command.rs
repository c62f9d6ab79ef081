//! Command definitions organized by module.
//!
//! Commands follow `module.methodName` format.
//!
//! # Command Modules
//!
//! | Module | Commands |
//! |--------|----------|
//! | `session` | Capability negotiation, status, subscriptions |
//! | `browsingContext` | Create, close, tree, navigation, print, screenshot |
//! | `script` | Evaluate, call function, disown handles |
//! | `cdp` | Tunneled CDP commands and session lookup |
//!
//! Anything not covered here goes through [`Command::Raw`].

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{CdpSessionId, ContextId};

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by module.
///
/// This enum wraps module-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Session module commands.
    Session(SessionCommand),
    /// BrowsingContext module commands.
    BrowsingContext(BrowsingContextCommand),
    /// Script module commands.
    Script(ScriptCommand),
    /// CDP tunnel commands.
    Cdp(CdpCommand),
    /// Any other command, by method name.
    Raw(RawCommand),
}

impl Command {
    /// Creates a command from an arbitrary method name and params.
    #[inline]
    #[must_use]
    pub fn raw(method: impl Into<String>, params: Value) -> Self {
        Self::Raw(RawCommand {
            method: method.into(),
            params,
        })
    }

    /// Splits the command into its method name and params object.
    ///
    /// Commands without params yield an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails, or [`Error::Config`]
    /// if the serialized form has no method.
    pub fn into_parts(self) -> Result<(String, Value)> {
        if let Self::Raw(raw) = self {
            return Ok((raw.method, raw.params));
        }

        let Value::Object(mut object) = serde_json::to_value(&self)? else {
            return Err(Error::config("command did not serialize to an object"));
        };

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(Error::config("command has no method")),
        };
        let params = object
            .remove("params")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok((method, params))
    }
}

impl From<SessionCommand> for Command {
    fn from(command: SessionCommand) -> Self {
        Self::Session(command)
    }
}

impl From<BrowsingContextCommand> for Command {
    fn from(command: BrowsingContextCommand) -> Self {
        Self::BrowsingContext(command)
    }
}

impl From<ScriptCommand> for Command {
    fn from(command: ScriptCommand) -> Self {
        Self::Script(command)
    }
}

impl From<CdpCommand> for Command {
    fn from(command: CdpCommand) -> Self {
        Self::Cdp(command)
    }
}

// ============================================================================
// Raw Command
// ============================================================================

/// A command given as method name plus untyped params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCommand {
    /// Method in `module.methodName` format.
    pub method: String,
    /// Params object.
    pub params: Value,
}

// ============================================================================
// Session Commands
// ============================================================================

/// Session module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum SessionCommand {
    /// Negotiate a new session.
    #[serde(rename = "session.new")]
    New {
        /// Capability request (`alwaysMatch` / `firstMatch`).
        capabilities: Value,
    },

    /// Query remote end readiness.
    #[serde(rename = "session.status")]
    Status {},

    /// Subscribe to event modules or events.
    #[serde(rename = "session.subscribe")]
    Subscribe {
        /// Event or module names.
        events: Vec<String>,
        /// Restrict to these contexts (optional).
        #[serde(skip_serializing_if = "Option::is_none")]
        contexts: Option<Vec<ContextId>>,
    },

    /// Unsubscribe from event modules or events.
    #[serde(rename = "session.unsubscribe")]
    Unsubscribe {
        /// Event or module names.
        events: Vec<String>,
        /// Restrict to these contexts (optional).
        #[serde(skip_serializing_if = "Option::is_none")]
        contexts: Option<Vec<ContextId>>,
    },
}

// ============================================================================
// BrowsingContext Commands
// ============================================================================

/// BrowsingContext module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum BrowsingContextCommand {
    /// Create a new top-level context.
    #[serde(rename = "browsingContext.create")]
    Create {
        /// `"tab"` or `"window"`.
        #[serde(rename = "type")]
        context_type: String,
        /// Context to open next to (optional).
        #[serde(rename = "referenceContext", skip_serializing_if = "Option::is_none")]
        reference_context: Option<ContextId>,
    },

    /// Close a top-level context.
    #[serde(rename = "browsingContext.close")]
    Close {
        /// Context to close.
        context: ContextId,
    },

    /// Get the context tree.
    #[serde(rename = "browsingContext.getTree")]
    GetTree {
        /// Maximum depth (optional).
        #[serde(rename = "maxDepth", skip_serializing_if = "Option::is_none")]
        max_depth: Option<u32>,
        /// Root context (optional).
        #[serde(skip_serializing_if = "Option::is_none")]
        root: Option<ContextId>,
    },

    /// Navigate a context.
    #[serde(rename = "browsingContext.navigate")]
    Navigate {
        /// Target context.
        context: ContextId,
        /// URL to navigate to.
        url: String,
        /// Readiness state to wait for (`none`, `interactive`, `complete`).
        #[serde(skip_serializing_if = "Option::is_none")]
        wait: Option<String>,
    },

    /// Reload a context.
    #[serde(rename = "browsingContext.reload")]
    Reload {
        /// Target context.
        context: ContextId,
        /// Bypass cache.
        #[serde(rename = "ignoreCache", skip_serializing_if = "Option::is_none")]
        ignore_cache: Option<bool>,
        /// Readiness state to wait for.
        #[serde(skip_serializing_if = "Option::is_none")]
        wait: Option<String>,
    },

    /// Print a context to PDF.
    #[serde(rename = "browsingContext.print")]
    Print {
        /// Target context.
        context: ContextId,
        /// Print backgrounds.
        #[serde(skip_serializing_if = "Option::is_none")]
        background: Option<bool>,
        /// `portrait` or `landscape`.
        #[serde(skip_serializing_if = "Option::is_none")]
        orientation: Option<String>,
        /// Page ranges such as `"1-3"`.
        #[serde(rename = "pageRanges", skip_serializing_if = "Option::is_none")]
        page_ranges: Option<Vec<String>>,
        /// Scale factor.
        #[serde(skip_serializing_if = "Option::is_none")]
        scale: Option<f64>,
        /// Shrink content to page width.
        #[serde(rename = "shrinkToFit", skip_serializing_if = "Option::is_none")]
        shrink_to_fit: Option<bool>,
    },

    /// Capture a screenshot.
    #[serde(rename = "browsingContext.captureScreenshot")]
    CaptureScreenshot {
        /// Target context.
        context: ContextId,
    },
}

// ============================================================================
// Script Commands
// ============================================================================

/// Where a script runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptTarget {
    /// A browsing context, optionally in a sandbox.
    Context {
        /// Target context.
        context: ContextId,
        /// Sandbox name (optional).
        #[serde(skip_serializing_if = "Option::is_none")]
        sandbox: Option<String>,
    },
    /// A realm by ID.
    Realm {
        /// Realm ID.
        realm: String,
    },
}

impl ScriptTarget {
    /// Targets the default realm of a context.
    #[inline]
    #[must_use]
    pub fn context(context: ContextId) -> Self {
        Self::Context {
            context,
            sandbox: None,
        }
    }
}

/// Script module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ScriptCommand {
    /// Evaluate an expression.
    #[serde(rename = "script.evaluate")]
    Evaluate {
        /// Expression source.
        expression: String,
        /// Where to evaluate.
        target: ScriptTarget,
        /// Await a returned promise.
        #[serde(rename = "awaitPromise")]
        await_promise: bool,
    },

    /// Call a function declaration.
    #[serde(rename = "script.callFunction")]
    CallFunction {
        /// Function source.
        #[serde(rename = "functionDeclaration")]
        function_declaration: String,
        /// Where to call.
        target: ScriptTarget,
        /// Await a returned promise.
        #[serde(rename = "awaitPromise")]
        await_promise: bool,
        /// Serialized arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        arguments: Vec<Value>,
        /// Serialized `this` (optional).
        #[serde(rename = "this", skip_serializing_if = "Option::is_none")]
        this: Option<Value>,
    },

    /// Release remote object handles.
    #[serde(rename = "script.disown")]
    Disown {
        /// Handles to release.
        handles: Vec<String>,
        /// Realm or context owning them.
        target: ScriptTarget,
    },
}

// ============================================================================
// CDP Commands
// ============================================================================

/// CDP tunnel commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum CdpCommand {
    /// Send a raw CDP command through the tunnel.
    #[serde(rename = "cdp.sendCommand")]
    SendCommand {
        /// CDP method, e.g. `Tracing.start`.
        #[serde(rename = "cdpMethod")]
        method: String,
        /// CDP params.
        #[serde(rename = "cdpParams")]
        params: Value,
        /// CDP session to address.
        #[serde(rename = "cdpSession", skip_serializing_if = "Option::is_none")]
        session: Option<CdpSessionId>,
    },

    /// Look up the CDP session backing a context.
    #[serde(rename = "cdp.getSession")]
    GetSession {
        /// Context to look up.
        context: ContextId,
    },
}

// ============================================================================
// Tests
// ============================================================================
