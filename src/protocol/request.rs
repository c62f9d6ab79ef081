//! Request, Response and inbound message types.
//!
//! Defines the wire format for command requests and the two kinds of
//! inbound messages (responses and events).

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::Event;

// ============================================================================
// Request
// ============================================================================

/// A command request from local end to remote end.
///
/// # Format
///
/// ```json
/// {
///   "id": 1,
///   "method": "module.methodName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    /// Correlation ID.
    pub id: CommandId,

    /// Method in `module.methodName` format.
    pub method: &'a str,

    /// Command params.
    pub params: &'a Value,
}

impl<'a> Request<'a> {
    /// Creates a request.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, method: &'a str, params: &'a Value) -> Self {
        Self { id, method, params }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A command outcome from remote end to local end.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 1, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// {
///   "id": 1,
///   "error": "unknown error",
///   "message": "something broke",
///   "stacktrace": "..."
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error code (if error).
    #[serde(default)]
    pub error: Option<String>,

    /// Error message (if error).
    #[serde(default)]
    pub message: Option<String>,

    /// Remote stack trace (if error).
    #[serde(default)]
    pub stacktrace: Option<String>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Joins error code, message and stack trace into one diagnostic.
    ///
    /// Returns `None` for success responses.
    #[must_use]
    pub fn error_text(&self) -> Option<String> {
        let error = self.error.as_deref()?;
        let mut text = format!("{} {}", error, self.message.as_deref().unwrap_or_default());
        if let Some(stacktrace) = &self.stacktrace {
            text.push(' ');
            text.push_str(stacktrace);
        }
        Some(text)
    }

    /// Splits the response into result value or error text.
    pub fn into_outcome(self) -> std::result::Result<Value, String> {
        match self.error_text() {
            Some(text) => Err(text),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// Any message received from the remote end.
///
/// Messages carrying an `id` are command outcomes; everything else
/// with a `method` is an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    /// Command outcome.
    Response(Response),
    /// Unsolicited event.
    Event(Event),
}

impl Incoming {
    /// Parses a raw text message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] if the text is not JSON or
    /// matches neither shape.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::malformed(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
