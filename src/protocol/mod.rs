//! WebDriver BiDi protocol message types.
//!
//! This module defines the message format exchanged with the remote end.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Command request |
//! | `Response` | Remote → Local | Command outcome (carries `id`) |
//! | `Event` | Remote → Local | Browser notification (no `id`) |
//!
//! # Command Naming
//!
//! Commands follow `module.methodName` format:
//!
//! - `session.subscribe`
//! - `browsingContext.navigate`
//! - `cdp.sendCommand`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions by domain |
//! | `event` | Event types, kinds and addressing |
//! | `request` | Request, Response and Incoming types |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by module.
pub mod command;

/// Event message types.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    BrowsingContextCommand, CdpCommand, Command, RawCommand, ScriptCommand, ScriptTarget,
    SessionCommand,
};
pub use event::{
    CallFrame, CdpEnvelope, ContextInfo, Event, EventKind, EventTarget, LogEntry, LogSource,
    NavigationInfo, NetworkEvent, ParsedEvent, StackTrace,
};
pub use request::{Incoming, Request, Response};
