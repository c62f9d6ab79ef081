//! BiDi WebDriver - browser automation over the WebDriver BiDi protocol.
//!
//! This library drives a browser through a single duplex channel of JSON
//! messages: commands go out with an id and come back as responses, events
//! arrive unsolicited and are routed to the browsing context they concern.
//!
//! # Architecture
//!
//! - **Connection**: owns the transport, correlates responses with pending
//!   commands, enforces per-command timeouts
//! - **Event routing**: events reach the context bus first, then the
//!   connection-wide bus; CDP tunnel events are routed by session id
//! - **Pages**: keep a frame tree in sync with context lifecycle events
//! - **Session**: negotiates capabilities and subscribes to event modules
//!
//! # Quick Start
//!
//! ```no_run
//! use bidi_webdriver::{Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .websocket_url("ws://127.0.0.1:9222/session")
//!         .build()
//!         .await?;
//!
//!     let page = session.new_page().await?;
//!     page.goto("https://example.com").await?;
//!     let png = page.screenshot().await?;
//!     println!("{} bytes", png.len());
//!
//!     session.close().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | [`Page`], [`BrowsingContext`], frame tree, tracing |
//! | [`emitter`] | Synchronous event bus |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Command, response and event types |
//! | [`session`] | [`Session`] bootstrap and configuration |
//! | [`transport`] | Transports, connection, routing |

// ============================================================================
// Modules
// ============================================================================

/// Pages, browsing contexts, frame tree and tracing.
pub mod browser;

/// Synchronous publish/subscribe bus.
pub mod emitter;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Protocol message types.
pub mod protocol;

/// Session negotiation.
pub mod session;

/// Transport and connection layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{
    BrowsingContext, ConsoleLocation, ConsoleMessage, FrameTree, Page, PageEvent, PdfOptions,
    Tracing, TracingOptions,
};

// Session types
pub use session::{Capabilities, Session, SessionBuilder, SessionEvent, SessionOptions};

// Transport types
pub use transport::{ChannelTransport, Connection, ConnectionOptions, RemoteEnd, Transport};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CdpSessionId, CommandId, ContextId, StreamHandle, SubscriptionId};
