//! Transport and connection layer.
//!
//! This module handles communication between the local end (Rust) and the
//! remote end (browser) over a duplex channel of whole text messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐                     ┌─────────────────┐
//! │  Connection                  │                     │  Browser        │
//! │   ├─ CallRegistry (id → tx)  │      Transport      │  (BiDi server)  │
//! │   ├─ EventRouter (ctx → bus) │◄───────────────────►│                 │
//! │   └─ EventBus (global)       │   text messages     │                 │
//! └──────────────────────────────┘                     └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. Open a [`Transport`] (e.g. [`WebSocketTransport::connect`])
//! 2. [`Connection::new`] spawns the event loop
//! 3. `send` commands, subscribe to events
//! 4. [`Connection::dispose`] or remote close tears everything down
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | In-memory transport pair |
//! | `connection` | Connection and event loop |
//! | `registry` | Pending command correlation |
//! | `router` | Context-scoped event routing |
//! | `websocket` | WebSocket transport |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// In-memory transport pair.
pub mod channel;

/// Connection and event loop.
pub mod connection;

/// Pending command correlation.
pub mod registry;

/// Context-scoped event routing.
pub mod router;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelTransport, RemoteEnd};
pub use connection::{Connection, ConnectionOptions};
pub use registry::CallRegistry;
pub use router::{Delivery, EventRouter};
pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// A duplex channel of whole text messages.
///
/// The connection event loop owns the transport exclusively and polls
/// [`Transport::recv`] inside `tokio::select!`, so `recv` must be
/// cancel-safe: dropping its future must not lose a message.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Sends one text message.
    async fn send(&mut self, message: String) -> Result<()>;

    /// Receives the next text message.
    ///
    /// Returns `None` once the channel is closed.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Closes the channel.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, message: String) -> Result<()> {
        (**self).send(message).await
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
