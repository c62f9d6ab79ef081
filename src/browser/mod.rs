//! Browser entities module.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Page`] | Top-level context plus its frame tree |
//! | [`BrowsingContext`] | One frame: commands and a routed event bus |
//! | [`FrameTree`] | Parent/child bookkeeping for a page |
//! | [`Tracing`] | Start/stop performance trace recorder |
//!
//! # Example
//!
//! ```no_run
//! use bidi_webdriver::{PageEvent, Result, Session};
//!
//! # async fn example() -> Result<()> {
//! let session = Session::builder()
//!     .websocket_url("ws://127.0.0.1:9222/session")
//!     .build()
//!     .await?;
//!
//! let page = session.new_page().await?;
//! page.on(|event| {
//!     if let PageEvent::FrameAttached(frame) = event {
//!         println!("frame {}", frame.id());
//!     }
//! });
//! page.goto("https://example.com").await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Browsing context handle.
pub mod context;

/// Pages and their events.
pub mod page;

/// Trace recording.
pub mod recording;

/// Frame tree.
pub mod tree;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::BrowsingContext;
pub use page::{ConsoleLocation, ConsoleMessage, Page, PageEvent, PdfOptions};
pub use recording::{StreamChunk, Tracing, TracingOptions, TracingSource};
pub use tree::FrameTree;
