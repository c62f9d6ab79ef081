//! Page: one top-level browsing context and its frame tree.
//!
//! A [`Page`] listens to the connection-wide event stream, keeps its
//! [`FrameTree`](super::FrameTree) in sync and re-emits what happened as
//! [`PageEvent`]s.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Page struct, events, accessors, close |
//! | `frames` | Attach / navigate / detach handling |
//! | `navigation` | URL navigation and script evaluation |
//! | `capture` | Screenshots and PDF |
//! | `console` | Console messages and page errors |
//! | `network` | Request and response events of the page's frames |
//! | `tracing_source` | CDP-backed trace source |
//!
//! # Example
//!
//! ```ignore
//! let page = session.new_page().await?;
//!
//! page.on(|event| {
//!     if let PageEvent::Console(message) = event {
//!         println!("console: {}", message.text);
//!     }
//! });
//!
//! page.goto("https://example.com").await?;
//! let png = page.screenshot().await?;
//! page.close().await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod capture;
mod console;
mod core;
mod frames;
mod navigation;
mod network;
mod tracing_source;

// ============================================================================
// Re-exports
// ============================================================================

pub use capture::PdfOptions;
pub use console::{ConsoleLocation, ConsoleMessage};
pub use self::core::{Page, PageEvent};
