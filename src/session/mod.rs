//! Session bootstrap module.
//!
//! A [`Session`] negotiates capabilities once per connection, subscribes to
//! the event modules pages rely on, and reports disconnection.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Negotiated session handle |
//! | [`SessionBuilder`] | Fluent configuration builder |
//! | [`SessionOptions`] | Timeout, delay, capabilities, modules |
//! | [`Capabilities`] | Browser name and version |
//! | [`SessionEvent`] | Session bus notifications |

// ============================================================================
// Submodules
// ============================================================================

/// Builder pattern for session configuration.
pub mod builder;

/// Session struct and bootstrap.
pub mod core;

/// Session options.
pub mod options;

/// Browser process supervision.
mod process;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use self::core::{Capabilities, Session, SessionEvent};
pub use options::{DEFAULT_MODULES, SessionOptions};
