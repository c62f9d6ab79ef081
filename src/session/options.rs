//! Session configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use bidi_webdriver::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_accept_insecure_certs(true)
//!     .with_module("script");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::transport::ConnectionOptions;
use crate::transport::connection::DEFAULT_COMMAND_TIMEOUT;

// ============================================================================
// Constants
// ============================================================================

/// Event modules every session subscribes to.
pub const DEFAULT_MODULES: &[&str] = &["browsingContext", "network", "log", "cdp"];

/// Module left out for browsers without a CDP tunnel.
const CDP_MODULE: &str = "cdp";

// ============================================================================
// SessionOptions
// ============================================================================

/// Options applied when a session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Per-command timeout; `None` disables it.
    pub timeout: Option<Duration>,

    /// Delay before each inbound message is processed ("slow-mo").
    pub delay: Option<Duration>,

    /// Ask the browser to accept invalid TLS certificates.
    pub accept_insecure_certs: bool,

    /// Modules subscribed to in addition to [`DEFAULT_MODULES`].
    pub extra_modules: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            delay: None,
            accept_insecure_certs: false,
            extra_modules: Vec::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Creates options with a 180 second command timeout.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the command timeout. Zero disables it.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Sets the inbound delay.
    #[inline]
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = (!delay.is_zero()).then_some(delay);
        self
    }

    /// Accepts invalid TLS certificates.
    #[inline]
    #[must_use]
    pub fn with_accept_insecure_certs(mut self, accept: bool) -> Self {
        self.accept_insecure_certs = accept;
        self
    }

    /// Adds an event module to subscribe to.
    #[inline]
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.extra_modules.push(module.into());
        self
    }
}

// ============================================================================
// Derived Settings
// ============================================================================

impl SessionOptions {
    /// Returns the options for the underlying connection.
    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            timeout: self.timeout,
            delay: self.delay,
        }
    }

    /// Returns the modules to subscribe to for a browser.
    ///
    /// Firefox has no CDP tunnel, so `cdp` is dropped when the name
    /// contains `firefox` in any case.
    #[must_use]
    pub fn subscribe_modules(&self, browser_name: &str) -> Vec<String> {
        let without_cdp = browser_name.to_lowercase().contains("firefox");

        let mut modules: Vec<String> = DEFAULT_MODULES
            .iter()
            .filter(|module| !(without_cdp && **module == CDP_MODULE))
            .map(|module| (*module).to_string())
            .collect();

        for module in &self.extra_modules {
            if !modules.contains(module) {
                modules.push(module.clone());
            }
        }
        modules
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::new();
        assert_eq!(options.timeout, Some(Duration::from_secs(180)));
        assert_eq!(options.delay, None);
        assert!(!options.accept_insecure_certs);
        assert!(options.extra_modules.is_empty());
    }

    #[test]
    fn test_zero_durations_disable() {
        let options = SessionOptions::new()
            .with_timeout(Duration::ZERO)
            .with_delay(Duration::ZERO);
        assert_eq!(options.timeout, None);
        assert_eq!(options.delay, None);
    }

    #[test]
    fn test_connection_options_carry_timing() {
        let options = SessionOptions::new()
            .with_timeout(Duration::from_secs(5))
            .with_delay(Duration::from_millis(20))
            .connection_options();
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.delay, Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_modules_for_chrome_keep_cdp() {
        let modules = SessionOptions::new().subscribe_modules("chrome");
        assert_eq!(modules, vec!["browsingContext", "network", "log", "cdp"]);
    }

    #[test]
    fn test_modules_for_firefox_drop_cdp() {
        let modules = SessionOptions::new().subscribe_modules("Firefox Nightly");
        assert_eq!(modules, vec!["browsingContext", "network", "log"]);
    }

    #[test]
    fn test_extra_modules_appended_once() {
        let modules = SessionOptions::new()
            .with_module("script")
            .with_module("log")
            .subscribe_modules("");
        assert_eq!(modules, vec!["browsingContext", "network", "log", "cdp", "script"]);
    }
}
