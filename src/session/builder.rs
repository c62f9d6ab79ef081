//! Builder pattern for session configuration.
//!
//! Provides a fluent API for connecting to a browser and creating a
//! [`Session`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bidi_webdriver::Session;
//!
//! # async fn example() -> bidi_webdriver::Result<()> {
//! let session = Session::builder()
//!     .websocket_url("ws://127.0.0.1:9222/session")
//!     .timeout(Duration::from_secs(30))
//!     .ignore_https_errors(true)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::process::Child;
use url::Url;

use crate::error::{Error, Result};
use crate::transport::{Connection, Transport, WebSocketTransport};

use super::core::Session;
use super::options::SessionOptions;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Default)]
pub struct SessionBuilder {
    /// WebSocket endpoint.
    websocket_url: Option<String>,
    /// Pre-opened transport; takes precedence over the URL.
    transport: Option<Box<dyn Transport>>,
    /// Browser process to supervise.
    process: Option<Child>,
    /// Session options.
    options: SessionOptions,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("websocket_url", &self.websocket_url)
            .field("transport", &self.transport.is_some())
            .field("process", &self.process.as_ref().and_then(Child::id))
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// Uses an already opened transport instead of a WebSocket URL.
    #[must_use]
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Supervises a browser process.
    ///
    /// Its exit disconnects the session; closing the session kills it.
    #[must_use]
    pub fn process(mut self, child: Child) -> Self {
        self.process = Some(child);
        self
    }

    /// Sets the command timeout. Zero disables it.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_timeout(timeout);
        self
    }

    /// Delays processing of each inbound message.
    #[inline]
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.options = self.options.with_delay(delay);
        self
    }

    /// Accepts invalid TLS certificates.
    #[inline]
    #[must_use]
    pub fn ignore_https_errors(mut self, ignore: bool) -> Self {
        self.options = self.options.with_accept_insecure_certs(ignore);
        self
    }

    /// Subscribes to an extra event module.
    #[inline]
    #[must_use]
    pub fn subscribe_module(mut self, module: impl Into<String>) -> Self {
        self.options = self.options.with_module(module);
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Connects and negotiates the session.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if neither URL nor transport is set, or the URL
    ///   is not a `ws`/`wss` URL
    /// - [`Error::Connection`] if the WebSocket handshake fails
    /// - The error of `session.subscribe`
    pub async fn build(self) -> Result<Session> {
        let connection_options = self.options.connection_options();

        let connection = match (self.transport, self.websocket_url) {
            (Some(transport), _) => Connection::new(transport, connection_options),
            (None, Some(url)) => {
                let url = validate_url(&url)?;
                let transport = WebSocketTransport::connect(url.as_str()).await?;
                Connection::new(transport, connection_options)
            }
            (None, None) => {
                return Err(Error::config(
                    "A WebSocket URL or transport is required.\n\
                     Example: Session::builder().websocket_url(\"ws://127.0.0.1:9222/session\")",
                ));
            }
        };

        Session::bootstrap(connection, self.options, self.process).await
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Parses a WebSocket URL, rejecting other schemes.
fn validate_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| Error::config(format!("Invalid WebSocket URL '{url}': {e}")))?;

    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        scheme => Err(Error::config(format!(
            "Unsupported URL scheme '{scheme}' in '{url}'. Use ws:// or wss://"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::channel;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = SessionBuilder::new();
        assert!(builder.websocket_url.is_none());
        assert!(builder.transport.is_none());
        assert_eq!(builder.options, SessionOptions::default());
    }

    #[test]
    fn test_setters_reach_options() {
        let builder = SessionBuilder::new()
            .timeout(Duration::from_secs(3))
            .delay(Duration::from_millis(5))
            .ignore_https_errors(true)
            .subscribe_module("script");

        assert_eq!(builder.options.timeout, Some(Duration::from_secs(3)));
        assert_eq!(builder.options.delay, Some(Duration::from_millis(5)));
        assert!(builder.options.accept_insecure_certs);
        assert_eq!(builder.options.extra_modules, vec!["script"]);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("ws://127.0.0.1:9222/session").is_ok());
        assert!(validate_url("wss://example.com/bidi").is_ok());
        assert!(matches!(validate_url("http://example.com"), Err(Error::Config { .. })));
        assert!(matches!(validate_url("not a url"), Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_build_without_endpoint_fails() {
        let err = SessionBuilder::new().build().await.expect_err("no endpoint");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_rejects_http_url() {
        let err = SessionBuilder::new()
            .websocket_url("http://127.0.0.1:9222")
            .build()
            .await
            .expect_err("bad scheme");
        assert!(err.to_string().contains("ws://"));
    }

    #[tokio::test]
    async fn test_build_over_transport() {
        let (transport, mut remote) = channel::pair();
        let building = tokio::spawn(SessionBuilder::new().transport(transport).build());

        let sent = remote.next_sent_json().await.expect("session.new");
        remote.push_json(&json!({
            "id": sent["id"],
            "result": { "capabilities": { "browserName": "firefox", "browserVersion": "140.0" } }
        }));
        let sent = remote.next_sent_json().await.expect("session.subscribe");
        remote.push_json(&json!({ "id": sent["id"], "result": {} }));

        let session = building.await.expect("join").expect("session");
        assert_eq!(session.version(), "firefox/140.0");
    }
}
