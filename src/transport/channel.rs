//! In-memory transport pair.
//!
//! [`pair`] returns a [`ChannelTransport`] for the connection and a
//! [`RemoteEnd`] that plays the browser: it reads what the connection sent
//! and injects responses and events.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

use super::Transport;

// ============================================================================
// Constructor
// ============================================================================

/// Creates a connected transport pair.
#[must_use]
pub fn pair() -> (ChannelTransport, RemoteEnd) {
    let (to_remote_tx, to_remote_rx) = mpsc::unbounded_channel();
    let (to_local_tx, to_local_rx) = mpsc::unbounded_channel();

    let transport = ChannelTransport {
        outgoing: Some(to_remote_tx),
        incoming: to_local_rx,
    };
    let remote = RemoteEnd {
        sent: to_remote_rx,
        inject: Some(to_local_tx),
    };

    (transport, remote)
}

// ============================================================================
// ChannelTransport
// ============================================================================

/// Local half of an in-memory transport.
#[derive(Debug)]
pub struct ChannelTransport {
    /// Messages towards the remote end; `None` once closed locally.
    outgoing: Option<mpsc::UnboundedSender<String>>,
    /// Messages from the remote end.
    incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<()> {
        let outgoing = self.outgoing.as_ref().ok_or(Error::ConnectionClosed)?;
        outgoing
            .send(message)
            .map_err(|_| Error::connection("remote end dropped"))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        if self.outgoing.is_none() {
            return None;
        }
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.outgoing = None;
        self.incoming.close();
        trace!("Channel transport closed");
        Ok(())
    }
}

// ============================================================================
// RemoteEnd
// ============================================================================

/// Remote half of an in-memory transport.
#[derive(Debug)]
pub struct RemoteEnd {
    /// Messages sent by the connection.
    sent: mpsc::UnboundedReceiver<String>,
    /// Injection side; `None` once closed.
    inject: Option<mpsc::UnboundedSender<String>>,
}

impl RemoteEnd {
    /// Delivers a raw text message to the connection.
    ///
    /// Returns `false` if either side is closed.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.inject
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Delivers a JSON message to the connection.
    pub fn push_json(&self, message: &Value) -> bool {
        self.push(message.to_string())
    }

    /// Waits for the next message the connection sent.
    ///
    /// Returns `None` once the connection closed its side.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Waits for the next message and parses it as JSON.
    pub async fn next_sent_json(&mut self) -> Option<Value> {
        let text = self.next_sent().await?;
        serde_json::from_str(&text).ok()
    }

    /// Returns an already-sent message without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Closes the remote side, as if the browser hung up.
    pub fn close(&mut self) {
        self.inject = None;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip() {
        let (mut transport, mut remote) = pair();

        transport.send("hello".to_string()).await.expect("send");
        assert_eq!(remote.next_sent().await.as_deref(), Some("hello"));

        assert!(remote.push_json(&json!({ "method": "x.y", "params": {} })));
        let received = transport.recv().await.expect("open").expect("ok");
        assert!(received.contains("x.y"));
    }

    #[tokio::test]
    async fn test_remote_close_ends_recv() {
        let (mut transport, mut remote) = pair();
        remote.close();

        assert!(transport.recv().await.is_none());
        assert!(!remote.push("late"));
    }

    #[tokio::test]
    async fn test_local_close() {
        let (mut transport, mut remote) = pair();
        transport.close().await.expect("close");

        assert!(transport.send("x".to_string()).await.is_err());
        assert!(transport.recv().await.is_none());
        assert!(remote.next_sent().await.is_none());
    }
}
