//! CDP-backed [`TracingSource`] for a page.
//!
//! Commands go through the main frame's CDP tunnel; `Tracing.tracingComplete`
//! arrives on the main frame's event bus.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::browser::{BrowsingContext, StreamChunk, TracingSource};
use crate::error::{Error, Result};
use crate::identifiers::StreamHandle;
use crate::protocol::ParsedEvent;

use super::core::PageInner;

// ============================================================================
// Constants
// ============================================================================

const TRACING_COMPLETE: &str = "Tracing.tracingComplete";

// ============================================================================
// PageTracingSource
// ============================================================================

/// Trace source bound to a page.
pub(crate) struct PageTracingSource {
    page: Weak<PageInner>,
}

impl PageTracingSource {
    pub(crate) fn new(page: Weak<PageInner>) -> Self {
        Self { page }
    }

    fn main_frame(&self) -> Result<Arc<BrowsingContext>> {
        self.page
            .upgrade()
            .ok_or_else(|| Error::invalid_state("Page is gone"))?
            .main_frame()
    }
}

#[async_trait]
impl TracingSource for PageTracingSource {
    async fn start(&self, params: Value) -> Result<()> {
        self.main_frame()?
            .send_cdp_command("Tracing.start", params)
            .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<StreamHandle> {
        let frame = self.main_frame()?;
        let timeout = frame.connection().options().timeout;

        let (subscription, complete) = frame.once(TRACING_COMPLETE);

        let ended = frame.send_cdp_command("Tracing.end", json!({})).await;
        if let Err(e) = ended {
            frame.off(subscription);
            return Err(e);
        }

        let waited = match timeout {
            Some(limit) => tokio::time::timeout(limit, complete).await.ok(),
            None => Some(complete.await),
        };
        frame.off(subscription);

        let event = waited
            .ok_or_else(|| Error::protocol("Tracing.end", format!("no {TRACING_COMPLETE} received")))??;
        match event.parse() {
            ParsedEvent::TracingComplete {
                stream: Some(stream),
            } => {
                debug!(%stream, "Trace complete");
                Ok(stream)
            }
            _ => Err(Error::protocol("Tracing.end", "trace completed without a stream")),
        }
    }

    async fn read(&self, handle: &StreamHandle) -> Result<StreamChunk> {
        let result = self
            .main_frame()?
            .send_cdp_command("IO.read", json!({ "handle": handle.as_str() }))
            .await?;

        Ok(serde_json::from_value(result)?)
    }

    async fn close(&self, handle: &StreamHandle) -> Result<()> {
        self.main_frame()?
            .send_cdp_command("IO.close", json!({ "handle": handle.as_str() }))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    use crate::browser::TracingOptions;
    use crate::browser::page::Page;
    use crate::identifiers::ContextId;
    use crate::transport::channel::{self, RemoteEnd};
    use crate::transport::{Connection, ConnectionOptions};

    /// Answers the next command, checking its CDP method.
    async fn answer(remote: &mut RemoteEnd, cdp_method: &str, result: serde_json::Value) {
        let sent = remote.next_sent_json().await.expect("command");
        assert_eq!(sent["method"], "cdp.sendCommand");
        assert_eq!(sent["params"]["cdpMethod"], cdp_method);
        assert_eq!(sent["params"]["cdpSession"], "S1");
        remote.push_json(&json!({ "id": sent["id"], "result": { "result": result } }));
    }

    #[tokio::test]
    async fn test_trace_round_through_cdp() {
        let (transport, mut remote) = channel::pair();
        let connection = Connection::new(transport, ConnectionOptions::default());
        let page = Page::new(connection, ContextId::new("A"));

        let starting = tokio::spawn({
            let page = page.clone();
            async move { page.tracing().start(TracingOptions::new()).await }
        });

        let sent = remote.next_sent_json().await.expect("getSession");
        assert_eq!(sent["method"], "cdp.getSession");
        remote.push_json(&json!({ "id": sent["id"], "result": { "session": "S1" } }));

        let sent = remote.next_sent_json().await.expect("start");
        assert_eq!(sent["params"]["cdpMethod"], "Tracing.start");
        assert_eq!(sent["params"]["cdpParams"]["transferMode"], "ReturnAsStream");
        remote.push_json(&json!({ "id": sent["id"], "result": { "result": {} } }));
        starting.await.expect("join").expect("started");

        let stopping = tokio::spawn({
            let page = page.clone();
            async move { page.tracing().stop().await }
        });

        answer(&mut remote, "Tracing.end", json!({})).await;
        remote.push_json(&json!({
            "method": "cdp.eventReceived",
            "params": {
                "event": "Tracing.tracingComplete",
                "params": { "stream": "H1" },
                "session": "S1"
            }
        }));
        answer(&mut remote, "IO.read", json!({ "data": "[1,", "eof": false })).await;
        answer(
            &mut remote,
            "IO.read",
            json!({ "data": STANDARD.encode("2]"), "base64Encoded": true, "eof": true }),
        )
        .await;
        answer(&mut remote, "IO.close", json!({})).await;

        let trace = stopping.await.expect("join").expect("stopped");
        assert_eq!(trace.as_deref(), Some(&b"[1,2]"[..]));
        assert!(!page.tracing().is_recording());
    }
}
