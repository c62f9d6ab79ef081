//! Performance trace recording.
//!
//! [`Tracing`] drives a start/stop recording against a [`TracingSource`].
//! Pages back the source with CDP commands tunneled through their main
//! frame; tests can plug in any other implementation.
//!
//! # State Machine
//!
//! ```text
//! Idle ──start──► Recording ──stop──► Idle
//! ```
//!
//! `start` while recording and `stop` while idle fail with
//! [`Error::InvalidState`] without contacting the browser.
//!
//! # Example
//!
//! ```ignore
//! page.tracing().start(TracingOptions::new().screenshots(true)).await?;
//! page.goto("https://example.com").await?;
//! let trace = page.tracing().stop().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::StreamHandle;

// ============================================================================
// Constants
// ============================================================================

/// Categories recorded when none are given. A leading `-` excludes.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "-*",
    "devtools.timeline",
    "v8.execute",
    "disabled-by-default-devtools.timeline",
    "disabled-by-default-devtools.timeline.frame",
    "toplevel",
    "blink.console",
    "blink.user_timing",
    "latencyInfo",
    "disabled-by-default-devtools.timeline.stack",
    "disabled-by-default-v8.cpu_profiler",
];

/// Category added when screenshots are requested.
pub const SCREENSHOT_CATEGORY: &str = "disabled-by-default-devtools.screenshot";

// ============================================================================
// StreamChunk
// ============================================================================

/// One `IO.read` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    /// Chunk payload.
    #[serde(default)]
    pub data: String,
    /// `data` is base64.
    #[serde(default)]
    pub base64_encoded: bool,
    /// Last chunk.
    #[serde(default)]
    pub eof: bool,
}

impl StreamChunk {
    /// Returns the decoded chunk bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        if self.base64_encoded {
            Ok(STANDARD.decode(self.data.as_bytes())?)
        } else {
            Ok(self.data.as_bytes().to_vec())
        }
    }
}

// ============================================================================
// TracingSource
// ============================================================================

/// Backend that actually records and streams traces.
#[async_trait]
pub trait TracingSource: Send + Sync {
    /// Starts recording with `Tracing.start` params.
    async fn start(&self, params: Value) -> Result<()>;

    /// Ends recording and returns the stream holding the trace.
    async fn stop(&self) -> Result<StreamHandle>;

    /// Reads the next chunk of a stream.
    async fn read(&self, handle: &StreamHandle) -> Result<StreamChunk>;

    /// Releases a stream.
    async fn close(&self, handle: &StreamHandle) -> Result<()>;
}

// ============================================================================
// TracingOptions
// ============================================================================

/// Options for [`Tracing::start`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TracingOptions {
    /// Write the trace here instead of returning it.
    pub path: Option<PathBuf>,
    /// Capture screenshots.
    pub screenshots: bool,
    /// Category filter; [`DEFAULT_CATEGORIES`] when `None`.
    pub categories: Option<Vec<String>>,
}

impl TracingOptions {
    /// Creates default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output file.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Enables or disables screenshots.
    #[must_use]
    pub fn screenshots(mut self, enabled: bool) -> Self {
        self.screenshots = enabled;
        self
    }

    /// Replaces the category filter.
    #[must_use]
    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the `Tracing.start` params.
    #[must_use]
    pub fn start_params(&self) -> Value {
        let mut categories: Vec<String> = match &self.categories {
            Some(categories) => categories.clone(),
            None => DEFAULT_CATEGORIES.iter().map(|c| (*c).to_string()).collect(),
        };
        if self.screenshots {
            categories.push(SCREENSHOT_CATEGORY.to_string());
        }

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        for category in categories {
            match category.strip_prefix('-') {
                Some(stripped) => excluded.push(stripped.to_string()),
                None => included.push(category),
            }
        }

        json!({
            "transferMode": "ReturnAsStream",
            "traceConfig": {
                "excludedCategories": excluded,
                "includedCategories": included,
            }
        })
    }
}

// ============================================================================
// Tracing
// ============================================================================

/// Recording state.
#[derive(Debug)]
enum State {
    Idle,
    Recording { path: Option<PathBuf> },
    Stopping,
}

/// Returns the recorder to `Idle` when a stop ends, including a dropped one.
struct IdleOnDrop<'a>(&'a Mutex<State>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock() = State::Idle;
    }
}

/// Start/stop trace recorder.
pub struct Tracing {
    source: Arc<dyn TracingSource>,
    state: Mutex<State>,
}

impl fmt::Debug for Tracing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracing")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl Tracing {
    /// Creates an idle recorder over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn TracingSource>) -> Self {
        Self {
            source,
            state: Mutex::new(State::Idle),
        }
    }

    /// Returns `true` while a trace is being recorded.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        !matches!(*self.state.lock(), State::Idle)
    }

    /// Starts recording.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if a recording is already active
    /// - Any error of the start command; the recorder is idle again
    pub async fn start(&self, options: TracingOptions) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, State::Idle) {
                return Err(Error::invalid_state(
                    "Cannot start recording trace while already recording trace",
                ));
            }
            *state = State::Recording {
                path: options.path.clone(),
            };
        }

        debug!(screenshots = options.screenshots, "Starting trace");

        if let Err(e) = self.source.start(options.start_params()).await {
            *self.state.lock() = State::Idle;
            return Err(e);
        }
        Ok(())
    }

    /// Stops recording and collects the trace.
    ///
    /// Returns `None` when the trace was written to the path given at start,
    /// otherwise the trace bytes. The recorder is idle afterwards whether or
    /// not collection succeeded, and also if this future is dropped early.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if no recording is active
    /// - Stream, decode or file errors
    pub async fn stop(&self) -> Result<Option<Vec<u8>>> {
        let path = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Stopping) {
                State::Recording { path } => path,
                other => {
                    *state = other;
                    return Err(Error::invalid_state("No trace is being recorded"));
                }
            }
        };

        let _idle = IdleOnDrop(&self.state);
        self.collect(path).await
    }

    async fn collect(&self, path: Option<PathBuf>) -> Result<Option<Vec<u8>>> {
        let handle = self.source.stop().await?;

        let data = self.drain(&handle).await;
        let closed = self.source.close(&handle).await;
        let data = data?;
        closed?;

        debug!(bytes = data.len(), %handle, "Trace collected");

        match path {
            Some(path) => {
                tokio::fs::write(&path, &data).await?;
                Ok(None)
            }
            None => Ok(Some(data)),
        }
    }

    async fn drain(&self, handle: &StreamHandle) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        loop {
            let chunk = self.source.read(handle).await?;
            buffer.extend(chunk.decode()?);
            if chunk.eof {
                return Ok(buffer);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    /// Source that records calls and serves canned chunks.
    #[derive(Default)]
    struct FakeSource {
        calls: Mutex<Vec<String>>,
        chunks: Mutex<VecDeque<StreamChunk>>,
        started_with: Mutex<Option<Value>>,
        fail_start: bool,
        hang_stop: bool,
    }

    impl FakeSource {
        fn with_chunks(chunks: Vec<StreamChunk>) -> Arc<Self> {
            Arc::new(Self {
                chunks: Mutex::new(chunks.into()),
                ..Self::default()
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl TracingSource for FakeSource {
        async fn start(&self, params: Value) -> Result<()> {
            self.calls.lock().push("start".to_string());
            *self.started_with.lock() = Some(params);
            if self.fail_start {
                return Err(Error::protocol("Tracing.start", "unknown error refused"));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<StreamHandle> {
            self.calls.lock().push("stop".to_string());
            if self.hang_stop {
                std::future::pending::<()>().await;
            }
            Ok(StreamHandle::new("h1"))
        }

        async fn read(&self, handle: &StreamHandle) -> Result<StreamChunk> {
            self.calls.lock().push(format!("read:{handle}"));
            Ok(self.chunks.lock().pop_front().unwrap_or(StreamChunk {
                eof: true,
                ..StreamChunk::default()
            }))
        }

        async fn close(&self, handle: &StreamHandle) -> Result<()> {
            self.calls.lock().push(format!("close:{handle}"));
            Ok(())
        }
    }

    fn chunk(data: &str, base64_encoded: bool, eof: bool) -> StreamChunk {
        StreamChunk {
            data: data.to_string(),
            base64_encoded,
            eof,
        }
    }

    #[test]
    fn test_default_start_params() {
        let params = TracingOptions::new().start_params();

        assert_eq!(params["transferMode"], "ReturnAsStream");
        assert_eq!(params["traceConfig"]["excludedCategories"], json!(["*"]));

        let included = params["traceConfig"]["includedCategories"]
            .as_array()
            .expect("array");
        assert_eq!(included.len(), DEFAULT_CATEGORIES.len() - 1);
        assert_eq!(included[0], "devtools.timeline");
        assert!(!included.contains(&json!(SCREENSHOT_CATEGORY)));
    }

    #[test]
    fn test_screenshots_and_custom_categories() {
        let params = TracingOptions::new()
            .categories(["-v8", "blink"])
            .screenshots(true)
            .start_params();

        assert_eq!(params["traceConfig"]["excludedCategories"], json!(["v8"]));
        assert_eq!(
            params["traceConfig"]["includedCategories"],
            json!(["blink", SCREENSHOT_CATEGORY])
        );
    }

    #[tokio::test]
    async fn test_start_twice_fails_without_second_command() {
        let source = FakeSource::with_chunks(Vec::new());
        let tracing = Tracing::new(source.clone());

        tracing.start(TracingOptions::new()).await.expect("first start");
        let err = tracing
            .start(TracingOptions::new())
            .await
            .expect_err("second start");

        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(source.calls(), vec!["start"]);
        assert!(tracing.is_recording());
    }

    #[tokio::test]
    async fn test_stop_returns_streamed_bytes() {
        let source = FakeSource::with_chunks(vec![
            chunk("eyJ0cmFj", true, false),
            chunk("ZUV2ZW50cyI6W119", true, true),
        ]);
        let tracing = Tracing::new(source.clone());

        tracing.start(TracingOptions::new()).await.expect("start");
        let data = tracing.stop().await.expect("stop").expect("bytes");

        assert_eq!(data, br#"{"traceEvents":[]}"#.to_vec());
        assert_eq!(
            source.calls(),
            vec!["start", "stop", "read:h1", "read:h1", "close:h1"]
        );
        assert!(!tracing.is_recording());
    }

    #[tokio::test]
    async fn test_stop_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.json");
        let source = FakeSource::with_chunks(vec![chunk("plain text", false, true)]);
        let tracing = Tracing::new(source);

        tracing
            .start(TracingOptions::new().path(&path))
            .await
            .expect("start");
        assert!(tracing.stop().await.expect("stop").is_none());

        let written = tokio::fs::read(&path).await.expect("read");
        assert_eq!(written, b"plain text".to_vec());
    }

    #[tokio::test]
    async fn test_stop_while_idle_fails_closed() {
        let source = FakeSource::with_chunks(Vec::new());
        let tracing = Tracing::new(source.clone());

        let err = tracing.stop().await.expect_err("idle");
        assert!(matches!(err, Error::InvalidState { .. }));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_returns_to_idle() {
        let source = Arc::new(FakeSource {
            fail_start: true,
            ..FakeSource::default()
        });
        let tracing = Tracing::new(source);

        assert!(tracing.start(TracingOptions::new()).await.is_err());
        assert!(!tracing.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_stop_returns_to_idle() {
        let source = Arc::new(FakeSource {
            hang_stop: true,
            ..FakeSource::default()
        });
        let tracing = Tracing::new(source.clone());

        tracing.start(TracingOptions::new()).await.expect("start");
        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(10), tracing.stop()).await;
        assert!(abandoned.is_err());
        assert!(!tracing.is_recording());

        tracing
            .start(TracingOptions::new())
            .await
            .expect("start after abandoned stop");
        assert_eq!(source.calls(), vec!["start", "stop", "start"]);
    }

    #[tokio::test]
    async fn test_bad_base64_still_closes_stream() {
        let source = FakeSource::with_chunks(vec![chunk("@@not base64@@", true, true)]);
        let tracing = Tracing::new(source.clone());

        tracing.start(TracingOptions::new()).await.expect("start");
        let err = tracing.stop().await.expect_err("decode");

        assert!(matches!(err, Error::Base64(_)));
        assert_eq!(source.calls().last().map(String::as_str), Some("close:h1"));
        assert!(!tracing.is_recording());
    }
}
