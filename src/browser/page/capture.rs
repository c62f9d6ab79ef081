//! Screenshots and PDF printing.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::BrowsingContextCommand;

use super::core::Page;

// ============================================================================
// PdfOptions
// ============================================================================

/// Options for [`Page::pdf`].
#[derive(Debug, Clone, Default)]
pub struct PdfOptions {
    /// Print background graphics.
    pub background: Option<bool>,
    /// Landscape orientation.
    pub landscape: bool,
    /// Page ranges, e.g. `"1-3, 5"`.
    pub page_ranges: Option<String>,
    /// Scale factor.
    pub scale: Option<f64>,
    /// Use the page's CSS page size instead of shrinking to fit.
    pub prefer_css_page_size: bool,
    /// Also write the document here.
    pub path: Option<PathBuf>,
}

impl PdfOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets landscape orientation.
    #[must_use]
    pub fn landscape(mut self, landscape: bool) -> Self {
        self.landscape = landscape;
        self
    }

    /// Sets page ranges.
    #[must_use]
    pub fn page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.page_ranges = Some(ranges.into());
        self
    }

    /// Sets the output path.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn ranges(&self) -> Option<Vec<String>> {
        self.page_ranges
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(|ranges| ranges.split(", ").map(str::to_string).collect())
    }
}

// ============================================================================
// Page - Capture
// ============================================================================

impl Page {
    /// Captures a PNG screenshot of the main frame.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let context = self.main_frame()?.id().clone();
        let result = self
            .connection()
            .execute(BrowsingContextCommand::CaptureScreenshot { context })
            .await?;

        decode_data("browsingContext.captureScreenshot", &result)
    }

    /// Prints the main frame to PDF.
    ///
    /// Writes the document to `options.path` as well when set.
    pub async fn pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        let context = self.main_frame()?.id().clone();
        let result = self
            .connection()
            .execute(BrowsingContextCommand::Print {
                context,
                background: options.background,
                orientation: Some(if options.landscape { "landscape" } else { "portrait" }.to_string()),
                page_ranges: options.ranges(),
                scale: options.scale,
                shrink_to_fit: Some(!options.prefer_css_page_size),
            })
            .await?;

        let data = decode_data("browsingContext.print", &result)?;

        if let Some(path) = &options.path {
            tokio::fs::write(path, &data).await?;
            debug!(path = %path.display(), bytes = data.len(), "PDF written");
        }
        Ok(data)
    }
}

fn decode_data(method: &str, result: &Value) -> Result<Vec<u8>> {
    let data = result
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::protocol(method, "response has no data"))?;

    Ok(STANDARD.decode(data)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::ContextId;
    use crate::transport::channel::{self, RemoteEnd};
    use crate::transport::{Connection, ConnectionOptions};

    fn page() -> (Page, RemoteEnd) {
        let (transport, remote) = channel::pair();
        let connection = Connection::new(transport, ConnectionOptions::default());
        (Page::new(connection, ContextId::new("A")), remote)
    }

    #[test]
    fn test_page_ranges_split() {
        let options = PdfOptions::new().page_ranges("1-3, 5");
        assert_eq!(
            options.ranges(),
            Some(vec!["1-3".to_string(), "5".to_string()])
        );
        assert_eq!(PdfOptions::new().page_ranges("").ranges(), None);
        assert_eq!(PdfOptions::new().page_ranges("2").ranges(), Some(vec!["2".to_string()]));
    }

    #[tokio::test]
    async fn test_screenshot_decodes_data() {
        let (page, mut remote) = page();

        let capturing = tokio::spawn({
            let page = page.clone();
            async move { page.screenshot().await }
        });

        let sent = remote.next_sent_json().await.expect("screenshot");
        assert_eq!(sent["method"], "browsingContext.captureScreenshot");
        assert_eq!(sent["params"]["context"], "A");
        remote.push_json(&json!({ "id": sent["id"], "result": { "data": STANDARD.encode(b"png") } }));

        assert_eq!(capturing.await.expect("join").expect("data"), b"png");
    }

    #[tokio::test]
    async fn test_missing_data_is_protocol_error() {
        let (page, mut remote) = page();

        let capturing = tokio::spawn({
            let page = page.clone();
            async move { page.screenshot().await }
        });

        let sent = remote.next_sent_json().await.expect("screenshot");
        remote.push_json(&json!({ "id": sent["id"], "result": {} }));

        let err = capturing.await.expect("join").expect_err("no data");
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_pdf_params_and_file() {
        let (page, mut remote) = page();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.pdf");
        let options = PdfOptions::new()
            .landscape(true)
            .page_ranges("1-2, 4")
            .path(&path);

        let printing = tokio::spawn({
            let page = page.clone();
            async move { page.pdf(&options).await }
        });

        let sent = remote.next_sent_json().await.expect("print");
        assert_eq!(sent["method"], "browsingContext.print");
        assert_eq!(sent["params"]["orientation"], "landscape");
        assert_eq!(sent["params"]["pageRanges"], json!(["1-2", "4"]));
        assert_eq!(sent["params"]["shrinkToFit"], true);
        remote.push_json(&json!({ "id": sent["id"], "result": { "data": STANDARD.encode(b"%PDF") } }));

        assert_eq!(printing.await.expect("join").expect("pdf"), b"%PDF");
        assert_eq!(std::fs::read(&path).expect("file"), b"%PDF");
    }
}
