//! Console messages and page errors from `log.entryAdded`.

use serde_json::Value;
use tracing::debug;

use crate::protocol::{LogEntry, StackTrace};

use super::core::{PageEvent, PageInner};

// ============================================================================
// Types
// ============================================================================

/// Source location of a console call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLocation {
    /// Script URL.
    pub url: String,
    /// Zero-based line.
    pub line_number: i64,
    /// Zero-based column.
    pub column_number: i64,
}

/// A `console.*` call made by the page.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleMessage {
    /// Console method (`log`, `warn`, `error`, ...).
    pub kind: String,
    /// Arguments rendered as text and joined by spaces.
    pub text: String,
    /// Serialized arguments as sent by the browser.
    pub args: Vec<Value>,
    /// Call stack, innermost first.
    pub locations: Vec<ConsoleLocation>,
}

impl ConsoleMessage {
    /// Builds a message from a `console` log entry.
    #[must_use]
    pub fn from_entry(entry: &LogEntry) -> Self {
        let text = entry
            .args
            .iter()
            .map(remote_value_text)
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            kind: entry.method.clone().unwrap_or_else(|| "log".to_string()),
            text,
            args: entry.args.clone(),
            locations: entry
                .stack_trace
                .as_ref()
                .map(stack_locations)
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Renders a serialized remote value the way a console shows it.
///
/// Primitives print their value; objects print as `JSHandle@{type}`.
#[must_use]
pub fn remote_value_text(value: &Value) -> String {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    let inner = value.get("value");

    match (kind, inner) {
        ("undefined", _) => "undefined".to_string(),
        ("null", _) => "null".to_string(),
        ("string", Some(Value::String(s))) => s.clone(),
        ("number" | "bigint", Some(Value::String(s))) => s.clone(),
        ("number" | "boolean", Some(v)) => v.to_string(),
        _ => format!("JSHandle@{kind}"),
    }
}

/// Formats a JavaScript error entry with its stack.
#[must_use]
pub fn page_error_text(entry: &LogEntry) -> String {
    let mut message = entry.text.clone().unwrap_or_default();

    for frame in entry.stack_trace.iter().flat_map(|s| &s.call_frames) {
        let name = if frame.function_name.is_empty() {
            "<anonymous>"
        } else {
            frame.function_name.as_str()
        };
        message.push_str(&format!(
            "\n    at {name} ({}:{}:{})",
            frame.url, frame.line_number, frame.column_number
        ));
    }
    message
}

fn stack_locations(stack: &StackTrace) -> Vec<ConsoleLocation> {
    stack
        .call_frames
        .iter()
        .map(|frame| ConsoleLocation {
            url: frame.url.clone(),
            line_number: frame.line_number,
            column_number: frame.column_number,
        })
        .collect()
}

// ============================================================================
// PageInner - Log Entries
// ============================================================================

impl PageInner {
    /// Turns a log entry of one of this page's frames into a page event.
    pub(crate) fn on_log_entry(&self, entry: &LogEntry) {
        let Some(context) = entry.source.context.as_ref() else {
            return;
        };
        if self.frame(context).is_none() {
            return;
        }

        match entry.entry_type.as_str() {
            "console" => {
                let message = ConsoleMessage::from_entry(entry);
                self.events.publish(&PageEvent::Console(message));
            }
            "javascript" => {
                self.events.publish(&PageEvent::PageError(page_error_text(entry)));
            }
            other => debug!(
                entry_type = other,
                text = ?entry.text,
                level = %entry.level,
                "Unhandled log entry"
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::browser::page::Page;
    use crate::identifiers::ContextId;
    use crate::transport::channel;
    use crate::transport::{Connection, ConnectionOptions};

    fn entry(value: Value) -> LogEntry {
        serde_json::from_value(value).expect("log entry")
    }

    #[test]
    fn test_remote_value_text() {
        assert_eq!(remote_value_text(&json!({ "type": "string", "value": "hi" })), "hi");
        assert_eq!(remote_value_text(&json!({ "type": "number", "value": 4.5 })), "4.5");
        assert_eq!(remote_value_text(&json!({ "type": "number", "value": "NaN" })), "NaN");
        assert_eq!(remote_value_text(&json!({ "type": "boolean", "value": true })), "true");
        assert_eq!(remote_value_text(&json!({ "type": "undefined" })), "undefined");
        assert_eq!(remote_value_text(&json!({ "type": "null" })), "null");
        assert_eq!(
            remote_value_text(&json!({ "type": "object", "handle": "h1" })),
            "JSHandle@object"
        );
    }

    #[test]
    fn test_console_message_from_entry() {
        let message = ConsoleMessage::from_entry(&entry(json!({
            "type": "console",
            "level": "info",
            "method": "warn",
            "source": { "realm": "r", "context": "A" },
            "args": [
                { "type": "string", "value": "count" },
                { "type": "number", "value": 3 }
            ],
            "stackTrace": {
                "callFrames": [
                    { "url": "https://a/x.js", "functionName": "f", "lineNumber": 1, "columnNumber": 2 }
                ]
            }
        })));

        assert_eq!(message.kind, "warn");
        assert_eq!(message.text, "count 3");
        assert_eq!(message.args.len(), 2);
        assert_eq!(
            message.locations,
            vec![ConsoleLocation {
                url: "https://a/x.js".to_string(),
                line_number: 1,
                column_number: 2,
            }]
        );
    }

    #[test]
    fn test_page_error_text() {
        let text = page_error_text(&entry(json!({
            "type": "javascript",
            "level": "error",
            "text": "Error: boom",
            "source": { "realm": "r", "context": "A" },
            "stackTrace": {
                "callFrames": [
                    { "url": "https://a/x.js", "functionName": "run", "lineNumber": 10, "columnNumber": 4 },
                    { "url": "https://a/y.js", "functionName": "", "lineNumber": 1, "columnNumber": 0 }
                ]
            }
        })));

        assert_eq!(
            text,
            "Error: boom\n    at run (https://a/x.js:10:4)\n    at <anonymous> (https://a/y.js:1:0)"
        );
    }

    #[tokio::test]
    async fn test_entries_become_page_events() {
        let (transport, remote) = channel::pair();
        let connection = Connection::new(transport, ConnectionOptions::default());
        let page = Page::new(connection.clone(), ContextId::new("A"));

        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let seen = std::sync::Arc::clone(&seen);
            page.on(move |event| match event {
                PageEvent::Console(message) => seen.lock().push(format!("console:{}", message.text)),
                PageEvent::PageError(text) => seen.lock().push(format!("error:{text}")),
                _ => {}
            });
        }
        let (_, barrier) = connection.events().once(|event| event.method == "test.barrier");

        for (context, kind) in [("A", "console"), ("elsewhere", "console"), ("A", "javascript"), ("A", "worker")] {
            remote.push_json(&json!({
                "method": "log.entryAdded",
                "params": {
                    "type": kind,
                    "level": "info",
                    "text": "hello",
                    "source": { "realm": "r", "context": context },
                    "args": [{ "type": "string", "value": "hello" }]
                }
            }));
        }
        remote.push_json(&json!({ "method": "test.barrier", "params": {} }));
        barrier.await.expect("barrier");

        assert_eq!(*seen.lock(), vec!["console:hello", "error:hello"]);
    }
}
