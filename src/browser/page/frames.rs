//! Frame tree maintenance from context events.
//!
//! | Event | Effect |
//! |-------|--------|
//! | `browsingContext.contextCreated` | attach if unknown and parent known (or no main yet) |
//! | `browsingContext.fragmentNavigated` | detach descendants, then `FrameNavigated` |
//! | `browsingContext.contextDestroyed` | detach subtree, children first |
//! | `browsingContext.load` / `domContentLoaded` | re-emitted for known frames |
//! | `log.entryAdded` | see `console` |
//! | `network.*` | see `network` |
//!
//! Every handler is idempotent under duplicate delivery and never holds
//! the tree lock while page listeners run.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::browser::BrowsingContext;
use crate::identifiers::ContextId;
use crate::protocol::{ContextInfo, Event, EventKind, NavigationInfo, ParsedEvent};

use super::core::{PageEvent, PageInner};

// ============================================================================
// PageInner - Event Handling
// ============================================================================

impl PageInner {
    /// Entry point for every connection-wide event.
    pub(crate) fn handle_event(self: &Arc<Self>, event: &Event) {
        if self.is_closed() {
            return;
        }

        if !matches!(
            event.kind(),
            EventKind::ContextCreated
                | EventKind::ContextDestroyed
                | EventKind::FragmentNavigated
                | EventKind::Load
                | EventKind::DomContentLoaded
                | EventKind::LogEntryAdded
                | EventKind::BeforeRequestSent
                | EventKind::ResponseCompleted
                | EventKind::FetchError
        ) {
            return;
        }

        match event.parse() {
            ParsedEvent::ContextCreated(info) => self.attach(&info),
            ParsedEvent::ContextDestroyed(info) => self.detach(&info.context),
            ParsedEvent::FragmentNavigated(info) => self.navigated(info),
            ParsedEvent::Load(info) => self.lifecycle(info, PageEvent::Load),
            ParsedEvent::DomContentLoaded(info) => self.lifecycle(info, PageEvent::DomContentLoaded),
            ParsedEvent::LogEntryAdded(entry) => self.on_log_entry(&entry),
            ParsedEvent::Network(network) => self.on_network(network),
            other => trace!(?other, "Ignoring unparseable page event"),
        }
    }

    /// Adds a context to the tree if it belongs to this page.
    pub(crate) fn attach(&self, info: &ContextInfo) {
        let attached = {
            let mut tree = self.tree.lock();
            let parent_known = info
                .parent
                .as_ref()
                .is_some_and(|parent| tree.contains(parent));

            if tree.contains(&info.context) || !(parent_known || tree.main().is_none()) {
                trace!(context = %info.context, parent = ?info.parent, "Ignoring context");
                None
            } else {
                let context = BrowsingContext::new(self.connection.clone(), info);
                self.connection
                    .register_context(info.context.clone(), Arc::clone(context.events()));
                tree.add(Arc::clone(&context));
                Some(context)
            }
        };

        if let Some(context) = attached {
            debug!(context = %context.id(), parent = ?context.parent(), "Frame attached");
            self.events.publish(&PageEvent::FrameAttached(context));
        }

        for child in info.children.iter().flatten() {
            let mut child = child.clone();
            child.parent.get_or_insert_with(|| info.context.clone());
            self.attach(&child);
        }
    }

    /// Removes a context and its whole subtree, children first.
    pub(crate) fn detach(&self, id: &ContextId) {
        let order = self.tree.lock().detach_order(id);

        for context_id in order {
            // A listener may already have detached it.
            let Some(context) = self.tree.lock().remove(&context_id) else {
                continue;
            };

            context.dispose();
            debug!(context = %context_id, "Frame detached");
            self.events.publish(&PageEvent::FrameDetached(context));
        }
    }

    /// Handles a same-document navigation.
    fn navigated(self: &Arc<Self>, info: NavigationInfo) {
        let Some(frame) = self.frame(&info.context) else {
            return;
        };

        if !info.url.is_empty() {
            frame.set_url(&info.url);
        }

        let children = self.tree.lock().child_frames(&info.context);
        for child in children {
            self.detach(child.id());
        }

        if let Some(frame) = self.frame(&info.context) {
            self.events.publish(&PageEvent::FrameNavigated(frame));
            return;
        }

        // Detached by a listener meanwhile; report once it is back.
        let waiter = self.tree.lock().wait_for_frame(&info.context);
        let page = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Ok(frame) = waiter.await
                && let Some(page) = page.upgrade()
                && !page.is_closed()
            {
                page.events.publish(&PageEvent::FrameNavigated(frame));
            }
        });
    }

    /// Re-emits load lifecycle events for frames of this page.
    fn lifecycle(&self, info: NavigationInfo, make: fn(NavigationInfo) -> PageEvent) {
        let Some(frame) = self.frame(&info.context) else {
            return;
        };

        if !info.url.is_empty() {
            frame.set_url(&info.url);
        }
        self.events.publish(&make(info));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use crate::browser::page::{Page, PageEvent};
    use crate::identifiers::ContextId;
    use crate::transport::channel::{self, RemoteEnd};
    use crate::transport::{Connection, ConnectionOptions};

    fn page() -> (Page, RemoteEnd) {
        let (transport, remote) = channel::pair();
        let connection = Connection::new(transport, ConnectionOptions::default());
        (Page::new(connection, ContextId::new("A")), remote)
    }

    /// Records page events as short strings.
    fn record(page: &Page) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        page.on(move |event| {
            let entry = match event {
                PageEvent::FrameAttached(f) => format!("attached:{}", f.id()),
                PageEvent::FrameNavigated(f) => format!("navigated:{}", f.id()),
                PageEvent::FrameDetached(f) => format!("detached:{}", f.id()),
                PageEvent::Load(info) => format!("load:{}", info.context),
                PageEvent::DomContentLoaded(info) => format!("dom:{}", info.context),
                PageEvent::Console(message) => format!("console:{}", message.text),
                PageEvent::PageError(text) => format!("error:{text}"),
                PageEvent::Request(e)
                | PageEvent::RequestServedFromCache(e)
                | PageEvent::Response(e)
                | PageEvent::RequestFailed(e)
                | PageEvent::RequestFinished(e) => format!("network:{}", e.request_id),
                PageEvent::Close => "close".to_string(),
            };
            sink.lock().push(entry);
        });
        log
    }

    fn created(context: &str, parent: Option<&str>) -> Value {
        json!({
            "type": "event",
            "method": "browsingContext.contextCreated",
            "params": { "context": context, "parent": parent, "url": "about:blank", "children": null }
        })
    }

    fn destroyed(context: &str) -> Value {
        json!({
            "method": "browsingContext.contextDestroyed",
            "params": { "context": context, "url": "about:blank", "children": null }
        })
    }

    /// Pushes `events` followed by a marker and waits until the page saw it.
    async fn deliver(page: &Page, remote: &RemoteEnd, events: &[Value]) {
        let (id, seen) = page
            .connection()
            .events()
            .once(|event| event.method == "test.barrier");
        for event in events {
            remote.push_json(event);
        }
        remote.push_json(&json!({ "method": "test.barrier", "params": {} }));
        seen.await.expect("barrier");
        page.connection().off(id);
    }

    fn frame_ids(page: &Page) -> Vec<String> {
        page.frames().iter().map(|f| f.id().to_string()).collect()
    }

    #[tokio::test]
    async fn test_attach_child_and_drop_orphan() {
        let (page, remote) = page();
        let log = record(&page);

        deliver(
            &page,
            &remote,
            &[created("B", Some("A")), created("O", Some("missing"))],
        )
        .await;

        assert_eq!(frame_ids(&page), vec!["A", "B"]);
        assert_eq!(*log.lock(), vec!["attached:B"]);
        assert!(page.connection().is_routed(&ContextId::new("B")));
        assert!(!page.connection().is_routed(&ContextId::new("O")));
    }

    #[tokio::test]
    async fn test_orphan_reattaches_after_parent() {
        let (page, remote) = page();

        deliver(&page, &remote, &[created("C", Some("P"))]).await;
        assert!(page.frame(&ContextId::new("C")).is_none());

        deliver(&page, &remote, &[created("P", Some("A")), created("C", Some("P"))]).await;
        assert_eq!(frame_ids(&page), vec!["A", "P", "C"]);
        assert_eq!(
            page.child_frames(&ContextId::new("P"))
                .iter()
                .map(|f| f.id().to_string())
                .collect::<Vec<_>>(),
            vec!["C"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_attach_and_foreign_top_level_ignored() {
        let (page, remote) = page();
        let log = record(&page);

        deliver(
            &page,
            &remote,
            &[created("A", None), created("B", Some("A")), created("B", Some("A")), created("T2", None)],
        )
        .await;

        assert_eq!(*log.lock(), vec!["attached:B"]);
        assert_eq!(frame_ids(&page), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_navigation_detaches_descendants_first() {
        let (page, remote) = page();
        deliver(
            &page,
            &remote,
            &[created("B", Some("A")), created("C", Some("A")), created("D", Some("C"))],
        )
        .await;
        let log = record(&page);

        deliver(
            &page,
            &remote,
            &[json!({
                "method": "browsingContext.fragmentNavigated",
                "params": { "context": "A", "navigation": null, "url": "https://example.com/#top" }
            })],
        )
        .await;

        assert_eq!(
            *log.lock(),
            vec!["detached:B", "detached:D", "detached:C", "navigated:A"]
        );
        assert_eq!(frame_ids(&page), vec!["A"]);
        assert_eq!(page.main_frame().expect("main").url(), "https://example.com/#top");
    }

    #[tokio::test]
    async fn test_navigated_frame_detached_by_listener_reported_on_reattach() {
        let (page, remote) = page();
        deliver(&page, &remote, &[created("B", Some("A")), created("C", Some("B"))]).await;
        let log = record(&page);

        // Detaching C takes its parent B down with it.
        let weak = Arc::downgrade(&page.inner);
        page.on(move |event| {
            if let PageEvent::FrameDetached(frame) = event
                && frame.id().as_str() == "C"
                && let Some(inner) = weak.upgrade()
            {
                inner.detach(&ContextId::new("B"));
            }
        });
        let (_, navigated) = page
            .events()
            .once(|event| matches!(event, PageEvent::FrameNavigated(_)));

        deliver(
            &page,
            &remote,
            &[json!({
                "method": "browsingContext.fragmentNavigated",
                "params": { "context": "B", "navigation": null, "url": "https://example.com/frame#x" }
            })],
        )
        .await;
        assert_eq!(*log.lock(), vec!["detached:C", "detached:B"]);
        assert!(page.frame(&ContextId::new("B")).is_none());

        deliver(&page, &remote, &[created("B", Some("A"))]).await;
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), navigated)
            .await
            .expect("navigated in time")
            .expect("navigated");

        let PageEvent::FrameNavigated(frame) = event else {
            panic!("unexpected page event");
        };
        assert_eq!(frame.id().as_str(), "B");
        assert_eq!(
            *log.lock(),
            vec!["detached:C", "detached:B", "attached:B", "navigated:B"]
        );
    }

    #[tokio::test]
    async fn test_destroy_is_recursive_and_idempotent() {
        let (page, remote) = page();
        deliver(
            &page,
            &remote,
            &[created("B", Some("A")), created("C", Some("B"))],
        )
        .await;
        let log = record(&page);

        deliver(&page, &remote, &[destroyed("B"), destroyed("B"), destroyed("C")]).await;

        assert_eq!(*log.lock(), vec!["detached:C", "detached:B"]);
        assert_eq!(frame_ids(&page), vec!["A"]);
        assert!(!page.connection().is_routed(&ContextId::new("C")));
    }

    #[tokio::test]
    async fn test_nested_children_in_created_event() {
        let (page, remote) = page();

        deliver(
            &page,
            &remote,
            &[json!({
                "method": "browsingContext.contextCreated",
                "params": {
                    "context": "B",
                    "parent": "A",
                    "url": "https://example.com/frame",
                    "children": [{ "context": "C", "url": "about:blank", "children": [] }]
                }
            })],
        )
        .await;

        let child = page.frame(&ContextId::new("C")).expect("nested child");
        assert_eq!(child.parent().map(ContextId::as_str), Some("B"));
    }

    #[tokio::test]
    async fn test_load_events_only_for_own_frames() {
        let (page, remote) = page();
        let log = record(&page);

        deliver(
            &page,
            &remote,
            &[
                json!({
                    "method": "browsingContext.domContentLoaded",
                    "params": { "context": "A", "navigation": "n1", "url": "https://example.com/" }
                }),
                json!({
                    "method": "browsingContext.load",
                    "params": { "context": "A", "navigation": "n1", "url": "https://example.com/" }
                }),
                json!({
                    "method": "browsingContext.load",
                    "params": { "context": "other", "navigation": "n2", "url": "https://other/" }
                }),
            ],
        )
        .await;

        assert_eq!(*log.lock(), vec!["dom:A", "load:A"]);
        assert_eq!(page.main_frame().expect("main").url(), "https://example.com/");
    }
}
