//! Core Page struct, events and accessors.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::browser::{BrowsingContext, FrameTree, Tracing};
use crate::emitter::EventBus;
use crate::error::{Error, Result};
use crate::identifiers::{ContextId, SubscriptionId};
use crate::protocol::{BrowsingContextCommand, ContextInfo, NavigationInfo, NetworkEvent};
use crate::transport::Connection;

use super::console::ConsoleMessage;
use super::tracing_source::PageTracingSource;

// ============================================================================
// Constants
// ============================================================================

/// URL of a freshly created context.
const BLANK_URL: &str = "about:blank";

// ============================================================================
// PageEvent
// ============================================================================

/// Notifications emitted on the page bus.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// A frame joined the tree.
    FrameAttached(Arc<BrowsingContext>),
    /// A frame navigated within its document.
    FrameNavigated(Arc<BrowsingContext>),
    /// A frame left the tree.
    FrameDetached(Arc<BrowsingContext>),
    /// A frame finished loading.
    Load(NavigationInfo),
    /// A frame's DOM is ready.
    DomContentLoaded(NavigationInfo),
    /// A `console.*` call.
    Console(ConsoleMessage),
    /// An uncaught script error, with formatted stack.
    PageError(String),
    /// A frame issued a request.
    Request(NetworkEvent),
    /// A completed response came from the cache. Precedes `Response`.
    RequestServedFromCache(NetworkEvent),
    /// A response completed.
    Response(NetworkEvent),
    /// A request failed before a response completed.
    RequestFailed(NetworkEvent),
    /// A request finished. Follows its `Response`.
    RequestFinished(NetworkEvent),
    /// The page was closed.
    Close,
}

// ============================================================================
// PageInner
// ============================================================================

/// Internal shared state for a page.
pub(crate) struct PageInner {
    /// Owning connection.
    pub(crate) connection: Connection,
    /// Frame tree.
    pub(crate) tree: Mutex<FrameTree>,
    /// Page event bus.
    pub(crate) events: EventBus<PageEvent>,
    /// Subscription on the connection-wide bus.
    pub(crate) subscription: Mutex<Option<SubscriptionId>>,
    /// Set once by `close`.
    pub(crate) closed: AtomicBool,
    /// Trace recorder.
    pub(crate) tracing: Tracing,
}

impl PageInner {
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn frame(&self, id: &ContextId) -> Option<Arc<BrowsingContext>> {
        self.tree.lock().get(id).cloned()
    }

    pub(crate) fn main_frame(&self) -> Result<Arc<BrowsingContext>> {
        self.tree
            .lock()
            .main()
            .cloned()
            .ok_or_else(|| Error::invalid_state("Page has no main frame"))
    }
}

// ============================================================================
// Page
// ============================================================================

/// A handle to a browser page.
///
/// Cheap to clone; clones share the same frame tree and event bus.
#[derive(Clone)]
pub struct Page {
    pub(crate) inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.inner.tree.lock();
        f.debug_struct("Page")
            .field("main", &tree.main().map(|frame| frame.id().clone()))
            .field("frames", &tree.len())
            .field("closed", &self.inner.is_closed())
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Creates a page whose main frame is `context`.
    ///
    /// The main frame is attached immediately with `about:blank`; the page
    /// then follows context events from the connection.
    pub fn new(connection: Connection, context: ContextId) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<PageInner>| PageInner {
            connection: connection.clone(),
            tree: Mutex::new(FrameTree::new()),
            events: EventBus::new(),
            subscription: Mutex::new(None),
            closed: AtomicBool::new(false),
            tracing: Tracing::new(Arc::new(PageTracingSource::new(weak.clone()))),
        });

        inner.attach(&ContextInfo {
            context,
            parent: None,
            url: BLANK_URL.to_string(),
            children: None,
        });

        let weak = Arc::downgrade(&inner);
        let subscription = connection.on_any(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        });
        *inner.subscription.lock() = Some(subscription);

        Self { inner }
    }
}

// ============================================================================
// Page - Accessors
// ============================================================================

impl Page {
    /// Returns the main frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] once the main frame was detached.
    pub fn main_frame(&self) -> Result<Arc<BrowsingContext>> {
        self.inner.main_frame()
    }

    /// Returns every frame in attach order.
    #[must_use]
    pub fn frames(&self) -> Vec<Arc<BrowsingContext>> {
        self.inner.tree.lock().frames()
    }

    /// Returns a frame by context ID.
    #[must_use]
    pub fn frame(&self, id: &ContextId) -> Option<Arc<BrowsingContext>> {
        self.inner.frame(id)
    }

    /// Returns a frame by context ID, failing if the page does not know it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameNotFound`] for contexts outside the frame tree,
    /// including frames that were already detached.
    pub fn get_frame(&self, id: &ContextId) -> Result<Arc<BrowsingContext>> {
        self.inner
            .frame(id)
            .ok_or_else(|| Error::frame_not_found(id.clone()))
    }

    /// Returns the direct children of a frame.
    #[must_use]
    pub fn child_frames(&self, id: &ContextId) -> Vec<Arc<BrowsingContext>> {
        self.inner.tree.lock().child_frames(id)
    }

    /// Waits until a frame with this ID is attached.
    ///
    /// Has no timeout of its own. Resolves to `None` if the page closes
    /// first.
    pub fn wait_for_frame(
        &self,
        id: &ContextId,
    ) -> impl Future<Output = Option<Arc<BrowsingContext>>> + Send + use<> {
        let waiter = {
            let mut tree = self.inner.tree.lock();
            (!self.inner.is_closed()).then(|| tree.wait_for_frame(id))
        };

        async move {
            match waiter {
                Some(waiter) => waiter.await.ok(),
                None => None,
            }
        }
    }

    /// Subscribes to page events.
    pub fn on<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PageEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    /// Removes a page event subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Returns the page event bus.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventBus<PageEvent> {
        &self.inner.events
    }

    /// Returns the trace recorder.
    #[inline]
    #[must_use]
    pub fn tracing(&self) -> &Tracing {
        &self.inner.tracing
    }

    /// Returns the owning connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Returns `true` once [`Page::close`] was called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

// ============================================================================
// Page - Close
// ============================================================================

impl Page {
    /// Closes the page.
    ///
    /// Stops following events, detaches every frame locally, emits
    /// [`PageEvent::Close`] and asks the browser to close the main context.
    /// Later calls return immediately.
    pub async fn close(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(subscription) = inner.subscription.lock().take() {
            inner.connection.off(subscription);
        }

        let (main, frames) = {
            let mut tree = inner.tree.lock();
            let main = tree.main().map(|frame| frame.id().clone());
            (main, tree.close())
        };
        for frame in &frames {
            frame.dispose();
        }

        inner.events.publish(&PageEvent::Close);
        inner.events.clear();

        debug!(?main, frames = frames.len(), "Page closed");

        if let Some(context) = main {
            inner
                .connection
                .execute(BrowsingContextCommand::Close { context })
                .await?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use crate::transport::ConnectionOptions;
    use crate::transport::channel::{self, RemoteEnd};

    fn page() -> (Page, RemoteEnd) {
        let (transport, remote) = channel::pair();
        let connection = Connection::new(transport, ConnectionOptions::default());
        (Page::new(connection, ContextId::new("A")), remote)
    }

    #[test]
    fn test_page_is_clone_and_debug() {
        fn assert_traits<T: Clone + fmt::Debug + Send + Sync>() {}
        assert_traits::<Page>();
    }

    #[tokio::test]
    async fn test_main_frame_attached_on_creation() {
        let (page, _remote) = page();

        let main = page.main_frame().expect("main");
        assert_eq!(main.id().as_str(), "A");
        assert_eq!(main.url(), "about:blank");
        assert!(page.connection().is_routed(main.id()));
        assert_eq!(page.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_get_frame_unknown_context() {
        let (page, _remote) = page();

        assert_eq!(page.get_frame(&ContextId::new("A")).expect("main").id().as_str(), "A");

        let err = page.get_frame(&ContextId::new("nowhere")).expect_err("unknown");
        assert!(matches!(
            &err,
            Error::FrameNotFound { context_id } if context_id.as_str() == "nowhere"
        ));
        assert_eq!(err.to_string(), "Frame not found: nowhere");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (page, mut remote) = page();
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let closes = Arc::clone(&closes);
            page.on(move |event| {
                if matches!(event, PageEvent::Close) {
                    closes.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let closing = tokio::spawn({
            let page = page.clone();
            async move { page.close().await }
        });

        let sent = remote.next_sent_json().await.expect("close command");
        assert_eq!(sent["method"], "browsingContext.close");
        assert_eq!(sent["params"]["context"], "A");
        remote.push_json(&json!({ "id": sent["id"], "result": {} }));
        closing.await.expect("join").expect("closed");

        page.close().await.expect("second close");
        assert!(remote.try_next_sent().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        assert!(page.is_closed());
        assert!(page.frames().is_empty());
        assert!(page.wait_for_frame(&ContextId::new("A")).await.is_none());
        assert!(!page.connection().is_routed(&ContextId::new("A")));
    }

    #[tokio::test]
    async fn test_wait_for_frame_released_by_close() {
        let (page, mut remote) = page();

        let waiting = tokio::spawn(page.wait_for_frame(&ContextId::new("later")));

        let closing = tokio::spawn({
            let page = page.clone();
            async move { page.close().await }
        });
        let sent = remote.next_sent_json().await.expect("close command");
        remote.push_json(&json!({ "id": sent["id"], "result": {} }));
        closing.await.expect("join").expect("closed");

        assert!(waiting.await.expect("join").is_none());
    }
}
