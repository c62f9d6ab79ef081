//! Network activity of the page's frames.
//!
//! | Event | Page events |
//! |-------|-------------|
//! | `network.beforeRequestSent` | `Request` |
//! | `network.responseCompleted` | `RequestServedFromCache` (cached only), `Response`, `RequestFinished` |
//! | `network.fetchError` | `RequestFailed` |
//!
//! `network.responseStarted` carries nothing the completed response does
//! not, so it is not re-emitted.

use tracing::trace;

use crate::protocol::{EventKind, NetworkEvent};

use super::core::{PageEvent, PageInner};

// ============================================================================
// PageInner - Network
// ============================================================================

impl PageInner {
    /// Re-emits a network event issued by one of this page's frames.
    pub(crate) fn on_network(&self, event: NetworkEvent) {
        let Some(context) = event.context.as_ref() else {
            return;
        };
        if self.frame(context).is_none() {
            trace!(%context, request = %event.request_id, "Network event for foreign context");
            return;
        }

        match event.kind {
            EventKind::BeforeRequestSent => {
                self.events.publish(&PageEvent::Request(event));
            }
            EventKind::ResponseCompleted => {
                if event.from_cache {
                    self.events
                        .publish(&PageEvent::RequestServedFromCache(event.clone()));
                }
                self.events.publish(&PageEvent::Response(event.clone()));
                self.events.publish(&PageEvent::RequestFinished(event));
            }
            EventKind::FetchError => {
                self.events.publish(&PageEvent::RequestFailed(event));
            }
            _ => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
