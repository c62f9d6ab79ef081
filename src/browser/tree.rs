//! Per-page frame tree.
//!
//! Plain data structure; all protocol handling lives in the page. Children
//! keep their attach order so recursive detach visits them
//! deterministically.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::identifiers::ContextId;

use super::BrowsingContext;

// ============================================================================
// FrameTree
// ============================================================================

/// Ordered forest of browsing contexts with one main context.
#[derive(Debug, Default)]
pub struct FrameTree {
    /// Known contexts.
    frames: FxHashMap<ContextId, Arc<BrowsingContext>>,
    /// Attach order, for `frames()`.
    order: Vec<ContextId>,
    /// Child IDs per parent, in attach order.
    children: FxHashMap<ContextId, Vec<ContextId>>,
    /// Main (top-level) context.
    main: Option<ContextId>,
    /// Callers waiting for a context to become known.
    waiters: FxHashMap<ContextId, Vec<oneshot::Sender<Arc<BrowsingContext>>>>,
}

impl FrameTree {
    /// Creates an empty tree.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the main context.
    #[must_use]
    pub fn main(&self) -> Option<&Arc<BrowsingContext>> {
        self.main.as_ref().and_then(|id| self.frames.get(id))
    }

    /// Returns a context by ID.
    #[inline]
    #[must_use]
    pub fn get(&self, id: &ContextId) -> Option<&Arc<BrowsingContext>> {
        self.frames.get(id)
    }

    /// Returns `true` if the context is known.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ContextId) -> bool {
        self.frames.contains_key(id)
    }

    /// Returns the number of known contexts.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no context is known.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns every context in attach order.
    #[must_use]
    pub fn frames(&self) -> Vec<Arc<BrowsingContext>> {
        self.order
            .iter()
            .filter_map(|id| self.frames.get(id).cloned())
            .collect()
    }

    /// Returns the direct children of a context in attach order.
    #[must_use]
    pub fn child_frames(&self, id: &ContextId) -> Vec<Arc<BrowsingContext>> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.frames.get(child).cloned())
            .collect()
    }

    /// Inserts a context.
    ///
    /// The first top-level context becomes main. Wakes anyone waiting for
    /// the ID. Returns `false` if the ID is already known.
    pub fn add(&mut self, context: Arc<BrowsingContext>) -> bool {
        let id = context.id().clone();
        if self.frames.contains_key(&id) {
            return false;
        }

        match context.parent() {
            Some(parent) => self.children.entry(parent.clone()).or_default().push(id.clone()),
            None if self.main.is_none() => self.main = Some(id.clone()),
            None => {}
        }

        self.order.push(id.clone());
        self.frames.insert(id.clone(), Arc::clone(&context));

        for waiter in self.waiters.remove(&id).into_iter().flatten() {
            let _ = waiter.send(Arc::clone(&context));
        }
        true
    }

    /// Removes a single context, leaving its children in place.
    pub fn remove(&mut self, id: &ContextId) -> Option<Arc<BrowsingContext>> {
        let context = self.frames.remove(id)?;

        self.order.retain(|existing| existing != id);
        self.children.remove(id);
        if let Some(parent) = context.parent()
            && let Some(siblings) = self.children.get_mut(parent)
        {
            siblings.retain(|existing| existing != id);
        }
        if self.main.as_ref() == Some(id) {
            self.main = None;
        }

        Some(context)
    }

    /// Returns the subtree rooted at `id` in detach order: each child's
    /// subtree first, in attach order, then the node itself.
    #[must_use]
    pub fn detach_order(&self, id: &ContextId) -> Vec<ContextId> {
        let mut order = Vec::new();
        if self.frames.contains_key(id) {
            self.collect_post_order(id, &mut order);
        }
        order
    }

    fn collect_post_order(&self, id: &ContextId, order: &mut Vec<ContextId>) {
        for child in self.children.get(id).into_iter().flatten() {
            self.collect_post_order(child, order);
        }
        order.push(id.clone());
    }

    /// Registers interest in a context.
    ///
    /// The receiver resolves immediately if the context is known, and
    /// errors if the tree is closed first.
    pub fn wait_for_frame(&mut self, id: &ContextId) -> oneshot::Receiver<Arc<BrowsingContext>> {
        let (tx, rx) = oneshot::channel();
        match self.frames.get(id) {
            Some(context) => {
                let _ = tx.send(Arc::clone(context));
            }
            None => self.waiters.entry(id.clone()).or_default().push(tx),
        }
        rx
    }

    /// Empties the tree, returning the removed contexts in attach order.
    ///
    /// Pending waiters are dropped.
    pub fn close(&mut self) -> Vec<Arc<BrowsingContext>> {
        let frames = self.frames();
        self.frames.clear();
        self.order.clear();
        self.children.clear();
        self.main = None;
        self.waiters.clear();
        frames
    }
}

// ============================================================================
// Tests
// ============================================================================
