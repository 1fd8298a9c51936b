//! Subscriber types for the reactive system.
//!
//! A signal notifies two kinds of subscribers:
//!
//! - plain callbacks, registered with [`Signal::subscribe`](super::Signal::subscribe)
//!   or by a computed/watch reaction, and invoked with the new value;
//! - tree nodes, entangled when a component reads the signal while rendering.
//!   Notifying a node asks its root for a targeted re-render of that node only.

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fiber::FiberId;

use super::signal::Source;

/// Unique identifier for a callback subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// The seam between the signal runtime and a mounted root.
///
/// Implemented by the root that owns the rendering node.
pub(crate) trait UpdateTarget {
    /// Schedule a targeted re-render of `fiber`.
    fn request_update(&self, fiber: FiberId);

    /// Record that `fiber` read `source` during its render, so the subscription
    /// can be revoked when the node is deleted.
    fn entangle(&self, fiber: FiberId, source: Rc<dyn Source>);
}

/// A rendering node that reads signals.
#[derive(Clone)]
pub(crate) struct NodeObserver {
    pub(crate) target: Weak<dyn UpdateTarget>,
    pub(crate) fiber: FiberId,
}

impl NodeObserver {
    pub(crate) fn request_update(&self) {
        if let Some(target) = self.target.upgrade() {
            target.request_update(self.fiber);
        }
    }

    pub(crate) fn entangle(&self, source: Rc<dyn Source>) {
        if let Some(target) = self.target.upgrade() {
            target.entangle(self.fiber, source);
        }
    }
}

impl fmt::Debug for NodeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeObserver")
            .field("fiber", &self.fiber)
            .field("live", &(self.target.strong_count() > 0))
            .finish()
    }
}

/// Key under which a subscriber is stored; makes subscription set-like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SubscriberKey {
    Node(FiberId),
    Callback(SubscriberId),
}

/// A subscriber to a `Signal<T>`.
pub(crate) enum Subscriber<T> {
    Node(NodeObserver),
    Callback(Rc<dyn Fn(&T)>),
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Node(observer) => Self::Node(observer.clone()),
            Self::Callback(callback) => Self::Callback(Rc::clone(callback)),
        }
    }
}
