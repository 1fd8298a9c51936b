//! Reactive Context
//!
//! The reactive context tracks who is currently observing signal reads.
//! There are two kinds of observer:
//!
//! - a **tracking pass**, entered while a computed or watch (re)derives. Reads
//!   are accumulated into a scratch list instead of subscribing anyone; the
//!   reaction reconciles its subscriptions from that list afterwards.
//! - a **rendering node**, entered while a component renders. Reads entangle
//!   the node with the signal directly.
//!
//! # Implementation
//!
//! We use a thread-local stack. Only the top frame observes, so a computed
//! created during a render tracks its own reads without entangling the node.
//! Frames are popped by guards, which keeps the stack consistent even if a
//! getter or component panics.

use std::cell::RefCell;
use std::rc::Rc;

use super::signal::Source;
use super::subscriber::NodeObserver;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

enum Frame {
    Tracking(Vec<Rc<dyn Source>>),
    Rendering(NodeObserver),
}

/// What the top of the stack wants from a signal read.
pub(crate) enum Observer {
    /// Record the signal in the current tracking pass.
    Tracking,
    /// Entangle the rendering node with the signal.
    Node(NodeObserver),
}

/// Guard that pops its frame when dropped.
pub struct ReactiveContext {
    depth: usize,
    popped: bool,
}

impl ReactiveContext {
    /// Enter a tracking pass.
    ///
    /// Signal reads made until [`finish`](Self::finish) are collected rather
    /// than subscribed.
    pub fn track() -> Self {
        Self::push(Frame::Tracking(Vec::new()))
    }

    /// Enter the render of a node.
    pub(crate) fn render(observer: NodeObserver) -> Self {
        Self::push(Frame::Rendering(observer))
    }

    fn push(frame: Frame) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(frame);
            stack.len()
        });
        Self {
            depth,
            popped: false,
        }
    }

    /// Leave the frame and return the signals read during a tracking pass,
    /// in first-read order without duplicates.
    pub(crate) fn finish(mut self) -> Vec<Rc<dyn Source>> {
        self.popped = true;
        match self.pop() {
            Some(Frame::Tracking(dependencies)) => dependencies,
            _ => Vec::new(),
        }
    }

    fn pop(&self) -> Option<Frame> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext popped out of order"
            );
            stack.pop()
        })
    }

    /// Check if any observer is active.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Check if the innermost observer is a tracking pass.
    pub fn is_tracking() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Frame::Tracking(_))))
    }

    pub(crate) fn current_observer() -> Option<Observer> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Tracking(_)) => Some(Observer::Tracking),
            Some(Frame::Rendering(observer)) => Some(Observer::Node(observer.clone())),
            None => None,
        })
    }

    /// Record a read in the innermost tracking pass.
    pub(crate) fn track_dependency(source: Rc<dyn Source>) {
        CONTEXT_STACK.with(|stack| {
            if let Some(Frame::Tracking(dependencies)) = stack.borrow_mut().last_mut() {
                if !dependencies.iter().any(|dep| dep.id() == source.id()) {
                    dependencies.push(source);
                }
            }
        });
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.popped {
            self.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;

    #[test]
    fn context_tracks_activity() {
        assert!(!ReactiveContext::is_active());

        {
            let _ctx = ReactiveContext::track();
            assert!(ReactiveContext::is_active());
            assert!(ReactiveContext::is_tracking());
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn tracking_collects_each_signal_once() {
        let a = Signal::new(1);
        let b = Signal::new(2);

        let ctx = ReactiveContext::track();
        a.get();
        b.get();
        a.get();
        let deps = ctx.finish();

        let ids: Vec<_> = deps.iter().map(|dep| dep.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn nested_tracking_is_isolated() {
        let outer_signal = Signal::new(0);
        let inner_signal = Signal::new(0);

        let outer = ReactiveContext::track();
        outer_signal.get();

        let inner = ReactiveContext::track();
        inner_signal.get();
        let inner_deps = inner.finish();

        let outer_deps = outer.finish();

        assert_eq!(inner_deps.len(), 1);
        assert_eq!(inner_deps[0].id(), inner_signal.id());
        assert_eq!(outer_deps.len(), 1);
        assert_eq!(outer_deps[0].id(), outer_signal.id());
    }

    #[test]
    fn frame_is_popped_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::track();
            panic!("getter failed");
        });
        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
    }
}
