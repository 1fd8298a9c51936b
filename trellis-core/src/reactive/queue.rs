//! Effect Queue and Microtask Scheduler
//!
//! The scheduler is the central coordinator for deferred reactive work. It
//! owns two thread-local queues:
//!
//! 1. The **microtask queue**: callbacks run at the end of the current turn,
//!    when the host calls [`Scheduler::run_microtasks`].
//!
//! 2. The **effect queue**: a map from reaction identity to its latest
//!    pending recomputation. Scheduling an identity that is already pending
//!    replaces the callback instead of adding a second entry, so any number
//!    of synchronous writes in one turn produce one recomputation.
//!
//! The first time an identity is scheduled in a turn, a microtask is queued
//! that flushes the effect queue. [`flush_pending_reactions`] drains it
//! manually, which is how tests get deterministic ordering.
//!
//! # Flush order
//!
//! Flushing takes a snapshot of the pending identities, then runs each one
//! that is still pending. A reaction that re-enqueues another identity while
//! running adds to the live queue, and that entry is picked up by the
//! microtask queued for it, never by recursion.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::trace;

use crate::error::ReactiveError;

/// Identity of a computed or watch within the effect queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReactionId(u64);

impl ReactionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ReactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A pending recomputation.
pub(crate) type Reaction = Rc<dyn Fn() -> Result<(), ReactiveError>>;

type Microtask = Box<dyn FnOnce() -> Result<(), ReactiveError>>;

thread_local! {
    static EFFECT_QUEUE: RefCell<IndexMap<ReactionId, Reaction>> = RefCell::new(IndexMap::new());
    static MICROTASKS: RefCell<VecDeque<Microtask>> = const { RefCell::new(VecDeque::new()) };
}

/// The per-thread reactive scheduler.
pub struct Scheduler;

impl Scheduler {
    /// Queue a callback to run at the end of the current turn.
    pub fn queue_microtask(task: impl FnOnce() + 'static) {
        Self::push_microtask(Box::new(move || {
            task();
            Ok(())
        }));
    }

    fn push_microtask(task: Microtask) {
        MICROTASKS.with(|queue| queue.borrow_mut().push_back(task));
    }

    /// Run queued microtasks until the queue is empty, including any queued
    /// while draining.
    ///
    /// Returns the number of tasks run. On error the failing task is dropped
    /// and the rest stay queued for the next call.
    pub fn run_microtasks() -> Result<usize, ReactiveError> {
        let mut ran = 0;
        loop {
            let next = MICROTASKS.with(|queue| queue.borrow_mut().pop_front());
            let Some(task) = next else {
                return Ok(ran);
            };
            ran += 1;
            task()?;
        }
    }

    pub fn has_pending_microtasks() -> bool {
        MICROTASKS.with(|queue| !queue.borrow().is_empty())
    }

    /// Register the latest recomputation for `id`.
    pub(crate) fn schedule_reaction(id: ReactionId, reaction: Reaction) {
        let first = EFFECT_QUEUE.with(|queue| queue.borrow_mut().insert(id, reaction).is_none());
        if first {
            trace!(?id, "reaction scheduled");
            Self::push_microtask(Box::new(flush_pending_reactions));
        }
    }

    /// Forget a pending recomputation, if any.
    pub(crate) fn cancel_reaction(id: ReactionId) {
        // Also reached from destructors, possibly during thread teardown.
        let _ = EFFECT_QUEUE.try_with(|queue| {
            queue.borrow_mut().shift_remove(&id);
        });
    }

    pub fn is_reaction_pending(id: ReactionId) -> bool {
        EFFECT_QUEUE.with(|queue| queue.borrow().contains_key(&id))
    }

    pub fn pending_reactions() -> usize {
        EFFECT_QUEUE.with(|queue| queue.borrow().len())
    }

    /// Run every reaction pending at the start of the call, in insertion order.
    pub fn flush_pending_reactions() -> Result<(), ReactiveError> {
        let ids: Vec<ReactionId> = EFFECT_QUEUE.with(|queue| queue.borrow().keys().copied().collect());
        for id in ids {
            let reaction = EFFECT_QUEUE.with(|queue| queue.borrow_mut().shift_remove(&id));
            if let Some(reaction) = reaction {
                trace!(?id, "reaction flushed");
                reaction()?;
            }
        }
        Ok(())
    }
}

/// Drain the effect queue synchronously.
pub fn flush_pending_reactions() -> Result<(), ReactiveError> {
    Scheduler::flush_pending_reactions()
}
