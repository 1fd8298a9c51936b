//! Watch Implementation
//!
//! A Watch is a side-effecting reaction that re-runs whenever the signals it
//! read on its last run change.
//!
//! # How Watches Work
//!
//! 1. Construction only queues the first run as a microtask. Code running
//!    synchronously after construction (for example a re-render in the same
//!    turn) can stop the watch before it ever does any work.
//!
//! 2. Each run happens inside a tracking pass, then the watch reconciles its
//!    subscriptions exactly like a computed does.
//!
//! 3. When a dependency changes, the re-run goes through the effect queue, so
//!    it is coalesced with any other write in the same turn.
//!
//! # Cleanup
//!
//! The getter may return a cleanup callback. It runs before the next run and
//! when the watch stops. Dropping the last handle stops the watch.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::ReactiveContext;
use super::queue::{ReactionId, Scheduler};
use super::reaction::Dependencies;

/// Callback returned by a watch getter or an effect hook, run on teardown.
pub type Cleanup = Box<dyn FnOnce()>;

struct WatchInner {
    id: ReactionId,
    getter: Box<dyn Fn() -> Option<Cleanup>>,
    deps: RefCell<Dependencies>,
    cleanup: RefCell<Option<Cleanup>>,
    running: Cell<bool>,
    run_count: Cell<usize>,
    this: Weak<WatchInner>,
}

impl WatchInner {
    fn start(&self) {
        if self.running.get() {
            return;
        }
        self.running.set(true);

        let this = self.this.clone();
        Scheduler::queue_microtask(move || {
            if let Some(inner) = this.upgrade() {
                if inner.running.get() {
                    inner.run();
                }
            }
        });
    }

    fn reaction(&self) -> Rc<dyn Fn()> {
        let id = self.id;
        let this = self.this.clone();
        Rc::new(move || {
            let this = this.clone();
            Scheduler::schedule_reaction(
                id,
                Rc::new(move || {
                    if let Some(inner) = this.upgrade() {
                        if inner.running.get() {
                            inner.run();
                        }
                    }
                    Ok(())
                }),
            );
        })
    }

    fn run(&self) {
        Scheduler::cancel_reaction(self.id);
        self.run_cleanup();
        trace!(id = ?self.id, "running watch");

        let ctx = ReactiveContext::track();
        let cleanup = (self.getter)();
        let tracked = ctx.finish();
        self.run_count.set(self.run_count.get() + 1);

        if !self.running.get() {
            // Stopped from inside its own getter.
            if let Some(cleanup) = cleanup {
                cleanup();
            }
            return;
        }
        *self.cleanup.borrow_mut() = cleanup;
        self.deps.borrow_mut().reconcile(tracked, self.reaction());
    }

    fn stop(&self) {
        if !self.running.get() {
            return;
        }
        self.running.set(false);
        Scheduler::cancel_reaction(self.id);
        self.deps.borrow_mut().clear();
        self.run_cleanup();
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

impl Drop for WatchInner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A side-effecting reaction with an optional cleanup.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::reactive::{Scheduler, Signal, Watch};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let watch = {
///     let (count, seen) = (count.clone(), seen.clone());
///     Watch::new(move || {
///         seen.set(count.get());
///         None
///     })
/// };
///
/// // The first run waits for the end of the turn.
/// assert_eq!(seen.get(), -1);
/// Scheduler::run_microtasks().unwrap();
/// assert_eq!(seen.get(), 0);
/// # drop(watch);
/// ```
#[derive(Clone)]
pub struct Watch {
    inner: Rc<WatchInner>,
}

impl Watch {
    /// Create a watch and queue its first run.
    pub fn new(getter: impl Fn() -> Option<Cleanup> + 'static) -> Self {
        let watch = Self::stopped(getter);
        watch.inner.start();
        watch
    }

    /// Create a watch without queueing its first run.
    pub(crate) fn stopped(getter: impl Fn() -> Option<Cleanup> + 'static) -> Self {
        let inner = Rc::new_cyclic(|this| WatchInner {
            id: ReactionId::new(),
            getter: Box::new(getter),
            deps: RefCell::new(Dependencies::new()),
            cleanup: RefCell::new(None),
            running: Cell::new(false),
            run_count: Cell::new(0),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Queue the first run if the watch is not running.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Stop the watch. Idempotent.
    ///
    /// Drops a pending run (including a first run that never happened),
    /// revokes every subscription and runs the last cleanup.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Get the number of times the getter has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub fn id(&self) -> ReactionId {
        self.inner.id
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("running", &self.is_running())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{flush_pending_reactions, Signal};

    fn counting_watch(signal: &Signal<i32>, runs: &Rc<Cell<i32>>) -> Watch {
        let (signal, runs) = (signal.clone(), runs.clone());
        Watch::new(move || {
            signal.get();
            runs.set(runs.get() + 1);
            None
        })
    }

    #[test]
    fn first_run_is_deferred() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let watch = counting_watch(&signal, &runs);

        assert_eq!(runs.get(), 0);
        assert!(watch.is_running());

        Scheduler::run_microtasks().unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(watch.dependency_count(), 1);
    }

    #[test]
    fn stopped_before_microtask_never_runs() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let watch = counting_watch(&signal, &runs);

        watch.stop();
        Scheduler::run_microtasks().unwrap();

        assert_eq!(runs.get(), 0);
        assert_eq!(watch.run_count(), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn reruns_once_per_burst() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let _watch = counting_watch(&signal, &runs);
        Scheduler::run_microtasks().unwrap();

        signal.set(1);
        signal.set(2);
        flush_pending_reactions().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_stop() {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let (s, l) = (signal.clone(), log.clone());
        let watch = Watch::new(move || {
            let value = s.get();
            l.borrow_mut().push(format!("run {value}"));
            let l = l.clone();
            Some(Box::new(move || l.borrow_mut().push(format!("cleanup {value}"))) as Cleanup)
        });
        Scheduler::run_microtasks().unwrap();

        signal.set(1);
        flush_pending_reactions().unwrap();
        watch.stop();
        watch.stop();

        assert_eq!(
            *log.borrow(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
        );
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn dropping_handle_stops_watch() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let watch = counting_watch(&signal, &runs);
        Scheduler::run_microtasks().unwrap();
        assert_eq!(signal.subscriber_count(), 1);

        drop(watch);
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(3);
        Scheduler::run_microtasks().unwrap();
        assert_eq!(runs.get(), 1);
    }
}
