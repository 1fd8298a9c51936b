//! Computed Implementation
//!
//! A Computed is a read-only signal whose value is derived from other signals.
//!
//! # How Computeds Work
//!
//! 1. On creation the getter runs inside a tracking pass. Every signal it
//!    reads is collected instead of subscribed.
//!
//! 2. The computed then subscribes to exactly the collected signals. Each
//!    subscription schedules a recomputation through the effect queue, so a
//!    burst of writes in one turn re-derives once.
//!
//! 3. Re-derivation repeats the tracking pass, stores the value silently,
//!    reconciles subscriptions against the new reads and only then notifies
//!    its own subscribers. Subscribers never see a value whose dependency set
//!    is still being rewired.
//!
//! # Failure
//!
//! A getter built with [`Computed::try_new`] may fail. A failed derivation is
//! all-or-nothing: the previous value and subscriptions stay as they were and
//! the error is returned to whoever triggered the derivation.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::{BoxError, ReactiveError};

use super::context::ReactiveContext;
use super::queue::{ReactionId, Scheduler};
use super::reaction::Dependencies;
use super::signal::{Signal, SignalId, Source, Subscription};

type Getter<T> = Box<dyn Fn() -> Result<T, BoxError>>;

struct ComputedInner<T: 'static> {
    id: ReactionId,
    signal: Signal<T>,
    getter: Getter<T>,
    deps: RefCell<Dependencies>,
    stopped: Cell<bool>,
    this: Weak<ComputedInner<T>>,
}

impl<T: Clone + 'static> ComputedInner<T> {
    /// Callback handed to each dependency.
    fn reaction(&self) -> Rc<dyn Fn()> {
        let id = self.id;
        let this = self.this.clone();
        Rc::new(move || {
            let this = this.clone();
            Scheduler::schedule_reaction(
                id,
                Rc::new(move || match this.upgrade() {
                    Some(inner) => inner.rederive(),
                    None => Ok(()),
                }),
            );
        })
    }

    fn rederive(&self) -> Result<(), ReactiveError> {
        if self.stopped.get() {
            return Ok(());
        }
        Scheduler::cancel_reaction(self.id);
        trace!(signal = %self.signal.id(), "re-deriving computed");

        let ctx = ReactiveContext::track();
        let result = (self.getter)();
        let tracked = ctx.finish();

        let value = result.map_err(|source| ReactiveError::Derivation {
            signal: self.signal.id(),
            source,
        })?;
        self.signal.sneak(value);
        self.deps.borrow_mut().reconcile(tracked, self.reaction());
        self.signal.notify();
        Ok(())
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Scheduler::cancel_reaction(self.id);
    }
}

/// A read-only signal derived from other signals.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{flush_pending_reactions, Computed, Signal};
///
/// let count = Signal::new(0);
/// let double = {
///     let count = count.clone();
///     Computed::new(move || count.get() * 2)
/// };
///
/// count.set(5);
/// flush_pending_reactions().unwrap();
/// assert_eq!(double.peek(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed and run its first derivation.
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        Self::infallible(getter, None)
    }

    /// Create a computed with a display name.
    pub fn named(getter: impl Fn() -> T + 'static, name: impl Into<String>) -> Self {
        Self::infallible(getter, Some(name.into()))
    }

    fn infallible(getter: impl Fn() -> T + 'static, name: Option<String>) -> Self {
        let ctx = ReactiveContext::track();
        let value = getter();
        let tracked = ctx.finish();
        Self::from_parts(
            SignalId::next(),
            value,
            tracked,
            Box::new(move || Ok(getter())),
            name,
        )
    }

    /// Create a computed from a fallible getter.
    ///
    /// Fails if the first derivation fails.
    pub fn try_new<E>(getter: impl Fn() -> Result<T, E> + 'static) -> Result<Self, ReactiveError>
    where
        E: Into<BoxError>,
    {
        let id = SignalId::next();
        let ctx = ReactiveContext::track();
        let result = getter();
        let tracked = ctx.finish();

        let value = result.map_err(|err| ReactiveError::Derivation {
            signal: id,
            source: err.into(),
        })?;
        Ok(Self::from_parts(
            id,
            value,
            tracked,
            Box::new(move || getter().map_err(Into::into)),
            None,
        ))
    }

    fn from_parts(
        id: SignalId,
        value: T,
        tracked: Vec<Rc<dyn Source>>,
        getter: Getter<T>,
        name: Option<String>,
    ) -> Self {
        let inner = Rc::new_cyclic(|this| ComputedInner {
            id: ReactionId::new(),
            signal: Signal::with_id(id, value, name),
            getter,
            deps: RefCell::new(Dependencies::new()),
            stopped: Cell::new(false),
            this: this.clone(),
        });
        let reaction = inner.reaction();
        inner.deps.borrow_mut().reconcile(tracked, reaction);
        Self { inner }
    }

    /// Get the current value, registering the read with the current observer.
    pub fn get(&self) -> T {
        self.inner.signal.get()
    }

    /// Get the current value without tracking.
    pub fn peek(&self) -> T {
        self.inner.signal.peek()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.signal.with(f)
    }

    /// Register a callback invoked after each re-derivation.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription<T> {
        self.inner.signal.subscribe(callback)
    }

    /// Re-derive now if a recomputation is pending.
    pub fn refresh(&self) -> Result<(), ReactiveError> {
        if Scheduler::is_reaction_pending(self.inner.id) {
            self.inner.rederive()?;
        }
        Ok(())
    }

    /// Stop reacting: drop any pending recomputation and every subscription.
    /// The last value stays readable.
    pub fn stop(&self) {
        self.inner.stopped.set(true);
        Scheduler::cancel_reaction(self.inner.id);
        self.inner.deps.borrow_mut().clear();
    }

    /// Resume after [`stop`](Self::stop), re-deriving immediately.
    #[cfg(feature = "hmr")]
    pub(crate) fn start(&self) -> Result<(), ReactiveError> {
        self.inner.stopped.set(false);
        self.inner.rederive()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    pub(crate) fn signal(&self) -> &Signal<T> {
        &self.inner.signal
    }
}

impl<T: 'static> Computed<T> {
    /// Identity of the underlying signal.
    pub fn id(&self) -> SignalId {
        self.inner.signal.id()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.inner.signal.display_name()
    }

    /// Get the number of signals this computed currently depends on.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.signal.subscriber_count()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("signal", &self.inner.signal)
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.inner.stopped.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
