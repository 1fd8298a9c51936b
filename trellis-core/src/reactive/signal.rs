//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! a set of subscribers.
//!
//! # How Signals Work
//!
//! 1. [`get`](Signal::get) during a tracking pass records the signal in the
//!    pass's scratch list. Outside tracking, if a component is rendering, the
//!    read entangles that node with the signal. Otherwise the read is plain.
//!
//! 2. [`set`](Signal::set) stores the value and notifies every subscriber:
//!    callbacks receive the new value, nodes get a targeted re-render.
//!
//! 3. [`peek`](Signal::peek) reads without entangling anyone.
//!
//! # Threading
//!
//! The runtime is single-threaded and cooperative, so signals are `Rc`-shared
//! and use `RefCell` interior mutability. Cloning a signal clones the handle.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::fiber::FiberId;

use super::context::{Observer, ReactiveContext};
use super::subscriber::{NodeObserver, Subscriber, SubscriberId, SubscriberKey};

/// Stable identity of a signal, used to key dependency sets and for
/// hot-replacement bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased view of a signal, used wherever dependency sets mix value types.
pub(crate) trait Source {
    fn id(&self) -> SignalId;

    /// Subscribe a reaction that ignores the value.
    fn subscribe_reaction(&self, reaction: Rc<dyn Fn()>) -> SubscriberId;

    fn unsubscribe(&self, id: SubscriberId);

    /// Revoke a node's entanglement.
    fn detach_node(&self, fiber: FiberId);
}

pub(crate) struct SignalInner<T> {
    id: SignalId,
    value: RefCell<T>,
    subscribers: RefCell<IndexMap<SubscriberKey, Subscriber<T>>>,
    display_name: Option<String>,
}

impl<T: 'static> SignalInner<T> {
    fn add_callback(&self, callback: Rc<dyn Fn(&T)>) -> SubscriberId {
        let id = SubscriberId::new();
        self.subscribers
            .borrow_mut()
            .insert(SubscriberKey::Callback(id), Subscriber::Callback(callback));
        id
    }
}

impl<T: 'static> Source for SignalInner<T> {
    fn id(&self) -> SignalId {
        self.id
    }

    fn subscribe_reaction(&self, reaction: Rc<dyn Fn()>) -> SubscriberId {
        self.add_callback(Rc::new(move |_: &T| reaction()))
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .borrow_mut()
            .shift_remove(&SubscriberKey::Callback(id));
    }

    fn detach_node(&self, fiber: FiberId) {
        self.subscribers
            .borrow_mut()
            .shift_remove(&SubscriberKey::Node(fiber));
    }
}

/// A reactive signal holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.peek(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::build(value, None)
    }

    /// Create a signal with a display name, shown in `Debug` output and kept
    /// across hot replacement.
    pub fn named(value: T, name: impl Into<String>) -> Self {
        Self::build(value, Some(name.into()))
    }

    fn build(value: T, display_name: Option<String>) -> Self {
        Self::with_id(SignalId::next(), value, display_name)
    }

    /// Create a signal under an identity allocated earlier.
    pub(crate) fn with_id(id: SignalId, value: T, display_name: Option<String>) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(value),
                subscribers: RefCell::new(IndexMap::new()),
                display_name,
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.inner.display_name.as_deref()
    }

    /// Borrow the value, registering the read with the current observer.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.observe();
        f(&self.inner.value.borrow())
    }

    /// Replace the value without notifying anyone.
    pub(crate) fn sneak(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
    }

    /// Register a callback invoked with the new value on every write.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription<T> {
        let id = self.inner.add_callback(Rc::new(callback));
        Subscription {
            signal: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Get the number of subscribers (nodes and callbacks).
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Drop every subscriber.
    pub fn clear_subscribers(&self) {
        self.inner.subscribers.borrow_mut().clear();
    }

    pub(crate) fn source(&self) -> Rc<dyn Source> {
        Rc::clone(&self.inner) as Rc<dyn Source>
    }

    fn observe(&self) {
        match ReactiveContext::current_observer() {
            Some(Observer::Tracking) => ReactiveContext::track_dependency(self.source()),
            Some(Observer::Node(observer)) => self.entangle(observer),
            None => {}
        }
    }

    fn entangle(&self, observer: NodeObserver) {
        let key = SubscriberKey::Node(observer.fiber);
        let inserted = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            if subscribers.contains_key(&key) {
                false
            } else {
                subscribers.insert(key, Subscriber::Node(observer.clone()));
                true
            }
        };
        if inserted {
            observer.entangle(self.source());
        }
    }

    #[cfg(feature = "hmr")]
    pub(crate) fn node_subscribers(&self) -> Vec<NodeObserver> {
        self.inner
            .subscribers
            .borrow()
            .values()
            .filter_map(|subscriber| match subscriber {
                Subscriber::Node(observer) => Some(observer.clone()),
                Subscriber::Callback(_) => None,
            })
            .collect()
    }

    #[cfg(feature = "hmr")]
    pub(crate) fn adopt_node(&self, observer: NodeObserver) {
        self.inner
            .subscribers
            .borrow_mut()
            .insert(SubscriberKey::Node(observer.fiber), Subscriber::Node(observer));
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value, registering the read with the current observer.
    pub fn get(&self) -> T {
        self.observe();
        self.peek()
    }

    /// Get the current value without entangling or tracking.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        self.sneak(value);
        self.notify();
    }

    /// Update the value in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Notify all subscribers with the current value.
    ///
    /// Subscribers removed by an earlier subscriber during the same
    /// notification are skipped.
    pub fn notify(&self) {
        let subscribers: Vec<(SubscriberKey, Subscriber<T>)> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(key, subscriber)| (*key, subscriber.clone()))
            .collect();
        if subscribers.is_empty() {
            return;
        }

        let value = self.peek();
        for (key, subscriber) in subscribers {
            if !self.inner.subscribers.borrow().contains_key(&key) {
                continue;
            }
            match subscriber {
                Subscriber::Callback(callback) => callback(&value),
                Subscriber::Node(observer) => observer.request_update(),
            }
        }
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("name", &self.inner.display_name)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`Signal::subscribe`].
pub struct Subscription<T: 'static> {
    signal: Weak<SignalInner<T>>,
    id: SubscriberId,
}

impl<T: 'static> Subscription<T> {
    /// Remove the callback from the signal.
    pub fn unsubscribe(self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.unsubscribe(self.id);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| *v += 5);
        assert_eq!(signal.peek(), 15);
    }

    #[test]
    fn signal_notifies_subscribers_with_new_value() {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        signal.subscribe(move |value| seen_clone.borrow_mut().push(*value));

        signal.set(1);
        signal.set(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let subscription = signal.subscribe(move |_| {
            call_count_clone.set(call_count_clone.get() + 1);
        });

        signal.set(1);
        assert_eq!(call_count.get(), 1);

        subscription.unsubscribe();
        signal.set(2);
        // Should not have been called again
        assert_eq!(call_count.get(), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_write_back() {
        let signal = Signal::new(0);
        let mirror = Signal::new(0);
        let mirror_clone = mirror.clone();
        let signal_clone = signal.clone();

        signal.subscribe(move |value| {
            mirror_clone.set(*value * 10);
            // Reading the source during notification is allowed.
            assert_eq!(signal_clone.peek(), *value);
        });

        signal.set(3);
        assert_eq!(mirror.peek(), 30);
    }

    #[test]
    fn removed_subscriber_is_skipped_mid_notify() {
        let signal = Signal::new(0);
        let later_calls = Rc::new(Cell::new(0));

        let later_slot: Rc<RefCell<Option<Subscription<i32>>>> = Rc::new(RefCell::new(None));
        let later_slot_clone = later_slot.clone();
        signal.subscribe(move |_| {
            if let Some(subscription) = later_slot_clone.borrow_mut().take() {
                subscription.unsubscribe();
            }
        });
        let later_calls_clone = later_calls.clone();
        *later_slot.borrow_mut() = Some(signal.subscribe(move |_| {
            later_calls_clone.set(later_calls_clone.get() + 1);
        }));

        signal.set(1);
        assert_eq!(later_calls.get(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
    }

    #[test]
    fn named_signal_debug_output() {
        let signal = Signal::named(7, "count");
        assert_eq!(signal.display_name(), Some("count"));
        let debug = format!("{signal:?}");
        assert!(debug.contains("count"));
        assert!(debug.contains('7'));
    }
}
