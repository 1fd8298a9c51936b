//! Hook Dispatcher
//!
//! Hooks bind per-node state to call order. While a component renders, its
//! root's [`HookDispatcher`] holds a frame with the node's previous hook
//! sequence and a running index. Each [`Scope::use_hook`] call:
//!
//! 1. checks that the node is the one currently rendering,
//! 2. checks that it is not running inside another hook's callback,
//! 3. reuses the previous record at the running index, after verifying its
//!    name and state type, or creates a fresh record,
//! 4. appends the record to the new sequence and advances the index.
//!
//! A render that ends with a different number of hooks than the previous one
//! is also a [`RenderError::HookOrderViolation`].
//!
//! # Staging
//!
//! Hooks never mutate committed state while rendering. State folds and memo
//! values are staged with [`HookContext::on_commit`] and effect callbacks with
//! [`HookContext::queue_effect`]. A pass that is discarded or fails drops
//! both, so no partial hook state survives it.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::warn;

use crate::error::RenderError;
use crate::reactive::{Cleanup, Computed, Signal, UpdateTarget, Watch};

use super::node::FiberId;
use super::root::RootInner;

/// A deferred callback produced by a render.
pub(crate) type Deferred = Box<dyn FnOnce()>;

/// Per-hook state owned by a fiber.
pub(crate) struct HookRecord {
    pub(crate) name: &'static str,
    state: Box<dyn Any>,
    pub(crate) cleanup: Option<Cleanup>,
}

pub(crate) type HookSlot = Rc<RefCell<HookRecord>>;

/// Take every pending cleanup from `hooks`, last hook first.
pub(crate) fn take_cleanups(hooks: &[HookSlot]) -> Vec<Cleanup> {
    hooks
        .iter()
        .rev()
        .filter_map(|slot| slot.borrow_mut().cleanup.take())
        .collect()
}

struct HookFrame {
    fiber: FiberId,
    component: String,
    index: usize,
    previous: Vec<HookSlot>,
    rendered_before: bool,
    hooks: Vec<HookSlot>,
    effects: Vec<Deferred>,
    commits: Vec<Deferred>,
}

/// What a component render left behind for its fiber and for the commit.
pub(crate) struct RenderOutput {
    pub(crate) hooks: Vec<HookSlot>,
    pub(crate) effects: Vec<Deferred>,
    pub(crate) commits: Vec<Deferred>,
}

/// Tracks the rendering node for one root.
#[derive(Default)]
pub(crate) struct HookDispatcher {
    frame: RefCell<Option<HookFrame>>,
    in_hook: Cell<bool>,
}

impl HookDispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make `fiber` the current node until the returned frame is finished or
    /// dropped.
    pub(crate) fn begin(
        &self,
        fiber: FiberId,
        component: &str,
        previous: Vec<HookSlot>,
        rendered_before: bool,
    ) -> RenderFrame<'_> {
        *self.frame.borrow_mut() = Some(HookFrame {
            fiber,
            component: component.to_string(),
            index: 0,
            previous,
            rendered_before,
            hooks: Vec::new(),
            effects: Vec::new(),
            commits: Vec::new(),
        });
        RenderFrame {
            dispatcher: self,
            finished: false,
        }
    }

    fn push_effect(&self, effect: Deferred) {
        if let Some(frame) = self.frame.borrow_mut().as_mut() {
            frame.effects.push(effect);
        }
    }

    fn push_commit(&self, commit: Deferred) {
        if let Some(frame) = self.frame.borrow_mut().as_mut() {
            frame.commits.push(commit);
        }
    }
}

/// Guard for the render of one component.
pub(crate) struct RenderFrame<'a> {
    dispatcher: &'a HookDispatcher,
    finished: bool,
}

impl RenderFrame<'_> {
    /// End the render, checking that the hook count is unchanged.
    pub(crate) fn finish(mut self) -> Result<RenderOutput, RenderError> {
        self.finished = true;
        let frame = self.dispatcher.frame.borrow_mut().take();
        let Some(frame) = frame else {
            return Ok(RenderOutput {
                hooks: Vec::new(),
                effects: Vec::new(),
                commits: Vec::new(),
            });
        };

        if frame.rendered_before && frame.hooks.len() != frame.previous.len() {
            let index = frame.hooks.len().min(frame.previous.len());
            let name_at = |hooks: &[HookSlot]| {
                hooks
                    .get(index)
                    .map_or_else(|| "<none>".to_string(), |slot| slot.borrow().name.to_string())
            };
            return Err(RenderError::HookOrderViolation {
                component: frame.component.clone(),
                index,
                expected: name_at(&frame.previous),
                found: name_at(&frame.hooks),
            });
        }

        Ok(RenderOutput {
            hooks: frame.hooks,
            effects: frame.effects,
            commits: frame.commits,
        })
    }
}

impl Drop for RenderFrame<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let frame = self.dispatcher.frame.borrow_mut().take();
            drop(frame);
        }
    }
}

struct InHook<'a>(&'a Cell<bool>);

impl<'a> InHook<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for InHook<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Access to a hook's record from inside its callback.
pub struct HookContext<'a, S> {
    /// The hook's state, fresh from `init` on the first render.
    pub state: &'a mut S,
    /// Whether the record was created by this call.
    pub is_init: bool,
    cleanup: &'a mut Option<Cleanup>,
    slot: Weak<RefCell<HookRecord>>,
    dispatcher: &'a HookDispatcher,
    root: Weak<RootInner>,
}

impl<S> HookContext<'_, S> {
    /// Register the callback run when the node is removed.
    pub fn set_cleanup(&mut self, cleanup: impl FnOnce() + 'static) {
        *self.cleanup = Some(Box::new(cleanup));
    }

    /// Run `effect` after the pass that rendered this hook commits.
    pub fn queue_effect(&self, effect: impl FnOnce() + 'static) {
        self.dispatcher.push_effect(Box::new(effect));
    }

    /// Apply `update` when the pass that rendered this hook commits. Dropped
    /// if the pass is discarded.
    pub fn on_commit(&self, update: impl FnOnce() + 'static) {
        self.dispatcher.push_commit(Box::new(update));
    }

    pub(crate) fn slot(&self) -> Weak<RefCell<HookRecord>> {
        self.slot.clone()
    }

    pub(crate) fn root(&self) -> Weak<RootInner> {
        self.root.clone()
    }
}

/// A rendering node's handle to its root, passed to every component render.
#[derive(Clone)]
pub struct Scope {
    pub(crate) root: Weak<RootInner>,
    pub(crate) fiber: FiberId,
}

impl Scope {
    pub(crate) fn new(root: Weak<RootInner>, fiber: FiberId) -> Self {
        Self { root, fiber }
    }

    /// The node this scope belongs to.
    pub fn id(&self) -> FiberId {
        self.fiber
    }

    /// Ask for a re-render of just this node.
    pub fn request_update(&self) {
        if let Some(root) = self.root.upgrade() {
            root.request_update(self.fiber);
        }
    }

    /// Run a hook.
    ///
    /// `init` builds the state the first time this position is reached;
    /// `callback` runs on every render with access to the state.
    pub fn use_hook<S: 'static, R>(
        &self,
        name: &'static str,
        init: impl FnOnce() -> S,
        callback: impl FnOnce(HookContext<'_, S>) -> R,
    ) -> Result<R, RenderError> {
        let root = self
            .root
            .upgrade()
            .ok_or(RenderError::MissingRenderContext { hook: name })?;
        let dispatcher = &root.dispatcher;
        if dispatcher.in_hook.get() {
            return Err(RenderError::NestedHookCall { hook: name });
        }

        let (index, component, previous) = {
            let frame = dispatcher.frame.borrow();
            let frame = match frame.as_ref() {
                Some(frame) if frame.fiber == self.fiber => frame,
                _ => return Err(RenderError::MissingRenderContext { hook: name }),
            };
            (
                frame.index,
                frame.component.clone(),
                frame.previous.get(frame.index).cloned(),
            )
        };
        let violation = |expected: &str| RenderError::HookOrderViolation {
            component: component.clone(),
            index,
            expected: expected.to_string(),
            found: name.to_string(),
        };

        if let Some(slot) = &previous {
            let record = slot.borrow();
            if record.name != name || !(*record.state).is::<S>() {
                return Err(violation(record.name));
            }
        }

        let _in_hook = InHook::enter(&dispatcher.in_hook);
        let is_init = previous.is_none();
        let slot = match previous {
            Some(slot) => slot,
            None => Rc::new(RefCell::new(HookRecord {
                name,
                state: Box::new(init()),
                cleanup: None,
            })),
        };

        let output = {
            let mut record = slot.borrow_mut();
            let HookRecord { state, cleanup, .. } = &mut *record;
            let state = (**state)
                .downcast_mut::<S>()
                .ok_or_else(|| violation(name))?;
            callback(HookContext {
                state,
                is_init,
                cleanup,
                slot: Rc::downgrade(&slot),
                dispatcher,
                root: Rc::downgrade(&root),
            })
        };

        if let Some(frame) = dispatcher.frame.borrow_mut().as_mut() {
            frame.hooks.push(slot);
            frame.index += 1;
        }
        Ok(output)
    }

    /// Local state. The value is the previous state with every queued update
    /// applied in submission order.
    pub fn use_state<T: Clone + 'static>(
        &self,
        initial: T,
    ) -> Result<(T, StateSetter<T>), RenderError> {
        self.use_hook(
            "use_state",
            move || {
                Rc::new(RefCell::new(StateCell {
                    base: initial,
                    queue: Vec::new(),
                }))
            },
            |ctx| {
                let (base, updaters) = {
                    let cell = ctx.state.borrow();
                    (cell.base.clone(), cell.queue.clone())
                };
                let applied = updaters.len();
                let value = updaters.iter().fold(base, |acc, update| update(&acc));

                if applied > 0 {
                    let cell = Rc::clone(ctx.state);
                    let committed = value.clone();
                    ctx.on_commit(move || {
                        let mut cell = cell.borrow_mut();
                        cell.queue.drain(..applied);
                        cell.base = committed;
                    });
                }

                let setter = StateSetter {
                    cell: Rc::downgrade(ctx.state),
                    root: ctx.root(),
                };
                (value, setter)
            },
        )
    }

    /// Run `effect` after commit when `deps` changed since its last run, on
    /// the first render, or on every render when `deps` is empty.
    ///
    /// The cleanup returned by the previous run is called first.
    pub fn use_effect(
        &self,
        deps: Deps,
        effect: impl FnOnce() -> Option<Cleanup> + 'static,
    ) -> Result<(), RenderError> {
        self.use_hook(
            "use_effect",
            || Rc::new(RefCell::new(None::<Deps>)),
            move |ctx| {
                let due = deps.is_empty()
                    || ctx
                        .state
                        .borrow()
                        .as_ref()
                        .map_or(true, |prev| deps_changed(prev, &deps));
                if !due {
                    return;
                }

                let stored = Rc::clone(ctx.state);
                let slot = ctx.slot();
                ctx.queue_effect(move || {
                    if let Some(slot) = slot.upgrade() {
                        let previous = slot.borrow_mut().cleanup.take();
                        if let Some(cleanup) = previous {
                            cleanup();
                        }
                        let cleanup = effect();
                        slot.borrow_mut().cleanup = cleanup;
                    }
                    *stored.borrow_mut() = Some(deps);
                });
            },
        )
    }

    /// Cache `compute()` until `deps` change.
    pub fn use_memo<T: Clone + 'static>(
        &self,
        deps: Deps,
        compute: impl FnOnce() -> T,
    ) -> Result<T, RenderError> {
        self.use_hook(
            "use_memo",
            || Rc::new(RefCell::new(None::<(Deps, T)>)),
            move |ctx| {
                let cached = ctx.state.borrow().as_ref().and_then(|(prev, value)| {
                    (!deps_changed(prev, &deps)).then(|| value.clone())
                });
                if let Some(value) = cached {
                    return value;
                }

                let value = compute();
                let cell = Rc::clone(ctx.state);
                let stored = value.clone();
                ctx.on_commit(move || *cell.borrow_mut() = Some((deps, stored)));
                value
            },
        )
    }

    /// A mutable box that persists across renders and never triggers one.
    pub fn use_ref<T: 'static>(&self, init: impl FnOnce() -> T) -> Result<Rc<RefCell<T>>, RenderError> {
        self.use_hook(
            "use_ref",
            move || Rc::new(RefCell::new(init())),
            |ctx| Rc::clone(ctx.state),
        )
    }

    /// A signal owned by this node. Its subscribers are dropped when the node
    /// is removed.
    pub fn use_signal<T: 'static>(&self, init: impl FnOnce() -> T) -> Result<Signal<T>, RenderError> {
        self.use_hook(
            "use_signal",
            move || Signal::new(init()),
            |mut ctx| {
                if ctx.is_init {
                    let signal = ctx.state.clone();
                    ctx.set_cleanup(move || signal.clear_subscribers());
                }
                ctx.state.clone()
            },
        )
    }

    /// A computed owned by this node, stopped when the node is removed.
    pub fn use_computed<T: Clone + 'static>(
        &self,
        getter: impl Fn() -> T + 'static,
    ) -> Result<Computed<T>, RenderError> {
        self.use_hook(
            "use_computed",
            move || Computed::new(getter),
            |mut ctx| {
                if ctx.is_init {
                    let computed = ctx.state.clone();
                    ctx.set_cleanup(move || {
                        computed.stop();
                        computed.signal().clear_subscribers();
                    });
                }
                ctx.state.clone()
            },
        )
    }

    /// A watch owned by this node, stopped when the node is removed.
    pub fn use_watch(
        &self,
        getter: impl Fn() -> Option<Cleanup> + 'static,
    ) -> Result<Watch, RenderError> {
        self.use_hook(
            "use_watch",
            move || Watch::new(getter),
            |mut ctx| {
                if ctx.is_init {
                    let watch = ctx.state.clone();
                    ctx.set_cleanup(move || watch.stop());
                }
                ctx.state.clone()
            },
        )
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("fiber", &self.fiber).finish()
    }
}

type Updater<T> = Rc<dyn Fn(&T) -> T>;

struct StateCell<T> {
    base: T,
    queue: Vec<Updater<T>>,
}

/// Queues updates for a [`Scope::use_state`] value.
pub struct StateSetter<T: 'static> {
    cell: Weak<RefCell<StateCell<T>>>,
    root: Weak<RootInner>,
}

impl<T: Clone + 'static> StateSetter<T> {
    /// Replace the state on the next render.
    pub fn set(&self, value: T) {
        self.update(move |_| value.clone());
    }

    /// Queue an updater and schedule a root re-render. The state does not
    /// change until that render.
    pub fn update(&self, updater: impl Fn(&T) -> T + 'static) {
        let Some(cell) = self.cell.upgrade() else {
            warn!("state update ignored: component was removed");
            return;
        };
        cell.borrow_mut().queue.push(Rc::new(updater));
        match self.root.upgrade() {
            Some(root) => root.request_root_update(),
            None => warn!("state update ignored: root was dropped"),
        }
    }
}

impl<T: 'static> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            root: self.root.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("live", &(self.cell.strong_count() > 0))
            .finish()
    }
}

trait DepValue: Any {
    fn eq_dep(&self, other: &dyn Any) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: PartialEq + 'static> DepValue for T {
    fn eq_dep(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().map_or(false, |other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One entry of a dependency list, compared by value.
#[derive(Clone)]
pub struct Dep(Rc<dyn DepValue>);

impl Dep {
    pub fn new<T: PartialEq + 'static>(value: T) -> Self {
        Self(Rc::new(value))
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        (*self.0).eq_dep((*other.0).as_any())
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dep(..)")
    }
}

/// A dependency list for [`Scope::use_effect`] and [`Scope::use_memo`].
pub type Deps = SmallVec<[Dep; 4]>;

/// Build a [`Deps`] list: `deps![count, name.clone()]`.
#[macro_export]
macro_rules! deps {
    () => {
        $crate::fiber::Deps::new()
    };
    ($($dep:expr),+ $(,)?) => {
        $crate::fiber::Deps::from_vec(vec![$($crate::fiber::Dep::new($dep)),+])
    };
}

/// Positional comparison.
pub(crate) fn deps_changed(prev: &[Dep], next: &[Dep]) -> bool {
    prev.len() != next.len() || prev.iter().zip(next).any(|(a, b)| a != b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deps_compare_by_value_and_position() {
        let a = deps![1, "x"];
        let b = deps![1, "x"];
        let c = deps![1, "y"];
        let d = deps!["x", 1];

        assert!(!deps_changed(&a, &b));
        assert!(deps_changed(&a, &c));
        assert!(deps_changed(&a, &d));
        assert!(deps_changed(&a, &deps![1]));
        assert!(!deps_changed(&deps![], &deps![]));
    }

    #[test]
    fn deps_of_different_types_differ() {
        assert_ne!(Dep::new(1_i32), Dep::new(1_i64));
    }

    #[test]
    fn cleanups_are_taken_in_reverse_once() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let slots: Vec<HookSlot> = (0..3)
            .map(|i| {
                let order = order.clone();
                Rc::new(RefCell::new(HookRecord {
                    name: "use_test",
                    state: Box::new(()),
                    cleanup: Some(Box::new(move || order.borrow_mut().push(i)) as Cleanup),
                }))
            })
            .collect();

        for cleanup in take_cleanups(&slots) {
            cleanup();
        }
        assert!(take_cleanups(&slots).is_empty());
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn hooks_outside_render_are_rejected() {
        let scope = Scope::new(Weak::new(), FiberId::new());
        let err = scope.use_state(0).unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingRenderContext { hook: "use_state" }
        ));
    }
}
