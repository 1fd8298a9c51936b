//! Render Root
//!
//! A [`Root`] owns one mounted tree and drives it with a cooperative work
//! loop. Work comes in two sizes:
//!
//! - a **root pass** re-renders the whole tree. State setters and
//!   [`Root::render`] request one. A root request arriving while another pass
//!   is unfinished discards that pass.
//! - a **node pass** re-renders one committed node and its subtree. Signal
//!   writes request them for the nodes that read the signal while rendering.
//!
//! # Algorithm
//!
//! Each call to [`Root::work_loop`] performs units of work until the
//! [`Deadline`] runs low:
//!
//! 1. If a root pass was requested, start it, discarding any unfinished pass
//!    and pending node passes (the root pass covers them).
//! 2. Otherwise, with no pass in progress, start a node pass for the next
//!    pending node that is still mounted.
//! 3. Perform the next unit, or commit when the pass has no more units.
//! 4. When the deadline is low, commit if the pass is complete, then yield.
//!
//! The host document is only mutated by commits. A pass interrupted by a yield
//! leaves it untouched and resumes on the next call.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use tracing::{debug, debug_span, trace};

use crate::config::{EffectOrder, RendererConfig};
use crate::error::RenderError;
use crate::host::{HostDocument, HostTarget, NativeHandle};
use crate::reactive::{Scheduler, Source, UpdateTarget};

use super::arena::FiberArena;
use super::commit;
use super::element::{Element, NodeType, Props, RenderResult};
use super::hooks::{HookDispatcher, Scope};
use super::node::{EffectTag, Fiber, FiberId};
use super::reconcile::{self, Discarded, WorkInProgress};

/// Time left in the current slice.
pub trait Deadline {
    fn time_remaining(&self) -> Duration;
}

/// A wall-clock slice.
#[derive(Debug, Clone, Copy)]
pub struct TimeSlice {
    end: Instant,
}

impl TimeSlice {
    pub fn new(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
        }
    }
}

impl Deadline for TimeSlice {
    fn time_remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }
}

/// A deadline that runs out after a fixed number of units.
///
/// Deterministic, which makes it the deadline of choice in tests.
#[derive(Debug)]
pub struct UnitBudget {
    remaining: Cell<usize>,
}

impl UnitBudget {
    pub fn new(units: usize) -> Self {
        Self {
            remaining: Cell::new(units),
        }
    }
}

impl Deadline for UnitBudget {
    fn time_remaining(&self) -> Duration {
        let left = self.remaining.get().saturating_sub(1);
        self.remaining.set(left);
        if left == 0 {
            Duration::ZERO
        } else {
            Duration::MAX
        }
    }
}

struct Unbounded;

impl Deadline for Unbounded {
    fn time_remaining(&self) -> Duration {
        Duration::MAX
    }
}

/// Outcome of one [`Root::work_loop`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Nothing left to do.
    Idle,
    /// The deadline ran low with work remaining.
    Yielded,
}

pub(crate) struct RootState {
    pub(crate) arena: FiberArena,
    pub(crate) wip: Option<WorkInProgress>,
    root_children: Vec<Element>,
}

pub(crate) struct RootInner {
    config: RendererConfig,
    document: Rc<dyn HostDocument>,
    container: NativeHandle,
    root_fiber: FiberId,
    pub(crate) state: RefCell<RootState>,
    pub(crate) dispatcher: HookDispatcher,
    root_dirty: Cell<bool>,
    unmounted: Cell<bool>,
    pending_nodes: RefCell<IndexSet<FiberId>>,
    entangled: RefCell<Vec<(FiberId, Rc<dyn Source>)>>,
}

impl RootInner {
    /// Ask for a full re-render.
    pub(crate) fn request_root_update(&self) {
        if self.unmounted.get() {
            return;
        }
        trace!("root update requested");
        self.root_dirty.set(true);
    }

    /// Move signal entanglements recorded during a render onto their fibers.
    pub(crate) fn absorb_entanglements(&self, arena: &mut FiberArena) {
        let entangled = std::mem::take(&mut *self.entangled.borrow_mut());
        for (id, source) in entangled {
            match arena.get_mut(id) {
                Some(fiber) => fiber.entangle(source),
                None => source.detach_node(id),
            }
        }
    }

    fn has_pass(&self) -> bool {
        self.state.borrow().wip.is_some()
    }

    fn next_unit(&self) -> Option<FiberId> {
        self.state.borrow().wip.as_ref().and_then(|wip| wip.next)
    }

    fn has_work(&self) -> bool {
        self.has_pass() || self.root_dirty.get() || !self.pending_nodes.borrow().is_empty()
    }

    fn start_root_pass(&self) {
        self.discard_pass("root update requested");
        self.pending_nodes.borrow_mut().clear();

        let mut state = self.state.borrow_mut();
        let props = Props::new().with_children(state.root_children.iter().cloned());
        if let Some(root) = state.arena.get_mut(self.root_fiber) {
            root.props = Rc::new(props);
            root.effect = Some(EffectTag::Update);
        }
        state.wip = Some(WorkInProgress::new(self.root_fiber));
        debug!(fibers = state.arena.len(), "root pass started");
    }

    /// Start a pass for the next pending node. Returns false if none is left.
    fn start_node_pass(&self) -> bool {
        let mut state = self.state.borrow_mut();
        loop {
            let next = self.pending_nodes.borrow_mut().shift_remove_index(0);
            let Some(id) = next else {
                return false;
            };
            let Some(fiber) = state.arena.get_mut(id) else {
                continue;
            };
            if fiber.prev.is_none() {
                continue;
            }
            fiber.effect = Some(EffectTag::Update);
            state.wip = Some(WorkInProgress::new(id));
            debug!(fiber = ?id, "node pass started");
            return true;
        }
    }

    /// Drop the unfinished pass, if any, restoring the committed tree.
    fn discard_pass(&self, reason: &str) {
        let discarded = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let Some(wip) = state.wip.take() else {
                return;
            };
            debug!(root = ?wip.root, units = wip.units, reason, "pass discarded");
            reconcile::rollback(&mut state.arena, wip)
        };
        self.absorb_entanglements(&mut self.state.borrow_mut().arena);

        let Discarded {
            cleanups,
            fibers,
            deferred,
        } = discarded;
        for cleanup in cleanups {
            cleanup();
        }
        drop(fibers);
        drop(deferred);
    }

    fn commit_pass(&self) {
        let Some(wip) = self.state.borrow_mut().wip.take() else {
            return;
        };
        let _span = debug_span!("commit", root = ?wip.root, units = wip.units).entered();

        let teardown = commit::collect_teardown(&self.state.borrow().arena, &wip.deletions);
        for cleanup in teardown {
            cleanup();
        }

        let WorkInProgress {
            root,
            deletions,
            effects,
            commits,
            ..
        } = wip;
        for staged in commits {
            staged();
        }

        let (removed, lifecycle) = {
            let mut state = self.state.borrow_mut();
            let removed = commit::remove_deleted(&mut state.arena, &*self.document, &deletions);
            let lifecycle = commit::apply(&mut state.arena, &*self.document, root);
            (removed, lifecycle)
        };
        {
            let mut pending = self.pending_nodes.borrow_mut();
            for fiber in &removed {
                pending.shift_remove(&fiber.id);
            }
        }
        debug!(
            deleted = removed.len(),
            effects = effects.len(),
            "pass committed"
        );
        drop(removed);

        for callback in lifecycle {
            callback();
        }
        match self.config.effect_order {
            EffectOrder::Lifo => effects.into_iter().rev().for_each(|effect| effect()),
            EffectOrder::Fifo => effects.into_iter().for_each(|effect| effect()),
        }
    }
}

impl UpdateTarget for RootInner {
    fn request_update(&self, fiber: FiberId) {
        if self.unmounted.get() {
            return;
        }
        trace!(?fiber, "node update requested");
        self.pending_nodes.borrow_mut().insert(fiber);
    }

    fn entangle(&self, fiber: FiberId, source: Rc<dyn Source>) {
        self.entangled.borrow_mut().push((fiber, source));
    }
}

/// A mounted tree.
pub struct Root {
    inner: Rc<RootInner>,
}

impl Root {
    /// Mount `app` into `target`. Nothing is rendered until the root is
    /// driven.
    pub fn new(app: Element, target: HostTarget, config: RendererConfig) -> Self {
        let HostTarget {
            document,
            container,
        } = target;
        let mut root = Fiber::new(
            NodeType::Intrinsic(Rc::from("#root")),
            Rc::new(Props::new()),
            None,
        );
        root.dom = Some(container);
        let root_fiber = root.id;

        let mut arena = FiberArena::new();
        arena.insert(root);
        let inner = Rc::new(RootInner {
            config,
            document,
            container,
            root_fiber,
            state: RefCell::new(RootState {
                arena,
                wip: None,
                root_children: vec![app],
            }),
            dispatcher: HookDispatcher::new(),
            root_dirty: Cell::new(true),
            unmounted: Cell::new(false),
            pending_nodes: RefCell::new(IndexSet::new()),
            entangled: RefCell::new(Vec::new()),
        });
        debug!(?container, "root created");
        Self { inner }
    }

    /// Replace the top-level element. The tree is re-rendered by the next
    /// root pass.
    pub fn render(&self, app: Element) {
        self.inner.state.borrow_mut().root_children = vec![app];
        self.inner.request_root_update();
    }

    pub fn request_root_update(&self) {
        self.inner.request_root_update();
    }

    /// Perform units of work until `deadline` runs low or the root is idle.
    ///
    /// A render error discards the pass in progress before it is returned.
    pub fn work_loop(&self, deadline: &dyn Deadline) -> Result<WorkStatus, RenderError> {
        let inner = &self.inner;
        let threshold = inner.config.yield_threshold();
        let _span = debug_span!("work_loop", container = ?inner.container).entered();

        loop {
            if inner.unmounted.get() {
                return Ok(WorkStatus::Idle);
            }
            if inner.root_dirty.replace(false) {
                inner.start_root_pass();
            } else if !inner.has_pass() && !inner.start_node_pass() {
                return Ok(WorkStatus::Idle);
            }

            match inner.next_unit() {
                Some(id) => {
                    if let Err(err) = reconcile::perform_unit_of_work(inner, id) {
                        debug!(error = %err, "render failed");
                        inner.discard_pass("render failed");
                        return Err(err);
                    }
                }
                None => inner.commit_pass(),
            }

            let remaining = deadline.time_remaining();
            if remaining.is_zero() || remaining < threshold {
                if inner.has_pass() && inner.next_unit().is_none() && !inner.root_dirty.get() {
                    inner.commit_pass();
                }
                let status = if inner.has_work() {
                    WorkStatus::Yielded
                } else {
                    WorkStatus::Idle
                };
                trace!(?status, "slice ended");
                return Ok(status);
            }
        }
    }

    /// Run slices and microtasks until nothing is left to do.
    pub fn run_until_idle(&self) -> Result<(), RenderError> {
        loop {
            let slice = TimeSlice::new(self.inner.config.slice_budget());
            let status = self.work_loop(&slice)?;
            let ran = Scheduler::run_microtasks()?;
            if status == WorkStatus::Idle && ran == 0 && !self.inner.has_work() {
                return Ok(());
            }
        }
    }

    /// Like [`run_until_idle`](Self::run_until_idle), yielding to the async
    /// runtime between slices.
    pub async fn drive(&self) -> Result<(), RenderError> {
        loop {
            let slice = TimeSlice::new(self.inner.config.slice_budget());
            let status = self.work_loop(&slice)?;
            let ran = Scheduler::run_microtasks()?;
            if status == WorkStatus::Idle && ran == 0 && !self.inner.has_work() {
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
    }

    /// Remove the whole tree from the container, running every cleanup.
    /// Later update requests are ignored.
    pub fn unmount(&self) -> Result<(), RenderError> {
        if self.inner.unmounted.get() {
            return Ok(());
        }
        self.inner.state.borrow_mut().root_children.clear();
        self.inner.root_dirty.set(true);
        self.work_loop(&Unbounded)?;
        self.inner.unmounted.set(true);
        self.inner.pending_nodes.borrow_mut().clear();
        debug!(container = ?self.inner.container, "root unmounted");
        Ok(())
    }

    pub fn is_idle(&self) -> bool {
        !self.inner.has_work()
    }

    pub fn is_unmounted(&self) -> bool {
        self.inner.unmounted.get()
    }

    /// Number of live fibers, the root fiber included.
    pub fn fiber_count(&self) -> usize {
        self.inner.state.borrow().arena.len()
    }

    pub fn container(&self) -> NativeHandle {
        self.inner.container
    }

    pub fn document(&self) -> Rc<dyn HostDocument> {
        Rc::clone(&self.inner.document)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("container", &self.inner.container)
            .field("fibers", &self.fiber_count())
            .field("idle", &self.is_idle())
            .finish()
    }
}

/// Mount a function component with the default configuration.
pub fn mount<F>(component: F, target: HostTarget, props: Props) -> Root
where
    F: Fn(&Scope, &Props) -> RenderResult + 'static,
{
    Root::new(
        Element::component(component, props),
        target,
        RendererConfig::default(),
    )
}
