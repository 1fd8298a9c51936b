//! Render phase.
//!
//! A pass walks the subtree of its root fiber one unit at a time. A unit
//! renders one fiber (components call their render function, intrinsic and
//! text fibers take their children from props) and reconciles the result
//! against the fiber's committed children:
//!
//! - same type at the same position: the old fiber is reused and tagged
//!   [`EffectTag::Update`] with the new props;
//! - different type: a fresh fiber is tagged [`EffectTag::Placement`] and the
//!   old one [`EffectTag::Deletion`];
//! - old children past the end of the new list are deleted.
//!
//! Nothing here touches the host document. Every change is either recorded
//! in the [`WorkInProgress`] or undoable from the fibers' snapshots, so a pass
//! can be dropped at any unit boundary with [`rollback`].

use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use tracing::trace;

use crate::error::RenderError;
use crate::reactive::{NodeObserver, ReactiveContext, UpdateTarget};

use super::arena::FiberArena;
use super::element::{Element, Instance, NodeType, Props};
use super::hooks::{take_cleanups, Deferred, HookSlot, RenderOutput, Scope};
use super::node::{EffectTag, Fiber, FiberId};
use super::root::RootInner;

/// State of an unfinished render pass.
pub(crate) struct WorkInProgress {
    /// Where the pass started. Commit walks this subtree.
    pub(crate) root: FiberId,
    /// Next unit, `None` once the whole subtree is rendered.
    pub(crate) next: Option<FiberId>,
    pub(crate) deletions: Vec<FiberId>,
    /// Committed fibers changed by this pass.
    pub(crate) touched: IndexSet<FiberId>,
    /// Fibers created by this pass.
    pub(crate) created: IndexSet<FiberId>,
    pub(crate) effects: Vec<Deferred>,
    pub(crate) commits: Vec<Deferred>,
    pub(crate) units: usize,
}

impl WorkInProgress {
    pub(crate) fn new(root: FiberId) -> Self {
        let mut touched = IndexSet::new();
        touched.insert(root);
        Self {
            root,
            next: Some(root),
            deletions: Vec::new(),
            touched,
            created: IndexSet::new(),
            effects: Vec::new(),
            commits: Vec::new(),
            units: 0,
        }
    }
}

/// Everything a discarded pass leaves behind. Dropped by the caller once no
/// borrow of the root is held, since hook state may run user code on drop.
pub(crate) struct Discarded {
    pub(crate) cleanups: Vec<Deferred>,
    pub(crate) fibers: Vec<Fiber>,
    pub(crate) deferred: Vec<Deferred>,
}

/// Undo a pass: drop the fibers it created and put the ones it touched back
/// in their committed state.
pub(crate) fn rollback(arena: &mut FiberArena, wip: WorkInProgress) -> Discarded {
    let mut cleanups = Vec::new();
    let mut fibers = Vec::new();
    for id in &wip.created {
        if let Some(mut fiber) = arena.remove(*id) {
            fiber.detach_signals();
            cleanups.extend(take_cleanups(&fiber.hooks));
            fibers.push(fiber);
        }
    }
    for id in wip.touched.iter().chain(&wip.deletions) {
        if let Some(fiber) = arena.get_mut(*id) {
            fiber.restore();
        }
    }

    let mut deferred = wip.effects;
    deferred.extend(wip.commits);
    Discarded {
        cleanups,
        fibers,
        deferred,
    }
}

/// Reconcile `parent`'s committed children against `elements`.
pub(crate) fn reconcile_children(
    arena: &mut FiberArena,
    wip: &mut WorkInProgress,
    parent: FiberId,
    elements: &[Element],
) {
    let old = arena.children(parent);
    let mut new = Vec::with_capacity(elements.len());

    for (index, element) in elements.iter().enumerate() {
        let reused = old.get(index).copied().filter(|id| {
            arena
                .get(*id)
                .map_or(false, |fiber| fiber.ty.same_type(&element.ty))
        });

        match reused {
            Some(id) => {
                if let Some(fiber) = arena.get_mut(id) {
                    fiber.props = Rc::clone(&element.props);
                    fiber.effect = Some(EffectTag::Update);
                }
                wip.touched.insert(id);
                new.push(id);
            }
            None => {
                if let Some(stale) = old.get(index).copied() {
                    delete(arena, wip, stale);
                }
                let mut fiber = Fiber::new(
                    element.ty.clone(),
                    Rc::clone(&element.props),
                    Some(parent),
                );
                fiber.effect = Some(EffectTag::Placement);
                let id = arena.insert(fiber);
                wip.created.insert(id);
                new.push(id);
            }
        }
    }

    for stale in old.iter().skip(elements.len()) {
        delete(arena, wip, *stale);
    }

    for pair in new.windows(2) {
        if let Some(fiber) = arena.get_mut(pair[0]) {
            fiber.sibling = Some(pair[1]);
        }
    }
    if let Some(last) = new.last().copied() {
        if let Some(fiber) = arena.get_mut(last) {
            fiber.sibling = None;
        }
    }
    if let Some(fiber) = arena.get_mut(parent) {
        fiber.child = new.first().copied();
    }
}

fn delete(arena: &mut FiberArena, wip: &mut WorkInProgress, id: FiberId) {
    if let Some(fiber) = arena.get_mut(id) {
        fiber.effect = Some(EffectTag::Deletion);
        wip.deletions.push(id);
    }
}

struct UnitInput {
    ty: NodeType,
    props: Rc<Props>,
    instance: Option<Instance>,
    hooks: Vec<HookSlot>,
    rendered_before: bool,
}

/// Render `id` and reconcile its children, then advance the pass.
pub(crate) fn perform_unit_of_work(root: &Rc<RootInner>, id: FiberId) -> Result<(), RenderError> {
    let input = {
        let state = root.state.borrow();
        state.arena.get(id).map(|fiber| UnitInput {
            ty: fiber.ty.clone(),
            props: Rc::clone(&fiber.props),
            instance: fiber.instance.clone(),
            hooks: fiber.hooks.clone(),
            rendered_before: fiber.prev.is_some(),
        })
    };
    let Some(input) = input else {
        advance(root, id);
        return Ok(());
    };
    trace!(fiber = ?id, node = input.ty.name(), "unit of work");

    let (children, rendered) = match &input.ty {
        NodeType::Intrinsic(_) | NodeType::Text => (input.props.children().to_vec(), None),
        NodeType::Function(component) => {
            let (element, output) = render_component(root, id, component.name(), &input, |scope| {
                component.render(scope, &input.props)
            })?;
            (vec![element], Some((output, None)))
        }
        NodeType::ClassLike(class) => {
            let created = input.instance.is_none();
            let instance = match &input.instance {
                Some(instance) => Rc::clone(instance),
                None => class.create(&input.props),
            };
            let (element, output) = render_component(root, id, class.name(), &input, |scope| {
                instance.borrow_mut().render(scope, &input.props)
            })?;
            (vec![element], Some((output, created.then_some(instance))))
        }
    };

    let mut state = root.state.borrow_mut();
    let state = &mut *state;
    let Some(wip) = state.wip.as_mut() else {
        return Ok(());
    };
    if let Some((output, instance)) = rendered {
        if let Some(fiber) = state.arena.get_mut(id) {
            fiber.hooks = output.hooks;
            if instance.is_some() {
                fiber.instance = instance;
            }
        }
        wip.touched.insert(id);
        wip.effects.extend(output.effects);
        wip.commits.extend(output.commits);
    }
    root.absorb_entanglements(&mut state.arena);

    reconcile_children(&mut state.arena, wip, id, &children);
    wip.units += 1;
    wip.next = state.arena.next_in_subtree(id, wip.root);
    Ok(())
}

fn render_component(
    root: &Rc<RootInner>,
    id: FiberId,
    component: &str,
    input: &UnitInput,
    render: impl FnOnce(&Scope) -> Result<Element, RenderError>,
) -> Result<(Element, RenderOutput), RenderError> {
    let scope = Scope::new(Rc::downgrade(root), id);
    let weak: Weak<RootInner> = Rc::downgrade(root);
    let target: Weak<dyn UpdateTarget> = weak;
    let frame = root
        .dispatcher
        .begin(id, component, input.hooks.clone(), input.rendered_before);

    let element = {
        let _context = ReactiveContext::render(NodeObserver { target, fiber: id });
        render(&scope)
    }?;
    let output = frame.finish()?;
    Ok((element, output))
}

fn advance(root: &RootInner, id: FiberId) {
    let mut state = root.state.borrow_mut();
    let state = &mut *state;
    if let Some(wip) = state.wip.as_mut() {
        wip.next = state.arena.next_in_subtree(id, wip.root);
    }
}
