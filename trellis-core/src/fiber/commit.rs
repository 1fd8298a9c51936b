//! Commit phase.
//!
//! Applies a finished pass to the host document in one synchronous step:
//!
//! 1. deletions: cleanups and `on_unmount` of every node in each deleted
//!    subtree, then removal of its topmost native nodes;
//! 2. a preorder walk of the pass subtree, placing new native nodes and
//!    patching updated ones. A new node goes after the last native node
//!    already committed under its host parent, else before the first
//!    mounted one that follows it, else at the end;
//! 3. lifecycle callbacks, returned to the root so they run with no borrow
//!    held.
//!
//! A placement with no native ancestor is logged as
//! [`RenderError::UnmountableTree`] and its subtree is skipped.

use std::collections::{HashMap, HashSet};

use tracing::{error, trace};

use crate::error::RenderError;
use crate::host::{HostDocument, NativeHandle};

use super::arena::FiberArena;
use super::element::{NodeType, PropValue, Props, REF_KEY, TEXT_VALUE};
use super::hooks::{take_cleanups, Deferred};
use super::node::{EffectTag, Fiber, FiberId};
use super::props::patch_props;

/// Cleanups and unmount callbacks for every node under `deletions`.
pub(crate) fn collect_teardown(arena: &FiberArena, deletions: &[FiberId]) -> Vec<Deferred> {
    let mut teardown: Vec<Deferred> = Vec::new();
    for &deleted in deletions {
        for id in arena.subtree(deleted) {
            let Some(fiber) = arena.get(id) else {
                continue;
            };
            teardown.extend(take_cleanups(&fiber.hooks));
            if let Some(instance) = &fiber.instance {
                let instance = instance.clone();
                teardown.push(Box::new(move || instance.borrow_mut().on_unmount()));
            }
        }
    }
    teardown
}

/// Detach deleted subtrees from the document and the arena.
///
/// The removed fibers are returned so the caller can drop them outside of
/// any borrow.
pub(crate) fn remove_deleted(
    arena: &mut FiberArena,
    document: &dyn HostDocument,
    deletions: &[FiberId],
) -> Vec<Fiber> {
    let mut removed = Vec::new();
    for &deleted in deletions {
        remove_host_nodes(arena, document, deleted);
        for id in arena.subtree(deleted) {
            let Some(mut fiber) = arena.remove(id) else {
                continue;
            };
            if let Some(PropValue::Ref(node_ref)) = fiber.props.get(REF_KEY) {
                node_ref.set(None);
            }
            fiber.detach_signals();
            removed.push(fiber);
        }
    }
    removed
}

/// Removing a native node takes its native children with it, so only the
/// topmost ones are removed.
fn remove_host_nodes(arena: &FiberArena, document: &dyn HostDocument, id: FiberId) {
    let Some(fiber) = arena.get(id) else {
        return;
    };
    match fiber.dom {
        Some(dom) => document.remove(dom),
        None => {
            for child in arena.children(id) {
                remove_host_nodes(arena, document, child);
            }
        }
    }
}

/// Place and patch the subtree of `root`, then retire every fiber in it.
///
/// Returns the lifecycle callbacks to run once the commit is complete.
pub(crate) fn apply(
    arena: &mut FiberArena,
    document: &dyn HostDocument,
    root: FiberId,
) -> Vec<Deferred> {
    let mut lifecycle: Vec<Deferred> = Vec::new();
    let mut skipped = HashSet::new();
    // Last native node committed under each host parent during this walk.
    let mut cursor: HashMap<NativeHandle, NativeHandle> = HashMap::new();
    if arena.get(root).map_or(false, |fiber| fiber.dom.is_none()) {
        if let (Some(parent), Some(previous)) =
            (host_parent(arena, root), previous_host_node(arena, root))
        {
            cursor.insert(parent, previous);
        }
    }

    for id in arena.subtree(root) {
        let Some(fiber) = arena.get(id) else {
            continue;
        };
        let parent_skipped = fiber.parent.map_or(false, |p| skipped.contains(&p));
        let effect = fiber.effect;
        let mounted = if parent_skipped {
            false
        } else {
            match effect {
                Some(EffectTag::Placement) => place(arena, document, &cursor, id),
                Some(EffectTag::Update) => {
                    update(arena, document, id);
                    true
                }
                _ => true,
            }
        };

        if mounted && id != root {
            if let Some(dom) = arena.get(id).and_then(|fiber| fiber.dom) {
                if let Some(parent) = host_parent(arena, id) {
                    cursor.insert(parent, dom);
                }
            }
        }

        let Some(fiber) = arena.get_mut(id) else {
            continue;
        };
        if mounted {
            if let Some(instance) = &fiber.instance {
                let instance = instance.clone();
                if fiber.prev.is_none() {
                    lifecycle.push(Box::new(move || instance.borrow_mut().on_mount()));
                } else if fiber.effect == Some(EffectTag::Update) {
                    lifecycle.push(Box::new(move || instance.borrow_mut().on_update()));
                }
            }
        } else {
            skipped.insert(id);
        }
        fiber.retire();
    }
    lifecycle
}

/// Returns false when the node could not be mounted.
fn place(
    arena: &mut FiberArena,
    document: &dyn HostDocument,
    cursor: &HashMap<NativeHandle, NativeHandle>,
    id: FiberId,
) -> bool {
    let Some(host_parent) = host_parent(arena, id) else {
        let node = arena
            .get(id)
            .map_or_else(String::new, |fiber| fiber.ty.name().to_string());
        let err = RenderError::UnmountableTree { node };
        error!(error = %err, "skipping subtree");
        return false;
    };

    let dom = {
        let Some(fiber) = arena.get(id) else {
            return false;
        };
        match &fiber.ty {
            NodeType::Intrinsic(tag) => {
                let dom = document.create_element(tag);
                patch_props(document, dom, &Props::new(), &fiber.props);
                Some(dom)
            }
            NodeType::Text => {
                let text = fiber.props.get_str(TEXT_VALUE).unwrap_or_default();
                Some(document.create_text(text))
            }
            NodeType::Function(_) | NodeType::ClassLike(_) => None,
        }
    };

    if let Some(dom) = dom {
        let before = match cursor.get(&host_parent) {
            Some(&previous) => document.next_sibling(previous),
            None => next_host_node(arena, id),
        };
        document.insert_before(host_parent, dom, before);
        trace!(fiber = ?id, ?dom, "placed");
        if let Some(fiber) = arena.get_mut(id) {
            fiber.dom = Some(dom);
        }
    }
    true
}

fn update(arena: &FiberArena, document: &dyn HostDocument, id: FiberId) {
    let Some(fiber) = arena.get(id) else {
        return;
    };
    let (Some(dom), Some(prev)) = (fiber.dom, fiber.prev.as_deref()) else {
        return;
    };
    if !std::rc::Rc::ptr_eq(&prev.props, &fiber.props) {
        patch_props(document, dom, &prev.props, &fiber.props);
    }
}

/// Nearest ancestor with a native node.
fn host_parent(arena: &FiberArena, id: FiberId) -> Option<NativeHandle> {
    let mut current = arena.get(id)?.parent;
    while let Some(parent) = current {
        let fiber = arena.get(parent)?;
        if fiber.dom.is_some() {
            return fiber.dom;
        }
        current = fiber.parent;
    }
    None
}

/// The native node that `id`'s native node must follow: the last native node
/// of the nearest preceding sibling that has one, looking through component
/// ancestors up to the host parent.
fn previous_host_node(arena: &FiberArena, id: FiberId) -> Option<NativeHandle> {
    let mut current = id;
    loop {
        let parent = arena.get(current)?.parent?;
        let siblings = arena.children(parent);
        let position = siblings.iter().position(|s| *s == current)?;
        for sibling in siblings[..position].iter().rev() {
            if let Some(node) = last_host_node(arena, *sibling) {
                return Some(node);
            }
        }
        if arena.get(parent)?.dom.is_some() {
            return None;
        }
        current = parent;
    }
}

/// The first mounted native node after `id` under its host parent.
fn next_host_node(arena: &FiberArena, id: FiberId) -> Option<NativeHandle> {
    let mut current = id;
    loop {
        let fiber = arena.get(current)?;
        let mut next = fiber.sibling;
        while let Some(sibling) = next {
            if let Some(node) = first_host_node(arena, sibling) {
                return Some(node);
            }
            next = arena.get(sibling)?.sibling;
        }
        let parent = fiber.parent?;
        if arena.get(parent)?.dom.is_some() {
            return None;
        }
        current = parent;
    }
}

/// A native fiber without a node is not placed yet and hides its children.
fn first_host_node(arena: &FiberArena, id: FiberId) -> Option<NativeHandle> {
    let fiber = arena.get(id)?;
    if fiber.dom.is_some() {
        return fiber.dom;
    }
    match fiber.ty {
        NodeType::Intrinsic(_) | NodeType::Text => None,
        NodeType::Function(_) | NodeType::ClassLike(_) => {
            let mut next = fiber.child;
            while let Some(child) = next {
                if let Some(node) = first_host_node(arena, child) {
                    return Some(node);
                }
                next = arena.get(child)?.sibling;
            }
            None
        }
    }
}

fn last_host_node(arena: &FiberArena, id: FiberId) -> Option<NativeHandle> {
    let fiber = arena.get(id)?;
    if fiber.dom.is_some() {
        return fiber.dom;
    }
    arena
        .children(id)
        .into_iter()
        .rev()
        .find_map(|child| last_host_node(arena, child))
}
