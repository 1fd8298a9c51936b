//! Tree Nodes
//!
//! This module defines the fiber, the unit of the render tree. Fibers live in
//! a [`FiberArena`](super::arena::FiberArena) and refer to each other by
//! [`FiberId`]. Only the parent→child edge implies ownership; parent and
//! sibling links are lookups.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::host::NativeHandle;
use crate::reactive::Source;

use super::element::{Instance, NodeType, Props};
use super::hooks::HookSlot;

/// Unique identifier for a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

impl FiberId {
    /// Generate a new unique fiber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for FiberId {
    fn default() -> Self {
        Self::new()
    }
}

/// What the commit engine must do with a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectTag {
    /// Create and insert the native node.
    Placement,
    /// Patch the native node from the previous props.
    Update,
    /// Remove the subtree and run its cleanups.
    Deletion,
}

/// A fiber as it was at its last commit.
#[derive(Clone)]
pub(crate) struct Snapshot {
    pub(crate) props: Rc<Props>,
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) hooks: Vec<HookSlot>,
}

/// A node of the render tree.
pub(crate) struct Fiber {
    pub(crate) id: FiberId,
    pub(crate) ty: NodeType,
    pub(crate) props: Rc<Props>,

    /// Native node, for intrinsic and text fibers once placed.
    pub(crate) dom: Option<NativeHandle>,

    /// Instance of a class-like component.
    pub(crate) instance: Option<Instance>,

    pub(crate) hooks: Vec<HookSlot>,

    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,

    /// State at the last commit. `None` until first committed.
    pub(crate) prev: Option<Box<Snapshot>>,

    pub(crate) effect: Option<EffectTag>,

    /// Signals this fiber is entangled with.
    pub(crate) signals: Vec<Rc<dyn Source>>,
}

impl Fiber {
    pub(crate) fn new(ty: NodeType, props: Rc<Props>, parent: Option<FiberId>) -> Self {
        Self {
            id: FiberId::new(),
            ty,
            props,
            dom: None,
            instance: None,
            hooks: Vec::new(),
            parent,
            child: None,
            sibling: None,
            prev: None,
            effect: None,
            signals: Vec::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            props: Rc::clone(&self.props),
            parent: self.parent,
            child: self.child,
            sibling: self.sibling,
            hooks: self.hooks.clone(),
        }
    }

    /// Put the fiber back in its last committed state.
    pub(crate) fn restore(&mut self) {
        match self.prev.as_deref() {
            Some(prev) => {
                self.props = Rc::clone(&prev.props);
                self.parent = prev.parent;
                self.child = prev.child;
                self.sibling = prev.sibling;
                self.hooks = prev.hooks.clone();
            }
            None => {
                self.child = None;
                self.sibling = None;
                self.hooks.clear();
            }
        }
        self.effect = None;
    }

    /// Retire the fiber at commit.
    pub(crate) fn retire(&mut self) {
        self.effect = None;
        self.prev = Some(Box::new(self.snapshot()));
    }

    pub(crate) fn entangle(&mut self, source: Rc<dyn Source>) {
        if !self.signals.iter().any(|s| s.id() == source.id()) {
            self.signals.push(source);
        }
    }

    /// Revoke every signal subscription held by this fiber.
    pub(crate) fn detach_signals(&mut self) {
        for source in self.signals.drain(..) {
            source.detach_node(self.id);
        }
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("type", &self.ty)
            .field("dom", &self.dom)
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("sibling", &self.sibling)
            .field("effect", &self.effect)
            .field("hooks", &self.hooks.len())
            .field("signals", &self.signals.len())
            .finish()
    }
}
