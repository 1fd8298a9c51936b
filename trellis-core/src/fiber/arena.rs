//! Fiber Arena
//!
//! All fibers of a root, indexed by ID. Structural links are plain IDs, so
//! the arena is the only owner and a removed fiber is gone for good.

use std::collections::HashMap;

use super::node::{Fiber, FiberId};

#[derive(Default)]
pub(crate) struct FiberArena {
    fibers: HashMap<FiberId, Fiber>,
}

impl FiberArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, fiber: Fiber) -> FiberId {
        let id = fiber.id;
        self.fibers.insert(id, fiber);
        id
    }

    pub(crate) fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: FiberId) -> Option<Fiber> {
        self.fibers.remove(&id)
    }

    pub(crate) fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.fibers.len()
    }

    /// The current child chain of `id`.
    pub(crate) fn children(&self, id: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut next = self.get(id).and_then(|f| f.child);
        while let Some(child) = next {
            out.push(child);
            next = self.get(child).and_then(|f| f.sibling);
        }
        out
    }

    /// `id` and all of its descendants in preorder.
    pub(crate) fn subtree(&self, id: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// The next fiber to visit after `id` in a depth-first walk that never
    /// leaves the subtree of `root`.
    pub(crate) fn next_in_subtree(&self, id: FiberId, root: FiberId) -> Option<FiberId> {
        if let Some(child) = self.get(id).and_then(|f| f.child) {
            return Some(child);
        }
        let mut current = id;
        loop {
            if current == root {
                return None;
            }
            let fiber = self.get(current)?;
            if let Some(sibling) = fiber.sibling {
                return Some(sibling);
            }
            current = fiber.parent?;
        }
    }
}
