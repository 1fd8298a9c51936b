//! Host Document
//!
//! The commit engine writes to the document through the [`HostDocument`]
//! capability set. Any host that can create element and text nodes, set
//! attributes and style properties, attach event listeners and move nodes
//! around is a valid mount target.
//!
//! [`MemoryDocument`] is an in-memory host used by the tests and for headless
//! rendering.

mod memory;

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub use memory::{MemoryDocument, NodeSnapshot};

/// Opaque handle to a node owned by a host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// An event delivered to a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name without the `on` prefix, e.g. `click`.
    pub kind: String,
    pub target: NativeHandle,
}

/// An event listener. Two listeners are equal only if they are the same
/// closure, which is what listener patching compares.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Event)>);

impl Listener {
    pub fn new(f: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// The mutation capabilities a mount target must provide.
///
/// Handles passed in are always ones this document created. Implementations
/// should ignore handles they no longer know about.
pub trait HostDocument {
    fn create_element(&self, tag: &str) -> NativeHandle;

    fn create_text(&self, text: &str) -> NativeHandle;

    /// Replace the content of a text node.
    fn set_text(&self, node: NativeHandle, text: &str);

    fn set_attribute(&self, node: NativeHandle, name: &str, value: &str);

    fn remove_attribute(&self, node: NativeHandle, name: &str);

    /// Set one style property, or clear it with `None`.
    fn set_style(&self, node: NativeHandle, property: &str, value: Option<&str>);

    fn add_event_listener(&self, node: NativeHandle, event: &str, listener: Listener);

    fn remove_event_listener(&self, node: NativeHandle, event: &str, listener: &Listener);

    /// Insert `child` into `parent` before `before`, or append it when
    /// `before` is `None`. A child that is already attached is moved.
    fn insert_before(&self, parent: NativeHandle, child: NativeHandle, before: Option<NativeHandle>);

    /// Detach `node` from its parent and release it together with its
    /// descendants.
    fn remove(&self, node: NativeHandle);

    fn first_child(&self, node: NativeHandle) -> Option<NativeHandle>;

    fn next_sibling(&self, node: NativeHandle) -> Option<NativeHandle>;
}

/// Where a root is mounted: a document and a container node inside it.
#[derive(Clone)]
pub struct HostTarget {
    pub document: Rc<dyn HostDocument>,
    pub container: NativeHandle,
}

impl HostTarget {
    pub fn new(document: Rc<dyn HostDocument>, container: NativeHandle) -> Self {
        Self {
            document,
            container,
        }
    }
}

impl fmt::Debug for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTarget")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}
