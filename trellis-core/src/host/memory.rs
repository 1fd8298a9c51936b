//! In-memory host document.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Event, HostDocument, HostTarget, Listener, NativeHandle};

enum NodeKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        style: BTreeMap<String, String>,
        listeners: Vec<(String, Listener)>,
    },
    Text(String),
}

struct MemoryNode {
    kind: NodeKind,
    parent: Option<NativeHandle>,
    children: Vec<NativeHandle>,
}

#[derive(Default)]
struct DocumentState {
    nodes: HashMap<NativeHandle, MemoryNode>,
    next_id: u64,
    mutations: usize,
}

impl DocumentState {
    fn alloc(&mut self, kind: NodeKind) -> NativeHandle {
        let handle = NativeHandle::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            handle,
            MemoryNode {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        handle
    }

    fn detach(&mut self, node: NativeHandle) {
        let parent = self.nodes.get_mut(&node).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != node);
        }
    }

    fn release(&mut self, node: NativeHandle) {
        if let Some(removed) = self.nodes.remove(&node) {
            for child in removed.children {
                self.release(child);
            }
        }
    }

    fn element_mut(
        &mut self,
        node: NativeHandle,
    ) -> Option<(
        &mut BTreeMap<String, String>,
        &mut BTreeMap<String, String>,
        &mut Vec<(String, Listener)>,
    )> {
        self.mutations += 1;
        match self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(NodeKind::Element {
                attributes,
                style,
                listeners,
                ..
            }) => Some((attributes, style, listeners)),
            _ => None,
        }
    }
}

/// Serializable view of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeSnapshot {
    Element {
        tag: String,
        #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
        attributes: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
        style: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        children: Vec<NodeSnapshot>,
    },
    Text {
        text: String,
    },
}

/// A host document kept entirely in memory.
///
/// Cloning yields another handle to the same document.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    state: Rc<RefCell<DocumentState>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element to mount a root into.
    pub fn create_container(&self, tag: &str) -> NativeHandle {
        self.create_element(tag)
    }

    /// Mount target for `container` in this document.
    pub fn target(&self, container: NativeHandle) -> HostTarget {
        HostTarget::new(Rc::new(self.clone()), container)
    }

    pub fn contains(&self, node: NativeHandle) -> bool {
        self.state.borrow().nodes.contains_key(&node)
    }

    /// Number of live nodes, containers included.
    pub fn node_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    /// Number of mutating calls made so far.
    pub fn mutation_count(&self) -> usize {
        self.state.borrow().mutations
    }

    pub fn tag(&self, node: NativeHandle) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, node: NativeHandle) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.kind {
            NodeKind::Text(text) => Some(text.clone()),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn attribute(&self, node: NativeHandle, name: &str) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).cloned(),
            NodeKind::Text(_) => None,
        }
    }

    pub fn style(&self, node: NativeHandle, property: &str) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.kind {
            NodeKind::Element { style, .. } => style.get(property).cloned(),
            NodeKind::Text(_) => None,
        }
    }

    pub fn listener_count(&self, node: NativeHandle) -> usize {
        match self.state.borrow().nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Element { listeners, .. }) => listeners.len(),
            _ => 0,
        }
    }

    pub fn children(&self, node: NativeHandle) -> Vec<NativeHandle> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, node: NativeHandle) -> Option<NativeHandle> {
        self.state.borrow().nodes.get(&node)?.parent
    }

    /// Deliver an event to the listeners registered on `target` for `kind`.
    ///
    /// Returns how many listeners ran. Listeners may mutate the document or
    /// write signals.
    pub fn dispatch(&self, target: NativeHandle, kind: &str) -> usize {
        let listeners: Vec<Listener> = match self.state.borrow().nodes.get(&target).map(|n| &n.kind) {
            Some(NodeKind::Element { listeners, .. }) => listeners
                .iter()
                .filter(|(event, _)| event == kind)
                .map(|(_, listener)| listener.clone())
                .collect(),
            _ => Vec::new(),
        };

        let event = Event {
            kind: kind.to_string(),
            target,
        };
        for listener in &listeners {
            listener.call(&event);
        }
        listeners.len()
    }

    /// Render the children of `node` as markup.
    pub fn inner_markup(&self, node: NativeHandle) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        if let Some(entry) = state.nodes.get(&node) {
            for child in &entry.children {
                Self::markup_in(&state, *child, &mut out);
            }
        }
        out
    }

    /// Render `node` and its subtree as markup.
    pub fn markup(&self, node: NativeHandle) -> String {
        let mut out = String::new();
        Self::markup_in(&self.state.borrow(), node, &mut out);
        out
    }

    fn markup_in(state: &DocumentState, node: NativeHandle, out: &mut String) {
        let Some(entry) = state.nodes.get(&node) else {
            return;
        };
        match &entry.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element {
                tag,
                attributes,
                style,
                ..
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    if value.is_empty() {
                        out.push_str(&format!(" {name}"));
                    } else {
                        out.push_str(&format!(" {name}=\"{value}\""));
                    }
                }
                if !style.is_empty() {
                    let declarations: Vec<String> =
                        style.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                    out.push_str(&format!(" style=\"{}\"", declarations.join("; ")));
                }
                out.push('>');
                for child in &entry.children {
                    Self::markup_in(state, *child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
        }
    }

    /// Serializable snapshot of `node` and its subtree.
    pub fn snapshot(&self, node: NativeHandle) -> Option<NodeSnapshot> {
        let state = self.state.borrow();
        Self::snapshot_in(&state, node)
    }

    fn snapshot_in(state: &DocumentState, node: NativeHandle) -> Option<NodeSnapshot> {
        let entry = state.nodes.get(&node)?;
        Some(match &entry.kind {
            NodeKind::Text(text) => NodeSnapshot::Text { text: text.clone() },
            NodeKind::Element {
                tag,
                attributes,
                style,
                ..
            } => NodeSnapshot::Element {
                tag: tag.clone(),
                attributes: attributes.clone(),
                style: style.clone(),
                children: entry
                    .children
                    .iter()
                    .filter_map(|child| Self::snapshot_in(state, *child))
                    .collect(),
            },
        })
    }
}

impl HostDocument for MemoryDocument {
    fn create_element(&self, tag: &str) -> NativeHandle {
        let mut state = self.state.borrow_mut();
        state.mutations += 1;
        state.alloc(NodeKind::Element {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
            style: BTreeMap::new(),
            listeners: Vec::new(),
        })
    }

    fn create_text(&self, text: &str) -> NativeHandle {
        let mut state = self.state.borrow_mut();
        state.mutations += 1;
        state.alloc(NodeKind::Text(text.to_string()))
    }

    fn set_text(&self, node: NativeHandle, text: &str) {
        let mut state = self.state.borrow_mut();
        state.mutations += 1;
        if let Some(MemoryNode {
            kind: NodeKind::Text(content),
            ..
        }) = state.nodes.get_mut(&node)
        {
            *content = text.to_string();
        }
    }

    fn set_attribute(&self, node: NativeHandle, name: &str, value: &str) {
        if let Some((attributes, _, _)) = self.state.borrow_mut().element_mut(node) {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&self, node: NativeHandle, name: &str) {
        if let Some((attributes, _, _)) = self.state.borrow_mut().element_mut(node) {
            attributes.remove(name);
        }
    }

    fn set_style(&self, node: NativeHandle, property: &str, value: Option<&str>) {
        if let Some((_, style, _)) = self.state.borrow_mut().element_mut(node) {
            match value {
                Some(value) => {
                    style.insert(property.to_string(), value.to_string());
                }
                None => {
                    style.remove(property);
                }
            }
        }
    }

    fn add_event_listener(&self, node: NativeHandle, event: &str, listener: Listener) {
        if let Some((_, _, listeners)) = self.state.borrow_mut().element_mut(node) {
            listeners.push((event.to_string(), listener));
        }
    }

    fn remove_event_listener(&self, node: NativeHandle, event: &str, listener: &Listener) {
        if let Some((_, _, listeners)) = self.state.borrow_mut().element_mut(node) {
            if let Some(pos) = listeners
                .iter()
                .position(|(name, existing)| name == event && existing == listener)
            {
                listeners.remove(pos);
            }
        }
    }

    fn insert_before(&self, parent: NativeHandle, child: NativeHandle, before: Option<NativeHandle>) {
        let mut state = self.state.borrow_mut();
        if !state.nodes.contains_key(&parent) || !state.nodes.contains_key(&child) {
            trace!(?parent, ?child, "insert_before on released node ignored");
            return;
        }
        state.mutations += 1;
        state.detach(child);
        if let Some(node) = state.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(parent) = state.nodes.get_mut(&parent) {
            let index = before
                .and_then(|before| parent.children.iter().position(|c| *c == before))
                .unwrap_or(parent.children.len());
            parent.children.insert(index, child);
        }
    }

    fn remove(&self, node: NativeHandle) {
        let mut state = self.state.borrow_mut();
        state.mutations += 1;
        state.detach(node);
        state.release(node);
    }

    fn first_child(&self, node: NativeHandle) -> Option<NativeHandle> {
        self.state.borrow().nodes.get(&node)?.children.first().copied()
    }

    fn next_sibling(&self, node: NativeHandle) -> Option<NativeHandle> {
        let state = self.state.borrow();
        let parent = state.nodes.get(&node)?.parent?;
        let siblings = &state.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }
}
