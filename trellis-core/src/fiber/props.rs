//! Prop patching.
//!
//! Translates the difference between two prop maps into the minimal set of
//! host calls. Only keys whose values differ are touched.
//!
//! - listeners (`on<event>` keys) are removed and re-added when the closure
//!   changes;
//! - `style` maps are merged property by property;
//! - `true` sets an empty attribute, `false` and `Null` remove it;
//! - `className` and `htmlFor` map to `class` and `for`;
//! - `nodeValue` is the content of a text node;
//! - `ref` receives the native handle.

use std::mem::discriminant;

use indexmap::IndexMap;

use crate::host::{HostDocument, NativeHandle};

use super::element::{PropValue, Props, TEXT_VALUE};

pub(crate) fn attribute_name(key: &str) -> &str {
    match key {
        "className" => "class",
        "htmlFor" => "for",
        other => other,
    }
}

/// `onclick` → `click`.
pub(crate) fn event_name(key: &str) -> Option<String> {
    key.strip_prefix("on")
        .filter(|event| !event.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Bring `node` from `prev` to `next`.
pub(crate) fn patch_props(
    document: &dyn HostDocument,
    node: NativeHandle,
    prev: &Props,
    next: &Props,
) {
    let prev = prev.attrs();
    let next = next.attrs();

    for (key, old) in prev {
        match next.get(key) {
            Some(new) if new == old => {}
            Some(new) if same_kind(old, new) && !replaces_whole(old) => {}
            _ => unset(document, node, key, old),
        }
    }

    for (key, new) in next {
        let old = prev.get(key);
        if old == Some(new) {
            continue;
        }
        let merge_from = old.filter(|old| same_kind(old, new));
        set(document, node, key, new, merge_from);
    }
}

fn same_kind(a: &PropValue, b: &PropValue) -> bool {
    discriminant(a) == discriminant(b)
}

/// Values whose old version must be explicitly undone before the new one is
/// applied, even when the kind is unchanged.
fn replaces_whole(value: &PropValue) -> bool {
    matches!(value, PropValue::Listener(_) | PropValue::Ref(_))
}

fn unset(document: &dyn HostDocument, node: NativeHandle, key: &str, old: &PropValue) {
    match old {
        PropValue::Listener(listener) => {
            if let Some(event) = event_name(key) {
                document.remove_event_listener(node, &event, listener);
            }
        }
        PropValue::Ref(node_ref) => node_ref.set(None),
        PropValue::Style(style) => {
            for property in style.keys() {
                document.set_style(node, property, None);
            }
        }
        _ if key == TEXT_VALUE => {}
        _ => document.remove_attribute(node, attribute_name(key)),
    }
}

fn set(
    document: &dyn HostDocument,
    node: NativeHandle,
    key: &str,
    new: &PropValue,
    old: Option<&PropValue>,
) {
    let name = attribute_name(key);
    match new {
        PropValue::Listener(listener) => {
            if let Some(event) = event_name(key) {
                document.add_event_listener(node, &event, listener.clone());
            }
        }
        PropValue::Ref(node_ref) => node_ref.set(Some(node)),
        PropValue::Style(style) => {
            let previous = match old {
                Some(PropValue::Style(previous)) => Some(previous),
                _ => None,
            };
            merge_style(document, node, previous, style);
        }
        PropValue::Str(text) if key == TEXT_VALUE => document.set_text(node, text),
        PropValue::Str(value) => document.set_attribute(node, name, value),
        PropValue::Number(value) => document.set_attribute(node, name, &value.to_string()),
        PropValue::Bool(true) => document.set_attribute(node, name, ""),
        PropValue::Bool(false) | PropValue::Null => document.remove_attribute(node, name),
    }
}

fn merge_style(
    document: &dyn HostDocument,
    node: NativeHandle,
    previous: Option<&IndexMap<String, String>>,
    next: &IndexMap<String, String>,
) {
    if let Some(previous) = previous {
        for property in previous.keys() {
            if !next.contains_key(property) {
                document.set_style(node, property, None);
            }
        }
    }
    for (property, value) in next {
        if previous.and_then(|p| p.get(property)) != Some(value) {
            document.set_style(node, property, Some(value));
        }
    }
}
