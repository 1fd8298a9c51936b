//! Elements
//!
//! An [`Element`] is the declarative description of one tree node: a type and
//! its props. Components return elements; the reconciler diffs them against
//! the committed tree.

use std::any::{type_name, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::RenderError;
use crate::host::{Event, Listener, NativeHandle};

use super::hooks::Scope;

/// What a component render produces.
pub type RenderResult = Result<Element, RenderError>;

/// Prop key holding the content of a text node.
pub(crate) const TEXT_VALUE: &str = "nodeValue";

/// Prop key receiving the native handle of a host node.
pub(crate) const REF_KEY: &str = "ref";

/// A slot that receives the native handle of the node it is attached to.
///
/// Set when the node is committed, cleared when it is removed.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<Cell<Option<NativeHandle>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NativeHandle> {
        self.0.get()
    }

    pub(crate) fn set(&self, handle: Option<NativeHandle>) {
        self.0.set(handle);
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.get()).finish()
    }
}

/// A prop value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// Inline style, patched property by property.
    Style(IndexMap<String, String>),
    Listener(Listener),
    Ref(NodeRef),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Listener> for PropValue {
    fn from(value: Listener) -> Self {
        Self::Listener(value)
    }
}

impl From<NodeRef> for PropValue {
    fn from(value: NodeRef) -> Self {
        Self::Ref(value)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Ordered props plus the children sequence.
#[derive(Debug, Clone, Default)]
pub struct Props {
    attrs: IndexMap<String, PropValue>,
    children: Vec<Element>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a prop.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder: append a child.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.attrs.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_str)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropValue::as_number)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(PropValue::as_bool)
    }

    /// Iterate props in insertion order, children excluded.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub(crate) fn attrs(&self) -> &IndexMap<String, PropValue> {
        &self.attrs
    }
}

/// A function component.
#[derive(Clone)]
pub struct FunctionComponent {
    id: TypeId,
    name: &'static str,
    render: Rc<dyn Fn(&Scope, &Props) -> RenderResult>,
}

impl FunctionComponent {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn render(&self, scope: &Scope, props: &Props) -> RenderResult {
        (self.render)(scope, props)
    }
}

/// A stateful component with lifecycle callbacks.
///
/// One instance lives as long as its tree node. Hooks may be used from
/// `render` as well.
pub trait ClassComponent: 'static {
    fn create(props: &Props) -> Self
    where
        Self: Sized;

    fn render(&mut self, cx: &Scope, props: &Props) -> RenderResult;

    /// Runs after the first commit that mounted this instance.
    fn on_mount(&mut self) {}

    /// Runs after every later commit that updated this instance.
    fn on_update(&mut self) {}

    /// Runs before the instance's native nodes are removed.
    fn on_unmount(&mut self) {}
}

pub(crate) type Instance = Rc<RefCell<Box<dyn ClassComponent>>>;

/// Constructor of a class-like component.
#[derive(Clone)]
pub struct ClassType {
    id: TypeId,
    name: &'static str,
    create: Rc<dyn Fn(&Props) -> Box<dyn ClassComponent>>,
}

impl ClassType {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn create(&self, props: &Props) -> Instance {
        Rc::new(RefCell::new((self.create)(props)))
    }
}

/// The type of a tree node.
#[derive(Clone)]
pub enum NodeType {
    /// A native element, by tag.
    Intrinsic(Rc<str>),
    /// A text node. Its content is the `nodeValue` prop.
    Text,
    Function(FunctionComponent),
    ClassLike(ClassType),
}

impl NodeType {
    /// Whether a committed node of type `self` can be updated in place to
    /// render `other`.
    pub fn same_type(&self, other: &NodeType) -> bool {
        match (self, other) {
            (Self::Intrinsic(a), Self::Intrinsic(b)) => a == b,
            (Self::Text, Self::Text) => true,
            (Self::Function(a), Self::Function(b)) => a.id == b.id,
            (Self::ClassLike(a), Self::ClassLike(b)) => a.id == b.id,
            _ => false,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, Self::Function(_) | Self::ClassLike(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Intrinsic(tag) => tag,
            Self::Text => "#text",
            Self::Function(f) => f.name,
            Self::ClassLike(c) => c.name,
        }
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intrinsic(tag) => write!(f, "Intrinsic({tag})"),
            Self::Text => f.write_str("Text"),
            Self::Function(c) => write!(f, "Function({})", c.name),
            Self::ClassLike(c) => write!(f, "ClassLike({})", c.name),
        }
    }
}

fn short_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// A declarative tree node: a type and its props.
#[derive(Clone)]
pub struct Element {
    pub(crate) ty: NodeType,
    pub(crate) props: Rc<Props>,
}

impl Element {
    /// A native element with the given tag.
    pub fn new(tag: &str) -> Self {
        Self {
            ty: NodeType::Intrinsic(Rc::from(tag)),
            props: Rc::new(Props::new()),
        }
    }

    /// A text node.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            ty: NodeType::Text,
            props: Rc::new(Props::new().with(TEXT_VALUE, value.into())),
        }
    }

    /// A function component. The function's type is its identity, so two
    /// elements built from the same function diff as the same type.
    pub fn component<F>(render: F, props: Props) -> Self
    where
        F: Fn(&Scope, &Props) -> RenderResult + 'static,
    {
        Self {
            ty: NodeType::Function(FunctionComponent {
                id: TypeId::of::<F>(),
                name: short_name::<F>(),
                render: Rc::new(render),
            }),
            props: Rc::new(props),
        }
    }

    /// A class-like component.
    pub fn class<C: ClassComponent>(props: Props) -> Self {
        Self {
            ty: NodeType::ClassLike(ClassType {
                id: TypeId::of::<C>(),
                name: short_name::<C>(),
                create: Rc::new(|props: &Props| Box::new(C::create(props)) as Box<dyn ClassComponent>),
            }),
            props: Rc::new(props),
        }
    }

    pub fn node_type(&self) -> &NodeType {
        &self.ty
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    fn props_mut(&mut self) -> &mut Props {
        Rc::make_mut(&mut self.props)
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props_mut().set(key, value);
        self
    }

    /// Attach an event listener, e.g. `on("click", ...)`.
    pub fn on(mut self, event: &str, handler: impl Fn(&Event) + 'static) -> Self {
        self.props_mut()
            .set(format!("on{event}"), Listener::new(handler));
        self
    }

    /// Set one inline style property.
    pub fn style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        let props = self.props_mut();
        let mut style = match props.attrs.shift_remove("style") {
            Some(PropValue::Style(style)) => style,
            _ => IndexMap::new(),
        };
        style.insert(property.into(), value.into());
        props.attrs.insert("style".to_string(), PropValue::Style(style));
        self
    }

    pub fn node_ref(self, node_ref: &NodeRef) -> Self {
        self.attr(REF_KEY, node_ref.clone())
    }

    pub fn child(mut self, child: Element) -> Self {
        self.props_mut().children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.props_mut().children.extend(children);
        self
    }

    /// Append a text child.
    pub fn with_text(self, value: impl Into<String>) -> Self {
        self.child(Element::text(value))
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("type", &self.ty)
            .field("props", &self.props)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(_cx: &Scope, _props: &Props) -> RenderResult {
        Ok(Element::new("div"))
    }

    fn other(_cx: &Scope, _props: &Props) -> RenderResult {
        Ok(Element::new("div"))
    }

    struct Counter;

    impl ClassComponent for Counter {
        fn create(_props: &Props) -> Self {
            Counter
        }

        fn render(&mut self, _cx: &Scope, _props: &Props) -> RenderResult {
            Ok(Element::new("span"))
        }
    }

    #[test]
    fn type_identity() {
        let div = Element::new("div");
        assert!(div.ty.same_type(&Element::new("div").ty));
        assert!(!div.ty.same_type(&Element::new("span").ty));
        assert!(Element::text("a").ty.same_type(&Element::text("b").ty));

        let a = Element::component(app, Props::new());
        assert!(a.ty.same_type(&Element::component(app, Props::new()).ty));
        assert!(!a.ty.same_type(&Element::component(other, Props::new()).ty));
        assert_eq!(a.ty.name(), "app");

        let c = Element::class::<Counter>(Props::new());
        assert!(c.ty.same_type(&Element::class::<Counter>(Props::new()).ty));
        assert!(!c.ty.same_type(&a.ty));
        assert_eq!(c.ty.name(), "Counter");
    }

    #[test]
    fn builder_collects_props_and_children() {
        let element = Element::new("button")
            .attr("className", "primary")
            .style("color", "red")
            .style("margin", "0")
            .on("click", |_| {})
            .with_text("Go");

        let props = element.props();
        assert_eq!(props.get_str("className"), Some("primary"));
        assert!(matches!(props.get("onclick"), Some(PropValue::Listener(_))));
        match props.get("style") {
            Some(PropValue::Style(style)) => assert_eq!(style.len(), 2),
            other => panic!("unexpected style prop {other:?}"),
        }
        assert_eq!(props.children().len(), 1);
        assert_eq!(
            props.children()[0].props().get_str(TEXT_VALUE),
            Some("Go")
        );
    }

    #[test]
    fn listener_props_compare_by_identity() {
        let listener = Listener::new(|_| {});
        assert_eq!(
            PropValue::Listener(listener.clone()),
            PropValue::Listener(listener)
        );
        assert_ne!(
            PropValue::Listener(Listener::new(|_| {})),
            PropValue::Listener(Listener::new(|_| {}))
        );
    }
}
