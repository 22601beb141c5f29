//! Descriptions - The values components return.
//!
//! A description is a recursive [`Node`]: nothing, text, a list, or an
//! element. Elements name what produced them through [`ElementType`]:
//! a host tag, a function component, a class component, or a fragment.
//!
//! ```ignore
//! use spark_reconciler::primitives::{h, component};
//!
//! let tree = h("ul")
//!     .children(items.iter().map(|item| h("li").key(item.id).child(item.label.as_str())))
//!     .build();
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::types::{Handler, Key, PropValue, Props};
use crate::class::{ClassType, Component};
use crate::error::RenderError;
use crate::hooks::Hooks;

/// What a component body returns.
pub type RenderResult = Result<Node, RenderError>;

/// Signature of a plain function component.
pub type ComponentFn = fn(&mut Hooks, &Props) -> RenderResult;

// =============================================================================
// Node
// =============================================================================

/// A UI description.
#[derive(Clone, Default)]
pub enum Node {
    /// Renders nothing (null, booleans, absent children).
    #[default]
    Empty,
    /// Text content. Numbers are converted to text.
    Text(Rc<str>),
    /// An ordered list of descriptions.
    List(Rc<[Node]>),
    /// A typed element.
    Element(Rc<Element>),
}

impl Node {
    /// True for values that occupy no slot: empty, or empty text.
    pub fn is_vacant(&self) -> bool {
        match self {
            Node::Empty => true,
            Node::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Identity comparison. Two clones of the same description are equal.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        match (a, b) {
            (Node::Empty, Node::Empty) => true,
            (Node::Text(a), Node::Text(b)) => Rc::ptr_eq(a, b),
            (Node::List(a), Node::List(b)) => Rc::ptr_eq(a, b),
            (Node::Element(a), Node::Element(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Empty => f.write_str("Empty"),
            Node::Text(text) => write!(f, "{text:?}"),
            Node::List(items) => f.debug_list().entries(items.iter()).finish(),
            Node::Element(element) => element.fmt(f),
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Text(value.into())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Text(value.into())
    }
}

impl From<Rc<str>> for Node {
    fn from(value: Rc<str>) -> Self {
        Node::Text(value)
    }
}

macro_rules! number_to_text {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Node {
                fn from(value: $ty) -> Self {
                    Node::Text(value.to_string().into())
                }
            }
        )*
    };
}

number_to_text!(i32, i64, u32, u64, usize, f64);

impl From<bool> for Node {
    fn from(_: bool) -> Self {
        Node::Empty
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Node::Empty, Into::into)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(value: Vec<T>) -> Self {
        Node::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Node::Element(Rc::new(value))
    }
}

impl From<ElementBuilder> for Node {
    fn from(value: ElementBuilder) -> Self {
        value.build()
    }
}

// =============================================================================
// Element
// =============================================================================

/// A typed element description.
#[derive(Clone)]
pub struct Element {
    pub ty: ElementType,
    pub key: Option<Key>,
    pub props: Props,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(&self.ty.name());
        if let Some(key) = &self.key {
            out.field("key", key);
        }
        out.field("props", &self.props)
            .field("children", self.props.children())
            .finish()
    }
}

/// What produced an element.
#[derive(Clone)]
pub enum ElementType {
    Host(Rc<str>),
    Function(FunctionComponent),
    Class(ClassType),
    Fragment,
}

impl ElementType {
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            ElementType::Host(tag) => Cow::Owned(tag.to_string()),
            ElementType::Function(f) => f.name.clone(),
            ElementType::Class(c) => Cow::Borrowed(c.name()),
            ElementType::Fragment => Cow::Borrowed("Fragment"),
        }
    }

    pub fn host_tag(&self) -> Option<&str> {
        match self {
            ElementType::Host(tag) => Some(tag),
            _ => None,
        }
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Function(a), ElementType::Function(b)) => a == b,
            (ElementType::Class(a), ElementType::Class(b)) => a.id() == b.id(),
            (ElementType::Fragment, ElementType::Fragment) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// =============================================================================
// Function components
// =============================================================================

#[derive(Clone)]
enum ComponentBody {
    Fn(ComponentFn),
    Closure(Rc<dyn Fn(&mut Hooks, &Props) -> RenderResult>),
}

/// A function component. Identity is the function pointer or the closure
/// allocation, so create closure components once and reuse them.
#[derive(Clone)]
pub struct FunctionComponent {
    name: Cow<'static, str>,
    body: ComponentBody,
}

impl FunctionComponent {
    pub fn new(name: impl Into<Cow<'static, str>>, body: ComponentFn) -> Self {
        Self {
            name: name.into(),
            body: ComponentBody::Fn(body),
        }
    }

    pub fn from_closure(
        name: impl Into<Cow<'static, str>>,
        body: impl Fn(&mut Hooks, &Props) -> RenderResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: ComponentBody::Closure(Rc::new(body)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, hooks: &mut Hooks, props: &Props) -> RenderResult {
        match &self.body {
            ComponentBody::Fn(f) => f(hooks, props),
            ComponentBody::Closure(f) => f(hooks, props),
        }
    }
}

impl PartialEq for FunctionComponent {
    fn eq(&self, other: &Self) -> bool {
        match (&self.body, &other.body) {
            (ComponentBody::Fn(a), ComponentBody::Fn(b)) => std::ptr::fn_addr_eq(*a, *b),
            (ComponentBody::Closure(a), ComponentBody::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Incrementally builds an [`Element`].
pub struct ElementBuilder {
    ty: ElementType,
    key: Option<Key>,
    attrs: BTreeMap<Rc<str>, PropValue>,
    children: Vec<Node>,
}

impl ElementBuilder {
    pub fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Attach an event handler prop.
    pub fn on(self, name: &str, handler: impl Fn() + 'static) -> Self {
        self.prop(name, Handler::new(handler))
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, T>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Finish the element. One child stays a single child; several become
    /// a list, which matters to the reconciler's single vs. list paths.
    pub fn build(self) -> Node {
        let children = match self.children.len() {
            0 => Node::Empty,
            1 => self.children.into_iter().next().unwrap_or_default(),
            _ => Node::List(self.children.into()),
        };
        Node::Element(Rc::new(Element {
            ty: self.ty,
            key: self.key,
            props: Props::new(self.attrs, children),
        }))
    }
}

/// A host element (`div`, `span`, ...).
pub fn h(tag: &str) -> ElementBuilder {
    ElementBuilder::new(ElementType::Host(tag.into()))
}

/// A function component element.
pub fn component(name: &'static str, body: ComponentFn) -> ElementBuilder {
    ElementBuilder::new(ElementType::Function(FunctionComponent::new(name, body)))
}

/// An element for an existing function component value.
pub fn component_of(component: &FunctionComponent) -> ElementBuilder {
    ElementBuilder::new(ElementType::Function(component.clone()))
}

/// A class component element.
pub fn class<C: Component>() -> ElementBuilder {
    ElementBuilder::new(ElementType::Class(ClassType::of::<C>()))
}

/// A fragment grouping several children without a host node.
pub fn fragment<I, T>(children: I) -> ElementBuilder
where
    I: IntoIterator<Item = T>,
    T: Into<Node>,
{
    ElementBuilder::new(ElementType::Fragment).children(children)
}

/// A text description.
pub fn text(content: impl Into<Rc<str>>) -> Node {
    Node::Text(content.into())
}
