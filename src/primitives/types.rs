//! Primitive types - Keys, prop values, props and cleanup.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::element::Node;

// =============================================================================
// Cleanup Function
// =============================================================================

/// Cleanup returned by an effect. Runs before the effect fires again and
/// when its component unmounts.
pub type Cleanup = Box<dyn FnOnce()>;

// =============================================================================
// Key
// =============================================================================

/// Identity of an element among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.into())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value.into())
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value.into())
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(n) => write!(f, "{n}"),
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// An event handler carried as a prop. Compared by identity.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn()>);

impl Handler {
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self) {
        (self.0)()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

// =============================================================================
// Prop Value
// =============================================================================

/// One attribute value.
///
/// Scalars compare by value; handlers and opaque values compare by identity,
/// so a freshly created closure always counts as a change.
#[derive(Clone)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Handler(Handler),
    Any(Rc<dyn Any>),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => a == b,
            (PropValue::Any(a), PropValue::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "{s:?}"),
            PropValue::Int(n) => write!(f, "{n}"),
            PropValue::Float(n) => write!(f, "{n}"),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Handler(_) => f.write_str("<handler>"),
            PropValue::Any(_) => f.write_str("<any>"),
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => f.write_str(s),
            other => write!(f, "{other:?}"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.into())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value.into())
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value.into())
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<Handler> for PropValue {
    fn from(value: Handler) -> Self {
        PropValue::Handler(value)
    }
}

// =============================================================================
// Props
// =============================================================================

struct PropsInner {
    attrs: BTreeMap<Rc<str>, PropValue>,
    children: Node,
}

/// Immutable props of an element, shared by reference.
///
/// Cloning is cheap. [`Props::ptr_eq`] is the identity test the work loop
/// uses to decide that a node received no new props.
#[derive(Clone)]
pub struct Props(Rc<PropsInner>);

impl Default for Props {
    fn default() -> Self {
        Self::new(BTreeMap::new(), Node::Empty)
    }
}

impl Props {
    pub fn new(attrs: BTreeMap<Rc<str>, PropValue>, children: Node) -> Self {
        Self(Rc::new(PropsInner { attrs, children }))
    }

    /// Props that only carry children (fragments, text nodes).
    pub fn from_children(children: Node) -> Self {
        Self::new(BTreeMap::new(), children)
    }

    pub fn ptr_eq(a: &Props, b: &Props) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn children(&self) -> &Node {
        &self.0.children
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.attrs.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            PropValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn handler(&self, name: &str) -> Option<Handler> {
        match self.get(name)? {
            PropValue::Handler(h) => Some(h.clone()),
            _ => None,
        }
    }

    /// Downcast an opaque prop.
    pub fn any<T: 'static>(&self, name: &str) -> Option<&T> {
        match self.get(name)? {
            PropValue::Any(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.attrs.iter().map(|(k, v)| (&**k, v))
    }

    /// Text carried by a text node's props.
    pub fn text(&self) -> &str {
        match &self.0.children {
            Node::Text(text) => text,
            _ => "",
        }
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.attrs.iter()).finish()
    }
}
