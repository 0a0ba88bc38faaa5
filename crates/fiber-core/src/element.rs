//! Immutable element descriptions produced by components.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::error::ComponentError;
use crate::hash::hash_key;
use crate::hooks::Hooks;
use crate::Key;

/// A single property value.
#[derive(Clone)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Opaque payload such as a callback; compared by identity.
    Any(Rc<dyn Any>),
}

impl PropValue {
    pub fn any<T: 'static>(value: T) -> Self {
        PropValue::Any(Rc::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            PropValue::Any(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Text form used for markup, or `None` for opaque values.
    pub fn to_markup(&self) -> Option<String> {
        match self {
            PropValue::Str(value) => Some(value.to_string()),
            PropValue::Int(value) => Some(value.to_string()),
            PropValue::Float(value) => Some(value.to_string()),
            PropValue::Bool(value) => Some(value.to_string()),
            PropValue::Any(_) => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Any(a), PropValue::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(value) => write!(f, "{value:?}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Any(_) => f.write_str("<any>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        PropValue::Str(value)
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

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
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

#[derive(Clone, Default)]
struct PropsData {
    attributes: BTreeMap<String, PropValue>,
    children: Vec<Element>,
}

/// Element properties: named attributes plus an ordered child list.
///
/// Cloning is cheap and clones compare equal under [`Props::ptr_eq`], which is
/// what lets the reconciler skip subtrees that received the same props.
#[derive(Clone, Default)]
pub struct Props {
    inner: Rc<PropsData>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        Rc::make_mut(&mut self.inner)
            .attributes
            .insert(key.into(), value.into());
        self
    }

    pub fn child(mut self, child: impl Into<Element>) -> Self {
        Rc::make_mut(&mut self.inner).children.push(child.into());
        self
    }

    pub fn with_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Element>,
    {
        Rc::make_mut(&mut self.inner)
            .children
            .extend(children.into_iter().map(Into::into));
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.inner.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropValue::as_int)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.inner
            .attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn children(&self) -> &[Element] {
        &self.inner.children
    }

    /// Children folded into a single element: nothing, the only child, or a list.
    pub fn children_element(&self) -> Element {
        match self.inner.children.as_slice() {
            [] => Element::Empty,
            [only] => only.clone(),
            many => Element::List(many.to_vec()),
        }
    }

    pub fn ptr_eq(&self, other: &Props) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attributes", &self.inner.attributes)
            .field("children", &self.inner.children)
            .finish()
    }
}

/// A function that renders props into an element tree.
///
/// Any `Fn(&mut Hooks, &Props) -> Result<Element, ComponentError>` is a component.
pub trait Component: 'static {
    fn render(&self, hooks: &mut Hooks<'_>, props: &Props) -> Result<Element, ComponentError>;
}

impl<F> Component for F
where
    F: Fn(&mut Hooks<'_>, &Props) -> Result<Element, ComponentError> + 'static,
{
    fn render(&self, hooks: &mut Hooks<'_>, props: &Props) -> Result<Element, ComponentError> {
        self(hooks, props)
    }
}

/// Type-erased component together with its identity.
///
/// Two component types are the same when they come from the same Rust type,
/// so a fiber keeps its state across renders of the same function.
#[derive(Clone)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
    render: Rc<dyn Component>,
}

impl ComponentType {
    pub fn new<C: Component>(component: C) -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
            render: Rc::new(component),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn same_type(&self, other: &ComponentType) -> bool {
        self.id == other.id
    }

    pub(crate) fn render(
        &self,
        hooks: &mut Hooks<'_>,
        props: &Props,
    ) -> Result<Element, ComponentError> {
        self.render.render(hooks, props)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Clone, Default)]
pub enum Element {
    Host {
        tag: Rc<str>,
        props: Props,
        key: Option<Key>,
    },
    Component {
        component: ComponentType,
        props: Props,
        key: Option<Key>,
    },
    Text(Rc<str>),
    #[default]
    Empty,
    List(Vec<Element>),
}

impl Element {
    /// Attaches a reconciliation key, hashed from any keyable value.
    pub fn with_key<K: Hash + ?Sized>(mut self, value: &K) -> Self {
        let hashed = hash_key(value);
        match &mut self {
            Element::Host { key, .. } | Element::Component { key, .. } => *key = Some(hashed),
            _ => log::warn!("key ignored on a text, empty or list element"),
        }
        self
    }

    pub fn key(&self) -> Option<Key> {
        match self {
            Element::Host { key, .. } | Element::Component { key, .. } => *key,
            _ => None,
        }
    }

    pub fn props(&self) -> Option<&Props> {
        match self {
            Element::Host { props, .. } | Element::Component { props, .. } => Some(props),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Element::Empty)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Host { tag, props, key } => f
                .debug_struct("Host")
                .field("tag", tag)
                .field("key", key)
                .field("props", props)
                .finish(),
            Element::Component {
                component,
                props,
                key,
            } => f
                .debug_struct("Component")
                .field("component", component)
                .field("key", key)
                .field("props", props)
                .finish(),
            Element::Text(text) => write!(f, "Text({text:?})"),
            Element::Empty => f.write_str("Empty"),
            Element::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::Text(Rc::from(value))
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::Text(Rc::from(value))
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Element::Text(Rc::from(value.to_string()))
    }
}

impl From<i32> for Element {
    fn from(value: i32) -> Self {
        Element::Text(Rc::from(value.to_string()))
    }
}

impl From<()> for Element {
    fn from(_: ()) -> Self {
        Element::Empty
    }
}

/// Booleans render nothing, so `cond.then(..)`-style children can be mixed in.
impl From<bool> for Element {
    fn from(_: bool) -> Self {
        Element::Empty
    }
}

impl From<Option<Element>> for Element {
    fn from(value: Option<Element>) -> Self {
        value.unwrap_or(Element::Empty)
    }
}

impl From<Vec<Element>> for Element {
    fn from(items: Vec<Element>) -> Self {
        Element::List(items)
    }
}

/// Host element factory.
pub fn h(tag: &str, props: Props) -> Element {
    Element::Host {
        tag: Rc::from(tag),
        props,
        key: None,
    }
}

pub fn text(value: impl Into<Rc<str>>) -> Element {
    Element::Text(value.into())
}

/// Component element factory.
pub fn component<F>(render: F, props: Props) -> Element
where
    F: Fn(&mut Hooks<'_>, &Props) -> Result<Element, ComponentError> + 'static,
{
    Element::Component {
        component: ComponentType::new(render),
        props,
        key: None,
    }
}

#[cfg(test)]
#[path = "tests/element_tests.rs"]
mod tests;
