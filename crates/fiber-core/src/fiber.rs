//! Fiber records and the arena that owns both trees.
//!
//! The current tree and the work-in-progress tree live in one `SlotMap`.
//! Fibers point at each other through generation-checked [`FiberId`]s, so a
//! dispatcher that outlives its fiber fails lookup instead of aliasing a new one.

use std::rc::Rc;

use slotmap::SlotMap;

use crate::element::{ComponentType, Element, Props};
use crate::expiration::ExpirationTime;
use crate::hooks::Hook;
use crate::update_queue::UpdateQueue;
use crate::{Key, NodeId};

slotmap::new_key_type! {
    pub struct FiberId;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FiberTag {
    HostRoot,
    HostComponent,
    HostText,
    FunctionComponent,
}

impl FiberTag {
    pub fn is_host(self) -> bool {
        matches!(self, FiberTag::HostComponent | FiberTag::HostText)
    }

    /// Fibers whose instance can hold host children.
    pub fn is_host_parent(self) -> bool {
        matches!(self, FiberTag::HostComponent | FiberTag::HostRoot)
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct FiberFlags: u16 {
        const PERFORMED_WORK = 1 << 0;
        const PLACEMENT = 1 << 1;
        const UPDATE = 1 << 2;
        const DELETION = 1 << 3;
        const PASSIVE = 1 << 4;
    }
}

impl FiberFlags {
    /// Flags that put a fiber on its parent's effect list.
    pub const SIDE_EFFECTS: FiberFlags = FiberFlags::PLACEMENT
        .union(FiberFlags::UPDATE)
        .union(FiberFlags::DELETION)
        .union(FiberFlags::PASSIVE);
}

#[derive(Clone)]
pub(crate) enum FiberType {
    None,
    Host(Rc<str>),
    Component(ComponentType),
}

#[derive(Clone)]
pub(crate) enum FiberProps {
    Root,
    Element(Props),
    Text(Rc<str>),
}

impl FiberProps {
    pub(crate) fn ptr_eq(&self, other: &FiberProps) -> bool {
        match (self, other) {
            (FiberProps::Root, FiberProps::Root) => true,
            (FiberProps::Element(a), FiberProps::Element(b)) => a.ptr_eq(b),
            (FiberProps::Text(a), FiberProps::Text(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn props(&self) -> Option<&Props> {
        match self {
            FiberProps::Element(props) => Some(props),
            _ => None,
        }
    }

    pub(crate) fn text(&self) -> Option<&Rc<str>> {
        match self {
            FiberProps::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Attribute writes computed during complete and applied during commit.
pub(crate) type PropertyPatch = Vec<(String, Option<crate::element::PropValue>)>;

pub(crate) struct Fiber {
    pub(crate) tag: FiberTag,
    pub(crate) kind: FiberType,
    pub(crate) key: Option<Key>,
    pub(crate) pending_props: FiberProps,
    pub(crate) memoized_props: Option<FiberProps>,
    /// Rendered element of a host root.
    pub(crate) memoized_state: Option<Element>,
    pub(crate) update_queue: Option<UpdateQueue<Element, Element>>,
    pub(crate) hooks: Vec<Hook>,

    pub(crate) return_fiber: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) index: usize,
    pub(crate) alternate: Option<FiberId>,

    /// Host instance, or the container for a host root.
    pub(crate) state_node: Option<NodeId>,

    pub(crate) flags: FiberFlags,
    pub(crate) first_effect: Option<FiberId>,
    pub(crate) last_effect: Option<FiberId>,
    pub(crate) next_effect: Option<FiberId>,
    pub(crate) update_payload: Option<PropertyPatch>,

    pub(crate) expiration_time: ExpirationTime,
    pub(crate) child_expiration_time: ExpirationTime,
}

impl Fiber {
    pub(crate) fn new(
        tag: FiberTag,
        kind: FiberType,
        key: Option<Key>,
        pending_props: FiberProps,
    ) -> Self {
        Self {
            tag,
            kind,
            key,
            pending_props,
            memoized_props: None,
            memoized_state: None,
            update_queue: None,
            hooks: Vec::new(),
            return_fiber: None,
            child: None,
            sibling: None,
            index: 0,
            alternate: None,
            state_node: None,
            flags: FiberFlags::empty(),
            first_effect: None,
            last_effect: None,
            next_effect: None,
            update_payload: None,
            expiration_time: ExpirationTime::NO_WORK,
            child_expiration_time: ExpirationTime::NO_WORK,
        }
    }

    /// Builds a fresh fiber for `element`, or `None` for elements that
    /// produce no fiber.
    pub(crate) fn from_element(element: &Element) -> Option<Self> {
        match element {
            Element::Host { tag, props, key } => Some(Fiber::new(
                FiberTag::HostComponent,
                FiberType::Host(Rc::clone(tag)),
                *key,
                FiberProps::Element(props.clone()),
            )),
            Element::Component {
                component,
                props,
                key,
            } => Some(Fiber::new(
                FiberTag::FunctionComponent,
                FiberType::Component(component.clone()),
                *key,
                FiberProps::Element(props.clone()),
            )),
            Element::Text(text) => Some(Fiber::new(
                FiberTag::HostText,
                FiberType::None,
                None,
                FiberProps::Text(Rc::clone(text)),
            )),
            Element::Empty => None,
            Element::List(_) => {
                log::warn!("nested element lists are not supported; skipping");
                None
            }
        }
    }

    /// Whether this fiber can be reused to render `element`.
    pub(crate) fn matches_element(&self, element: &Element) -> bool {
        match (&self.kind, element) {
            (FiberType::Host(tag), Element::Host { tag: next, .. }) => tag == next,
            (FiberType::Component(component), Element::Component { component: next, .. }) => {
                component.same_type(next)
            }
            _ => false,
        }
    }

    pub(crate) fn has_pending_work(&self, render_time: ExpirationTime) -> bool {
        render_time.includes(self.expiration_time)
    }

    pub(crate) fn describe(&self) -> String {
        match (&self.kind, &self.pending_props) {
            (FiberType::Host(tag), _) => format!("<{tag}>"),
            (FiberType::Component(component), _) => component.name().to_string(),
            (_, FiberProps::Text(text)) => format!("{text:?}"),
            _ => "root".to_string(),
        }
    }
}

pub(crate) type FiberArena = SlotMap<FiberId, Fiber>;

/// Returns the work-in-progress twin of `current`, reusing its alternate when
/// one exists. The twin starts with clean flags and effect links.
pub(crate) fn create_work_in_progress(
    arena: &mut FiberArena,
    current_id: FiberId,
    pending_props: FiberProps,
) -> FiberId {
    let current = &arena[current_id];
    let mut next = Fiber::new(current.tag, current.kind.clone(), current.key, pending_props);
    next.memoized_props = current.memoized_props.clone();
    next.memoized_state = current.memoized_state.clone();
    next.update_queue = current.update_queue.as_ref().map(UpdateQueue::fork);
    next.hooks = current.hooks.clone();
    next.child = current.child;
    next.sibling = current.sibling;
    next.index = current.index;
    next.state_node = current.state_node;
    next.expiration_time = current.expiration_time;
    next.child_expiration_time = current.child_expiration_time;
    next.return_fiber = current.return_fiber;
    next.alternate = Some(current_id);

    let reusable = current.alternate.filter(|id| arena.contains_key(*id));
    match reusable {
        Some(wip) => {
            arena[wip] = next;
            wip
        }
        None => {
            let wip = arena.insert(next);
            arena[current_id].alternate = Some(wip);
            wip
        }
    }
}

/// Collects `first` and its following siblings.
pub(crate) fn siblings(arena: &FiberArena, first: Option<FiberId>) -> Vec<FiberId> {
    let mut out = Vec::new();
    let mut cursor = first;
    while let Some(id) = cursor {
        out.push(id);
        cursor = arena[id].sibling;
    }
    out
}

#[cfg(test)]
#[path = "tests/fiber_tests.rs"]
mod tests;
