//! The host side of the reconciler: the tree of platform nodes it mutates.

use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use crate::element::PropValue;
use crate::error::HostError;
use crate::NodeId;

/// Mutation surface the reconciler drives during render and commit.
///
/// Instances are created while rendering, before they are attached anywhere.
/// Every attach, detach and property write happens during commit, except
/// that a freshly created subtree is assembled bottom-up before it is placed.
pub trait HostConfig: Any {
    fn create_instance(&mut self, tag: &str) -> Result<NodeId, HostError>;
    fn create_text_instance(&mut self, text: &str) -> Result<NodeId, HostError>;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError>;
    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), HostError>;
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError>;
    /// `None` removes the property.
    fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: Option<&PropValue>,
    ) -> Result<(), HostError>;
    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), HostError>;
}

/// One recorded call against a [`MemoryHost`].
#[derive(Clone, Debug, PartialEq)]
pub enum HostCall {
    CreateInstance { id: NodeId, tag: String },
    CreateText { id: NodeId, text: String },
    AppendChild { parent: NodeId, child: NodeId },
    InsertBefore { parent: NodeId, child: NodeId, before: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
    SetProperty { node: NodeId, key: String, value: Option<PropValue> },
    SetText { node: NodeId, text: String },
}

impl HostCall {
    pub fn is_create(&self) -> bool {
        matches!(self, HostCall::CreateInstance { .. } | HostCall::CreateText { .. })
    }

    /// Calls that change an attached tree.
    pub fn is_mutation(&self) -> bool {
        !self.is_create()
    }
}

#[derive(Debug)]
enum MemoryNodeKind {
    Container,
    Element { tag: String },
    Text { text: String },
}

#[derive(Debug)]
struct MemoryNode {
    kind: MemoryNodeKind,
    attributes: BTreeMap<String, PropValue>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

/// In-memory host tree that records every call it receives.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<MemoryNode>,
    calls: Vec<HostCall>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root container; not recorded as a call.
    pub fn create_container(&mut self) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(MemoryNode::new(MemoryNodeKind::Container));
        id
    }

    /// Every call recorded since the last [`MemoryHost::take_calls`].
    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    /// Drains the call log.
    pub fn take_calls(&mut self) -> Vec<HostCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of nodes ever created, containers included. Detached nodes are kept.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attached children of `id`, in order.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], HostError> {
        Ok(&self.node(id)?.children)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, HostError> {
        Ok(self.node(id)?.parent)
    }

    /// Element tag, or `None` for text nodes and containers.
    pub fn tag(&self, id: NodeId) -> Result<Option<&str>, HostError> {
        Ok(match &self.node(id)?.kind {
            MemoryNodeKind::Element { tag } => Some(tag),
            _ => None,
        })
    }

    pub fn text(&self, id: NodeId) -> Result<Option<&str>, HostError> {
        Ok(match &self.node(id)?.kind {
            MemoryNodeKind::Text { text } => Some(text),
            _ => None,
        })
    }

    /// Current value of attribute `key` on `id`.
    pub fn attribute(&self, id: NodeId, key: &str) -> Result<Option<&PropValue>, HostError> {
        Ok(self.node(id)?.attributes.get(key))
    }

    /// Serialized children of `container`, in the same format as `render_to_string`.
    pub fn markup(&self, container: NodeId) -> Result<String, HostError> {
        let mut out = String::new();
        for &child in &self.node(container)?.children {
            self.write_markup(child, &mut out)?;
        }
        Ok(out)
    }

    fn write_markup(&self, id: NodeId, out: &mut String) -> Result<(), HostError> {
        let node = self.node(id)?;
        match &node.kind {
            MemoryNodeKind::Text { text } => crate::server::escape_into(text, out),
            MemoryNodeKind::Element { tag } => {
                crate::server::open_tag(tag, node.attributes.iter(), out);
                for &child in &node.children {
                    self.write_markup(child, out)?;
                }
                crate::server::close_tag(tag, out);
            }
            MemoryNodeKind::Container => {
                for &child in &node.children {
                    self.write_markup(child, out)?;
                }
            }
        }
        Ok(())
    }

    /// One line per node under `root`, indented by depth, with node ids.
    pub fn dump_tree(&self, root: NodeId) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, root, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(node) = self.nodes.get(id) else {
            output.push_str(&format!("{indent}[{id}] (missing)\n"));
            return;
        };
        match &node.kind {
            MemoryNodeKind::Container => output.push_str(&format!("{indent}[{id}] container\n")),
            MemoryNodeKind::Element { tag } => {
                output.push_str(&format!("{indent}[{id}] <{tag}> {:?}\n", node.attributes))
            }
            MemoryNodeKind::Text { text } => output.push_str(&format!("{indent}[{id}] {text:?}\n")),
        }
        for &child in &node.children {
            self.dump_node(output, child, depth + 1);
        }
    }

    fn node(&self, id: NodeId) -> Result<&MemoryNode, HostError> {
        self.nodes.get(id).ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes.get_mut(id).ok_or(HostError::Missing { id })
    }

    fn push_node(&mut self, kind: MemoryNodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(MemoryNode::new(kind));
        id
    }

    fn check_container(&self, id: NodeId) -> Result<(), HostError> {
        match self.node(id)?.kind {
            MemoryNodeKind::Text { .. } => Err(HostError::NotAContainer { id }),
            _ => Ok(()),
        }
    }

    fn detach(&mut self, child: NodeId) -> Result<(), HostError> {
        if let Some(previous) = self.node(child)?.parent {
            self.node_mut(previous)?.children.retain(|&id| id != child);
            self.node_mut(child)?.parent = None;
        }
        Ok(())
    }
}

impl HostConfig for MemoryHost {
    fn create_instance(&mut self, tag: &str) -> Result<NodeId, HostError> {
        let id = self.push_node(MemoryNodeKind::Element {
            tag: tag.to_string(),
        });
        self.calls.push(HostCall::CreateInstance {
            id,
            tag: tag.to_string(),
        });
        Ok(id)
    }

    fn create_text_instance(&mut self, text: &str) -> Result<NodeId, HostError> {
        let id = self.push_node(MemoryNodeKind::Text {
            text: text.to_string(),
        });
        self.calls.push(HostCall::CreateText {
            id,
            text: text.to_string(),
        });
        Ok(id)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.check_container(parent)?;
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        self.calls.push(HostCall::AppendChild { parent, child });
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), HostError> {
        self.check_container(parent)?;
        self.detach(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let index = siblings
            .iter()
            .position(|&id| id == before)
            .ok_or(HostError::NotAChild {
                parent,
                child: before,
            })?;
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        self.calls.push(HostCall::InsertBefore {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        self.detach(child)?;
        self.calls.push(HostCall::RemoveChild { parent, child });
        Ok(())
    }

    fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: Option<&PropValue>,
    ) -> Result<(), HostError> {
        let attributes = &mut self.node_mut(node)?.attributes;
        match value {
            Some(value) => attributes.insert(key.to_string(), value.clone()),
            None => attributes.remove(key),
        };
        self.calls.push(HostCall::SetProperty {
            node,
            key: key.to_string(),
            value: value.cloned(),
        });
        Ok(())
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), HostError> {
        match &mut self.node_mut(node)?.kind {
            MemoryNodeKind::Text { text: current } => {
                *current = text.to_string();
            }
            _ => return Err(HostError::NotAContainer { id: node }),
        }
        self.calls.push(HostCall::SetText {
            node,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Type-erased access to the host owned by a renderer.
pub trait HostHolder {
    fn borrow_dyn(&self) -> RefMut<'_, dyn HostConfig>;
}

pub struct ConcreteHost<H: HostConfig> {
    inner: RefCell<H>,
}

impl<H: HostConfig> ConcreteHost<H> {
    pub fn new(host: H) -> Self {
        Self {
            inner: RefCell::new(host),
        }
    }

    pub fn borrow_typed(&self) -> RefMut<'_, H> {
        self.inner.borrow_mut()
    }

    pub fn try_borrow_typed(&self) -> Result<RefMut<'_, H>, std::cell::BorrowMutError> {
        self.inner.try_borrow_mut()
    }

    pub fn into_inner(self) -> H {
        self.inner.into_inner()
    }
}

impl<H: HostConfig> HostHolder for ConcreteHost<H> {
    fn borrow_dyn(&self) -> RefMut<'_, dyn HostConfig> {
        RefMut::map(self.inner.borrow_mut(), |host| host as &mut dyn HostConfig)
    }
}

/// Mutable access to the concrete host. Drop it before dispatching updates.
pub struct HostGuard<'a, H: HostConfig> {
    inner: RefMut<'a, H>,
}

impl<'a, H: HostConfig> HostGuard<'a, H> {
    pub(crate) fn new(inner: RefMut<'a, H>) -> Self {
        Self { inner }
    }
}

impl<H: HostConfig> Deref for HostGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<H: HostConfig> DerefMut for HostGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
#[path = "tests/host_tests.rs"]
mod tests;
