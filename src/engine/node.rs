//! RenderNode - One buffer of one logical position in the tree.
//!
//! Every logical position owns up to two nodes: the one on screen
//! ("current") and the one being built ("work in progress"). They point at
//! each other through `alternate`; which one is current is decided by the
//! root, and flips for the whole tree at commit.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::class::ClassInstance;
use crate::hooks::{Effect, Hook};
use crate::host::{HostHandle, UpdatePayload};
use crate::lanes::Lanes;
use crate::primitives::{ElementType, Key, Node, Props};

use super::update_queue::UpdateQueue;

// =============================================================================
// Node identity
// =============================================================================

/// Arena address of a node buffer.
///
/// The generation changes every time a slot is reused, so ids held by
/// dispatch handles of deleted components go stale instead of aliasing a
/// new node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Kind of node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    HostRoot,
    HostComponent,
    HostText,
    FunctionComponent,
    ClassComponent,
    Fragment,
}

impl WorkTag {
    pub fn is_host(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostText)
    }

    /// Nodes that can receive host children.
    pub fn is_host_parent(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostRoot)
    }
}

// =============================================================================
// Flags
// =============================================================================

bitflags::bitflags! {
    /// Side effects a node needs at commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        const PLACEMENT = 1 << 1;
        const UPDATE = 1 << 2;
        const CHILD_DELETION = 1 << 4;
        const CONTENT_RESET = 1 << 5;
        const CALLBACK = 1 << 6;
        const SNAPSHOT = 1 << 10;
        const PASSIVE = 1 << 11;

        const BEFORE_MUTATION_MASK = Self::SNAPSHOT.bits();
        const MUTATION_MASK = Self::PLACEMENT.bits()
            | Self::UPDATE.bits()
            | Self::CHILD_DELETION.bits()
            | Self::CONTENT_RESET.bits();
        const LAYOUT_MASK = Self::UPDATE.bits() | Self::CALLBACK.bits();
        const PASSIVE_MASK = Self::PASSIVE.bits() | Self::CHILD_DELETION.bits();
    }
}

// =============================================================================
// Node payloads
// =============================================================================

/// Type-erased class component state.
pub type ClassState = Rc<dyn Any>;

/// Host object, container, or class instance backing a node.
#[derive(Clone, Default)]
pub enum StateNode {
    #[default]
    None,
    Host(HostHandle),
    Container(HostHandle),
    Class(Rc<RefCell<ClassInstance>>),
}

impl StateNode {
    pub fn host(&self) -> Option<HostHandle> {
        match self {
            StateNode::Host(handle) => Some(*handle),
            _ => None,
        }
    }
}

/// What `memoized_state` holds for each node kind.
#[derive(Clone, Default)]
pub enum MemoizedState {
    #[default]
    None,
    /// State-cell chain of a function component, in call order.
    Hooks(Vec<Hook>),
    /// Element last rendered into a root.
    Root(Node),
    Class(ClassState),
}

impl MemoizedState {
    pub fn hooks(&self) -> Option<&[Hook]> {
        match self {
            MemoizedState::Hooks(hooks) => Some(hooks),
            _ => None,
        }
    }
}

/// What `update_queue` holds for each node kind.
#[derive(Clone, Default)]
pub enum NodeQueue {
    #[default]
    None,
    Root(UpdateQueue<Node>),
    Class(UpdateQueue<ClassState>),
    /// Effects registered by the last render of a function component.
    Effects(Vec<Effect>),
    /// Prepared host update, consumed at commit.
    Host(Option<UpdatePayload>),
}

// =============================================================================
// RenderNode
// =============================================================================

/// One buffer of one logical tree position.
pub struct RenderNode {
    // Identity
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub element_type: Option<ElementType>,
    pub state_node: StateNode,

    // Tree
    pub parent: Option<NodeId>,
    pub child: Option<NodeId>,
    pub sibling: Option<NodeId>,
    pub index: usize,

    // Render
    pub pending_props: Props,
    pub memoized_props: Props,
    pub memoized_state: MemoizedState,
    pub update_queue: NodeQueue,

    // Bookkeeping
    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: Vec<NodeId>,
    pub lanes: Lanes,
    pub child_lanes: Lanes,

    pub alternate: Option<NodeId>,
}

impl RenderNode {
    pub fn new(tag: WorkTag, pending_props: Props, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            state_node: StateNode::None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            memoized_props: pending_props.clone(),
            pending_props,
            memoized_state: MemoizedState::None,
            update_queue: NodeQueue::None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: Vec::new(),
            lanes: Lanes::empty(),
            child_lanes: Lanes::empty(),
            alternate: None,
        }
    }

    /// Human-readable label for logs and errors.
    pub fn label(&self) -> String {
        match (&self.element_type, self.tag) {
            (Some(ty), _) => ty.name().into_owned(),
            (None, WorkTag::HostText) => "#text".to_string(),
            (None, WorkTag::HostRoot) => "#root".to_string(),
            (None, tag) => format!("{tag:?}"),
        }
    }

    /// Text of a text node.
    pub fn text(&self) -> &str {
        self.pending_props.text()
    }
}

impl fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderNode")
            .field("tag", &self.tag)
            .field("label", &self.label())
            .field("key", &self.key)
            .field("flags", &self.flags)
            .field("lanes", &self.lanes)
            .field("child_lanes", &self.child_lanes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks() {
        assert!(Flags::MUTATION_MASK.contains(Flags::PLACEMENT));
        assert!(Flags::MUTATION_MASK.contains(Flags::CHILD_DELETION));
        assert!(!Flags::MUTATION_MASK.contains(Flags::PASSIVE));
        assert!(Flags::PASSIVE_MASK.contains(Flags::CHILD_DELETION));
        assert!(Flags::LAYOUT_MASK.intersects(Flags::UPDATE));
    }

    #[test]
    fn test_new_node_has_no_work() {
        let node = RenderNode::new(WorkTag::HostText, Props::from_children("hi".into()), None);
        assert_eq!(node.text(), "hi");
        assert!(node.flags.is_empty());
        assert!(node.lanes.is_empty());
        assert_eq!(node.label(), "#text");
    }
}
