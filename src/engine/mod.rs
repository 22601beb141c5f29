//! Engine - Render nodes, their arena, and the per-root engine state.
//!
//! The engine manages the core data structures:
//! - Node: one buffer of one tree position ([`RenderNode`])
//! - Arena: generational slot storage addressed by [`NodeId`]
//! - UpdateQueue: batched, prioritised state updates for roots and classes
//! - Engine: everything one root needs to render and commit
//!
//! # Architecture
//!
//! Nodes are NOT objects holding pointers. They are slots in an arena and
//! refer to each other by id:
//!
//! ```text
//! #0v0 HostRoot   child=#1v0            alternate=#5v0
//! #1v0 div        child=#2v0 parent=#0  alternate=#6v0
//! #2v0 "hello"    sibling=#3 parent=#1
//! #3v0 button     parent=#1
//! ```
//!
//! The work loop, child reconciler and commit engine are `impl Engine`
//! blocks in their own modules.

mod arena;
mod node;
mod update_queue;

pub use arena::*;
pub use node::*;
pub use update_queue::*;

use std::rc::{Rc, Weak};

use crate::config::ReconcilerConfig;
use crate::error::ReconcileError;
use crate::host::{HostConfig, HostHandle};
use crate::lanes::{Lanes, RootLanes, TransitionLanes};
use crate::primitives::{Node, Props};
use crate::root::Shared;
use crate::scheduler::TaskHandle;

/// A root callback registered with the scheduler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScheduledCallback {
    pub handle: TaskHandle,
    pub priority: Lanes,
}

/// A committed tree whose passive effects have not run yet.
pub(crate) struct PendingPassive {
    pub finished: NodeId,
    pub lanes: Lanes,
    /// Roots of subtrees deleted by the commit; released after their
    /// passive cleanups run.
    pub deletions: Vec<NodeId>,
    pub task: Option<TaskHandle>,
}

/// State of one root: its tree, its lanes, and the render in progress.
pub(crate) struct Engine {
    pub arena: NodeArena,
    pub host: Rc<dyn HostConfig>,
    pub config: ReconcilerConfig,
    pub shared: Weak<Shared>,
    pub container: HostHandle,

    /// The HostRoot buffer currently on screen.
    pub current: NodeId,
    pub root_lanes: RootLanes,
    pub callback: Option<ScheduledCallback>,
    pub transitions: TransitionLanes,

    // Work loop
    pub wip_root: Option<NodeId>,
    pub work_in_progress: Option<NodeId>,
    pub render_lanes: Lanes,

    // Commit
    pub pending_passive: Option<PendingPassive>,
    pub nested_updates: u32,
    pub error: Option<ReconcileError>,
}

impl Engine {
    pub(crate) fn new(
        host: Rc<dyn HostConfig>,
        container: HostHandle,
        config: ReconcilerConfig,
        shared: Weak<Shared>,
    ) -> Self {
        let mut arena = NodeArena::new();
        let mut root = RenderNode::new(WorkTag::HostRoot, Props::default(), None);
        root.state_node = StateNode::Container(container);
        root.memoized_state = MemoizedState::Root(Node::Empty);
        root.update_queue = NodeQueue::Root(UpdateQueue::new(Node::Empty));
        let current = arena.allocate(root);

        Self {
            arena,
            host,
            config,
            shared,
            container,
            current,
            root_lanes: RootLanes::default(),
            callback: None,
            transitions: TransitionLanes::default(),
            wip_root: None,
            work_in_progress: None,
            render_lanes: Lanes::empty(),
            pending_passive: None,
            nested_updates: 0,
            error: None,
        }
    }

    /// Record `lane` on `node` and `child_lanes` on every ancestor.
    ///
    /// Returns false when the walk does not end at this root (the node was
    /// deleted or its id is stale), in which case nothing is scheduled.
    pub(crate) fn mark_update_lane_from_node_to_root(&mut self, node: NodeId, lane: Lanes) -> bool {
        let Some(source) = self.arena.get_mut(node) else {
            return false;
        };
        source.lanes |= lane;
        let alternate = source.alternate;
        if let Some(alternate) = alternate.and_then(|id| self.arena.get_mut(id)) {
            alternate.lanes |= lane;
        }

        let mut top = node;
        let mut parent = self.arena[node].parent;
        while let Some(id) = parent {
            let Some(ancestor) = self.arena.get_mut(id) else {
                return false;
            };
            ancestor.child_lanes |= lane;
            let alternate = ancestor.alternate;
            if let Some(alternate) = alternate.and_then(|id| self.arena.get_mut(id)) {
                alternate.child_lanes |= lane;
            }
            top = id;
            parent = self.arena[id].parent;
        }

        if self.arena[top].tag != WorkTag::HostRoot {
            return false;
        }
        self.root_lanes.mark_updated(lane);
        true
    }

    /// The buffer of `node` that is not `node`.
    pub(crate) fn alternate_of(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node).and_then(|n| n.alternate)
    }

    /// True when either buffer of `node` has pending lanes.
    pub(crate) fn has_pending_lanes(&self, node: NodeId) -> bool {
        let own = self.arena.get(node).map_or(Lanes::empty(), |n| n.lanes);
        let alternate = self
            .alternate_of(node)
            .and_then(|id| self.arena.get(id))
            .map_or(Lanes::empty(), |n| n.lanes);
        !own.is_empty() || !alternate.is_empty()
    }
}
