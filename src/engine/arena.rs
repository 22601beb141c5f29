//! Node Arena - Slot allocation for render nodes.
//!
//! Manages the lifecycle of node slots:
//! - Free slot pool for O(1) reuse
//! - Generation counter per slot so released ids go stale
//! - Alternate pairing and subtree release
//!
//! Nodes reference each other by [`NodeId`], never by pointer, so the
//! cyclic `alternate` and `parent` links need no shared ownership.

use std::ops::{Index, IndexMut};

use crate::primitives::Props;

use super::node::{Flags, NodeId, RenderNode};

struct Slot {
    generation: u32,
    node: Option<RenderNode>,
}

/// What a render changed in nodes it does not own.
#[derive(Default)]
struct Journal {
    allocated: Vec<NodeId>,
    /// Previous `parent` of every node relinked, oldest first.
    parents: Vec<(NodeId, Option<NodeId>)>,
}

/// Storage for every node buffer of one root.
#[derive(Default)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    journal: Option<Journal>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Store a node and return its id. Reuses a freed slot when possible.
    pub fn allocate(&mut self, node: RenderNode) -> NodeId {
        self.live += 1;
        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        };
        if let Some(journal) = &mut self.journal {
            journal.allocated.push(id);
        }
        id
    }

    /// Point `id` at `parent`. While a journal is open the old link is
    /// recorded, so committed nodes relinked under a discarded buffer get
    /// their parent back.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        let previous = std::mem::replace(&mut self[id].parent, parent);
        if let Some(journal) = &mut self.journal {
            journal.parents.push((id, previous));
        }
    }

    /// Start recording allocations, so a render that fails can give back
    /// every buffer it created.
    pub fn begin_journal(&mut self) {
        self.journal = Some(Journal::default());
    }

    /// Stop recording and keep what was allocated.
    pub fn end_journal(&mut self) {
        self.journal = None;
    }

    /// Stop recording, restore every relinked parent and release everything
    /// allocated since [`begin_journal`](Self::begin_journal). Buffers paired
    /// with a surviving node are unpaired first.
    pub fn discard_journal(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for (id, parent) in journal.parents.into_iter().rev() {
            if let Some(node) = self.get_mut(id) {
                node.parent = parent;
            }
        }
        for id in journal.allocated {
            if let Some(node) = self.release(id) {
                if let Some(partner) = node.alternate.and_then(|alt| self.get_mut(alt)) {
                    partner.alternate = None;
                }
            }
        }
    }

    /// Free one slot. Stale ids are ignored.
    pub fn release(&mut self, id: NodeId) -> Option<RenderNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    /// Free a subtree and every alternate inside it.
    ///
    /// Walks `child`/`sibling` of the given buffer and its alternate, so
    /// both generations of every descendant are returned to the pool.
    pub fn release_subtree(&mut self, root: NodeId) {
        let root_alternate = self.get(root).and_then(|n| n.alternate);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.release(id) else {
                continue;
            };
            if let Some(alternate) = node.alternate {
                if let Some(alt) = self.get_mut(alternate) {
                    alt.alternate = None;
                }
                stack.push(alternate);
            }
            if let Some(child) = node.child {
                stack.push(child);
            }
            // The root of the released subtree keeps its siblings alive.
            if id != root && Some(id) != root_alternate {
                if let Some(sibling) = node.sibling {
                    stack.push(sibling);
                }
            }
        }
    }

    /// The work-in-progress buffer for `current`, with `props` pending.
    ///
    /// Reuses the alternate slot when there is one, so a position never owns
    /// more than two buffers. Everything but effects is copied from `current`.
    pub fn work_in_progress(&mut self, current: NodeId, props: Props) -> NodeId {
        let wip = match self[current].alternate {
            Some(alternate) => {
                let node = &mut self[alternate];
                node.pending_props = props;
                node.flags = Flags::empty();
                node.subtree_flags = Flags::empty();
                node.deletions.clear();
                alternate
            }
            None => {
                let source = &self[current];
                let mut node = RenderNode::new(source.tag, props, source.key.clone());
                node.element_type = source.element_type.clone();
                node.state_node = source.state_node.clone();
                node.alternate = Some(current);
                let id = self.allocate(node);
                self[current].alternate = Some(id);
                id
            }
        };

        let source = &self[current];
        let child = source.child;
        let sibling = source.sibling;
        let index = source.index;
        let lanes = source.lanes;
        let child_lanes = source.child_lanes;
        let memoized_props = source.memoized_props.clone();
        let memoized_state = source.memoized_state.clone();
        let update_queue = source.update_queue.clone();
        let state_node = source.state_node.clone();

        let node = &mut self[wip];
        node.child = child;
        node.sibling = sibling;
        node.index = index;
        node.lanes = lanes;
        node.child_lanes = child_lanes;
        node.memoized_props = memoized_props;
        node.memoized_state = memoized_state;
        node.update_queue = update_queue;
        node.state_node = state_node;
        wip
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn get(&self, id: NodeId) -> Option<&RenderNode> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut RenderNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live node buffers.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Children of a node in sibling order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut child = self[id].child;
        while let Some(c) = child {
            out.push(c);
            child = self[c].sibling;
        }
        out
    }
}

impl Index<NodeId> for NodeArena {
    type Output = RenderNode;

    fn index(&self, id: NodeId) -> &RenderNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node id {id:?}"),
        }
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut RenderNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale node id {id:?}"),
        }
    }
}
