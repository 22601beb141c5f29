//! Complete phase - host instances and bubbling.

use crate::engine::{Engine, Flags, NodeId, NodeQueue, StateNode, WorkTag};
use crate::error::{ReconcileError, ReconcileResult};
use crate::host::HostHandle;
use crate::lanes::Lanes;
use crate::primitives::{ElementType, Props};

impl Engine {
    pub(super) fn complete_work(&mut self, current: Option<NodeId>, wip: NodeId) -> ReconcileResult<()> {
        match self.arena[wip].tag {
            WorkTag::HostComponent => self.complete_host_component(current, wip)?,
            WorkTag::HostText => self.complete_host_text(current, wip),
            WorkTag::HostRoot => {
                let first_mount = current.is_none_or(|c| self.arena[c].child.is_none());
                if first_mount && self.arena[wip].child.is_some() {
                    // Start from an empty container on first mount.
                    self.arena[wip].flags |= Flags::SNAPSHOT;
                }
            }
            WorkTag::FunctionComponent | WorkTag::ClassComponent | WorkTag::Fragment => {}
        }
        self.bubble_properties(current, wip);
        Ok(())
    }

    fn complete_host_component(&mut self, current: Option<NodeId>, wip: NodeId) -> ReconcileResult<()> {
        let tag = match &self.arena[wip].element_type {
            Some(ElementType::Host(tag)) => tag.clone(),
            _ => return Ok(()),
        };
        let new_props = self.arena[wip].pending_props.clone();

        if let Some(current) = current {
            if let Some(instance) = self.arena[wip].state_node.host() {
                let old_props = self.arena[current].memoized_props.clone();
                if Props::ptr_eq(&old_props, &new_props) {
                    return Ok(());
                }
                if let Some(payload) = self.host.prepare_update(instance, &tag, &old_props, &new_props) {
                    let node = &mut self.arena[wip];
                    node.update_queue = NodeQueue::Host(Some(payload));
                    node.flags |= Flags::UPDATE;
                }
                return Ok(());
            }
        }

        if self.arena[wip].state_node.host().is_some() {
            return Err(ReconcileError::DoubleMount(wip));
        }

        let instance = self.host.create_instance(&tag, &new_props);
        self.append_all_children(instance, wip);
        self.arena[wip].state_node = StateNode::Host(instance);
        self.host.finalize_initial_children(instance, &tag, &new_props);
        Ok(())
    }

    fn complete_host_text(&mut self, current: Option<NodeId>, wip: NodeId) {
        let new_text = self.arena[wip].pending_props.clone();
        match current {
            Some(current) if self.arena[wip].state_node.host().is_some() => {
                if self.arena[current].memoized_props.text() != new_text.text() {
                    self.arena[wip].flags |= Flags::UPDATE;
                }
            }
            _ => {
                let instance = self.host.create_text_instance(new_text.text());
                self.arena[wip].state_node = StateNode::Host(instance);
            }
        }
    }

    /// Append the topmost host nodes below `wip` to its new instance.
    ///
    /// Components and fragments are looked through; a host child's own
    /// children were appended when that child completed.
    fn append_all_children(&mut self, parent: HostHandle, wip: NodeId) {
        let mut node = self.arena[wip].child;
        while let Some(id) = node {
            let entry = &self.arena[id];
            if entry.tag.is_host() {
                if let Some(child) = entry.state_node.host() {
                    self.host.append_initial_child(parent, child);
                }
            } else if let Some(child) = entry.child {
                node = Some(child);
                continue;
            }

            // Next sibling, climbing out of components as needed.
            let mut cursor = id;
            loop {
                if cursor == wip {
                    return;
                }
                if let Some(sibling) = self.arena[cursor].sibling {
                    node = Some(sibling);
                    break;
                }
                match self.arena[cursor].parent {
                    Some(parent) if parent != wip => cursor = parent,
                    _ => return,
                }
            }
        }
    }

    /// Fold children's lanes and flags into `wip`.
    ///
    /// When the children were skipped (`wip.child` is still the current
    /// child list) their flags belong to an earlier commit and are ignored.
    fn bubble_properties(&mut self, current: Option<NodeId>, wip: NodeId) {
        let did_bailout = current.is_some_and(|c| self.arena[c].child == self.arena[wip].child);

        let mut child_lanes = Lanes::empty();
        let mut subtree_flags = Flags::empty();
        let mut child = self.arena[wip].child;
        while let Some(id) = child {
            let node = &self.arena[id];
            child_lanes |= node.lanes | node.child_lanes;
            if !did_bailout {
                subtree_flags |= node.subtree_flags | node.flags;
            }
            child = node.sibling;
            self.arena.set_parent(id, Some(wip));
        }

        let node = &mut self.arena[wip];
        node.child_lanes = child_lanes;
        node.subtree_flags |= subtree_flags;
    }
}
