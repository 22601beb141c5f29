//! Mutation phase - deletions, placements, and host updates.

use crate::engine::{Engine, Flags, NodeId, NodeQueue, StateNode, WorkTag};
use crate::error::{ReconcileError, ReconcileResult};
use crate::hooks::{HookFlags, commit_unmount};
use crate::host::HostHandle;
use crate::primitives::ElementType;

use super::class_instance;

/// Where host children of a subtree are attached.
#[derive(Debug, Clone, Copy)]
enum HostParent {
    Instance(HostHandle),
    Container(HostHandle),
}

impl Engine {
    pub(super) fn commit_mutation_effects(&mut self, node: NodeId, deleted: &mut Vec<NodeId>) -> ReconcileResult<()> {
        let deletions = std::mem::take(&mut self.arena[node].deletions);
        for child in deletions {
            self.commit_deletion(node, child)?;
            deleted.push(child);
        }

        if self.arena[node].subtree_flags.intersects(Flags::MUTATION_MASK) {
            for child in self.arena.children(node) {
                self.commit_mutation_effects(child, deleted)?;
            }
        }

        if self.arena[node].flags.contains(Flags::PLACEMENT) {
            self.commit_placement(node)?;
            self.arena[node].flags.remove(Flags::PLACEMENT);
        }

        let flags = self.arena[node].flags;
        match self.arena[node].tag {
            WorkTag::FunctionComponent if flags.contains(Flags::UPDATE) => {
                if let NodeQueue::Effects(effects) = &self.arena[node].update_queue {
                    commit_unmount(effects, HookFlags::LAYOUT | HookFlags::HAS_EFFECT);
                }
            }
            WorkTag::HostComponent => self.commit_host_update(node, flags),
            WorkTag::HostText if flags.contains(Flags::UPDATE) => {
                let entry = &self.arena[node];
                if let (Some(instance), Some(current)) = (entry.state_node.host(), entry.alternate) {
                    let old = self.arena[current].memoized_props.text();
                    tracing::trace!(?instance, "commit text update");
                    self.host.commit_text_update(instance, old, entry.memoized_props.text());
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn commit_host_update(&mut self, node: NodeId, flags: Flags) {
        let Some(instance) = self.arena[node].state_node.host() else {
            return;
        };
        if flags.contains(Flags::CONTENT_RESET) {
            self.host.reset_text_content(instance);
            self.arena[node].flags.remove(Flags::CONTENT_RESET);
        }
        if !flags.contains(Flags::UPDATE) {
            return;
        }

        let payload = match &mut self.arena[node].update_queue {
            NodeQueue::Host(payload) => payload.take(),
            _ => None,
        };
        let (Some(payload), Some(current)) = (payload, self.arena[node].alternate) else {
            return;
        };
        let entry = &self.arena[node];
        let tag = match &entry.element_type {
            Some(ElementType::Host(tag)) => tag.clone(),
            _ => return,
        };
        tracing::trace!(?instance, %tag, changes = payload.changes.len(), "commit update");
        self.host.commit_update(
            instance,
            &payload,
            &tag,
            &self.arena[current].memoized_props,
            &entry.memoized_props,
        );
    }

    // =========================================================================
    // Placement
    // =========================================================================

    fn commit_placement(&mut self, node: NodeId) -> ReconcileResult<()> {
        let parent = self.arena[node].parent;
        let Some((parent_node, host_parent)) = parent.and_then(|p| self.find_host_parent(p)) else {
            return Err(ReconcileError::HostParentNotFound(node));
        };

        if self.arena[parent_node].flags.contains(Flags::CONTENT_RESET) {
            if let HostParent::Instance(instance) = host_parent {
                self.host.reset_text_content(instance);
            }
            self.arena[parent_node].flags.remove(Flags::CONTENT_RESET);
        }

        let before = self.get_host_sibling(node);
        self.insert_or_append(node, before, host_parent);
        Ok(())
    }

    /// The nearest host ancestor, starting at `start` itself.
    fn find_host_parent(&self, start: NodeId) -> Option<(NodeId, HostParent)> {
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            let node = self.arena.get(id)?;
            match (node.tag, &node.state_node) {
                (WorkTag::HostComponent, StateNode::Host(handle)) => {
                    return Some((id, HostParent::Instance(*handle)));
                }
                (WorkTag::HostRoot, StateNode::Container(handle)) => {
                    return Some((id, HostParent::Container(*handle)));
                }
                _ => cursor = node.parent,
            }
        }
        None
    }

    /// The host instance to insert before, or `None` to append.
    ///
    /// Searches forward through siblings (descending into components and
    /// climbing out of them) for the first host node that is not itself
    /// being placed in this commit.
    fn get_host_sibling(&self, start: NodeId) -> Option<HostHandle> {
        let mut node = start;
        'siblings: loop {
            while self.arena[node].sibling.is_none() {
                match self.arena[node].parent {
                    Some(parent) if !self.arena[parent].tag.is_host_parent() => node = parent,
                    _ => return None,
                }
            }
            node = self.arena[node].sibling?;

            while !self.arena[node].tag.is_host() {
                let entry = &self.arena[node];
                if entry.flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match entry.child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }

            let entry = &self.arena[node];
            if !entry.flags.contains(Flags::PLACEMENT) {
                if let Some(instance) = entry.state_node.host() {
                    return Some(instance);
                }
            }
        }
    }

    fn insert_or_append(&self, node: NodeId, before: Option<HostHandle>, parent: HostParent) {
        let entry = &self.arena[node];
        if entry.tag.is_host() {
            let Some(child) = entry.state_node.host() else {
                return;
            };
            tracing::trace!(?child, ?before, ?parent, "place");
            match (parent, before) {
                (HostParent::Instance(parent), Some(before)) => self.host.insert_before(parent, child, before),
                (HostParent::Instance(parent), None) => self.host.append_child(parent, child),
                (HostParent::Container(container), Some(before)) => {
                    self.host.insert_in_container_before(container, child, before)
                }
                (HostParent::Container(container), None) => self.host.append_child_to_container(container, child),
            }
            return;
        }

        let mut child = entry.child;
        while let Some(id) = child {
            self.insert_or_append(id, before, parent);
            child = self.arena[id].sibling;
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn commit_deletion(&mut self, parent: NodeId, deleted: NodeId) -> ReconcileResult<()> {
        let Some((_, host_parent)) = self.find_host_parent(parent) else {
            return Err(ReconcileError::HostParentNotFound(deleted));
        };
        tracing::trace!(node = ?deleted, label = %self.arena[deleted].label(), "delete");
        self.commit_deletion_effects(deleted, Some(host_parent));

        // Detach both buffers so late walks up from inside the subtree stop.
        self.arena[deleted].parent = None;
        if let Some(alternate) = self.arena[deleted].alternate {
            if let Some(alt) = self.arena.get_mut(alternate) {
                alt.parent = None;
            }
        }
        Ok(())
    }

    /// Remove the topmost host nodes of a deleted subtree from `host_parent`
    /// and run unmount work for every component in it. `host_parent` is
    /// `None` below a removed host node.
    fn commit_deletion_effects(&self, node: NodeId, host_parent: Option<HostParent>) {
        let entry = &self.arena[node];
        let mut below = host_parent;
        match entry.tag {
            WorkTag::HostComponent | WorkTag::HostText => {
                if let (Some(parent), Some(child)) = (host_parent, entry.state_node.host()) {
                    match parent {
                        HostParent::Instance(parent) => self.host.remove_child(parent, child),
                        HostParent::Container(container) => self.host.remove_child_from_container(container, child),
                    }
                }
                below = None;
            }
            WorkTag::FunctionComponent => {
                if let NodeQueue::Effects(effects) = &entry.update_queue {
                    commit_unmount(effects, HookFlags::LAYOUT);
                }
            }
            WorkTag::ClassComponent => {
                if let Some(instance) = class_instance(&entry.state_node) {
                    instance.borrow_mut().will_unmount();
                }
            }
            WorkTag::HostRoot | WorkTag::Fragment => {}
        }

        let mut child = entry.child;
        while let Some(id) = child {
            self.commit_deletion_effects(id, below);
            child = self.arena[id].sibling;
        }
    }
}
