//! Begin phase - render one node and reconcile its children.

use std::cell::RefCell;
use std::rc::Rc;

use crate::class::UpdateTarget;
use crate::engine::{
    ClassState, Engine, Flags, MemoizedState, NodeId, NodeQueue, StateNode, UpdateQueue, WorkTag,
};
use crate::error::{ReconcileError, ReconcileResult};
use crate::hooks::{Hook, Hooks};
use crate::lanes::Lanes;
use crate::primitives::{ElementType, Node, Props};
use crate::reconciler::ChildReconciler;
use crate::root::RenderingNode;

impl Engine {
    /// Returns the next node to begin, or `None` to complete this one.
    pub(super) fn begin_work(&mut self, current: Option<NodeId>, wip: NodeId) -> ReconcileResult<Option<NodeId>> {
        let render_lanes = self.render_lanes;

        let mut props_changed = true;
        if let Some(current) = current {
            props_changed = !Props::ptr_eq(&self.arena[current].memoized_props, &self.arena[wip].pending_props);
            if !props_changed && !self.arena[wip].lanes.includes_some(render_lanes) {
                return Ok(self.bailout_on_already_finished_work(wip));
            }
        }

        self.arena[wip].lanes = Lanes::empty();

        match self.arena[wip].tag {
            WorkTag::HostRoot => self.update_host_root(current, wip),
            WorkTag::HostComponent => Ok(self.update_host_component(current, wip)),
            WorkTag::HostText => Ok(None),
            WorkTag::FunctionComponent => self.update_function_component(current, wip, props_changed),
            WorkTag::ClassComponent => self.update_class_component(current, wip, props_changed),
            WorkTag::Fragment => {
                let children = self.arena[wip].pending_props.children().clone();
                Ok(self.reconcile_children(current, wip, &children))
            }
        }
    }

    /// Skip a node. Its subtree is skipped too unless a descendant has work
    /// in this render, in which case the children are cloned and visited.
    fn bailout_on_already_finished_work(&mut self, wip: NodeId) -> Option<NodeId> {
        if !self.arena[wip].child_lanes.includes_some(self.render_lanes) {
            tracing::trace!(node = ?wip, "bail out subtree");
            return None;
        }
        self.clone_child_nodes(wip);
        self.arena[wip].child
    }

    fn clone_child_nodes(&mut self, wip: NodeId) {
        let Some(first) = self.arena[wip].child else {
            return;
        };

        let props = self.arena[first].pending_props.clone();
        let mut new_child = self.arena.work_in_progress(first, props);
        self.arena[wip].child = Some(new_child);
        self.arena.set_parent(new_child, Some(wip));

        let mut current_child = first;
        while let Some(next) = self.arena[current_child].sibling {
            current_child = next;
            let props = self.arena[next].pending_props.clone();
            let cloned = self.arena.work_in_progress(next, props);
            self.arena[new_child].sibling = Some(cloned);
            self.arena.set_parent(cloned, Some(wip));
            new_child = cloned;
        }
        self.arena[new_child].sibling = None;
    }

    fn reconcile_children(&mut self, current: Option<NodeId>, wip: NodeId, next: &Node) -> Option<NodeId> {
        let current_first = current.and_then(|c| self.arena[c].child);
        let first = ChildReconciler::new(&mut self.arena, wip, self.render_lanes, current.is_some())
            .reconcile(current_first, next);
        self.arena[wip].child = first;
        first
    }

    // =========================================================================
    // Host nodes
    // =========================================================================

    fn update_host_root(&mut self, current: Option<NodeId>, wip: NodeId) -> ReconcileResult<Option<NodeId>> {
        let mut queue = match std::mem::take(&mut self.arena[wip].update_queue) {
            NodeQueue::Root(queue) => queue,
            _ => UpdateQueue::new(Node::Empty),
        };
        self.absorb_root_updates(current, &mut queue);

        let props = self.arena[wip].pending_props.clone();
        let processed = queue.process(&props, self.render_lanes);
        let previous = match current.map(|c| &self.arena[c].memoized_state) {
            Some(MemoizedState::Root(previous)) => Some(previous.clone()),
            _ => None,
        };

        let node = &mut self.arena[wip];
        node.update_queue = NodeQueue::Root(queue);
        node.memoized_state = MemoizedState::Root(processed.state.clone());
        node.lanes |= processed.skipped_lanes;

        if let Some(previous) = previous {
            if Node::ptr_eq(&previous, &processed.state) {
                return Ok(self.bailout_on_already_finished_work(wip));
            }
        }
        Ok(self.reconcile_children(current, wip, &processed.state))
    }

    fn absorb_root_updates(&mut self, current: Option<NodeId>, queue: &mut UpdateQueue<Node>) {
        let Some(current) = current else {
            queue.absorb_pending(None);
            return;
        };
        let mut other = std::mem::take(&mut self.arena[current].update_queue);
        match &mut other {
            NodeQueue::Root(current_queue) => queue.absorb_pending(Some(current_queue)),
            _ => queue.absorb_pending(None),
        }
        self.arena[current].update_queue = other;
    }

    fn update_host_component(&mut self, current: Option<NodeId>, wip: NodeId) -> Option<NodeId> {
        let props = self.arena[wip].pending_props.clone();
        let tag = match &self.arena[wip].element_type {
            Some(ElementType::Host(tag)) => tag.clone(),
            _ => Rc::from(""),
        };

        let mut children = props.children().clone();
        if self.host.should_set_text_content(&tag, &props) {
            // The host renders this text itself.
            children = Node::Empty;
        } else if let Some(current) = current {
            let previous = self.arena[current].memoized_props.clone();
            if self.host.should_set_text_content(&tag, &previous) {
                self.arena[wip].flags |= Flags::CONTENT_RESET;
            }
        }
        self.reconcile_children(current, wip, &children)
    }

    // =========================================================================
    // Function components
    // =========================================================================

    fn update_function_component(
        &mut self,
        current: Option<NodeId>,
        wip: NodeId,
        props_changed: bool,
    ) -> ReconcileResult<Option<NodeId>> {
        let Some(ElementType::Function(component)) = self.arena[wip].element_type.clone() else {
            return Ok(None);
        };
        let props = self.arena[wip].pending_props.clone();

        // Updates queued since the last render join the committed chain's
        // base queues, so they survive if this render is thrown away.
        let chain = current.and_then(|current| {
            let MemoizedState::Hooks(hooks) = &mut self.arena[current].memoized_state else {
                return None;
            };
            for hook in hooks.iter_mut() {
                if let Hook::State(state) = hook {
                    state.absorb_pending();
                }
            }
            Some(hooks.clone())
        });

        let mut hooks = Hooks::new(wip, self.shared.clone(), self.render_lanes, chain);
        let shared = self.shared.upgrade();
        if let Some(shared) = &shared {
            shared.enter_render(RenderingNode {
                wip,
                current,
                lanes: self.render_lanes,
            });
        }

        let limit = self.config.rerender_limit;
        let mut passes = 0;
        let rendered = loop {
            let result = component.call(&mut hooks, &props);
            let rerender = shared.as_ref().is_some_and(|s| s.take_render_phase_update());
            if !rerender || result.is_err() {
                break result.map_err(|source| ReconcileError::Render {
                    component: component.name().to_string().into(),
                    source,
                });
            }
            passes += 1;
            if passes >= limit {
                break Err(ReconcileError::TooManyRerenders { limit });
            }
            tracing::warn!(component = component.name(), passes, "re-rendering after render-phase update");
            hooks.begin_rerender();
        };

        if let Some(shared) = &shared {
            shared.exit_render();
        }
        let children = rendered?;
        let output = hooks.finish()?;

        if let Some(current) = current {
            if !props_changed && !output.did_receive_update {
                // Nothing this component reads changed: keep the committed
                // effects and skip its children.
                let effects = self.arena[current].update_queue.clone();
                let current_node = &mut self.arena[current];
                current_node.lanes = current_node.lanes.remove_lanes(self.render_lanes);

                let node = &mut self.arena[wip];
                node.memoized_state = MemoizedState::Hooks(output.hooks);
                node.update_queue = effects;
                node.lanes |= output.skipped_lanes;
                return Ok(self.bailout_on_already_finished_work(wip));
            }
        }

        let node = &mut self.arena[wip];
        node.memoized_state = MemoizedState::Hooks(output.hooks);
        node.update_queue = NodeQueue::Effects(output.effects);
        node.flags |= output.flags;
        node.lanes |= output.skipped_lanes;
        Ok(self.reconcile_children(current, wip, &children))
    }

    // =========================================================================
    // Class components
    // =========================================================================

    fn update_class_component(
        &mut self,
        current: Option<NodeId>,
        wip: NodeId,
        props_changed: bool,
    ) -> ReconcileResult<Option<NodeId>> {
        let Some(ElementType::Class(class)) = self.arena[wip].element_type.clone() else {
            return Ok(None);
        };
        let props = self.arena[wip].pending_props.clone();
        let label = class.name();

        let existing = match &self.arena[wip].state_node {
            StateNode::Class(instance) if current.is_some() => Some(instance.clone()),
            _ => None,
        };
        let instance = match existing {
            Some(instance) => instance,
            None => {
                // Mount
                let mut instance = class.instantiate(&props);
                let state = instance.initial_state(&props);
                let queue = UpdateQueue::new(state.clone());
                instance.attach(UpdateTarget::new(self.shared.clone(), wip, queue.sender()));
                let instance = Rc::new(RefCell::new(instance));

                let node = &mut self.arena[wip];
                node.state_node = StateNode::Class(instance.clone());
                node.memoized_state = MemoizedState::Class(state.clone());
                node.update_queue = NodeQueue::Class(queue);
                node.flags |= Flags::UPDATE;

                let rendered = instance.borrow().render(&props, &state);
                let children = rendered.map_err(|source| ReconcileError::Render {
                    component: label.into(),
                    source,
                })?;
                return Ok(self.reconcile_children(current, wip, &children));
            }
        };

        let Some(current) = current else {
            return Ok(None);
        };
        let mut queue = match std::mem::take(&mut self.arena[wip].update_queue) {
            NodeQueue::Class(queue) => queue,
            _ => return Ok(None),
        };
        let mut other = std::mem::take(&mut self.arena[current].update_queue);
        match &mut other {
            NodeQueue::Class(current_queue) => queue.absorb_pending(Some(current_queue)),
            _ => queue.absorb_pending(None),
        }
        self.arena[current].update_queue = other;

        let processed = queue.process(&props, self.render_lanes);
        let old_props = self.arena[current].memoized_props.clone();
        let old_state: ClassState = match &self.arena[current].memoized_state {
            MemoizedState::Class(state) => state.clone(),
            _ => processed.state.clone(),
        };
        let new_state = processed.state;

        let state_changed = !instance.borrow().state_eq(&old_state, &new_state);
        let should_update = processed.force_update
            || ((props_changed || state_changed)
                && instance.borrow().should_update(&old_props, &props, &old_state, &new_state));

        let node = &mut self.arena[wip];
        node.update_queue = NodeQueue::Class(queue);
        node.memoized_state = MemoizedState::Class(new_state.clone());
        node.lanes |= processed.skipped_lanes;

        if !should_update {
            return Ok(self.bailout_on_already_finished_work(wip));
        }
        node.flags |= Flags::UPDATE | Flags::SNAPSHOT;

        let rendered = instance.borrow().render(&props, &new_state);
        let children = rendered.map_err(|source| ReconcileError::Render {
            component: label.into(),
            source,
        })?;
        Ok(self.reconcile_children(Some(current), wip, &children))
    }
}
