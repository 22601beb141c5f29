//! Work Loop - Build a finished tree from the current one.
//!
//! One render walks the work-in-progress tree depth first:
//!
//! ```text
//!            root
//!           /    \
//!         A        D          begin:    root A B C D
//!        / \                 complete: B C A D root
//!       B   C
//! ```
//!
//! - `begin` (top-down) decides whether a node can be skipped, renders it,
//!   and reconciles its children. It returns the first child to visit next.
//! - `complete` (bottom-up) creates or diffs host instances and bubbles
//!   flags and lanes into the parent, then moves to the sibling or back up.
//!
//! A render runs to completion. When it fails, every buffer it allocated is
//! released, every parent link it moved is restored, and the updates of the
//! failed lanes are dropped from the current tree. The next render starts
//! from what was last committed.

mod begin;
mod complete;

use crate::engine::{Engine, MemoizedState, NodeId, NodeQueue};
use crate::hooks::Hook;
use crate::error::ReconcileResult;
use crate::lanes::Lanes;

impl Engine {
    /// Render the root for `lanes`. Returns the finished HostRoot buffer.
    pub(crate) fn render_root(&mut self, lanes: Lanes) -> ReconcileResult<NodeId> {
        let _span = tracing::debug_span!("render_root", ?lanes).entered();
        tracing::debug!(?lanes, nodes = self.arena.len(), "render started");

        let root = self.prepare_fresh_stack(lanes);
        while let Some(unit) = self.work_in_progress {
            if let Err(err) = self.perform_unit_of_work(unit) {
                tracing::debug!(%err, "render aborted");
                self.discard_render();
                self.drop_failed_lanes(lanes);
                return Err(err);
            }
        }

        self.arena.end_journal();
        self.wip_root = None;
        self.render_lanes = Lanes::empty();
        Ok(root)
    }

    /// Throw away any in-progress work and start from the current root.
    fn prepare_fresh_stack(&mut self, lanes: Lanes) -> NodeId {
        if self.wip_root.is_some() {
            tracing::warn!("discarding an unfinished render");
            self.discard_render();
        }
        self.arena.begin_journal();

        let props = self.arena[self.current].memoized_props.clone();
        let wip = self.arena.work_in_progress(self.current, props);
        self.arena.set_parent(wip, None);

        self.wip_root = Some(wip);
        self.work_in_progress = Some(wip);
        self.render_lanes = lanes;
        wip
    }

    fn discard_render(&mut self) {
        self.arena.discard_journal();
        self.wip_root = None;
        self.work_in_progress = None;
        self.render_lanes = Lanes::empty();
    }

    /// Forget the updates of a failed render: strip `lanes` from the root,
    /// from every node of the current tree and its alternate, and from every
    /// state cell and update queue in it.
    fn drop_failed_lanes(&mut self, lanes: Lanes) {
        self.root_lanes.mark_failed(lanes);

        let mut stack = vec![self.current];
        while let Some(id) = stack.pop() {
            let node = &mut self.arena[id];
            node.lanes = node.lanes.remove_lanes(lanes);
            node.child_lanes = node.child_lanes.remove_lanes(lanes);
            if let MemoizedState::Hooks(hooks) = &mut node.memoized_state {
                for hook in hooks.iter_mut() {
                    if let Hook::State(state) = hook {
                        state.drop_lanes(lanes);
                    }
                }
            }
            match &mut node.update_queue {
                NodeQueue::Root(queue) => queue.drop_lanes(lanes),
                NodeQueue::Class(queue) => queue.drop_lanes(lanes),
                _ => {}
            }

            let alternate = node.alternate;
            let mut child = node.child;
            if let Some(alt) = alternate.and_then(|alt| self.arena.get_mut(alt)) {
                alt.lanes = alt.lanes.remove_lanes(lanes);
                alt.child_lanes = alt.child_lanes.remove_lanes(lanes);
            }
            while let Some(c) = child {
                stack.push(c);
                child = self.arena[c].sibling;
            }
        }
        tracing::debug!(?lanes, "dropped updates of failed render");
    }

    fn perform_unit_of_work(&mut self, unit: NodeId) -> ReconcileResult<()> {
        let current = self.arena[unit].alternate;
        tracing::trace!(node = ?unit, label = %self.arena[unit].label(), "begin");

        let next = self.begin_work(current, unit)?;
        let node = &mut self.arena[unit];
        node.memoized_props = node.pending_props.clone();

        match next {
            Some(child) => self.work_in_progress = Some(child),
            None => self.complete_unit_of_work(unit)?,
        }
        Ok(())
    }

    /// Complete `unit` and its ancestors until one has an unvisited sibling.
    fn complete_unit_of_work(&mut self, unit: NodeId) -> ReconcileResult<()> {
        let mut completed = unit;
        loop {
            let current = self.arena[completed].alternate;
            self.complete_work(current, completed)?;

            if let Some(sibling) = self.arena[completed].sibling {
                self.work_in_progress = Some(sibling);
                return Ok(());
            }
            match self.arena[completed].parent {
                Some(parent) if Some(completed) != self.wip_root => completed = parent,
                _ => {
                    self.work_in_progress = None;
                    return Ok(());
                }
            }
        }
    }
}

