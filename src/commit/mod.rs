//! Commit - Apply a finished tree to the host and make it current.
//!
//! A commit is synchronous and cannot be interrupted. It walks only the
//! parts of the finished tree whose `subtree_flags` say there is something
//! to do, in fixed phases:
//!
//! ```text
//! before mutation   class snapshots, clear container on first paint
//! mutation          deletions → children → placement → updates
//! swap              engine.current = finished
//! layout            layout effects, did_mount / did_update
//! passive           (later) effect cleanups, then effect creates
//! ```
//!
//! # Pattern: user code during commit
//!
//! Layout effects and class lifecycles run while the engine is borrowed.
//! Updates they dispatch are deferred and flushed once the commit returns.
//! Passive effects are collected here but run by the root with the engine
//! released, so their updates schedule like any other.

mod layout;
mod mutation;
mod passive;

pub(crate) use passive::PassiveEffects;

use crate::class::ClassInstance;
use crate::engine::{ClassState, Engine, Flags, MemoizedState, NodeId, PendingPassive, StateNode, WorkTag};
use crate::error::ReconcileResult;
use crate::lanes::Lanes;

use std::cell::RefCell;
use std::rc::Rc;

impl Engine {
    /// Commit the finished HostRoot buffer rendered for `lanes`.
    pub(crate) fn commit_root(&mut self, finished: NodeId, lanes: Lanes) -> ReconcileResult<()> {
        let _span = tracing::debug_span!("commit_root", ?lanes).entered();

        let (flags, remaining) = {
            let root = &self.arena[finished];
            (root.flags | root.subtree_flags, root.lanes | root.child_lanes)
        };
        self.root_lanes.mark_finished(remaining);

        if flags.intersects(Flags::BEFORE_MUTATION_MASK) {
            self.commit_before_mutation_effects(finished);
        }

        let mut deleted = Vec::new();
        if flags.intersects(Flags::MUTATION_MASK) {
            self.commit_mutation_effects(finished, &mut deleted)?;
        }

        self.current = finished;

        if flags.intersects(Flags::LAYOUT_MASK) {
            self.commit_layout_effects(finished);
        }

        if flags.intersects(Flags::PASSIVE_MASK) || !deleted.is_empty() {
            self.pending_passive = Some(PendingPassive {
                finished,
                lanes,
                deletions: deleted,
                task: None,
            });
        }

        tracing::debug!(?lanes, ?remaining, "commit finished");
        if self.config.trace_commits {
            tracing::info!(
                nodes = self.arena.len(),
                ?flags,
                pending = ?self.root_lanes.pending,
                "committed tree"
            );
        }
        Ok(())
    }

    // =========================================================================
    // Before mutation
    // =========================================================================

    fn commit_before_mutation_effects(&mut self, node: NodeId) {
        if self.arena[node].subtree_flags.intersects(Flags::BEFORE_MUTATION_MASK) {
            for child in self.arena.children(node) {
                self.commit_before_mutation_effects(child);
            }
        }

        let entry = &self.arena[node];
        if !entry.flags.contains(Flags::SNAPSHOT) {
            return;
        }
        match entry.tag {
            WorkTag::ClassComponent => {
                let Some(current) = entry.alternate else {
                    return;
                };
                let Some(instance) = class_instance(&entry.state_node) else {
                    return;
                };
                let previous = &self.arena[current];
                if let Some(state) = class_state(&previous.memoized_state) {
                    instance.borrow_mut().capture_snapshot(&previous.memoized_props, &state);
                }
            }
            WorkTag::HostRoot => {
                if let StateNode::Container(container) = entry.state_node {
                    tracing::trace!(?container, "clear container");
                    self.host.clear_container(container);
                }
            }
            _ => {}
        }
    }
}

fn class_instance(state_node: &StateNode) -> Option<Rc<RefCell<ClassInstance>>> {
    match state_node {
        StateNode::Class(instance) => Some(instance.clone()),
        _ => None,
    }
}

fn class_state(state: &MemoizedState) -> Option<ClassState> {
    match state {
        MemoizedState::Class(state) => Some(state.clone()),
        _ => None,
    }
}
