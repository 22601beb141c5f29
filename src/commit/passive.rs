//! Passive phase - effects collected from a commit, run after it.

use crate::engine::{Engine, Flags, NodeId, NodeQueue, WorkTag};
use crate::hooks::{Effect, HookFlags, commit_mount, commit_unmount};
use crate::scheduler::TaskHandle;

/// Passive effects of one commit, detached from the engine.
#[derive(Default)]
pub(crate) struct PassiveEffects {
    /// Every passive effect of every deleted component.
    deleted: Vec<Effect>,
    /// Effect lists of updated components, children before parents.
    updated: Vec<Vec<Effect>>,
}

impl PassiveEffects {
    /// Cleanups of deleted components, then cleanups of updated ones, then
    /// creates. No create runs before every cleanup has.
    pub(crate) fn run(self) {
        commit_unmount(&self.deleted, HookFlags::PASSIVE);
        for effects in &self.updated {
            commit_unmount(effects, HookFlags::PASSIVE | HookFlags::HAS_EFFECT);
        }
        for effects in &self.updated {
            commit_mount(effects, HookFlags::PASSIVE | HookFlags::HAS_EFFECT);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.updated.is_empty()
    }
}

impl Engine {
    /// Take the pending passive work of the last commit.
    ///
    /// Deleted subtrees are released from the arena here, after their
    /// effects were collected. Returns the scheduled task (if any) so the
    /// caller can cancel it.
    pub(crate) fn take_passive_effects(&mut self) -> Option<(PassiveEffects, Option<TaskHandle>)> {
        let pending = self.pending_passive.take()?;
        let _span = tracing::debug_span!("passive_effects", lanes = ?pending.lanes).entered();

        let mut effects = PassiveEffects::default();
        for &deleted in &pending.deletions {
            self.collect_deleted(deleted, &mut effects.deleted);
        }
        for deleted in pending.deletions {
            self.arena.release_subtree(deleted);
        }
        if self.arena.contains(pending.finished) {
            self.collect_passive(pending.finished, &mut effects);
        }

        tracing::debug!(
            deleted = effects.deleted.len(),
            updated = effects.updated.len(),
            "passive effects collected"
        );
        Some((effects, pending.task))
    }

    fn collect_passive(&self, node: NodeId, out: &mut PassiveEffects) {
        let entry = &self.arena[node];
        if entry.subtree_flags.intersects(Flags::PASSIVE_MASK) {
            let mut child = entry.child;
            while let Some(id) = child {
                self.collect_passive(id, out);
                child = self.arena[id].sibling;
            }
        }
        if entry.tag == WorkTag::FunctionComponent && entry.flags.contains(Flags::PASSIVE) {
            if let NodeQueue::Effects(effects) = &entry.update_queue {
                out.updated.push(effects.clone());
            }
        }
    }

    fn collect_deleted(&self, node: NodeId, out: &mut Vec<Effect>) {
        let Some(entry) = self.arena.get(node) else {
            return;
        };
        if entry.tag == WorkTag::FunctionComponent {
            if let NodeQueue::Effects(effects) = &entry.update_queue {
                out.extend(effects.iter().cloned());
            }
        }
        let mut child = entry.child;
        while let Some(id) = child {
            self.collect_deleted(id, out);
            child = self.arena.get(id).and_then(|n| n.sibling);
        }
    }
}
