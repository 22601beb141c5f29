//! Layout phase - runs after the host tree is mutated, before passive effects.

use crate::engine::{Engine, Flags, NodeId, NodeQueue, WorkTag};
use crate::hooks::{HookFlags, commit_mount};

use super::{class_instance, class_state};

impl Engine {
    /// Children first, so a parent's layout effect sees mounted children.
    pub(super) fn commit_layout_effects(&mut self, node: NodeId) {
        if self.arena[node].subtree_flags.intersects(Flags::LAYOUT_MASK) {
            for child in self.arena.children(node) {
                self.commit_layout_effects(child);
            }
        }

        let entry = &self.arena[node];
        if !entry.flags.contains(Flags::UPDATE) {
            return;
        }
        match entry.tag {
            WorkTag::FunctionComponent => {
                if let NodeQueue::Effects(effects) = &entry.update_queue {
                    commit_mount(effects, HookFlags::LAYOUT | HookFlags::HAS_EFFECT);
                }
            }
            WorkTag::ClassComponent => {
                let Some(instance) = class_instance(&entry.state_node) else {
                    return;
                };
                let Some(state) = class_state(&entry.memoized_state) else {
                    return;
                };
                match entry.alternate {
                    None => {
                        tracing::trace!(node = ?node, "did_mount");
                        instance.borrow_mut().did_mount(&entry.memoized_props, &state);
                    }
                    Some(current) => {
                        let previous = &self.arena[current];
                        let prev_state = class_state(&previous.memoized_state).unwrap_or(state);
                        tracing::trace!(node = ?node, "did_update");
                        instance.borrow_mut().did_update(&previous.memoized_props, &prev_state);
                    }
                }
            }
            _ => {}
        }
    }
}
