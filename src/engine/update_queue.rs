//! Update queue for roots and class components.
//!
//! Updates are pushed onto a `pending` list shared by both buffers of a node.
//! When the node renders, pending updates are moved onto the end of the base
//! queue of *both* buffers (so a discarded render never loses them) and then
//! folded in insertion order, skipping updates whose lane is not part of the
//! render:
//!
//! ```text
//! base_state: 1    base_queue: [+1 (DEFAULT), x10 (SYNC)]
//!
//! render SYNC     → state 10, base_state 1, base_queue [+1 (DEFAULT), x10 (none)]
//! render DEFAULT  → state 20, base_state 20, base_queue []
//! ```
//!
//! Once one update is skipped, every later update is kept in the base queue
//! too (with no lane, so it always re-applies), which keeps the final state
//! equal to "all updates applied in enqueue order".

use std::cell::RefCell;
use std::rc::Rc;

use crate::lanes::Lanes;
use crate::primitives::Props;

/// Computes a new state from the previous one.
pub type StateUpdater<S> = Rc<dyn Fn(&S, &Props) -> S>;

/// What an update does when applied.
pub enum Payload<S> {
    /// Replace the state.
    Replace(S),
    /// Derive the state from the previous state and current props.
    Updater(StateUpdater<S>),
    /// Keep the state, but render even if nothing changed.
    Force,
}

impl<S: Clone> Clone for Payload<S> {
    fn clone(&self) -> Self {
        match self {
            Payload::Replace(state) => Payload::Replace(state.clone()),
            Payload::Updater(f) => Payload::Updater(f.clone()),
            Payload::Force => Payload::Force,
        }
    }
}

/// One queued update.
#[derive(Clone)]
pub struct QueuedUpdate<S: Clone> {
    pub lane: Lanes,
    pub payload: Payload<S>,
}

/// Result of folding a queue.
pub struct Processed<S> {
    pub state: S,
    /// Lanes of updates left in the base queue.
    pub skipped_lanes: Lanes,
    pub force_update: bool,
}

type Pending<S> = Rc<RefCell<Vec<QueuedUpdate<S>>>>;

/// Enqueue-only handle, kept by class updaters.
pub struct UpdateSender<S: Clone>(Pending<S>);

impl<S: Clone> UpdateSender<S> {
    pub fn send(&self, update: QueuedUpdate<S>) {
        self.0.borrow_mut().push(update);
    }
}

impl<S: Clone> Clone for UpdateSender<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Per-buffer queue. Clones share `pending`.
#[derive(Clone)]
pub struct UpdateQueue<S: Clone> {
    pub base_state: S,
    pub base_queue: Vec<QueuedUpdate<S>>,
    pending: Pending<S>,
}

impl<S: Clone> UpdateQueue<S> {
    pub fn new(base_state: S) -> Self {
        Self {
            base_state,
            base_queue: Vec::new(),
            pending: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Queue an update. Safe while the owning node renders: nothing reads
    /// `pending` except [`absorb_pending`](Self::absorb_pending).
    pub fn enqueue(&self, update: QueuedUpdate<S>) {
        self.pending.borrow_mut().push(update);
    }

    pub fn sender(&self) -> UpdateSender<S> {
        UpdateSender(self.pending.clone())
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    /// Move pending updates onto this base queue and onto the other buffer's.
    pub fn absorb_pending(&mut self, current: Option<&mut UpdateQueue<S>>) {
        let pending: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        if pending.is_empty() {
            return;
        }
        if let Some(current) = current {
            current.base_queue.extend(pending.iter().cloned());
        }
        self.base_queue.extend(pending);
    }

    /// Forget every update, queued or pending, in `lanes`. Rebased updates
    /// carry no lane and are kept.
    pub fn drop_lanes(&mut self, lanes: Lanes) {
        self.base_queue.retain(|update| !update.lane.includes_some(lanes));
        self.pending.borrow_mut().retain(|update| !update.lane.includes_some(lanes));
    }

    /// Fold the base queue for `render_lanes`.
    pub fn process(&mut self, props: &Props, render_lanes: Lanes) -> Processed<S> {
        let mut state = self.base_state.clone();
        let mut new_base_state = None;
        let mut new_base_queue = Vec::new();
        let mut skipped_lanes = Lanes::empty();
        let mut force_update = false;

        for update in std::mem::take(&mut self.base_queue) {
            if !render_lanes.is_subset(update.lane) {
                if new_base_queue.is_empty() {
                    new_base_state = Some(state.clone());
                }
                skipped_lanes |= update.lane;
                new_base_queue.push(update);
                continue;
            }

            if !new_base_queue.is_empty() {
                new_base_queue.push(QueuedUpdate {
                    lane: Lanes::empty(),
                    payload: update.payload.clone(),
                });
            }

            state = match &update.payload {
                Payload::Replace(next) => next.clone(),
                Payload::Updater(f) => f(&state, props),
                Payload::Force => {
                    force_update = true;
                    state
                }
            };
        }

        self.base_state = new_base_state.unwrap_or_else(|| state.clone());
        self.base_queue = new_base_queue;

        Processed {
            state,
            skipped_lanes,
            force_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(n: i32) -> Payload<i32> {
        Payload::Updater(Rc::new(move |s: &i32, _: &Props| s + n))
    }

    fn mul(n: i32) -> Payload<i32> {
        Payload::Updater(Rc::new(move |s: &i32, _: &Props| s * n))
    }

    #[test]
    fn test_fifo() {
        let mut queue = UpdateQueue::new(1);
        queue.enqueue(QueuedUpdate { lane: Lanes::DEFAULT, payload: add(1) });
        queue.enqueue(QueuedUpdate { lane: Lanes::DEFAULT, payload: mul(10) });
        queue.absorb_pending(None);

        let result = queue.process(&Props::default(), Lanes::DEFAULT);
        assert_eq!(result.state, 20);
        assert_eq!(queue.base_state, 20);
        assert!(queue.base_queue.is_empty());
    }

    #[test]
    fn test_drop_lanes_keeps_other_updates() {
        let mut queue = UpdateQueue::new(1);
        queue.enqueue(QueuedUpdate { lane: Lanes::DEFAULT, payload: add(1) });
        queue.enqueue(QueuedUpdate { lane: Lanes::SYNC, payload: mul(10) });
        queue.absorb_pending(None);
        queue.enqueue(QueuedUpdate { lane: Lanes::SYNC, payload: add(5) });

        queue.drop_lanes(Lanes::SYNC);
        queue.absorb_pending(None);

        let result = queue.process(&Props::default(), Lanes::SYNC | Lanes::DEFAULT);
        assert_eq!(result.state, 2);
        assert!(queue.base_queue.is_empty());
    }

    #[test]
    fn test_skip_and_rebase() {
        let mut queue = UpdateQueue::new(1);
        queue.enqueue(QueuedUpdate { lane: Lanes::DEFAULT, payload: add(1) });
        queue.enqueue(QueuedUpdate { lane: Lanes::SYNC, payload: mul(10) });
        queue.absorb_pending(None);

        let high = queue.process(&Props::default(), Lanes::SYNC);
        assert_eq!(high.state, 10);
        assert_eq!(high.skipped_lanes, Lanes::DEFAULT);
        assert_eq!(queue.base_state, 1);
        assert_eq!(queue.base_queue.len(), 2);
        assert!(queue.base_queue[1].lane.is_empty());

        let low = queue.process(&Props::default(), Lanes::DEFAULT);
        assert_eq!(low.state, 20);
        assert!(low.skipped_lanes.is_empty());
        assert!(queue.base_queue.is_empty());
    }

    #[test]
    fn test_absorb_into_both_buffers() {
        let mut current = UpdateQueue::new(0);
        let mut wip = current.clone();
        wip.enqueue(QueuedUpdate { lane: Lanes::DEFAULT, payload: Payload::Replace(5) });
        assert!(current.has_pending());

        current.sender().send(QueuedUpdate { lane: Lanes::SYNC, payload: Payload::Force });
        wip.absorb_pending(Some(&mut current));
        assert_eq!(current.base_queue.len(), 2);
        assert_eq!(wip.base_queue.len(), 2);
        assert!(!current.has_pending());
    }

    #[test]
    fn test_force_update() {
        let mut queue = UpdateQueue::new(3);
        queue.enqueue(QueuedUpdate { lane: Lanes::SYNC, payload: Payload::Force });
        queue.absorb_pending(None);
        let result = queue.process(&Props::default(), Lanes::SYNC);
        assert!(result.force_update);
        assert_eq!(result.state, 3);
    }
}
