//! TaskQueue - A hand-cranked binary min-heap scheduler.
//!
//! Tasks are ordered by `(sort_index, id)` where `sort_index` is the virtual
//! start time plus the priority timeout and `id` is the insertion counter.
//! The id makes ties break in insertion order, so a run is reproducible.

use std::cell::{Cell, RefCell};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use super::{PriorityLevel, Scheduler, Task, TaskHandle};

struct Entry {
    sort_index: u64,
    id: u64,
    priority: PriorityLevel,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_index == other.sort_index && self.id == other.id
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_index
            .cmp(&other.sort_index)
            .then(self.id.cmp(&other.id))
    }
}

/// Deterministic scheduler driven by explicit `run_next` / `flush_all` calls.
///
/// Interior mutability lets tasks schedule more tasks while the queue is
/// being flushed: the heap borrow is released before a task runs.
#[derive(Default)]
pub struct TaskQueue {
    heap: RefCell<BinaryHeap<Reverse<Entry>>>,
    cancelled: RefCell<HashSet<u64>>,
    next_id: Cell<u64>,
    now: Cell<u64>,
    scheduled: Cell<usize>,
    cancels: Cell<usize>,
    log: RefCell<Vec<PriorityLevel>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the virtual clock.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    /// Run the next live task. Returns false when the queue is empty.
    pub fn run_next(&self) -> bool {
        loop {
            let entry = self.heap.borrow_mut().pop();
            let Some(Reverse(entry)) = entry else {
                return false;
            };
            if self.cancelled.borrow_mut().remove(&entry.id) {
                continue;
            }
            self.log.borrow_mut().push(entry.priority);
            (entry.task)();
            return true;
        }
    }

    /// Run tasks until none remain, including tasks scheduled while flushing.
    /// Returns how many ran.
    pub fn flush_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Run only tasks at `priority` or more urgent, in heap order.
    pub fn flush_through(&self, priority: PriorityLevel) -> usize {
        let mut ran = 0;
        loop {
            let next = self.peek_priority();
            match next {
                Some(p) if p <= priority => {
                    self.run_next();
                    ran += 1;
                }
                _ => return ran,
            }
        }
    }

    /// Run everything except idle work.
    pub fn flush_until_idle(&self) -> usize {
        self.flush_through(PriorityLevel::Low)
    }

    fn peek_priority(&self) -> Option<PriorityLevel> {
        let mut heap = self.heap.borrow_mut();
        let mut cancelled = self.cancelled.borrow_mut();
        while let Some(Reverse(top)) = heap.peek() {
            if cancelled.remove(&top.id) {
                heap.pop();
                continue;
            }
            return Some(top.priority);
        }
        None
    }

    /// Number of live tasks waiting.
    pub fn len(&self) -> usize {
        let cancelled = self.cancelled.borrow();
        self.heap
            .borrow()
            .iter()
            .filter(|Reverse(e)| !cancelled.contains(&e.id))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total `schedule_callback` calls since creation.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.get()
    }

    /// Total `cancel_callback` calls since creation.
    pub fn cancelled_count(&self) -> usize {
        self.cancels.get()
    }

    /// Priorities of tasks that actually ran, in order.
    pub fn run_log(&self) -> Vec<PriorityLevel> {
        self.log.borrow().clone()
    }
}

impl Scheduler for TaskQueue {
    fn schedule_callback(&self, priority: PriorityLevel, task: Task) -> TaskHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.scheduled.set(self.scheduled.get() + 1);

        let sort_index = self.now.get().saturating_add(priority.timeout());
        self.heap.borrow_mut().push(Reverse(Entry {
            sort_index,
            id,
            priority,
            task,
        }));
        TaskHandle(id)
    }

    fn cancel_callback(&self, handle: TaskHandle) {
        self.cancels.set(self.cancels.get() + 1);
        let queued = self
            .heap
            .borrow()
            .iter()
            .any(|Reverse(e)| e.id == handle.0);
        if queued {
            self.cancelled.borrow_mut().insert(handle.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_for_task = seen.clone();
        let make = move |name: &'static str| -> Task {
            let seen = seen_for_task.clone();
            Box::new(move || seen.borrow_mut().push(name))
        };
        (seen, make)
    }

    #[test]
    fn test_priority_order() {
        let queue = TaskQueue::new();
        let (seen, task) = recorder();

        queue.schedule_callback(PriorityLevel::Idle, task("idle"));
        queue.schedule_callback(PriorityLevel::Normal, task("normal"));
        queue.schedule_callback(PriorityLevel::Immediate, task("immediate"));

        assert_eq!(queue.flush_all(), 3);
        assert_eq!(*seen.borrow(), vec!["immediate", "normal", "idle"]);
    }

    #[test]
    fn test_ties_break_by_insertion() {
        let queue = TaskQueue::new();
        let (seen, task) = recorder();

        queue.schedule_callback(PriorityLevel::Normal, task("a"));
        queue.schedule_callback(PriorityLevel::Normal, task("b"));
        queue.schedule_callback(PriorityLevel::Normal, task("c"));
        queue.flush_all();

        assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_expired_normal_beats_fresh_user_blocking() {
        let queue = TaskQueue::new();
        let (seen, task) = recorder();

        queue.schedule_callback(PriorityLevel::Normal, task("old normal"));
        queue.advance(10_000);
        queue.schedule_callback(PriorityLevel::UserBlocking, task("new blocking"));
        queue.flush_all();

        assert_eq!(*seen.borrow(), vec!["old normal", "new blocking"]);
    }

    #[test]
    fn test_cancel() {
        let queue = TaskQueue::new();
        let (seen, task) = recorder();

        let handle = queue.schedule_callback(PriorityLevel::Normal, task("cancelled"));
        queue.schedule_callback(PriorityLevel::Normal, task("kept"));
        queue.cancel_callback(handle);

        assert_eq!(queue.len(), 1);
        queue.flush_all();
        assert_eq!(*seen.borrow(), vec!["kept"]);
        assert_eq!(queue.scheduled_count(), 2);
    }

    #[test]
    fn test_flush_through_stops_at_priority() {
        let queue = TaskQueue::new();
        let (seen, task) = recorder();

        queue.schedule_callback(PriorityLevel::Immediate, task("sync"));
        queue.schedule_callback(PriorityLevel::Normal, task("default"));

        assert_eq!(queue.flush_through(PriorityLevel::UserBlocking), 1);
        assert_eq!(*seen.borrow(), vec!["sync"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_tasks_can_schedule_tasks() {
        let queue = Rc::new(TaskQueue::new());
        let (seen, task) = recorder();
        let task = Rc::new(task);

        let inner_queue = queue.clone();
        let inner_task = task.clone();
        queue.schedule_callback(
            PriorityLevel::Normal,
            Box::new(move || {
                inner_queue.schedule_callback(PriorityLevel::Normal, inner_task("nested"));
            }),
        );

        assert_eq!(queue.flush_all(), 2);
        assert_eq!(*seen.borrow(), vec!["nested"]);
    }
}
