//! Scheduler contract - How roots ask for time to run.
//!
//! The engine never decides *when* work happens. It hands a task and a
//! priority to a [`Scheduler`] and may later cancel it. Any event loop can
//! implement the trait; [`TaskQueue`] is a deterministic implementation
//! driven by hand (tests, embedders without their own loop).

mod task_queue;

pub use task_queue::TaskQueue;

/// A unit of scheduled work.
pub type Task = Box<dyn FnOnce()>;

/// Scheduler priority classes, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityLevel {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

impl PriorityLevel {
    /// Virtual milliseconds a task may wait before it is considered expired.
    /// Expiration only affects ordering: sort index = start time + timeout.
    pub const fn timeout(self) -> u64 {
        match self {
            PriorityLevel::Immediate => 0,
            PriorityLevel::UserBlocking => 250,
            PriorityLevel::Normal => 5_000,
            PriorityLevel::Low => 10_000,
            // Never expires.
            PriorityLevel::Idle => 1_073_741_823,
        }
    }
}

/// Opaque handle returned by [`Scheduler::schedule_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

/// The priority-task scheduler the engine depends on.
pub trait Scheduler {
    /// Queue `task` to run later at `priority`. Must not run it synchronously.
    fn schedule_callback(&self, priority: PriorityLevel, task: Task) -> TaskHandle;

    /// Drop a queued task. Cancelling a task that already ran is a no-op.
    fn cancel_callback(&self, handle: TaskHandle);
}
