//! Platform abstraction traits for the reconciler's scheduling collaborators.
//!
//! The work loop never spins its own event loop. It hands tasks to a
//! [`TaskScheduler`] and reads time from a [`Clock`], so the same engine runs
//! against the std runtime, a manual test harness, or an embedder's own loop.

use crate::error::RenderError;

/// Cooperative priority levels, most urgent first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedulerPriority {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

impl SchedulerPriority {
    pub const ALL: [SchedulerPriority; 5] = [
        SchedulerPriority::Immediate,
        SchedulerPriority::UserBlocking,
        SchedulerPriority::Normal,
        SchedulerPriority::Low,
        SchedulerPriority::Idle,
    ];

    /// Milliseconds a task at this priority may wait before it is considered overdue.
    ///
    /// `None` means the task never times out.
    pub const fn timeout_millis(self) -> Option<u64> {
        match self {
            SchedulerPriority::Immediate => Some(0),
            SchedulerPriority::UserBlocking => Some(250),
            SchedulerPriority::Normal => Some(5_000),
            SchedulerPriority::Low => Some(10_000),
            SchedulerPriority::Idle => None,
        }
    }
}

/// Opaque handle returned by [`TaskScheduler::schedule_callback`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

/// A unit of work queued with the scheduler.
///
/// The flag tells the task whether the scheduler considers it overdue.
pub type SchedulerTask = Box<dyn FnOnce(bool) -> Result<(), RenderError> + 'static>;

/// Queues prioritized callbacks for the reconciler.
///
/// Implementations must never run a task from inside `schedule_callback`;
/// tasks may schedule or cancel other tasks while they run.
pub trait TaskScheduler {
    fn schedule_callback(&self, priority: SchedulerPriority, task: SchedulerTask) -> TaskHandle;

    /// Cancelling an unknown or already-run handle is a no-op.
    fn cancel_callback(&self, handle: TaskHandle);

    /// Returns `true` when the current time slice is used up.
    fn should_yield(&self) -> bool;
}

/// Provides monotonic time for expiration bookkeeping.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin.
    fn now_millis(&self) -> u64;
}
