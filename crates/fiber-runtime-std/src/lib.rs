//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the scheduling
//! collaborators defined in `fiber-core`. Applications construct a
//! [`StdRuntime`], build a [`fiber_core::Renderer`] from it, and pump
//! [`StdRuntime::run_until_idle`] from their event loop.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fiber_core::collections::map::HashMap;
use fiber_core::{
    Clock, HostConfig, RenderError, Renderer, SchedulerPriority, SchedulerTask, TaskHandle,
    TaskScheduler,
};

/// Time slice and per-priority timeouts for a [`StdScheduler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How long a task may run before `should_yield` asks it to stop.
    pub yield_interval: Duration,
    pub immediate_timeout: Duration,
    pub user_blocking_timeout: Duration,
    pub normal_timeout: Duration,
    pub low_timeout: Duration,
}

impl SchedulerConfig {
    pub fn with_yield_interval(mut self, interval: Duration) -> Self {
        self.yield_interval = interval;
        self
    }

    /// Timeout for `priority`; idle work never times out.
    pub fn timeout(&self, priority: SchedulerPriority) -> Option<Duration> {
        match priority {
            SchedulerPriority::Immediate => Some(self.immediate_timeout),
            SchedulerPriority::UserBlocking => Some(self.user_blocking_timeout),
            SchedulerPriority::Normal => Some(self.normal_timeout),
            SchedulerPriority::Low => Some(self.low_timeout),
            SchedulerPriority::Idle => None,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let timeout = |priority: SchedulerPriority| {
            Duration::from_millis(priority.timeout_millis().unwrap_or_default())
        };
        Self {
            yield_interval: Duration::from_millis(5),
            immediate_timeout: timeout(SchedulerPriority::Immediate),
            user_blocking_timeout: timeout(SchedulerPriority::UserBlocking),
            normal_timeout: timeout(SchedulerPriority::Normal),
            low_timeout: timeout(SchedulerPriority::Low),
        }
    }
}

/// Clock implementation backed by [`std::time`].
#[derive(Debug, Clone)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Returns the elapsed time since creation as a [`Duration`].
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

struct QueuedTask {
    priority: SchedulerPriority,
    deadline: u64,
    task: SchedulerTask,
}

/// Deadline-ordered task queue that runs on the calling thread.
///
/// Tasks run in order of `(deadline, insertion)`. A task is overdue once the
/// clock passes its deadline; the flag is handed to the task when it runs.
pub struct StdScheduler {
    config: SchedulerConfig,
    clock: Rc<StdClock>,
    heap: RefCell<BinaryHeap<Reverse<(u64, u64)>>>,
    tasks: RefCell<HashMap<u64, QueuedTask>>,
    next_id: Cell<u64>,
    slice_start: Cell<Option<Instant>>,
}

impl StdScheduler {
    pub fn new(clock: Rc<StdClock>) -> Self {
        Self::with_config(clock, SchedulerConfig::default())
    }

    pub fn with_config(clock: Rc<StdClock>, config: SchedulerConfig) -> Self {
        Self {
            config,
            clock,
            heap: RefCell::new(BinaryHeap::new()),
            tasks: RefCell::new(HashMap::default()),
            next_id: Cell::new(0),
            slice_start: Cell::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    fn pop_next(&self) -> Option<QueuedTask> {
        let mut heap = self.heap.borrow_mut();
        let mut tasks = self.tasks.borrow_mut();
        while let Some(Reverse((_, id))) = heap.pop() {
            // cancelled entries stay in the heap until they surface here
            if let Some(task) = tasks.remove(&id) {
                return Some(task);
            }
        }
        None
    }

    /// Runs the most urgent task. Returns `None` when the queue is empty.
    pub fn run_next(&self) -> Option<Result<(), RenderError>> {
        let next = self.pop_next()?;
        let did_timeout = self.clock.now_millis() >= next.deadline;
        log::trace!(
            "running {:?} task (deadline {}ms, overdue: {did_timeout})",
            next.priority,
            next.deadline
        );
        self.slice_start.set(Some(Instant::now()));
        let result = (next.task)(did_timeout);
        self.slice_start.set(None);
        Some(result)
    }

    /// Runs tasks until the queue is empty, stopping at the first error.
    ///
    /// Returns the number of tasks that ran.
    pub fn run_until_idle(&self) -> Result<usize, RenderError> {
        let mut ran = 0;
        while let Some(result) = self.run_next() {
            ran += 1;
            if let Err(err) = result {
                log::error!("scheduler task failed: {err}");
                return Err(err);
            }
        }
        Ok(ran)
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .finish()
    }
}

impl TaskScheduler for StdScheduler {
    fn schedule_callback(&self, priority: SchedulerPriority, task: SchedulerTask) -> TaskHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let deadline = match self.config.timeout(priority) {
            Some(timeout) => {
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                self.clock.now_millis().saturating_add(millis)
            }
            None => u64::MAX,
        };
        self.tasks.borrow_mut().insert(
            id,
            QueuedTask {
                priority,
                deadline,
                task,
            },
        );
        self.heap.borrow_mut().push(Reverse((deadline, id)));
        TaskHandle::new(id)
    }

    fn cancel_callback(&self, handle: TaskHandle) {
        self.tasks.borrow_mut().remove(&handle.id());
    }

    fn should_yield(&self) -> bool {
        self.slice_start
            .get()
            .is_some_and(|start| start.elapsed() >= self.config.yield_interval)
    }
}

/// Convenience container bundling the standard scheduler and clock.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Rc<StdScheduler>,
    clock: Rc<StdClock>,
}

impl StdRuntime {
    /// Creates a new standard runtime instance.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let clock = Rc::new(StdClock::new());
        let scheduler = Rc::new(StdScheduler::with_config(Rc::clone(&clock), config));
        Self { scheduler, clock }
    }

    /// Builds a renderer over `host` driven by this runtime.
    pub fn renderer<H: HostConfig>(&self, host: H) -> Renderer<H> {
        Renderer::new(host, self.scheduler.clone(), self.clock.clone())
    }

    /// Returns the scheduler implementation.
    pub fn scheduler(&self) -> Rc<StdScheduler> {
        Rc::clone(&self.scheduler)
    }

    /// Returns the clock implementation.
    pub fn clock(&self) -> Rc<StdClock> {
        Rc::clone(&self.clock)
    }

    /// Runs queued work until nothing is left.
    pub fn run_until_idle(&self) -> Result<usize, RenderError> {
        self.scheduler.run_until_idle()
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
