//! Hand-driven scheduler and clock for deterministic tests.

use std::cell::{Cell, RefCell};
use std::fmt;

use fiber_core::{Clock, RenderError, SchedulerPriority, SchedulerTask, TaskHandle, TaskScheduler};

/// Clock whose time only moves when a test says so.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Cell::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.set(millis);
    }

    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get().saturating_add(millis));
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }
}

/// Answer `should_yield` gives while a task runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum YieldPolicy {
    #[default]
    Never,
    Always,
    /// Yield once this many checks have passed in the current task.
    After(usize),
}

struct ManualTask {
    handle: TaskHandle,
    priority: SchedulerPriority,
    deadline: Option<u64>,
    task: SchedulerTask,
}

/// Task queue that only runs when the test pumps it.
///
/// Tasks run most urgent priority first, then in the order they were
/// scheduled. A task is overdue once the manual clock reaches its deadline.
pub struct ManualScheduler {
    clock: std::rc::Rc<ManualClock>,
    queue: RefCell<Vec<ManualTask>>,
    next_id: Cell<u64>,
    policy: Cell<YieldPolicy>,
    checks: Cell<usize>,
    ran: Cell<usize>,
}

impl ManualScheduler {
    pub fn new(clock: std::rc::Rc<ManualClock>) -> Self {
        Self {
            clock,
            queue: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            policy: Cell::new(YieldPolicy::Never),
            checks: Cell::new(0),
            ran: Cell::new(0),
        }
    }

    pub fn set_yield_policy(&self, policy: YieldPolicy) {
        self.policy.set(policy);
    }

    pub fn yield_after(&self, checks: usize) {
        self.set_yield_policy(YieldPolicy::After(checks));
    }

    pub fn always_yield(&self) {
        self.set_yield_policy(YieldPolicy::Always);
    }

    pub fn never_yield(&self) {
        self.set_yield_policy(YieldPolicy::Never);
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Priorities of queued tasks, in run order.
    pub fn pending_priorities(&self) -> Vec<SchedulerPriority> {
        let mut queued: Vec<(SchedulerPriority, TaskHandle)> = self
            .queue
            .borrow()
            .iter()
            .map(|task| (task.priority, task.handle))
            .collect();
        queued.sort();
        queued.into_iter().map(|(priority, _)| priority).collect()
    }

    /// Total number of tasks run so far.
    pub fn tasks_run(&self) -> usize {
        self.ran.get()
    }

    pub fn run_next(&self) -> Option<Result<(), RenderError>> {
        let next = {
            let mut queue = self.queue.borrow_mut();
            let index = queue
                .iter()
                .enumerate()
                .min_by_key(|(_, task)| (task.priority, task.handle))
                .map(|(index, _)| index)?;
            queue.remove(index)
        };
        let now = self.clock.now_millis();
        let did_timeout = next.deadline.is_some_and(|deadline| now >= deadline);
        log::trace!("manual scheduler running {:?} (overdue: {did_timeout})", next.priority);
        self.checks.set(0);
        self.ran.set(self.ran.get() + 1);
        Some((next.task)(did_timeout))
    }

    /// Runs tasks until none are left, up to `limit` of them.
    pub fn run_until_idle_with_limit(&self, limit: usize) -> Result<usize, RenderError> {
        let mut ran = 0;
        while ran < limit {
            match self.run_next() {
                Some(result) => {
                    result?;
                    ran += 1;
                }
                None => return Ok(ran),
            }
        }
        log::warn!("manual scheduler stopped after {limit} tasks with work left");
        Ok(ran)
    }

    pub fn run_until_idle(&self) -> Result<usize, RenderError> {
        self.run_until_idle_with_limit(10_000)
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .field("policy", &self.policy.get())
            .field("tasks_run", &self.ran.get())
            .finish()
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule_callback(&self, priority: SchedulerPriority, task: SchedulerTask) -> TaskHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let handle = TaskHandle::new(id);
        let deadline = priority
            .timeout_millis()
            .map(|timeout| self.clock.now_millis().saturating_add(timeout));
        self.queue.borrow_mut().push(ManualTask {
            handle,
            priority,
            deadline,
            task,
        });
        handle
    }

    fn cancel_callback(&self, handle: TaskHandle) {
        self.queue.borrow_mut().retain(|task| task.handle != handle);
    }

    fn should_yield(&self) -> bool {
        let checks = self.checks.get() + 1;
        self.checks.set(checks);
        match self.policy.get() {
            YieldPolicy::Never => false,
            YieldPolicy::Always => true,
            YieldPolicy::After(limit) => checks > limit,
        }
    }
}
