use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::RenderError;
use crate::host::MemoryHost;
use crate::platform::{Clock, SchedulerPriority, SchedulerTask, TaskHandle, TaskScheduler};
use crate::root::Renderer;
use crate::NodeId;

#[derive(Default)]
pub(crate) struct TestClock {
    now: Cell<u64>,
}

impl TestClock {
    pub(crate) fn advance(&self, millis: u64) {
        self.now.set(self.now.get() + millis);
    }
}

impl Clock for TestClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }
}

struct QueuedTask {
    handle: TaskHandle,
    deadline: u64,
    task: SchedulerTask,
}

/// Deadline-ordered task queue driven by hand from tests.
pub(crate) struct TestScheduler {
    clock: Rc<TestClock>,
    queue: RefCell<Vec<QueuedTask>>,
    next_id: Cell<u64>,
    yield_after: Cell<Option<usize>>,
    checks: Cell<usize>,
}

impl TestScheduler {
    pub(crate) fn new(clock: Rc<TestClock>) -> Self {
        Self {
            clock,
            queue: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            yield_after: Cell::new(None),
            checks: Cell::new(0),
        }
    }

    /// Yield once `units` work units have run in a task; `None` never yields.
    pub(crate) fn set_yield_after(&self, units: Option<usize>) {
        self.yield_after.set(units);
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    pub(crate) fn run_next(&self) -> Option<Result<(), RenderError>> {
        let next = {
            let mut queue = self.queue.borrow_mut();
            let index = queue
                .iter()
                .enumerate()
                .min_by_key(|(_, task)| (task.deadline, task.handle))
                .map(|(index, _)| index)?;
            queue.remove(index)
        };
        self.checks.set(0);
        let did_timeout = self.clock.now_millis() >= next.deadline;
        Some((next.task)(did_timeout))
    }

    pub(crate) fn run_all(&self) -> Result<usize, RenderError> {
        let mut ran = 0;
        while let Some(result) = self.run_next() {
            result?;
            ran += 1;
            assert!(ran < 1_000, "scheduler did not settle");
        }
        Ok(ran)
    }
}

impl TaskScheduler for TestScheduler {
    fn schedule_callback(&self, priority: SchedulerPriority, task: SchedulerTask) -> TaskHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let handle = TaskHandle::new(id);
        let deadline = priority
            .timeout_millis()
            .map_or(u64::MAX, |timeout| self.clock.now_millis() + timeout);
        self.queue.borrow_mut().push(QueuedTask {
            handle,
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
        self.yield_after.get().is_some_and(|limit| checks > limit)
    }
}

pub(crate) struct Harness {
    pub(crate) renderer: Renderer<MemoryHost>,
    pub(crate) container: NodeId,
    pub(crate) scheduler: Rc<TestScheduler>,
    pub(crate) clock: Rc<TestClock>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let clock = Rc::new(TestClock::default());
        let scheduler = Rc::new(TestScheduler::new(Rc::clone(&clock)));
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let renderer = Renderer::new(host, scheduler.clone(), clock.clone());
        Self {
            renderer,
            container,
            scheduler,
            clock,
        }
    }

    /// Renders at `Immediate` priority, so the tree is committed on return.
    pub(crate) fn render_sync(&mut self, element: crate::Element) -> Result<(), RenderError> {
        let container = self.container;
        self.renderer
            .with_priority(SchedulerPriority::Immediate, |renderer| {
                renderer.render(element, container)
            })
            .map(|_| ())
    }

    pub(crate) fn markup(&self) -> String {
        self.renderer
            .host()
            .markup(self.container)
            .expect("container exists")
    }

    pub(crate) fn take_calls(&self) -> Vec<crate::HostCall> {
        self.renderer.host().take_calls()
    }
}
