//! Root containers and the public [`Renderer`] entry point.

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::element::Element;
use crate::error::RenderError;
use crate::expiration::ExpirationTime;
use crate::fiber::{Fiber, FiberArena, FiberId, FiberProps, FiberTag, FiberType};
use crate::hooks::{Cleanup, EffectHook};
use crate::host::{ConcreteHost, HostConfig, HostGuard, HostHolder};
use crate::owned::Owned;
use crate::platform::{Clock, SchedulerPriority, TaskHandle, TaskScheduler};
use crate::update_queue::{QueueHandle, UpdateQueue};
use crate::NodeId;

/// Scheduler, clock and current update priority shared by a renderer's roots.
pub(crate) struct SchedulingContext {
    pub(crate) scheduler: Rc<dyn TaskScheduler>,
    pub(crate) clock: Rc<dyn Clock>,
    priority: Cell<SchedulerPriority>,
}

impl SchedulingContext {
    fn new(scheduler: Rc<dyn TaskScheduler>, clock: Rc<dyn Clock>) -> Self {
        Self {
            scheduler,
            clock,
            priority: Cell::new(SchedulerPriority::Normal),
        }
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub(crate) fn priority(&self) -> SchedulerPriority {
        self.priority.get()
    }
}

struct PriorityScope<'a> {
    context: &'a SchedulingContext,
    previous: SchedulerPriority,
}

impl Drop for PriorityScope<'_> {
    fn drop(&mut self) {
        self.context.priority.set(self.previous);
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub(crate) struct ExecutionContext: u8 {
        const RENDER = 1 << 0;
        const COMMIT = 1 << 1;
    }
}

pub(crate) struct ExecutionScope<'a> {
    cell: &'a Cell<ExecutionContext>,
    previous: ExecutionContext,
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

/// Passive effect work queued by a commit and run by a later task.
#[derive(Default)]
pub(crate) struct PassiveEffects {
    pub(crate) unmount: Vec<Owned<Option<Cleanup>>>,
    pub(crate) mount: Vec<EffectHook>,
}

impl PassiveEffects {
    pub(crate) fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.mount.is_empty()
    }

    pub(crate) fn len(&self) -> (usize, usize) {
        (self.unmount.len(), self.mount.len())
    }

    /// Drops work queued after `mark`, a value from [`PassiveEffects::len`].
    pub(crate) fn truncate(&mut self, mark: (usize, usize)) {
        self.unmount.truncate(mark.0);
        self.mount.truncate(mark.1);
    }
}

/// Fiber of the component currently executing, and its committed twin.
#[derive(Copy, Clone)]
pub(crate) struct RenderingFiber {
    pub(crate) wip: FiberId,
    pub(crate) current: Option<FiberId>,
}

pub(crate) struct RootState {
    pub(crate) arena: FiberArena,
    pub(crate) current: FiberId,
    pub(crate) container: NodeId,
    pub(crate) root_queue: QueueHandle<Element>,

    pub(crate) callback_node: Option<TaskHandle>,
    pub(crate) callback_priority: Option<SchedulerPriority>,
    pub(crate) callback_expiration: ExpirationTime,
    pub(crate) callback_generation: u64,

    pub(crate) first_pending_time: ExpirationTime,
    pub(crate) last_expired_time: ExpirationTime,
    pub(crate) finished_expiration_time: ExpirationTime,
    pub(crate) finished_work: Option<FiberId>,

    pub(crate) wip_root: Option<FiberId>,
    pub(crate) work_in_progress: Option<FiberId>,
    pub(crate) render_expiration_time: ExpirationTime,
    /// Fibers created by the in-progress pass that have no committed twin yet.
    pub(crate) allocated: Vec<FiberId>,

    pub(crate) pending_passive: PassiveEffects,
    pub(crate) passive_callback: Option<TaskHandle>,
}

impl RootState {
    fn new(container: NodeId) -> Self {
        let mut arena = FiberArena::with_key();
        let mut fiber = Fiber::new(FiberTag::HostRoot, FiberType::None, None, FiberProps::Root);
        let queue = UpdateQueue::new(Element::Empty);
        let root_queue = queue.handle();
        fiber.update_queue = Some(queue);
        fiber.memoized_state = Some(Element::Empty);
        fiber.memoized_props = Some(FiberProps::Root);
        fiber.state_node = Some(container);
        let current = arena.insert(fiber);
        Self {
            arena,
            current,
            container,
            root_queue,
            callback_node: None,
            callback_priority: None,
            callback_expiration: ExpirationTime::NO_WORK,
            callback_generation: 0,
            first_pending_time: ExpirationTime::NO_WORK,
            last_expired_time: ExpirationTime::NO_WORK,
            finished_expiration_time: ExpirationTime::NO_WORK,
            finished_work: None,
            wip_root: None,
            work_in_progress: None,
            render_expiration_time: ExpirationTime::NO_WORK,
            allocated: Vec::new(),
            pending_passive: PassiveEffects::default(),
            passive_callback: None,
        }
    }

    /// Records `expiration` on `fiber` and on every ancestor's child summary.
    ///
    /// Returns `false` when the fiber no longer belongs to this root.
    pub(crate) fn mark_update_time(&mut self, fiber: FiberId, expiration: ExpirationTime) -> bool {
        let Some(node) = self.arena.get_mut(fiber) else {
            return false;
        };
        node.expiration_time = node.expiration_time.more_urgent(expiration);
        let mut reached_root = node.tag == FiberTag::HostRoot;
        let mut parent = node.return_fiber;
        if let Some(alternate) = node.alternate.and_then(|id| self.arena.get_mut(id)) {
            alternate.expiration_time = alternate.expiration_time.more_urgent(expiration);
        }

        let mut steps = 0;
        while let (false, Some(id)) = (reached_root, parent) {
            steps += 1;
            if steps > self.arena.len() {
                log::error!("return path of {fiber:?} does not reach the root");
                return false;
            }
            let Some(node) = self.arena.get_mut(id) else {
                return false;
            };
            node.child_expiration_time = node.child_expiration_time.more_urgent(expiration);
            reached_root = node.tag == FiberTag::HostRoot;
            parent = node.return_fiber;
            if let Some(alternate) = node.alternate.and_then(|id| self.arena.get_mut(id)) {
                alternate.child_expiration_time =
                    alternate.child_expiration_time.more_urgent(expiration);
            }
        }

        if reached_root {
            self.first_pending_time = self.first_pending_time.more_urgent(expiration);
        }
        reached_root
    }

    /// Frees fibers the in-progress pass created.
    pub(crate) fn discard_allocated(&mut self) {
        for id in self.allocated.drain(..) {
            self.arena.remove(id);
        }
    }

    pub(crate) fn free_fiber(&mut self, id: FiberId) {
        if let Some(fiber) = self.arena.remove(id) {
            if let Some(alternate) = fiber.alternate {
                self.arena.remove(alternate);
            }
        }
    }

    fn dump_tree(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.current, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(fiber) = self.arena.get(id) else {
                continue;
            };
            let _ = writeln!(out, "{}{:?} {}", "  ".repeat(depth), fiber.tag, fiber.describe());
            let children = crate::fiber::siblings(&self.arena, fiber.child);
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }
        out
    }
}

pub(crate) struct RootInner {
    pub(crate) state: RefCell<RootState>,
    pub(crate) host: Rc<dyn HostHolder>,
    pub(crate) context: Rc<SchedulingContext>,
    execution: Cell<ExecutionContext>,
    pub(crate) rendering: Cell<Option<RenderingFiber>>,
    render_phase_update: Cell<bool>,
    /// Mirror of the in-progress render time, readable while `state` is borrowed elsewhere.
    pub(crate) render_time: Cell<ExpirationTime>,
    pub(crate) sync_pending: Cell<bool>,
    unmounted: Cell<bool>,
}

impl RootInner {
    fn new(host: Rc<dyn HostHolder>, context: Rc<SchedulingContext>, container: NodeId) -> Self {
        Self {
            state: RefCell::new(RootState::new(container)),
            host,
            context,
            execution: Cell::new(ExecutionContext::empty()),
            rendering: Cell::new(None),
            render_phase_update: Cell::new(false),
            render_time: Cell::new(ExpirationTime::NO_WORK),
            sync_pending: Cell::new(false),
            unmounted: Cell::new(false),
        }
    }

    pub(crate) fn enter(&self, context: ExecutionContext) -> ExecutionScope<'_> {
        let previous = self.execution.get();
        self.execution.set(previous | context);
        ExecutionScope {
            cell: &self.execution,
            previous,
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.execution.get().is_empty()
    }

    pub(crate) fn take_render_phase_update(&self) -> bool {
        self.render_phase_update.replace(false)
    }

    pub(crate) fn note_render_phase_update(&self) {
        self.render_phase_update.set(true);
    }

    fn update_container(self: &Rc<Self>, element: Element) -> Result<(), RenderError> {
        if self.unmounted.get() {
            return Err(RenderError::RootUnmounted);
        }
        let (fiber, queue) = {
            let state = self.state.borrow();
            (state.current, state.root_queue.clone())
        };
        let expiration = self.request_update_time(fiber);
        log::debug!("root update requested at {expiration:?}");
        queue.enqueue(expiration, element);
        self.schedule_update_on_fiber(fiber, expiration)
    }
}

/// Handle to one mounted root container.
#[derive(Clone)]
pub struct FiberRoot {
    inner: Rc<RootInner>,
}

impl std::fmt::Debug for FiberRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberRoot").finish_non_exhaustive()
    }
}

impl FiberRoot {
    /// Host container this root renders into.
    pub fn container(&self) -> NodeId {
        self.inner.state.borrow().container
    }

    /// Schedules `element` as the new content of this root at the current priority.
    pub fn render(&self, element: impl Into<Element>) -> Result<(), RenderError> {
        self.inner.update_container(element.into())
    }

    /// Most urgent expiration time with unfinished work, or `NO_WORK`.
    pub fn first_pending_time(&self) -> ExpirationTime {
        self.inner.state.borrow().first_pending_time
    }

    /// Expiration time of work that ran out of time and is being finished synchronously.
    pub fn last_expired_time(&self) -> ExpirationTime {
        self.inner.state.borrow().last_expired_time
    }

    /// Expiration time of the tree being committed; `NO_WORK` outside a commit.
    pub fn finished_expiration_time(&self) -> ExpirationTime {
        self.inner.state.borrow().finished_expiration_time
    }

    /// Priority of the queued root task, if one is queued.
    pub fn callback_priority(&self) -> Option<SchedulerPriority> {
        self.inner.state.borrow().callback_priority
    }

    pub fn has_pending_work(&self) -> bool {
        !self.first_pending_time().is_no_work()
    }

    /// `true` while a render pass is suspended between scheduler tasks.
    pub fn is_rendering(&self) -> bool {
        self.inner.state.borrow().wip_root.is_some()
    }

    pub fn has_pending_passive_effects(&self) -> bool {
        !self.inner.state.borrow().pending_passive.is_empty()
    }

    /// Runs queued passive effects now. Returns whether any were pending.
    pub fn flush_passive_effects(&self) -> Result<bool, RenderError> {
        self.inner.flush_passive_effects()
    }

    /// Number of live fibers across both trees.
    pub fn fiber_count(&self) -> usize {
        self.inner.state.borrow().arena.len()
    }

    /// Indented listing of the committed fiber tree.
    pub fn dump_tree(&self) -> String {
        self.inner.state.borrow().dump_tree()
    }
}

/// Owns the host and mounts element trees into its containers.
pub struct Renderer<H: HostConfig> {
    host: Rc<ConcreteHost<H>>,
    context: Rc<SchedulingContext>,
    roots: HashMap<NodeId, FiberRoot>,
}

impl<H: HostConfig> Renderer<H> {
    pub fn new(host: H, scheduler: Rc<dyn TaskScheduler>, clock: Rc<dyn Clock>) -> Self {
        Self {
            host: Rc::new(ConcreteHost::new(host)),
            context: Rc::new(SchedulingContext::new(scheduler, clock)),
            roots: HashMap::default(),
        }
    }

    /// Renders `element` into `container`, creating the root on first use.
    ///
    /// At `Immediate` priority the tree is committed before this returns;
    /// otherwise the work is queued with the scheduler.
    pub fn render(
        &mut self,
        element: impl Into<Element>,
        container: NodeId,
    ) -> Result<FiberRoot, RenderError> {
        let root = match self.roots.get(&container) {
            Some(root) => root.clone(),
            None => {
                log::debug!("creating root for container {container}");
                let host: Rc<dyn HostHolder> = self.host.clone();
                let root = FiberRoot {
                    inner: Rc::new(RootInner::new(host, Rc::clone(&self.context), container)),
                };
                self.roots.insert(container, root.clone());
                root
            }
        };
        root.render(element)?;
        Ok(root)
    }

    /// Synchronously empties `container` and forgets its root.
    pub fn unmount(&mut self, container: NodeId) -> Result<bool, RenderError> {
        let Some(root) = self.roots.remove(&container) else {
            return Ok(false);
        };
        {
            let _scope = self.priority_scope(SchedulerPriority::Immediate);
            root.render(Element::Empty)?;
        }
        root.flush_passive_effects()?;
        root.inner.cancel_root_callback();
        root.inner.unmounted.set(true);
        Ok(true)
    }

    pub fn root(&self, container: NodeId) -> Option<FiberRoot> {
        self.roots.get(&container).cloned()
    }

    pub fn priority(&self) -> SchedulerPriority {
        self.context.priority()
    }

    /// Runs `f` with `priority` as the priority of every update it requests.
    pub fn with_priority<R>(
        &mut self,
        priority: SchedulerPriority,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let context = Rc::clone(&self.context);
        let _scope = PriorityScope {
            previous: context.priority.replace(priority),
            context: &context,
        };
        f(self)
    }

    fn priority_scope(&self, priority: SchedulerPriority) -> PriorityScope<'_> {
        PriorityScope {
            previous: self.context.priority.replace(priority),
            context: &self.context,
        }
    }

    pub fn flush_passive_effects(&self) -> Result<(), RenderError> {
        for root in self.roots.values() {
            root.flush_passive_effects()?;
        }
        Ok(())
    }

    /// Borrows the host. Release the guard before updates are dispatched.
    pub fn host(&self) -> HostGuard<'_, H> {
        HostGuard::new(self.host.borrow_typed())
    }

    pub fn scheduler(&self) -> Rc<dyn TaskScheduler> {
        Rc::clone(&self.context.scheduler)
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.context.clock)
    }
}

#[cfg(test)]
#[path = "tests/root_tests.rs"]
mod tests;
