//! Update scheduling and the interruptible render loop.
//!
//! Updates mark their fiber and every ancestor with an expiration time, then
//! ask the scheduler for a root task at the matching priority. Sync work runs
//! to completion in the current turn. Everything else renders one fiber per
//! unit, checking `should_yield` between units, and restarts from the current
//! tree whenever a more urgent update arrives.

use std::rc::Rc;

use crate::complete_work::{append_effects_to_parent, complete_work, reset_child_expiration_time};
use crate::error::RenderError;
use crate::expiration::ExpirationTime;
use crate::fiber::{create_work_in_progress, FiberId, FiberProps};
use crate::platform::{SchedulerPriority, SchedulerTask};
use crate::root::{ExecutionContext, RootInner, RootState};

impl RootInner {
    fn is_rendering_fiber(&self, fiber: FiberId) -> bool {
        self.rendering
            .get()
            .is_some_and(|rendering| rendering.wip == fiber || rendering.current == Some(fiber))
    }

    /// Expiration for an update on `fiber` requested now.
    ///
    /// Updates a component makes on itself while rendering join the pass in progress.
    pub(crate) fn request_update_time(&self, fiber: FiberId) -> ExpirationTime {
        if self.is_rendering_fiber(fiber) {
            return self.render_time.get();
        }
        ExpirationTime::compute(self.context.now(), self.context.priority())
    }

    pub(crate) fn schedule_update_on_fiber(
        self: &Rc<Self>,
        fiber: FiberId,
        expiration: ExpirationTime,
    ) -> Result<(), RenderError> {
        if self.is_rendering_fiber(fiber) {
            self.note_render_phase_update();
            return Ok(());
        }
        if !self.state.borrow_mut().mark_update_time(fiber, expiration) {
            log::warn!("update on unmounted fiber {fiber:?} ignored");
            return Ok(());
        }
        if expiration.is_sync() {
            if self.is_idle() {
                return self.perform_sync_work_on_root();
            }
            self.sync_pending.set(true);
        }
        self.ensure_root_is_scheduled();
        Ok(())
    }

    /// Makes sure exactly one root task exists for the most urgent pending work.
    pub(crate) fn ensure_root_is_scheduled(self: &Rc<Self>) {
        let now = self.context.now();
        let mut state = self.state.borrow_mut();
        let target = if !state.last_expired_time.is_no_work() {
            Some((state.last_expired_time, SchedulerPriority::Immediate, true))
        } else if state.first_pending_time.is_no_work() {
            None
        } else {
            let expiration = state.first_pending_time;
            Some((expiration, expiration.priority_at(now), expiration.is_sync()))
        };

        let Some((expiration, priority, sync)) = target else {
            if let Some(handle) = state.callback_node.take() {
                self.context.scheduler.cancel_callback(handle);
            }
            state.callback_priority = None;
            state.callback_expiration = ExpirationTime::NO_WORK;
            return;
        };

        if let Some(existing) = state.callback_node {
            let covered = state.callback_expiration == expiration
                && state.callback_priority.is_some_and(|current| current <= priority);
            if covered {
                return;
            }
            self.context.scheduler.cancel_callback(existing);
        }

        state.callback_generation += 1;
        let generation = state.callback_generation;
        let root = Rc::downgrade(self);
        let task: SchedulerTask = if sync {
            Box::new(move |_| match root.upgrade() {
                Some(root) => root.run_sync_task(generation),
                None => Ok(()),
            })
        } else {
            Box::new(move |did_timeout| match root.upgrade() {
                Some(root) => root.perform_concurrent_work_on_root(generation, did_timeout),
                None => Ok(()),
            })
        };
        let handle = self.context.scheduler.schedule_callback(priority, task);
        log::trace!("root task {handle:?} scheduled at {priority:?} for {expiration:?}");
        state.callback_node = Some(handle);
        state.callback_priority = Some(priority);
        state.callback_expiration = expiration;
    }

    pub(crate) fn cancel_root_callback(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(handle) = state.callback_node.take() {
            self.context.scheduler.cancel_callback(handle);
        }
        state.callback_priority = None;
        state.callback_expiration = ExpirationTime::NO_WORK;
    }

    /// Clears the callback fields if `generation` still owns them.
    fn claim_callback(&self, generation: u64) -> bool {
        let mut state = self.state.borrow_mut();
        if state.callback_generation != generation || state.callback_node.is_none() {
            return false;
        }
        state.callback_node = None;
        state.callback_priority = None;
        state.callback_expiration = ExpirationTime::NO_WORK;
        true
    }

    fn run_sync_task(self: &Rc<Self>, generation: u64) -> Result<(), RenderError> {
        if !self.claim_callback(generation) {
            return Ok(());
        }
        self.perform_sync_work_on_root()
    }

    /// Renders and commits sync or expired work without yielding.
    pub(crate) fn perform_sync_work_on_root(self: &Rc<Self>) -> Result<(), RenderError> {
        self.sync_pending.set(false);
        self.cancel_root_callback();
        self.flush_passive_effects()?;
        {
            let mut state = self.state.borrow_mut();
            let expiration = if state.last_expired_time.is_no_work() {
                ExpirationTime::SYNC
            } else {
                state.last_expired_time
            };
            if state.wip_root.is_none() || state.render_expiration_time != expiration {
                self.prepare_fresh_stack(&mut state, expiration);
            }
            log::debug!("sync render at {expiration:?}");
        }
        self.render_root(true)?;
        self.commit_root()
    }

    fn perform_concurrent_work_on_root(
        self: &Rc<Self>,
        generation: u64,
        did_timeout: bool,
    ) -> Result<(), RenderError> {
        if !self.claim_callback(generation) {
            return Ok(());
        }
        self.flush_passive_effects()?;

        let now = self.context.now();
        let expiration = self.state.borrow().first_pending_time;
        if expiration.is_no_work() {
            return Ok(());
        }
        if did_timeout || expiration.has_expired(now) {
            let expired_at = expiration.less_urgent(ExpirationTime::from_millis(now));
            log::debug!("work due at {expiration:?} is overdue at {now}ms; finishing synchronously");
            self.state.borrow_mut().last_expired_time = expired_at;
            return self.perform_sync_work_on_root();
        }

        {
            let mut state = self.state.borrow_mut();
            if state.wip_root.is_none() || state.render_expiration_time != expiration {
                self.prepare_fresh_stack(&mut state, expiration);
            }
        }
        if !self.render_root(false)? {
            log::trace!("yielding with work left at {expiration:?}");
            self.ensure_root_is_scheduled();
            return self.flush_sync_queue();
        }
        self.commit_root()
    }

    /// Starts a new pass from the current tree, discarding any pass in progress.
    fn prepare_fresh_stack(&self, state: &mut RootState, expiration: ExpirationTime) {
        if state.wip_root.is_some() {
            log::debug!(
                "discarding pass at {:?} for work at {expiration:?}",
                state.render_expiration_time
            );
            state.discard_allocated();
        }
        state.finished_work = None;
        state.finished_expiration_time = ExpirationTime::NO_WORK;
        let wip = create_work_in_progress(&mut state.arena, state.current, FiberProps::Root);
        state.wip_root = Some(wip);
        state.work_in_progress = Some(wip);
        state.render_expiration_time = expiration;
        self.render_time.set(expiration);
    }

    /// Throws away the pass in progress; the committed tree is untouched.
    pub(crate) fn abort_pass(&self) {
        let mut state = self.state.borrow_mut();
        state.discard_allocated();
        state.wip_root = None;
        state.work_in_progress = None;
        state.render_expiration_time = ExpirationTime::NO_WORK;
        self.render_time.set(ExpirationTime::NO_WORK);
    }

    /// Runs the work loop. Returns `true` once the whole tree is complete.
    fn render_root(self: &Rc<Self>, sync: bool) -> Result<bool, RenderError> {
        let result = {
            let _scope = self.enter(ExecutionContext::RENDER);
            self.work_loop(sync)
        };
        if let Err(err) = result {
            log::error!("render aborted: {err}");
            self.abort_pass();
            return Err(err);
        }
        Ok(self.state.borrow().work_in_progress.is_none())
    }

    fn work_loop(self: &Rc<Self>, sync: bool) -> Result<(), RenderError> {
        loop {
            let Some(unit) = self.state.borrow().work_in_progress else {
                return Ok(());
            };
            if !sync && self.context.scheduler.should_yield() {
                return Ok(());
            }
            self.perform_unit_of_work(unit)?;
        }
    }

    fn perform_unit_of_work(self: &Rc<Self>, unit: FiberId) -> Result<(), RenderError> {
        let (current, render_time) = {
            let state = self.state.borrow();
            (state.arena[unit].alternate, state.render_expiration_time)
        };
        let next = self.begin_work(current, unit, render_time)?;

        let mut state = self.state.borrow_mut();
        let props = state.arena[unit].pending_props.clone();
        state.arena[unit].memoized_props = Some(props);
        match next {
            Some(child) => {
                state.work_in_progress = Some(child);
                Ok(())
            }
            None => self.complete_unit_of_work(&mut state, unit),
        }
    }

    /// Completes `unit` and its ancestors until one has an unvisited sibling.
    fn complete_unit_of_work(&self, state: &mut RootState, unit: FiberId) -> Result<(), RenderError> {
        let mut completed = unit;
        loop {
            let (current, parent, sibling) = {
                let fiber = &state.arena[completed];
                (fiber.alternate, fiber.return_fiber, fiber.sibling)
            };
            {
                let mut host = self.host.borrow_dyn();
                complete_work(state, &mut *host, current, completed)?;
            }
            reset_child_expiration_time(state, completed);
            if let Some(parent) = parent {
                append_effects_to_parent(state, completed, parent);
            }
            if let Some(sibling) = sibling {
                state.work_in_progress = Some(sibling);
                return Ok(());
            }
            match parent {
                Some(parent) => completed = parent,
                None => {
                    state.work_in_progress = None;
                    return Ok(());
                }
            }
        }
    }

    /// Runs sync work that was requested while the root was busy.
    pub(crate) fn flush_sync_queue(self: &Rc<Self>) -> Result<(), RenderError> {
        if !self.is_idle() || !self.sync_pending.get() {
            return Ok(());
        }
        self.perform_sync_work_on_root()
    }
}

#[cfg(test)]
#[path = "tests/work_loop_tests.rs"]
mod tests;
