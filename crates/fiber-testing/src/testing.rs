use std::rc::Rc;

use fiber_core::{
    Element, FiberRoot, HostCall, HostError, HostGuard, MemoryHost, NodeId, RenderError,
    Renderer, SchedulerPriority,
};

use crate::manual::{ManualClock, ManualScheduler};

const PUMP_LIMIT: usize = 1_000;

/// Testing harness that mounts elements into a [`MemoryHost`] container and
/// drives the renderer with a [`ManualScheduler`].
pub struct TestRenderer {
    renderer: Renderer<MemoryHost>,
    container: NodeId,
    scheduler: Rc<ManualScheduler>,
    clock: Rc<ManualClock>,
}

impl TestRenderer {
    /// Creates a fresh renderer with one empty container and the clock at zero.
    pub fn new() -> Self {
        let clock = Rc::new(ManualClock::default());
        let scheduler = Rc::new(ManualScheduler::new(Rc::clone(&clock)));
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

    /// Requests a render at the current priority. Deferred work stays queued
    /// until [`TestRenderer::flush`] or [`TestRenderer::run_next`].
    pub fn render(&mut self, element: impl Into<Element>) -> Result<FiberRoot, RenderError> {
        let container = self.container;
        self.renderer.render(element, container)
    }

    /// Renders and commits before returning.
    pub fn render_sync(&mut self, element: impl Into<Element>) -> Result<FiberRoot, RenderError> {
        let container = self.container;
        self.renderer
            .with_priority(SchedulerPriority::Immediate, |renderer| {
                renderer.render(element, container)
            })
    }

    /// Renders, then runs scheduled work and passive effects until idle.
    pub fn render_and_flush(&mut self, element: impl Into<Element>) -> Result<(), RenderError> {
        self.render(element)?;
        self.flush()
    }

    /// Runs the next queued task, if any.
    pub fn run_next(&self) -> Option<Result<(), RenderError>> {
        self.scheduler.run_next()
    }

    /// Runs queued tasks and flushes passive effects until nothing is left.
    pub fn flush(&self) -> Result<(), RenderError> {
        for _ in 0..PUMP_LIMIT {
            let ran = self.scheduler.run_until_idle()?;
            self.renderer.flush_passive_effects()?;
            if ran == 0 && self.scheduler.pending() == 0 {
                return Ok(());
            }
        }
        log::warn!("test renderer did not settle after {PUMP_LIMIT} rounds");
        Ok(())
    }

    /// Runs `f` with every update it dispatches requested at `priority`.
    pub fn with_priority<R>(&mut self, priority: SchedulerPriority, f: impl FnOnce() -> R) -> R {
        self.renderer.with_priority(priority, |_| f())
    }

    pub fn unmount(&mut self) -> Result<bool, RenderError> {
        let container = self.container;
        self.renderer.unmount(container)
    }

    pub fn markup(&self) -> Result<String, HostError> {
        self.renderer.host().markup(self.container)
    }

    pub fn take_calls(&self) -> Vec<HostCall> {
        self.renderer.host().take_calls()
    }

    /// Indented dump of the host nodes under the container.
    pub fn dump_tree(&self) -> String {
        self.renderer.host().dump_tree(self.container)
    }

    pub fn has_content(&self) -> bool {
        self.renderer
            .host()
            .children(self.container)
            .is_ok_and(|children| !children.is_empty())
    }

    pub fn root(&self) -> Option<FiberRoot> {
        self.renderer.root(self.container)
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn host(&self) -> HostGuard<'_, MemoryHost> {
        self.renderer.host()
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<MemoryHost> {
        &mut self.renderer
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }
}

impl Default for TestRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need a temporary renderer.
pub fn run_test_renderer<R>(f: impl FnOnce(&mut TestRenderer) -> R) -> R {
    let mut renderer = TestRenderer::new();
    f(&mut renderer)
}

#[cfg(test)]
#[path = "tests/testing_tests.rs"]
mod tests;
