//! Per-fiber render step: compute new children for one work-in-progress fiber.

use std::rc::Rc;

use crate::child_reconciler::reconcile_children;
use crate::element::Element;
use crate::error::RenderError;
use crate::expiration::ExpirationTime;
use crate::fiber::{create_work_in_progress, FiberFlags, FiberId, FiberTag, FiberType};
use crate::hooks::render_with_hooks;
use crate::root::{RenderingFiber, RootInner, RootState};

impl RootState {
    /// Skips a fiber whose props and state are unchanged.
    ///
    /// Children are cloned when one of them has work at `render_time`;
    /// otherwise the whole subtree is reused as is.
    pub(crate) fn bailout_on_already_finished_work(
        &mut self,
        wip: FiberId,
        render_time: ExpirationTime,
    ) -> Option<FiberId> {
        if !render_time.includes(self.arena[wip].child_expiration_time) {
            return None;
        }
        self.clone_child_fibers(wip);
        self.arena[wip].child
    }

    fn clone_child_fibers(&mut self, wip: FiberId) {
        let mut current_child = self.arena[wip].child;
        let mut previous: Option<FiberId> = None;
        while let Some(current) = current_child {
            let props = self.arena[current].pending_props.clone();
            let next = create_work_in_progress(&mut self.arena, current, props);
            self.arena[next].return_fiber = Some(wip);
            match previous {
                Some(previous) => self.arena[previous].sibling = Some(next),
                None => self.arena[wip].child = Some(next),
            }
            previous = Some(next);
            current_child = self.arena[current].sibling;
        }
        if let Some(last) = previous {
            self.arena[last].sibling = None;
        }
    }
}

impl RootInner {
    /// Renders `wip` and returns its first child, or `None` when there is
    /// nothing below it to visit.
    pub(crate) fn begin_work(
        self: &Rc<Self>,
        current: Option<FiberId>,
        wip: FiberId,
        render_time: ExpirationTime,
    ) -> Result<Option<FiberId>, RenderError> {
        let tag = {
            let mut state = self.state.borrow_mut();
            if let Some(current) = current {
                let unchanged = state.arena[current]
                    .memoized_props
                    .as_ref()
                    .is_some_and(|previous| previous.ptr_eq(&state.arena[wip].pending_props));
                if unchanged && !state.arena[wip].has_pending_work(render_time) {
                    return Ok(state.bailout_on_already_finished_work(wip, render_time));
                }
            }
            let fiber = &mut state.arena[wip];
            fiber.expiration_time = ExpirationTime::NO_WORK;
            fiber.tag
        };

        match tag {
            FiberTag::HostRoot => self.update_host_root(current, wip, render_time),
            FiberTag::HostComponent => self.update_host_component(current, wip),
            FiberTag::HostText => self.update_host_text(wip),
            FiberTag::FunctionComponent => self.update_function_component(current, wip, render_time),
        }
    }

    fn update_host_root(
        &self,
        current: Option<FiberId>,
        wip: FiberId,
        render_time: ExpirationTime,
    ) -> Result<Option<FiberId>, RenderError> {
        let mut state = self.state.borrow_mut();
        let fiber = &mut state.arena[wip];
        let Some(queue) = fiber.update_queue.as_mut() else {
            log::error!("host root without an update queue");
            return Ok(None);
        };
        let processed = queue.process(render_time, |_, element| element.clone());
        fiber.expiration_time = processed.remaining;
        fiber.memoized_state = Some(processed.state.clone());
        Ok(reconcile_children(&mut state, current, wip, &processed.state))
    }

    fn update_host_component(
        &self,
        current: Option<FiberId>,
        wip: FiberId,
    ) -> Result<Option<FiberId>, RenderError> {
        let mut state = self.state.borrow_mut();
        let (tag, children, instance) = {
            let fiber = &state.arena[wip];
            let FiberType::Host(tag) = &fiber.kind else {
                return Ok(None);
            };
            let children = fiber
                .pending_props
                .props()
                .map(|props| props.children_element())
                .unwrap_or_default();
            (Rc::clone(tag), children, fiber.state_node)
        };
        if instance.is_none() {
            let id = self.host.borrow_dyn().create_instance(&tag)?;
            state.arena[wip].state_node = Some(id);
        }
        Ok(reconcile_children(&mut state, current, wip, &children))
    }

    fn update_host_text(&self, wip: FiberId) -> Result<Option<FiberId>, RenderError> {
        let mut state = self.state.borrow_mut();
        let fiber = &mut state.arena[wip];
        if fiber.state_node.is_none() {
            if let Some(text) = fiber.pending_props.text() {
                fiber.state_node = Some(self.host.borrow_dyn().create_text_instance(text)?);
            }
        }
        Ok(None)
    }

    fn update_function_component(
        self: &Rc<Self>,
        current: Option<FiberId>,
        wip: FiberId,
        render_time: ExpirationTime,
    ) -> Result<Option<FiberId>, RenderError> {
        let (component, props, committed) = {
            let state = self.state.borrow();
            let fiber = &state.arena[wip];
            let FiberType::Component(component) = &fiber.kind else {
                return Ok(None);
            };
            let committed = current
                .map(|current| state.arena[current].hooks.clone())
                .unwrap_or_default();
            let props = fiber.pending_props.props().cloned().unwrap_or_default();
            (component.clone(), props, committed)
        };

        self.rendering.set(Some(RenderingFiber { wip, current }));
        let result = render_with_hooks(self, wip, &component, &props, &committed, render_time);
        self.rendering.set(None);
        let rendered = result?;

        let mut state = self.state.borrow_mut();
        let fiber = &mut state.arena[wip];
        fiber.hooks = rendered.hooks;
        fiber.flags |= rendered.flags | FiberFlags::PERFORMED_WORK;
        fiber.expiration_time = fiber.expiration_time.more_urgent(rendered.remaining);
        let children: Element = rendered.element;
        Ok(reconcile_children(&mut state, current, wip, &children))
    }
}
