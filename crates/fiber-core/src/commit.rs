//! Commit: apply a finished tree to the host and run effects.
//!
//! Host mutations happen in three sweeps over the effect list: deletions,
//! then placements, then property and text updates. The finished tree then
//! becomes current, layout effects run (teardowns first), and passive
//! effects are queued for a later task.

use std::rc::Rc;

use crate::collections::NodeBuffer;
use crate::error::RenderError;
use crate::expiration::ExpirationTime;
use crate::fiber::{siblings, FiberArena, FiberFlags, FiberId, FiberTag};
use crate::hooks::{Cleanup, EffectHook, HookEffectFlags};
use crate::host::HostConfig;
use crate::owned::Owned;
use crate::platform::SchedulerPriority;
use crate::root::{ExecutionContext, RootInner, RootState};
use crate::NodeId;

#[derive(Default)]
struct LayoutWork {
    /// Taken only once the mutation sweeps succeed.
    destroys: Vec<Owned<Option<Cleanup>>>,
    mounts: Vec<EffectHook>,
    freed: Vec<FiberId>,
}

impl RootInner {
    pub(crate) fn commit_root(self: &Rc<Self>) -> Result<(), RenderError> {
        {
            let _scope = self.enter(ExecutionContext::COMMIT);
            let mut layout = LayoutWork::default();
            let schedule_passive = {
                let mut state = self.state.borrow_mut();
                let Some(finished) = state.wip_root else {
                    return Ok(());
                };
                let expiration = state.render_expiration_time;
                state.finished_work = Some(finished);
                state.finished_expiration_time = expiration;

                let effects = collect_effects(&state.arena, finished);
                log::debug!("committing {} effects at {expiration:?}", effects.len());
                let passive_mark = state.pending_passive.len();
                let mutated = {
                    let mut host = self.host.borrow_dyn();
                    commit_mutation_effects(&mut state, &mut *host, &effects, &mut layout)
                };
                if let Err(err) = mutated {
                    log::error!("commit aborted at {expiration:?}: {err}");
                    state.pending_passive.truncate(passive_mark);
                    state.finished_work = None;
                    state.finished_expiration_time = ExpirationTime::NO_WORK;
                    drop(state);
                    self.abort_pass();
                    return Err(err);
                }

                state.wip_root = None;
                state.work_in_progress = None;
                state.render_expiration_time = ExpirationTime::NO_WORK;
                self.render_time.set(ExpirationTime::NO_WORK);
                state.allocated.clear();
                let remaining = {
                    let fiber = &state.arena[finished];
                    fiber.expiration_time.more_urgent(fiber.child_expiration_time)
                };
                state.first_pending_time = remaining;
                if !state.last_expired_time.is_no_work() && remaining > state.last_expired_time {
                    state.last_expired_time = ExpirationTime::NO_WORK;
                }

                state.current = finished;
                collect_lifecycle_effects(&mut state, &effects, &mut layout);
                for id in layout.freed.drain(..) {
                    state.free_fiber(id);
                }
                state.finished_work = None;
                state.finished_expiration_time = ExpirationTime::NO_WORK;
                !state.pending_passive.is_empty() && state.passive_callback.is_none()
            };

            if schedule_passive {
                self.schedule_passive_flush();
            }
            for destroy in layout.destroys {
                if let Some(cleanup) = destroy.take() {
                    cleanup.run();
                }
            }
            for effect in layout.mounts {
                if let Some(create) = effect.create.take() {
                    effect.destroy.replace(Some(create()));
                }
            }
        }
        self.ensure_root_is_scheduled();
        self.flush_sync_queue()
    }

    fn schedule_passive_flush(self: &Rc<Self>) {
        let root = Rc::downgrade(self);
        let handle = self.context.scheduler.schedule_callback(
            SchedulerPriority::Normal,
            Box::new(move |_| match root.upgrade() {
                Some(root) => root.flush_passive_effects().map(|_| ()),
                None => Ok(()),
            }),
        );
        self.state.borrow_mut().passive_callback = Some(handle);
    }

    /// Runs queued passive teardowns, then queued passive creates.
    pub(crate) fn flush_passive_effects(self: &Rc<Self>) -> Result<bool, RenderError> {
        let (effects, handle) = {
            let mut state = self.state.borrow_mut();
            (
                std::mem::take(&mut state.pending_passive),
                state.passive_callback.take(),
            )
        };
        if let Some(handle) = handle {
            self.context.scheduler.cancel_callback(handle);
        }
        if effects.is_empty() {
            return Ok(false);
        }
        log::trace!(
            "flushing {} passive teardowns and {} passive effects",
            effects.unmount.len(),
            effects.mount.len()
        );
        {
            let _scope = self.enter(ExecutionContext::COMMIT);
            for destroy in effects.unmount {
                if let Some(cleanup) = destroy.take() {
                    cleanup.run();
                }
            }
            for effect in effects.mount {
                if let Some(create) = effect.create.take() {
                    effect.destroy.replace(Some(create()));
                }
            }
        }
        self.flush_sync_queue()?;
        Ok(true)
    }
}

fn collect_effects(arena: &FiberArena, root: FiberId) -> Vec<FiberId> {
    let mut effects = Vec::new();
    let mut cursor = arena[root].first_effect;
    while let Some(id) = cursor {
        effects.push(id);
        cursor = arena[id].next_effect;
    }
    if arena[root].flags.intersects(FiberFlags::SIDE_EFFECTS) {
        effects.push(root);
    }
    effects
}

fn commit_mutation_effects(
    state: &mut RootState,
    host: &mut dyn HostConfig,
    effects: &[FiberId],
    layout: &mut LayoutWork,
) -> Result<(), RenderError> {
    for &id in effects {
        if state.arena[id].flags.contains(FiberFlags::DELETION) {
            commit_deletion(state, host, id, layout)?;
        }
    }
    for &id in effects {
        if state.arena[id].flags.contains(FiberFlags::PLACEMENT) {
            commit_placement(state, host, id)?;
        }
    }
    for &id in effects {
        if state.arena[id].flags.contains(FiberFlags::UPDATE) {
            commit_work(state, host, id, layout)?;
        }
    }
    Ok(())
}

fn host_parent(arena: &FiberArena, fiber: FiberId) -> Option<NodeId> {
    let mut cursor = arena[fiber].return_fiber;
    while let Some(id) = cursor {
        let parent = arena.get(id)?;
        if parent.tag.is_host_parent() {
            return parent.state_node;
        }
        cursor = parent.return_fiber;
    }
    None
}

/// First host node after `fiber` that is already in place, if any.
fn host_sibling(arena: &FiberArena, fiber: FiberId) -> Option<NodeId> {
    let mut node = fiber;
    'siblings: loop {
        while arena[node].sibling.is_none() {
            match arena[node].return_fiber {
                Some(parent) if !arena[parent].tag.is_host_parent() => node = parent,
                _ => return None,
            }
        }
        node = arena[node].sibling?;
        while !arena[node].tag.is_host() {
            if arena[node].flags.contains(FiberFlags::PLACEMENT) {
                continue 'siblings;
            }
            match arena[node].child {
                Some(child) => node = child,
                None => continue 'siblings,
            }
        }
        if !arena[node].flags.contains(FiberFlags::PLACEMENT) {
            return arena[node].state_node;
        }
    }
}

/// Host nodes directly owned by `fiber`: itself, or its nearest host descendants.
fn top_host_nodes(arena: &FiberArena, fiber: FiberId) -> NodeBuffer<NodeId> {
    let mut nodes = NodeBuffer::new();
    let mut stack = vec![fiber];
    while let Some(id) = stack.pop() {
        let node = &arena[id];
        if node.tag.is_host() {
            nodes.extend(node.state_node);
            continue;
        }
        stack.extend(siblings(arena, node.child).into_iter().rev());
    }
    nodes
}

fn commit_placement(
    state: &mut RootState,
    host: &mut dyn HostConfig,
    fiber: FiberId,
) -> Result<(), RenderError> {
    let arena = &state.arena;
    let Some(parent) = host_parent(arena, fiber) else {
        log::warn!("placed fiber {fiber:?} has no host parent");
        return Ok(());
    };
    let before = host_sibling(arena, fiber);
    for node in top_host_nodes(arena, fiber) {
        match before {
            Some(before) => host.insert_before(parent, node, before)?,
            None => host.append_child(parent, node)?,
        }
    }
    state.arena[fiber].flags.remove(FiberFlags::PLACEMENT);
    Ok(())
}

/// Detaches a deleted subtree and collects the teardowns of every component in it.
fn commit_deletion(
    state: &mut RootState,
    host: &mut dyn HostConfig,
    fiber: FiberId,
    layout: &mut LayoutWork,
) -> Result<(), RenderError> {
    let parent = host_parent(&state.arena, fiber);
    let mut removals = NodeBuffer::new();
    let mut stack = vec![(fiber, false)];
    while let Some((id, inside_host)) = stack.pop() {
        let node = &state.arena[id];
        if node.tag == FiberTag::FunctionComponent {
            for effect in node.hooks.iter().filter_map(|hook| hook.as_effect()) {
                if effect.tag.contains(HookEffectFlags::PASSIVE) {
                    state.pending_passive.unmount.push(effect.destroy.clone());
                } else {
                    layout.destroys.push(effect.destroy.clone());
                }
            }
        }
        let is_host = node.tag.is_host();
        if is_host && !inside_host {
            removals.extend(node.state_node);
        }
        let children = siblings(&state.arena, node.child);
        stack.extend(children.into_iter().rev().map(|child| (child, inside_host || is_host)));
        layout.freed.push(id);
    }

    match parent {
        Some(parent) => {
            for node in removals {
                host.remove_child(parent, node)?;
            }
        }
        None => log::warn!("deleted fiber {fiber:?} has no host parent"),
    }
    Ok(())
}

fn commit_work(
    state: &mut RootState,
    host: &mut dyn HostConfig,
    id: FiberId,
    layout: &mut LayoutWork,
) -> Result<(), RenderError> {
    let fiber = &mut state.arena[id];
    match fiber.tag {
        FiberTag::HostComponent => {
            if let (Some(node), Some(patch)) = (fiber.state_node, fiber.update_payload.take()) {
                for (key, value) in patch {
                    host.set_property(node, &key, value.as_ref())?;
                }
            }
        }
        FiberTag::HostText => {
            let text = fiber.memoized_props.as_ref().and_then(|props| props.text());
            if let (Some(node), Some(text)) = (fiber.state_node, text) {
                host.set_text(node, text)?;
            }
        }
        FiberTag::FunctionComponent => {
            for effect in fiber.hooks.iter().filter_map(|hook| hook.as_effect()) {
                if effect.needs_commit(HookEffectFlags::LAYOUT) {
                    layout.destroys.push(effect.destroy.clone());
                }
            }
        }
        FiberTag::HostRoot => {}
    }
    Ok(())
}

/// Queues layout creates and passive work for components in the committed tree.
fn collect_lifecycle_effects(state: &mut RootState, effects: &[FiberId], layout: &mut LayoutWork) {
    for &id in effects {
        let Some(fiber) = state.arena.get(id) else {
            continue;
        };
        if fiber.tag != FiberTag::FunctionComponent {
            continue;
        }
        let flags = fiber.flags;
        for effect in fiber.hooks.iter().filter_map(|hook| hook.as_effect()) {
            if flags.contains(FiberFlags::UPDATE) && effect.needs_commit(HookEffectFlags::LAYOUT) {
                layout.mounts.push(effect.clone());
            }
            if flags.contains(FiberFlags::PASSIVE) && effect.needs_commit(HookEffectFlags::PASSIVE) {
                state.pending_passive.unmount.push(effect.destroy.clone());
                state.pending_passive.mount.push(effect.clone());
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/commit_tests.rs"]
mod tests;
