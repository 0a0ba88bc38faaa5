use crate::element::Props;
use crate::error::RenderError;
use crate::expiration::ExpirationTime;
use crate::fiber::{FiberFlags, FiberId, FiberProps, FiberTag, PropertyPatch};
use crate::host::HostConfig;
use crate::root::RootState;
use crate::NodeId;

/// Finishes a fiber after all of its children are done.
///
/// New host instances get their host children attached and initial
/// properties applied here, so a fresh subtree is fully assembled before
/// commit places its top node. Existing instances only record a patch.
pub(crate) fn complete_work(
    state: &mut RootState,
    host: &mut dyn HostConfig,
    current: Option<FiberId>,
    wip: FiberId,
) -> Result<(), RenderError> {
    match state.arena[wip].tag {
        FiberTag::HostRoot | FiberTag::FunctionComponent => Ok(()),
        FiberTag::HostComponent => complete_host_component(state, host, current, wip),
        FiberTag::HostText => {
            complete_host_text(state, current, wip);
            Ok(())
        }
    }
}

fn complete_host_component(
    state: &mut RootState,
    host: &mut dyn HostConfig,
    current: Option<FiberId>,
    wip: FiberId,
) -> Result<(), RenderError> {
    let Some(instance) = state.arena[wip].state_node else {
        return Ok(());
    };
    let next = state.arena[wip].pending_props.clone();
    match current {
        Some(current) => {
            let previous = state.arena[current].memoized_props.clone();
            let patch = match (previous.as_ref().and_then(FiberProps::props), next.props()) {
                (Some(previous), Some(next)) if !previous.ptr_eq(next) => {
                    diff_properties(previous, next)
                }
                _ => PropertyPatch::new(),
            };
            if !patch.is_empty() {
                let fiber = &mut state.arena[wip];
                fiber.update_payload = Some(patch);
                fiber.flags |= FiberFlags::UPDATE;
            }
        }
        None => {
            append_all_children(state, host, instance, wip)?;
            if let Some(props) = next.props() {
                for (key, value) in props.attributes() {
                    host.set_property(instance, key, Some(value))?;
                }
            }
        }
    }
    Ok(())
}

fn complete_host_text(state: &mut RootState, current: Option<FiberId>, wip: FiberId) {
    let Some(current) = current else {
        return;
    };
    let previous = state.arena[current]
        .memoized_props
        .as_ref()
        .and_then(FiberProps::text)
        .cloned();
    let fiber = &mut state.arena[wip];
    let changed = match (previous, fiber.pending_props.text()) {
        (Some(previous), Some(next)) => previous != *next,
        _ => true,
    };
    if changed {
        fiber.flags |= FiberFlags::UPDATE;
    }
}

/// Removed keys first, then added or changed keys, each in key order.
fn diff_properties(previous: &Props, next: &Props) -> PropertyPatch {
    let mut patch = PropertyPatch::new();
    for (key, _) in previous.attributes() {
        if next.get(key).is_none() {
            patch.push((key.to_string(), None));
        }
    }
    for (key, value) in next.attributes() {
        if previous.get(key) != Some(value) {
            patch.push((key.to_string(), Some(value.clone())));
        }
    }
    patch
}

/// Attaches the nearest host descendants of `wip` to `parent`, in order.
fn append_all_children(
    state: &RootState,
    host: &mut dyn HostConfig,
    parent: NodeId,
    wip: FiberId,
) -> Result<(), RenderError> {
    let arena = &state.arena;
    let Some(mut node) = arena[wip].child else {
        return Ok(());
    };
    loop {
        let fiber = &arena[node];
        if fiber.tag.is_host() {
            if let Some(instance) = fiber.state_node {
                host.append_child(parent, instance)?;
            }
        } else if let Some(child) = fiber.child {
            node = child;
            continue;
        }
        loop {
            if let Some(sibling) = arena[node].sibling {
                node = sibling;
                break;
            }
            match arena[node].return_fiber {
                Some(parent_fiber) if parent_fiber != wip => node = parent_fiber,
                _ => return Ok(()),
            }
        }
    }
}

pub(crate) fn reset_child_expiration_time(state: &mut RootState, wip: FiberId) {
    let mut next = ExpirationTime::NO_WORK;
    let mut child = state.arena[wip].child;
    while let Some(id) = child {
        let fiber = &state.arena[id];
        next = next
            .more_urgent(fiber.expiration_time)
            .more_urgent(fiber.child_expiration_time);
        child = fiber.sibling;
    }
    state.arena[wip].child_expiration_time = next;
}

/// Splices the effect list of `completed`, then `completed` itself, onto `parent`.
pub(crate) fn append_effects_to_parent(state: &mut RootState, completed: FiberId, parent: FiberId) {
    let arena = &mut state.arena;
    let (first, last, flags) = {
        let fiber = &arena[completed];
        (fiber.first_effect, fiber.last_effect, fiber.flags)
    };
    if arena[parent].first_effect.is_none() {
        arena[parent].first_effect = first;
    }
    if let Some(last) = last {
        if let Some(parent_last) = arena[parent].last_effect {
            arena[parent_last].next_effect = first;
        }
        arena[parent].last_effect = Some(last);
    }
    if flags.intersects(FiberFlags::SIDE_EFFECTS) {
        match arena[parent].last_effect {
            Some(parent_last) => arena[parent_last].next_effect = Some(completed),
            None => arena[parent].first_effect = Some(completed),
        }
        arena[parent].last_effect = Some(completed);
    }
}
