//! Diffs a fiber's current children against a new child description.
//!
//! Matching is by key, falling back to position; a match also needs the same
//! element type. Reused fibers keep their state. Unmatched old fibers go on the
//! parent's effect list as deletions, and new or moved fibers get `PLACEMENT`.

use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::element::Element;
use crate::fiber::{
    create_work_in_progress, siblings, Fiber, FiberFlags, FiberId, FiberProps, FiberTag,
    FiberType,
};
use crate::root::RootState;
use crate::Key;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum SlotKey {
    Key(Key),
    Index(usize),
}

impl SlotKey {
    fn new(key: Option<Key>, index: usize) -> Self {
        key.map_or(SlotKey::Index(index), SlotKey::Key)
    }
}

/// Reconciles `children` under `wip` and stores the first new child on it.
///
/// Side effects are tracked only when `wip` has a current counterpart; a
/// freshly mounted subtree is placed as a whole by its top fiber.
pub(crate) fn reconcile_children(
    state: &mut RootState,
    current: Option<FiberId>,
    wip: FiberId,
    children: &Element,
) -> Option<FiberId> {
    let current_first = current.and_then(|current| state.arena[current].child);
    let first = ChildReconciler {
        state: &mut *state,
        return_fiber: wip,
        track_side_effects: current.is_some(),
    }
    .reconcile_child_fibers(current_first, children);
    state.arena[wip].child = first;
    first
}

struct ChildReconciler<'a> {
    state: &'a mut RootState,
    return_fiber: FiberId,
    track_side_effects: bool,
}

impl ChildReconciler<'_> {
    fn reconcile_child_fibers(
        &mut self,
        current_first: Option<FiberId>,
        element: &Element,
    ) -> Option<FiberId> {
        match element {
            Element::Host { .. } | Element::Component { .. } => {
                let fiber = self.reconcile_single_element(current_first, element)?;
                Some(self.place_single_child(fiber))
            }
            Element::Text(text) => {
                let fiber = self.reconcile_single_text(current_first, text)?;
                Some(self.place_single_child(fiber))
            }
            Element::List(children) => self.reconcile_children_array(current_first, children),
            Element::Empty => {
                self.delete_remaining_children(current_first);
                None
            }
        }
    }

    fn delete_child(&mut self, child: FiberId) {
        if !self.track_side_effects {
            return;
        }
        let arena = &mut self.state.arena;
        match arena[self.return_fiber].last_effect {
            Some(last) => arena[last].next_effect = Some(child),
            None => arena[self.return_fiber].first_effect = Some(child),
        }
        arena[self.return_fiber].last_effect = Some(child);
        let fiber = &mut arena[child];
        fiber.next_effect = None;
        fiber.flags = FiberFlags::DELETION;
    }

    fn delete_remaining_children(&mut self, first: Option<FiberId>) {
        if !self.track_side_effects {
            return;
        }
        for child in siblings(&self.state.arena, first) {
            self.delete_child(child);
        }
    }

    fn use_fiber(&mut self, current: FiberId, props: FiberProps) -> FiberId {
        let wip = create_work_in_progress(&mut self.state.arena, current, props);
        let fiber = &mut self.state.arena[wip];
        fiber.index = 0;
        fiber.sibling = None;
        fiber.return_fiber = Some(self.return_fiber);
        wip
    }

    fn create_fiber(&mut self, element: &Element) -> Option<FiberId> {
        let mut fiber = Fiber::from_element(element)?;
        fiber.return_fiber = Some(self.return_fiber);
        let id = self.state.arena.insert(fiber);
        self.state.allocated.push(id);
        Some(id)
    }

    fn reuse_for_element(&mut self, existing: FiberId, element: &Element) -> FiberId {
        let props = element.props().cloned().unwrap_or_default();
        let wip = self.use_fiber(existing, FiberProps::Element(props));
        if let Element::Component { component, .. } = element {
            // same component type, but the new value may capture different data
            self.state.arena[wip].kind = FiberType::Component(component.clone());
        }
        wip
    }

    fn update_element(&mut self, old: Option<FiberId>, element: &Element) -> Option<FiberId> {
        match old {
            Some(old) if self.state.arena[old].matches_element(element) => {
                Some(self.reuse_for_element(old, element))
            }
            _ => self.create_fiber(element),
        }
    }

    fn update_text(&mut self, old: Option<FiberId>, text: &Rc<str>) -> Option<FiberId> {
        match old {
            Some(old) if self.state.arena[old].tag == FiberTag::HostText => {
                Some(self.use_fiber(old, FiberProps::Text(Rc::clone(text))))
            }
            _ => self.create_fiber(&Element::Text(Rc::clone(text))),
        }
    }

    fn place_single_child(&mut self, fiber: FiberId) -> FiberId {
        let node = &mut self.state.arena[fiber];
        if self.track_side_effects && node.alternate.is_none() {
            node.flags |= FiberFlags::PLACEMENT;
        }
        fiber
    }

    /// Marks moved or inserted children; returns the updated high-water index.
    fn place_child(&mut self, fiber: FiberId, last_placed_index: usize, new_index: usize) -> usize {
        let arena = &mut self.state.arena;
        arena[fiber].index = new_index;
        if !self.track_side_effects {
            return last_placed_index;
        }
        let old_index = arena[fiber]
            .alternate
            .and_then(|current| arena.get(current))
            .map(|current| current.index);
        match old_index {
            Some(old_index) if old_index >= last_placed_index => old_index,
            _ => {
                arena[fiber].flags |= FiberFlags::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn reconcile_single_element(
        &mut self,
        current_first: Option<FiberId>,
        element: &Element,
    ) -> Option<FiberId> {
        let key = element.key();
        let mut child = current_first;
        while let Some(candidate) = child {
            let (candidate_key, matches, sibling) = {
                let fiber = &self.state.arena[candidate];
                (fiber.key, fiber.matches_element(element), fiber.sibling)
            };
            if candidate_key == key {
                if matches {
                    self.delete_remaining_children(sibling);
                    return Some(self.reuse_for_element(candidate, element));
                }
                self.delete_remaining_children(Some(candidate));
                break;
            }
            self.delete_child(candidate);
            child = sibling;
        }
        self.create_fiber(element)
    }

    fn reconcile_single_text(
        &mut self,
        current_first: Option<FiberId>,
        text: &Rc<str>,
    ) -> Option<FiberId> {
        if let Some(first) = current_first {
            if self.state.arena[first].tag == FiberTag::HostText {
                let rest = self.state.arena[first].sibling;
                self.delete_remaining_children(rest);
                return Some(self.use_fiber(first, FiberProps::Text(Rc::clone(text))));
            }
        }
        self.delete_remaining_children(current_first);
        self.create_fiber(&Element::Text(Rc::clone(text)))
    }

    fn update_slot(&mut self, old: Option<FiberId>, element: &Element) -> Option<FiberId> {
        let key = old.and_then(|old| self.state.arena[old].key);
        match element {
            Element::Text(text) if key.is_none() => self.update_text(old, text),
            Element::Host { .. } | Element::Component { .. } if element.key() == key => {
                self.update_element(old, element)
            }
            Element::List(_) => {
                log::warn!("nested element lists are not supported; skipping");
                None
            }
            _ => None,
        }
    }

    fn update_from_map(
        &mut self,
        existing: &HashMap<SlotKey, FiberId>,
        index: usize,
        element: &Element,
    ) -> Option<FiberId> {
        match element {
            Element::Text(text) => {
                let matched = existing.get(&SlotKey::Index(index)).copied();
                self.update_text(matched, text)
            }
            Element::Host { .. } | Element::Component { .. } => {
                let matched = existing.get(&SlotKey::new(element.key(), index)).copied();
                self.update_element(matched, element)
            }
            Element::Empty | Element::List(_) => None,
        }
    }

    fn map_remaining_children(&self, first: Option<FiberId>) -> HashMap<SlotKey, FiberId> {
        let arena = &self.state.arena;
        siblings(arena, first)
            .into_iter()
            .map(|id| (SlotKey::new(arena[id].key, arena[id].index), id))
            .collect()
    }

    fn link(&mut self, first: &mut Option<FiberId>, previous: &mut Option<FiberId>, fiber: FiberId) {
        match previous {
            Some(previous) => self.state.arena[*previous].sibling = Some(fiber),
            None => *first = Some(fiber),
        }
        *previous = Some(fiber);
    }

    fn reconcile_children_array(
        &mut self,
        current_first: Option<FiberId>,
        children: &[Element],
    ) -> Option<FiberId> {
        let mut first = None;
        let mut previous = None;
        let mut old_fiber = current_first;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        // walk both lists in step while keys line up
        while new_index < children.len() {
            let Some(old) = old_fiber else {
                break;
            };
            let (slot, next_old) = if self.state.arena[old].index > new_index {
                (None, Some(old))
            } else {
                (Some(old), self.state.arena[old].sibling)
            };
            let Some(new_fiber) = self.update_slot(slot, &children[new_index]) else {
                break;
            };
            if let Some(slot) = slot {
                if self.state.arena[new_fiber].alternate.is_none() {
                    self.delete_child(slot);
                }
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, new_index);
            self.link(&mut first, &mut previous, new_fiber);
            old_fiber = next_old;
            new_index += 1;
        }

        if new_index == children.len() {
            self.delete_remaining_children(old_fiber);
            return first;
        }

        if old_fiber.is_none() {
            for (index, element) in children.iter().enumerate().skip(new_index) {
                let Some(new_fiber) = self.create_fiber(element) else {
                    continue;
                };
                last_placed_index = self.place_child(new_fiber, last_placed_index, index);
                self.link(&mut first, &mut previous, new_fiber);
            }
            return first;
        }

        let mut existing = self.map_remaining_children(old_fiber);
        for (index, element) in children.iter().enumerate().skip(new_index) {
            let Some(new_fiber) = self.update_from_map(&existing, index, element) else {
                continue;
            };
            if self.track_side_effects && self.state.arena[new_fiber].alternate.is_some() {
                existing.remove(&SlotKey::new(self.state.arena[new_fiber].key, index));
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, index);
            self.link(&mut first, &mut previous, new_fiber);
        }

        if self.track_side_effects {
            let mut leftover: Vec<FiberId> = existing.into_values().collect();
            leftover.sort_by_key(|id| self.state.arena[*id].index);
            for id in leftover {
                self.delete_child(id);
            }
        }
        first
    }
}
