use super::*;
use crate::element::{h, text};

fn host_fiber(tag: &str) -> Fiber {
    Fiber::from_element(&h(tag, Props::new())).expect("host element builds a fiber")
}

#[test]
fn work_in_progress_reuses_the_alternate_slot() {
    let mut arena = FiberArena::with_key();
    let current = arena.insert(host_fiber("div"));
    arena[current].flags = FiberFlags::PLACEMENT;

    let props = FiberProps::Element(Props::new());
    let first = create_work_in_progress(&mut arena, current, props.clone());
    assert_eq!(arena.len(), 2);
    assert_eq!(arena[current].alternate, Some(first));
    assert_eq!(arena[first].alternate, Some(current));
    assert!(arena[first].flags.is_empty(), "twin starts with clean flags");

    let second = create_work_in_progress(&mut arena, current, props);
    assert_eq!(second, first);
    assert_eq!(arena.len(), 2);
}

#[test]
fn freed_alternate_is_replaced() {
    let mut arena = FiberArena::with_key();
    let current = arena.insert(host_fiber("div"));
    let stale = create_work_in_progress(&mut arena, current, FiberProps::Root);
    arena.remove(stale);

    let fresh = create_work_in_progress(&mut arena, current, FiberProps::Root);
    assert_ne!(fresh, stale);
    assert!(arena.get(stale).is_none());
    assert_eq!(arena[current].alternate, Some(fresh));
}

#[test]
fn elements_match_by_type() {
    let div = host_fiber("div");
    assert!(div.matches_element(&h("div", Props::new().attr("id", "x"))));
    assert!(!div.matches_element(&h("span", Props::new())));
    assert!(!div.matches_element(&text("div")));

    assert!(Fiber::from_element(&Element::Empty).is_none());
    assert!(Fiber::from_element(&Element::List(Vec::new())).is_none());
    let leaf = Fiber::from_element(&text("t")).expect("text fiber");
    assert_eq!(leaf.tag, FiberTag::HostText);
    assert_eq!(leaf.describe(), "\"t\"");
}

#[test]
fn siblings_walks_the_chain() {
    let mut arena = FiberArena::with_key();
    let a = arena.insert(host_fiber("a"));
    let b = arena.insert(host_fiber("b"));
    let c = arena.insert(host_fiber("c"));
    arena[a].sibling = Some(b);
    arena[b].sibling = Some(c);

    assert_eq!(siblings(&arena, Some(a)), vec![a, b, c]);
    assert_eq!(siblings(&arena, Some(c)), vec![c]);
    assert!(siblings(&arena, None).is_empty());
}

#[test]
fn tag_and_flag_helpers() {
    assert!(FiberTag::HostText.is_host());
    assert!(!FiberTag::HostRoot.is_host());
    assert!(FiberTag::HostRoot.is_host_parent());
    assert!(!FiberTag::FunctionComponent.is_host_parent());

    assert!(FiberFlags::SIDE_EFFECTS.contains(FiberFlags::DELETION));
    assert!(!FiberFlags::PERFORMED_WORK.intersects(FiberFlags::SIDE_EFFECTS));
}

#[test]
fn pending_work_respects_render_time() {
    let mut fiber = host_fiber("div");
    assert!(!fiber.has_pending_work(ExpirationTime::IDLE));
    fiber.expiration_time = ExpirationTime::from_millis(300);
    assert!(fiber.has_pending_work(ExpirationTime::from_millis(300)));
    assert!(!fiber.has_pending_work(ExpirationTime::SYNC));
}
