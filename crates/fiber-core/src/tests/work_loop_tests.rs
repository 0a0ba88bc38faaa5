use super::*;
use crate::element::{component, h, text, Element, Props};
use crate::error::ComponentError;
use crate::hooks::{Dispatch, Hooks};
use crate::test_support::Harness;
use std::cell::RefCell;

thread_local! {
    static APPEND: RefCell<Option<Dispatch<&'static str>>> = RefCell::new(None);
    static SEEN: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn appender(hooks: &mut Hooks<'_>, _: &Props) -> Result<Element, ComponentError> {
    let (value, append) = hooks.use_reducer(
        |state: &String, suffix: &'static str| format!("{state}{suffix}"),
        || "a".to_string(),
    );
    APPEND.with(|slot| *slot.borrow_mut() = Some(append));
    SEEN.with(|seen| seen.borrow_mut().push(value.clone()));
    Ok(text(value))
}

fn append(suffix: &'static str) {
    APPEND
        .with(|slot| slot.borrow().clone())
        .expect("appender rendered")
        .dispatch(suffix)
        .expect("dispatch");
}

fn take_seen() -> Vec<String> {
    SEEN.with(|seen| seen.take())
}

fn mount_appender() -> (Harness, crate::root::FiberRoot) {
    let mut harness = Harness::new();
    harness
        .render_sync(component(appender, Props::new()))
        .expect("mount");
    let root = harness
        .renderer
        .root(harness.container)
        .expect("root exists");
    take_seen();
    (harness, root)
}

#[test]
fn urgent_update_preempts_and_rebases_pending_work() {
    let (mut harness, root) = mount_appender();
    harness.scheduler.set_yield_after(Some(2));

    append("b");
    harness.scheduler.run_next().expect("task").expect("partial pass");
    assert!(root.is_rendering(), "pass yielded before completing");
    assert_eq!(take_seen(), ["ab"]);
    assert_eq!(harness.markup(), "a");

    harness
        .renderer
        .with_priority(SchedulerPriority::Immediate, |_| append("c"));
    assert_eq!(take_seen(), ["ac"], "low priority update skipped");
    assert_eq!(harness.markup(), "ac");
    assert_eq!(root.first_pending_time(), ExpirationTime::from_millis(5_000));
    assert_eq!(harness.scheduler.pending(), 1);

    harness.scheduler.set_yield_after(None);
    harness.scheduler.run_all().expect("remaining work");
    assert_eq!(harness.markup(), "abc");
    assert!(!root.has_pending_work());
}

#[test]
fn expired_work_finishes_synchronously() {
    let (harness, root) = mount_appender();
    harness.scheduler.set_yield_after(Some(0));

    append("b");
    harness.scheduler.run_next().expect("task").expect("starved pass");
    assert!(root.is_rendering());
    assert_eq!(harness.markup(), "a");
    assert_eq!(harness.scheduler.pending(), 1);

    harness.clock.advance(6_000);
    harness.scheduler.run_next().expect("task").expect("expired pass");
    assert_eq!(harness.markup(), "ab");
    assert_eq!(root.last_expired_time(), ExpirationTime::NO_WORK);
    assert!(!root.is_rendering());
    assert_eq!(harness.scheduler.pending(), 0);
}

#[test]
fn more_urgent_update_replaces_the_root_task() {
    let (mut harness, root) = mount_appender();

    append("b");
    assert_eq!(root.callback_priority(), Some(SchedulerPriority::Normal));
    harness
        .renderer
        .with_priority(SchedulerPriority::UserBlocking, |_| append("c"));
    assert_eq!(root.callback_priority(), Some(SchedulerPriority::UserBlocking));
    assert_eq!(harness.scheduler.pending(), 1);

    harness.scheduler.run_next().expect("task").expect("urgent pass");
    assert_eq!(harness.markup(), "ac");
    assert_eq!(root.callback_priority(), Some(SchedulerPriority::Normal));

    harness.scheduler.run_all().expect("run");
    assert_eq!(harness.markup(), "abc");
}

#[test]
fn yielding_pass_resumes_one_unit_per_task() {
    let mut harness = Harness::new();
    harness.scheduler.set_yield_after(Some(1));
    let container = harness.container;
    harness
        .renderer
        .render(
            h("div", Props::new().child(h("span", Props::new().child("x")))),
            container,
        )
        .expect("schedule");

    // root, div, span and text each take one task
    assert_eq!(harness.scheduler.run_all().expect("run"), 4);
    assert_eq!(harness.markup(), "<div><span>x</span></div>");
}

#[test]
fn abandoned_pass_frees_its_fibers() {
    let mut harness = Harness::new();
    harness
        .render_sync(h("ul", Props::new()))
        .expect("mount");
    let root = harness
        .renderer
        .root(harness.container)
        .expect("root exists");

    let items: Vec<Element> = ["one", "two", "three"]
        .into_iter()
        .map(|label| h("li", Props::new().child(label)).with_key(label))
        .collect();
    harness.scheduler.set_yield_after(Some(3));
    root.render(h("ul", Props::new().with_children(items)))
        .expect("schedule");
    harness.scheduler.run_next().expect("task").expect("partial pass");
    assert!(root.is_rendering());

    harness.render_sync(h("ul", Props::new())).expect("sync");
    assert_eq!(harness.markup(), "<ul></ul>");
    assert_eq!(root.fiber_count(), 4, "two root fibers and two list fibers");

    harness.scheduler.set_yield_after(None);
    harness.scheduler.run_all().expect("replay");
    assert_eq!(harness.markup(), "<ul></ul>", "later update still wins");
    assert_eq!(root.fiber_count(), 4);
}

#[test]
fn sync_update_from_layout_effect_flushes_after_commit() {
    fn sync_from_layout(hooks: &mut Hooks<'_>, _: &Props) -> Result<Element, ComponentError> {
        let (n, set_n) = hooks.use_state(|| 0);
        hooks.use_layout_effect(
            move || {
                if n == 0 {
                    let _ = set_n.set(1);
                }
            },
            n,
        );
        Ok(text(n.to_string()))
    }

    let mut harness = Harness::new();
    harness
        .render_sync(component(sync_from_layout, Props::new()))
        .expect("mount");
    assert_eq!(harness.markup(), "1");
    assert_eq!(harness.scheduler.pending(), 0);
}

#[test]
fn idle_update_waits_for_an_idle_task() {
    let (mut harness, root) = mount_appender();
    harness
        .renderer
        .with_priority(SchedulerPriority::Idle, |_| append("z"));
    assert_eq!(root.first_pending_time(), ExpirationTime::IDLE);
    assert_eq!(root.callback_priority(), Some(SchedulerPriority::Idle));
    assert_eq!(harness.markup(), "a");

    harness.clock.advance(1_000_000);
    harness.scheduler.run_all().expect("idle work");
    assert_eq!(harness.markup(), "az");
}
