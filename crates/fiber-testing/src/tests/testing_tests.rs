use super::*;
use crate::YieldPolicy;
use fiber_core::{
    component, h, ComponentError, Element, Hooks, Props, SchedulerTask, SetState, TaskScheduler,
};
use std::cell::RefCell;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn noop() -> SchedulerTask {
    Box::new(|_| Ok(()))
}

#[test]
fn manual_scheduler_runs_by_priority_then_order() {
    let clock = Rc::new(ManualClock::default());
    let scheduler = ManualScheduler::new(Rc::clone(&clock));
    scheduler.schedule_callback(SchedulerPriority::Low, noop());
    scheduler.schedule_callback(SchedulerPriority::Immediate, noop());
    scheduler.schedule_callback(SchedulerPriority::Low, noop());
    scheduler.schedule_callback(SchedulerPriority::UserBlocking, noop());

    assert_eq!(
        scheduler.pending_priorities(),
        [
            SchedulerPriority::Immediate,
            SchedulerPriority::UserBlocking,
            SchedulerPriority::Low,
            SchedulerPriority::Low,
        ]
    );
    assert_eq!(scheduler.run_until_idle().expect("run"), 4);
    assert_eq!(scheduler.tasks_run(), 4);
    assert!(scheduler.run_next().is_none());
}

#[test]
fn manual_scheduler_reports_overdue_tasks_against_its_clock() {
    let clock = Rc::new(ManualClock::new(100));
    let scheduler = ManualScheduler::new(Rc::clone(&clock));
    let flags = Rc::new(RefCell::new(Vec::new()));
    let task = |flags: &Rc<RefCell<Vec<bool>>>| -> SchedulerTask {
        let flags = Rc::clone(flags);
        Box::new(move |did_timeout| {
            flags.borrow_mut().push(did_timeout);
            Ok(())
        })
    };

    scheduler.schedule_callback(SchedulerPriority::Normal, task(&flags));
    scheduler.run_next().expect("task").expect("run");
    scheduler.schedule_callback(SchedulerPriority::Normal, task(&flags));
    clock.advance(5_000);
    scheduler.run_next().expect("task").expect("run");
    scheduler.schedule_callback(SchedulerPriority::Idle, task(&flags));
    clock.set(u64::MAX);
    scheduler.run_next().expect("task").expect("run");

    assert_eq!(*flags.borrow(), [false, true, false]);
}

#[test]
fn cancelled_task_is_dropped_from_the_queue() {
    let scheduler = ManualScheduler::new(Rc::new(ManualClock::default()));
    let handle = scheduler.schedule_callback(SchedulerPriority::Normal, noop());
    scheduler.cancel_callback(handle);
    scheduler.cancel_callback(handle);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn yield_policy_counts_checks_per_task() {
    let scheduler = ManualScheduler::new(Rc::new(ManualClock::default()));
    assert!(!scheduler.should_yield());

    scheduler.always_yield();
    assert!(scheduler.should_yield());

    scheduler.yield_after(2);
    scheduler.schedule_callback(SchedulerPriority::Normal, noop());
    scheduler.run_next().expect("task").expect("run");
    assert!(!scheduler.should_yield());
    assert!(!scheduler.should_yield());
    assert!(scheduler.should_yield());

    scheduler.never_yield();
    assert!(!scheduler.should_yield());
    assert!(format!("{scheduler:?}").contains("Never"));
    scheduler.set_yield_policy(YieldPolicy::Always);
    assert!(scheduler.should_yield());
}

#[test]
fn run_until_idle_with_limit_stops_a_self_rescheduling_task() {
    fn forever(scheduler: Rc<ManualScheduler>) -> SchedulerTask {
        Box::new(move |_| {
            let again = forever(Rc::clone(&scheduler));
            scheduler.schedule_callback(SchedulerPriority::Normal, again);
            Ok(())
        })
    }

    let scheduler = Rc::new(ManualScheduler::new(Rc::new(ManualClock::default())));
    scheduler.schedule_callback(SchedulerPriority::Normal, forever(Rc::clone(&scheduler)));
    assert_eq!(scheduler.run_until_idle_with_limit(5).expect("run"), 5);
    assert_eq!(scheduler.pending(), 1);
}

thread_local! {
    static NAME: RefCell<Option<SetState<String>>> = RefCell::new(None);
}

fn name_tag(hooks: &mut Hooks<'_>, _: &Props) -> Result<Element, ComponentError> {
    let (name, set_name) = hooks.use_state(|| "anon".to_string());
    NAME.with(|slot| *slot.borrow_mut() = Some(set_name));
    Ok(h("b", Props::new().attr("title", name.clone()).child(name)))
}

fn set_name(value: &str) {
    NAME.with(|slot| slot.borrow().clone())
        .expect("name tag rendered")
        .set(value.to_string())
        .expect("dispatch");
}

#[test]
fn render_defers_until_flush() {
    init_logger();
    let mut rule = TestRenderer::new();
    rule.render(component(name_tag, Props::new()))
        .expect("schedule");
    assert!(!rule.has_content());
    assert_eq!(rule.scheduler().pending(), 1);

    rule.flush().expect("flush");
    assert!(rule.has_content());
    assert_eq!(rule.markup().expect("markup"), "<b title=\"anon\">anon</b>");
    assert_eq!(rule.scheduler().pending(), 0);
}

#[test]
fn render_sync_commits_immediately() {
    let mut rule = TestRenderer::default();
    let root = rule
        .render_sync(h("p", Props::new().child("now")))
        .expect("mount");
    assert_eq!(rule.markup().expect("markup"), "<p>now</p>");
    assert!(!root.has_pending_work());
    assert_eq!(rule.root().map(|root| root.container()), Some(rule.container()));
    assert!(rule.dump_tree().contains("<p>"));
    assert_eq!(rule.take_calls().len(), 4);
    assert!(rule.take_calls().is_empty());
}

#[test]
fn with_priority_scopes_dispatched_updates() {
    let mut rule = TestRenderer::new();
    rule.render_sync(component(name_tag, Props::new()))
        .expect("mount");

    rule.with_priority(SchedulerPriority::Immediate, || set_name("ada"));
    assert_eq!(rule.markup().expect("markup"), "<b title=\"ada\">ada</b>");

    set_name("grace");
    assert_eq!(rule.markup().expect("markup"), "<b title=\"ada\">ada</b>");
    rule.flush().expect("flush");
    assert_eq!(rule.markup().expect("markup"), "<b title=\"grace\">grace</b>");
}

#[test]
fn unmount_clears_the_container() {
    run_test_renderer(|rule| {
        rule.render_sync(h("div", Props::new())).expect("mount");
        assert!(rule.unmount().expect("unmount"));
        assert!(!rule.has_content());
        assert!(rule.root().is_none());
        assert!(!rule.unmount().expect("second unmount"));
    });
}

#[test]
fn host_access_reads_attributes() {
    let mut rule = TestRenderer::new();
    rule.render_sync(h("a", Props::new().attr("href", "/home")))
        .expect("mount");
    let host = rule.host();
    let link = host.children(rule.container()).expect("container")[0];
    assert_eq!(
        host.attribute(link, "href")
            .expect("node")
            .and_then(|value| value.as_str()),
        Some("/home")
    );
}

#[test]
fn renderer_mut_exposes_additional_containers() {
    let mut rule = TestRenderer::new();
    let second = rule.renderer_mut().host().create_container();
    rule.renderer_mut()
        .with_priority(SchedulerPriority::Immediate, |renderer| {
            renderer.render(h("i", Props::new()), second)
        })
        .expect("second root");
    assert_eq!(rule.host().markup(second).expect("markup"), "<i></i>");
    assert_eq!(rule.markup().expect("markup"), "");
}
