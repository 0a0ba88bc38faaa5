use crate::element::{component, h, Element, PropValue, Props};
use crate::error::{ComponentError, HostError, RenderError};
use crate::hooks::{Cleanup, Hooks};
use crate::host::{HostCall, HostConfig, MemoryHost};
use crate::platform::SchedulerPriority;
use crate::root::Renderer;
use crate::test_support::{Harness, TestClock, TestScheduler};
use crate::NodeId;
use std::cell::Cell;
use std::rc::Rc;

fn list(labels: &[&str]) -> Element {
    h(
        "ul",
        Props::new().with_children(
            labels
                .iter()
                .map(|label| h("li", Props::new().child(*label)).with_key(*label)),
        ),
    )
}

fn mounted(element: Element) -> Harness {
    let mut harness = Harness::new();
    harness.render_sync(element).expect("mount");
    harness.take_calls();
    harness
}

#[test]
fn keyed_insert_goes_before_the_next_stable_sibling() {
    // ul 1, li a 2, text 3, li c 4, text 5
    let mut harness = mounted(list(&["a", "c"]));

    harness.render_sync(list(&["a", "b", "c"])).expect("insert");
    assert_eq!(
        harness.take_calls(),
        vec![
            HostCall::CreateInstance {
                id: 6,
                tag: "li".into()
            },
            HostCall::CreateText {
                id: 7,
                text: "b".into()
            },
            HostCall::AppendChild {
                parent: 6,
                child: 7
            },
            HostCall::InsertBefore {
                parent: 1,
                child: 6,
                before: 4
            },
        ]
    );
    assert_eq!(
        harness.markup(),
        "<ul><li>a</li><li>b</li><li>c</li></ul>"
    );
}

#[test]
fn keyed_reorder_moves_existing_nodes() {
    // ul 1, li a 2, li b 4, li c 6
    let mut harness = mounted(list(&["a", "b", "c"]));

    harness.render_sync(list(&["c", "a", "b"])).expect("reorder");
    let calls = harness.take_calls();
    assert!(calls.iter().all(|call| !call.is_create()), "nodes are reused");
    assert_eq!(
        calls,
        vec![
            HostCall::AppendChild {
                parent: 1,
                child: 2
            },
            HostCall::AppendChild {
                parent: 1,
                child: 4
            },
        ]
    );
    assert_eq!(
        harness.markup(),
        "<ul><li>c</li><li>a</li><li>b</li></ul>"
    );
}

#[test]
fn removed_key_detaches_only_its_node() {
    let mut harness = mounted(list(&["a", "b", "c"]));
    harness.render_sync(list(&["a", "b", "c"])).expect("warm up");
    assert!(harness.take_calls().is_empty());
    let root = harness
        .renderer
        .root(harness.container)
        .expect("root exists");
    let fibers = root.fiber_count();

    harness.render_sync(list(&["a", "c"])).expect("remove");
    assert_eq!(
        harness.take_calls(),
        vec![HostCall::RemoveChild {
            parent: 1,
            child: 4
        }]
    );
    assert_eq!(harness.markup(), "<ul><li>a</li><li>c</li></ul>");
    assert!(root.fiber_count() < fibers, "deleted fibers are freed");
}

#[test]
fn unkeyed_children_update_in_place() {
    let mut harness = mounted(h("p", Props::new().child("x").child("y")));

    harness
        .render_sync(h("p", Props::new().child("x").child("z")))
        .expect("update");
    assert_eq!(
        harness.take_calls(),
        vec![HostCall::SetText {
            node: 3,
            text: "z".into()
        }]
    );
}

fn pair(_: &mut Hooks<'_>, _: &Props) -> Result<Element, ComponentError> {
    Ok(Element::List(vec![
        h("i", Props::new()),
        h("u", Props::new()),
    ]))
}

fn with_pair(show: bool) -> Element {
    let mut children = Vec::new();
    if show {
        children.push(component(pair, Props::new()).with_key("pair"));
    }
    children.push(h("b", Props::new()).with_key("b"));
    h("div", Props::new().with_children(children))
}

#[test]
fn component_placement_inserts_all_of_its_host_nodes() {
    // div 1, b 2
    let mut harness = mounted(with_pair(false));

    harness.render_sync(with_pair(true)).expect("show pair");
    assert_eq!(
        harness.take_calls(),
        vec![
            HostCall::CreateInstance {
                id: 3,
                tag: "i".into()
            },
            HostCall::CreateInstance {
                id: 4,
                tag: "u".into()
            },
            HostCall::InsertBefore {
                parent: 1,
                child: 3,
                before: 2
            },
            HostCall::InsertBefore {
                parent: 1,
                child: 4,
                before: 2
            },
        ]
    );
    assert_eq!(harness.markup(), "<div><i></i><u></u><b></b></div>");

    harness.render_sync(with_pair(false)).expect("hide pair");
    assert_eq!(
        harness.take_calls(),
        vec![
            HostCall::RemoveChild {
                parent: 1,
                child: 3
            },
            HostCall::RemoveChild {
                parent: 1,
                child: 4
            },
        ]
    );
    assert_eq!(harness.markup(), "<div><b></b></div>");
}

#[test]
fn passive_effects_flush_on_demand() {
    fn effectful(hooks: &mut Hooks<'_>, _: &Props) -> Result<Element, ComponentError> {
        hooks.use_effect(|| (), ());
        Ok(Element::Empty)
    }

    let mut harness = Harness::new();
    harness
        .render_sync(component(effectful, Props::new()))
        .expect("mount");
    let root = harness
        .renderer
        .root(harness.container)
        .expect("root exists");

    assert!(root.has_pending_passive_effects());
    assert_eq!(harness.scheduler.pending(), 1);
    assert_eq!(root.flush_passive_effects(), Ok(true));
    assert_eq!(root.flush_passive_effects(), Ok(false));
    assert_eq!(harness.scheduler.pending(), 0, "flush task cancelled");
}

/// Memory host whose text writes fail for one poisoned value.
struct FlakyHost {
    inner: MemoryHost,
}

impl HostConfig for FlakyHost {
    fn create_instance(&mut self, tag: &str) -> Result<NodeId, HostError> {
        self.inner.create_instance(tag)
    }

    fn create_text_instance(&mut self, text: &str) -> Result<NodeId, HostError> {
        self.inner.create_text_instance(text)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.inner.append_child(parent, child)
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), HostError> {
        self.inner.insert_before(parent, child, before)
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.inner.remove_child(parent, child)
    }

    fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: Option<&PropValue>,
    ) -> Result<(), HostError> {
        self.inner.set_property(node, key, value)
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), HostError> {
        if text == "boom" {
            return Err(HostError::Missing { id: node });
        }
        self.inner.set_text(node, text)
    }
}

thread_local! {
    static CLEANUPS: Cell<usize> = Cell::new(0);
}

fn tracked(hooks: &mut Hooks<'_>, _: &Props) -> Result<Element, ComponentError> {
    hooks.use_layout_effect(
        || Cleanup::new(|| CLEANUPS.with(|count| count.set(count.get() + 1))),
        (),
    );
    Ok(Element::Empty)
}

fn panel(message: &str, with_tracker: bool) -> Element {
    let mut children = Vec::new();
    if with_tracker {
        children.push(component(tracked, Props::new()).with_key("tracker"));
    }
    children.push(h("p", Props::new().child(message)).with_key("p"));
    h("div", Props::new().with_children(children))
}

#[test]
fn failed_host_write_discards_the_commit() {
    let clock = Rc::new(TestClock::default());
    let scheduler = Rc::new(TestScheduler::new(Rc::clone(&clock)));
    let mut host = FlakyHost {
        inner: MemoryHost::new(),
    };
    let container = host.inner.create_container();
    let mut renderer = Renderer::new(host, scheduler.clone(), clock.clone());
    let render_sync = |renderer: &mut Renderer<FlakyHost>, element: Element| {
        renderer.with_priority(SchedulerPriority::Immediate, |renderer| {
            renderer.render(element, container)
        })
    };

    render_sync(&mut renderer, panel("ok", true)).expect("mount");
    render_sync(&mut renderer, panel("ok", true)).expect("warm up");
    let root = renderer.root(container).expect("root exists");
    let fibers = root.fiber_count();

    let err = render_sync(&mut renderer, panel("boom", false)).expect_err("text write fails");
    assert!(matches!(err, RenderError::Host(HostError::Missing { .. })), "unexpected error: {err:?}");
    assert_eq!(
        renderer.host().inner.markup(container).expect("markup"),
        "<div><p>ok</p></div>"
    );
    assert_eq!(CLEANUPS.with(Cell::get), 0, "teardown kept for the retry");
    assert!(!root.is_rendering());
    assert!(root.has_pending_work(), "the update is still pending");
    assert_eq!(root.fiber_count(), fibers);
    assert!(!root.has_pending_passive_effects());

    render_sync(&mut renderer, panel("fine", false)).expect("retry");
    assert_eq!(
        renderer.host().inner.markup(container).expect("markup"),
        "<div><p>fine</p></div>"
    );
    assert_eq!(CLEANUPS.with(Cell::get), 1);
    assert!(!root.has_pending_work());
}
