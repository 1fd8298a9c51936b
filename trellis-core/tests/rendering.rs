//! Integration Tests for the Renderer
//!
//! These tests mount component trees into a `MemoryDocument` and check the
//! committed markup, hook behavior and the work loop's scheduling.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::config::{EffectOrder, RendererConfig};
use trellis_core::deps;
use trellis_core::error::RenderError;
use trellis_core::fiber::{
    mount, ClassComponent, Element, NodeRef, Props, RenderResult, Root, Scope, StateSetter,
    UnitBudget, WorkStatus,
};
use trellis_core::host::{HostDocument, MemoryDocument, NativeHandle};
use trellis_core::reactive::{Cleanup, Scheduler, Signal};

fn setup() -> (MemoryDocument, NativeHandle) {
    let doc = MemoryDocument::new();
    let container = doc.create_container("main");
    (doc, container)
}

fn mount_element(doc: &MemoryDocument, container: NativeHandle, app: Element) -> Root {
    Root::new(app, doc.target(container), RendererConfig::default())
}

type SetterSlot<T> = Rc<RefCell<Option<StateSetter<T>>>>;

fn setter<T: 'static>(slot: &SetterSlot<T>) -> StateSetter<T> {
    slot.borrow().clone().expect("component rendered")
}

/// Test that queued updates fold over the previous state in order.
#[test]
fn state_updates_fold_in_submission_order() {
    let (doc, container) = setup();
    let slot: SetterSlot<i32> = Rc::default();

    let root = {
        let slot = slot.clone();
        mount(
            move |cx, _| {
                let (count, set) = cx.use_state(1)?;
                *slot.borrow_mut() = Some(set);
                Ok(Element::new("p").with_text(count.to_string()))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<p>1</p>");

    let set = setter(&slot);
    set.update(|n| n + 1);
    set.update(|n| n * 10);
    assert!(!root.is_idle());
    // Nothing changes before the next render.
    assert_eq!(doc.inner_markup(container), "<p>1</p>");

    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<p>20</p>");

    set.set(7);
    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<p>7</p>");
}

/// Test that effects re-run only when their dependencies change.
#[test]
fn effect_runs_when_deps_change() {
    let (doc, container) = setup();
    let runs = Rc::new(Cell::new(0));
    let cleanups = Rc::new(Cell::new(0));
    let slot: Rc<RefCell<Option<(StateSetter<i32>, StateSetter<i32>)>>> = Rc::default();

    let root = {
        let (runs, cleanups, slot) = (runs.clone(), cleanups.clone(), slot.clone());
        mount(
            move |cx, _| {
                let (count, set_count) = cx.use_state(0)?;
                let (tick, set_tick) = cx.use_state(0)?;
                *slot.borrow_mut() = Some((set_count, set_tick));

                let (runs, cleanups) = (runs.clone(), cleanups.clone());
                cx.use_effect(deps![count], move || {
                    runs.set(runs.get() + 1);
                    let cleanup: Cleanup = Box::new(move || cleanups.set(cleanups.get() + 1));
                    Some(cleanup)
                })?;
                Ok(Element::new("p").with_text(format!("{count}/{tick}")))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();
    assert_eq!((runs.get(), cleanups.get()), (1, 0));

    let (set_count, set_tick) = slot.borrow().clone().unwrap();
    set_tick.update(|t| t + 1);
    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<p>0/1</p>");
    assert_eq!((runs.get(), cleanups.get()), (1, 0));

    set_count.update(|c| c + 1);
    root.run_until_idle().unwrap();
    assert_eq!((runs.get(), cleanups.get()), (2, 1));

    root.unmount().unwrap();
    assert_eq!((runs.get(), cleanups.get()), (2, 2));
}

/// Test that an effect with an empty dependency list runs after every render.
#[test]
fn effect_with_empty_deps_runs_every_render() {
    let (doc, container) = setup();
    let runs = Rc::new(Cell::new(0));
    let slot: SetterSlot<i32> = Rc::default();

    let root = {
        let (runs, slot) = (runs.clone(), slot.clone());
        mount(
            move |cx, _| {
                let (count, set_count) = cx.use_state(0)?;
                *slot.borrow_mut() = Some(set_count);

                let runs = runs.clone();
                cx.use_effect(deps![], move || {
                    runs.set(runs.get() + 1);
                    None
                })?;
                Ok(Element::new("p").with_text(count.to_string()))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();
    assert_eq!(runs.get(), 1);

    for _ in 0..3 {
        setter(&slot).update(|c| c + 1);
        root.run_until_idle().unwrap();
    }
    assert_eq!(doc.inner_markup(container), "<p>3</p>");
    assert_eq!(runs.get(), 4);
}

/// Test that mounting into a non-empty container appends after its content.
#[test]
fn mount_appends_after_existing_content() {
    let (doc, container) = setup();
    let aside = doc.create_element("aside");
    doc.insert_before(container, aside, None);

    let root = mount(
        |_, _| Ok(Element::new("p")),
        doc.target(container),
        Props::new(),
    );
    root.run_until_idle().unwrap();

    assert_eq!(doc.inner_markup(container), "<aside></aside><p></p>");
}

/// Test that removing an ancestor runs a descendant's cleanup exactly once.
#[test]
fn ancestor_removal_runs_cleanup_once() {
    let (doc, container) = setup();
    let cleanups = Rc::new(Cell::new(0));

    let leaf = {
        let cleanups = cleanups.clone();
        move |cx: &Scope, _: &Props| -> RenderResult {
            let cleanups = cleanups.clone();
            cx.use_effect(deps![()], move || {
                let cleanup: Cleanup = Box::new(move || cleanups.set(cleanups.get() + 1));
                Some(cleanup)
            })?;
            Ok(Element::new("i"))
        }
    };

    let root = mount_element(
        &doc,
        container,
        Element::new("section").child(
            Element::new("div").child(Element::new("span").child(Element::component(leaf, Props::new()))),
        ),
    );
    root.run_until_idle().unwrap();
    assert_eq!(
        doc.inner_markup(container),
        "<section><div><span><i></i></span></div></section>"
    );

    root.render(Element::new("section"));
    root.run_until_idle().unwrap();
    assert_eq!(cleanups.get(), 1);
    assert_eq!(doc.inner_markup(container), "<section></section>");

    root.render(Element::new("section"));
    root.run_until_idle().unwrap();
    root.unmount().unwrap();
    assert_eq!(cleanups.get(), 1);
}

thread_local! {
    static LIFECYCLE: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn record(entry: impl Into<String>) {
    LIFECYCLE.with(|log| log.borrow_mut().push(entry.into()));
}

fn take_lifecycle() -> Vec<String> {
    LIFECYCLE.with(|log| log.borrow_mut().drain(..).collect())
}

struct Greeter {
    renders: usize,
}

impl ClassComponent for Greeter {
    fn create(props: &Props) -> Self {
        record(format!("create {}", props.get_str("name").unwrap_or_default()));
        Self { renders: 0 }
    }

    fn render(&mut self, _cx: &Scope, props: &Props) -> RenderResult {
        self.renders += 1;
        let name = props.get_str("name").unwrap_or_default();
        Ok(Element::new("span").with_text(format!("{name}:{}", self.renders)))
    }

    fn on_mount(&mut self) {
        record("mount");
    }

    fn on_update(&mut self) {
        record("update");
    }

    fn on_unmount(&mut self) {
        record("unmount");
    }
}

/// Test that one class instance lives as long as its node.
#[test]
fn class_component_lifecycle() {
    let (doc, container) = setup();
    let root = mount_element(
        &doc,
        container,
        Element::class::<Greeter>(Props::new().with("name", "ada")),
    );

    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<span>ada:1</span>");
    assert_eq!(take_lifecycle(), ["create ada", "mount"]);

    root.render(Element::class::<Greeter>(Props::new().with("name", "bob")));
    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<span>bob:2</span>");
    assert_eq!(take_lifecycle(), ["update"]);

    root.render(Element::new("div"));
    root.run_until_idle().unwrap();
    assert_eq!(take_lifecycle(), ["unmount"]);
    assert_eq!(doc.inner_markup(container), "<div></div>");
}

/// Test that a signal write re-renders only the node that read it.
#[test]
fn signal_write_rerenders_reading_node_only() {
    let (doc, container) = setup();
    let signal = Signal::new(1);
    let parent_renders = Rc::new(Cell::new(0));
    let child_renders = Rc::new(Cell::new(0));

    let root = {
        let (signal, parent_renders, child_renders) =
            (signal.clone(), parent_renders.clone(), child_renders.clone());
        mount(
            move |_, _| {
                parent_renders.set(parent_renders.get() + 1);
                let (signal, child_renders) = (signal.clone(), child_renders.clone());
                let child = move |_: &Scope, _: &Props| -> RenderResult {
                    child_renders.set(child_renders.get() + 1);
                    Ok(Element::new("span").with_text(signal.get().to_string()))
                };
                Ok(Element::new("div").child(Element::component(child, Props::new())))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<div><span>1</span></div>");
    assert_eq!(signal.subscriber_count(), 1);

    signal.set(2);
    assert!(!root.is_idle());
    root.run_until_idle().unwrap();

    assert_eq!(doc.inner_markup(container), "<div><span>2</span></div>");
    assert_eq!(parent_renders.get(), 1);
    assert_eq!(child_renders.get(), 2);
    assert_eq!(signal.subscriber_count(), 1);

    root.unmount().unwrap();
    assert_eq!(signal.subscriber_count(), 0);
}

/// Test that a computed owned by a node drives its re-render.
#[test]
fn computed_hook_updates_node() {
    let (doc, container) = setup();
    let signal = Signal::new(2);

    let root = {
        let signal = signal.clone();
        mount(
            move |cx, _| {
                let signal = signal.clone();
                let doubled = cx.use_computed(move || signal.get() * 2)?;
                Ok(Element::new("b").with_text(doubled.get().to_string()))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<b>4</b>");

    signal.set(5);
    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<b>10</b>");

    root.unmount().unwrap();
    assert_eq!(signal.subscriber_count(), 0);
}

/// Test that a watch owned by a node stops with it.
#[test]
fn watch_hook_stops_on_removal() {
    let (doc, container) = setup();
    let signal = Signal::new(1);
    let seen = Rc::new(Cell::new(0));

    let root = {
        let (signal, seen) = (signal.clone(), seen.clone());
        mount(
            move |cx, _| {
                let (signal, seen) = (signal.clone(), seen.clone());
                cx.use_watch(move || {
                    seen.set(signal.get());
                    None
                })?;
                Ok(Element::new("div"))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();
    assert_eq!(seen.get(), 1);

    signal.set(5);
    root.run_until_idle().unwrap();
    assert_eq!(seen.get(), 5);

    root.unmount().unwrap();
    signal.set(9);
    Scheduler::run_microtasks().unwrap();
    assert_eq!(seen.get(), 5);
}

fn list_app(_: &Scope, props: &Props) -> RenderResult {
    let count = props.get_number("count").unwrap_or(0.0) as usize;
    Ok(Element::new("ul").children((0..count).map(|i| {
        Element::new("li")
            .attr("data-index", i as f64)
            .with_text(format!("item {i}"))
    })))
}

/// Test that a yielded pass leaves the document untouched.
#[test]
fn yielding_defers_all_mutation_to_commit() {
    let (doc, container) = setup();
    let root = mount(list_app, doc.target(container), Props::new().with("count", 3));
    let before = doc.mutation_count();

    let mut slices = 0;
    loop {
        let status = root.work_loop(&UnitBudget::new(1)).unwrap();
        slices += 1;
        if status == WorkStatus::Idle {
            break;
        }
        assert_eq!(doc.mutation_count(), before, "mutated in slice {slices}");
    }

    assert!(slices > 5);
    assert_eq!(
        doc.inner_markup(container),
        concat!(
            r#"<ul><li data-index="0">item 0</li>"#,
            r#"<li data-index="1">item 1</li>"#,
            r#"<li data-index="2">item 2</li></ul>"#
        )
    );
}

/// Test that a discarded pass leaves no fibers, nodes or effects behind.
#[test]
fn discarded_pass_leaves_no_orphans() {
    let (doc, container) = setup();
    let effects = Rc::new(Cell::new(0));

    let heavy = {
        let effects = effects.clone();
        move |cx: &Scope, _: &Props| -> RenderResult {
            let effects = effects.clone();
            cx.use_effect(deps![()], move || {
                effects.set(effects.get() + 1);
                None
            })?;
            Ok(Element::new("div").children((0..10).map(|_| Element::new("p"))))
        }
    };

    let root = mount_element(&doc, container, Element::component(heavy, Props::new()));
    assert_eq!(root.work_loop(&UnitBudget::new(5)).unwrap(), WorkStatus::Yielded);
    assert!(root.fiber_count() > 2);

    root.render(Element::new("p").with_text("light"));
    root.run_until_idle().unwrap();

    assert_eq!(effects.get(), 0);
    assert_eq!(doc.inner_markup(container), "<p>light</p>");
    // root, p, text
    assert_eq!(root.fiber_count(), 3);
    // container, p, text
    assert_eq!(doc.node_count(), 3);
}

/// Test that a hook order change fails the pass and keeps the last commit.
#[test]
fn hook_order_violation_rolls_back() {
    let (doc, container) = setup();
    let flip = Rc::new(Cell::new(false));
    let slot: SetterSlot<i32> = Rc::default();

    let root = {
        let (flip, slot) = (flip.clone(), slot.clone());
        mount(
            move |cx, _| {
                let (count, set) = cx.use_state(0)?;
                *slot.borrow_mut() = Some(set);
                if flip.get() {
                    cx.use_memo(deps![], || 1)?;
                } else {
                    cx.use_ref(|| 0)?;
                }
                Ok(Element::new("p").with_text(count.to_string()))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();
    let committed = doc.inner_markup(container);
    let fibers = root.fiber_count();

    flip.set(true);
    setter(&slot).set(1);
    let err = root.run_until_idle().unwrap_err();

    match err {
        RenderError::HookOrderViolation {
            index,
            expected,
            found,
            ..
        } => {
            assert_eq!(index, 1);
            assert_eq!(expected, "use_ref");
            assert_eq!(found, "use_memo");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(doc.inner_markup(container), committed);
    assert_eq!(root.fiber_count(), fibers);
    assert!(root.is_idle());

    // The queued update survives the failed pass.
    flip.set(false);
    root.request_root_update();
    root.run_until_idle().unwrap();
    assert_eq!(doc.inner_markup(container), "<p>1</p>");
}

/// Test that a hook called inside another hook is rejected.
#[test]
fn nested_hook_call_is_rejected() {
    let (doc, container) = setup();
    let root = mount(
        |cx, _| {
            cx.use_hook("outer", || 0_u8, |_| cx.use_state(1).map(|_| ()))??;
            Ok(Element::new("div"))
        },
        doc.target(container),
        Props::new(),
    );

    let err = root.run_until_idle().unwrap_err();
    assert!(matches!(err, RenderError::NestedHookCall { hook: "use_state" }));
    assert_eq!(doc.inner_markup(container), "");
}

fn effect_order_log(order: EffectOrder) -> Vec<&'static str> {
    let (doc, container) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    let child = {
        let log = log.clone();
        move |cx: &Scope, _: &Props| -> RenderResult {
            let log = log.clone();
            cx.use_effect(deps![()], move || {
                log.borrow_mut().push("child");
                None
            })?;
            Ok(Element::new("span"))
        }
    };
    let parent = {
        let log = log.clone();
        move |cx: &Scope, _: &Props| -> RenderResult {
            let log = log.clone();
            cx.use_effect(deps![()], move || {
                log.borrow_mut().push("parent");
                None
            })?;
            Ok(Element::new("div").child(Element::component(child.clone(), Props::new())))
        }
    };

    let config = RendererConfig {
        effect_order: order,
        ..RendererConfig::default()
    };
    let root = Root::new(
        Element::component(parent, Props::new()),
        doc.target(container),
        config,
    );
    root.run_until_idle().unwrap();
    let entries = log.borrow().clone();
    entries
}

#[test]
fn effect_drain_order_is_configurable() {
    assert_eq!(effect_order_log(EffectOrder::Lifo), ["child", "parent"]);
    assert_eq!(effect_order_log(EffectOrder::Fifo), ["parent", "child"]);
}

/// Test listeners and refs on committed nodes.
#[test]
fn listeners_and_refs() {
    let (doc, container) = setup();
    let button = NodeRef::new();

    let root = {
        let button = button.clone();
        mount(
            move |cx, _| {
                let (clicks, set) = cx.use_state(0)?;
                Ok(Element::new("button")
                    .node_ref(&button)
                    .on("click", move |_| set.update(|n| n + 1))
                    .with_text(clicks.to_string()))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();

    let handle = button.get().expect("ref set at commit");
    assert_eq!(doc.dispatch(handle, "click"), 1);
    assert_eq!(doc.dispatch(handle, "click"), 1);
    root.run_until_idle().unwrap();

    assert_eq!(doc.inner_markup(container), "<button>2</button>");
    assert_eq!(doc.listener_count(handle), 1);

    root.unmount().unwrap();
    assert_eq!(button.get(), None);
    assert!(!doc.contains(handle));
}

/// Test that updates after unmount are ignored.
#[test]
fn unmounted_root_ignores_updates() {
    let (doc, container) = setup();
    let slot: SetterSlot<i32> = Rc::default();
    let root = {
        let slot = slot.clone();
        mount(
            move |cx, _| {
                let (_, set) = cx.use_state(0)?;
                *slot.borrow_mut() = Some(set);
                Ok(Element::new("div"))
            },
            doc.target(container),
            Props::new(),
        )
    };
    root.run_until_idle().unwrap();
    let set = setter(&slot);

    root.unmount().unwrap();
    set.set(3);

    assert!(root.is_idle());
    assert_eq!(doc.inner_markup(container), "");
}

/// Test the async driver.
#[tokio::test]
async fn drive_renders_until_idle() {
    let (doc, container) = setup();
    let root = mount(list_app, doc.target(container), Props::new().with("count", 2));

    root.drive().await.unwrap();

    assert!(root.is_idle());
    assert_eq!(doc.children(container).len(), 1);
    assert_eq!(
        doc.inner_markup(container),
        r#"<ul><li data-index="0">item 0</li><li data-index="1">item 1</li></ul>"#
    );
}
