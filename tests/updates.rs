//! Update scheduling: lanes, batching, bail-outs, and render failures.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use spark_reconciler::{
    Dispatch, FunctionComponent, HostHandle, HostOp, Hooks, Lanes, MemoryHost, Node, PriorityLevel, Props,
    ReconcileError, ReconcilerConfig, RenderError, RenderResult, Root, SetState, TaskQueue, component,
    component_of, h,
};

fn setup() -> (Rc<MemoryHost>, HostHandle, Rc<TaskQueue>, Root) {
    setup_with(ReconcilerConfig::default())
}

fn setup_with(config: ReconcilerConfig) -> (Rc<MemoryHost>, HostHandle, Rc<TaskQueue>, Root) {
    let host = MemoryHost::new();
    let container = host.create_container();
    let queue = Rc::new(TaskQueue::new());
    let root = Root::with_config(host.clone(), container, queue.clone(), config);
    (host, container, queue, root)
}

/// A component exposing its setter through a shared slot.
fn exposed_state(
    slot: Rc<RefCell<Option<SetState<i32>>>>,
    renders: Rc<Cell<u32>>,
) -> FunctionComponent {
    FunctionComponent::from_closure("Exposed", move |hooks: &mut Hooks, _: &Props| {
        renders.set(renders.get() + 1);
        let (value, set_value) = hooks.use_state(|| 1);
        *slot.borrow_mut() = Some(set_value);
        Ok(h("span").child(value).build())
    })
}

// =============================================================================
// BAIL-OUT
// =============================================================================

#[test]
fn test_noop_update_schedules_nothing() {
    let (host, container, queue, root) = setup();
    let slot = Rc::new(RefCell::new(None));
    let renders = Rc::new(Cell::new(0));
    let app = exposed_state(slot.clone(), renders.clone());

    root.flush_sync(|| root.render(component_of(&app))).unwrap();
    queue.flush_all();
    let scheduled = queue.scheduled_count();
    host.clear_ops();

    let set = slot.borrow().clone().unwrap();
    set.set(1);

    assert_eq!(queue.scheduled_count(), scheduled);
    assert!(queue.is_empty());
    assert_eq!(root.pending_lanes(), Lanes::empty());
    queue.flush_all();
    assert_eq!(renders.get(), 1);
    assert!(host.ops().is_empty());
    assert_eq!(host.to_markup(container), "<span>1</span>");
}

#[test]
fn test_updates_batch_into_one_render() {
    let (host, container, queue, root) = setup();
    let slot = Rc::new(RefCell::new(None));
    let renders = Rc::new(Cell::new(0));
    let app = exposed_state(slot.clone(), renders.clone());
    root.flush_sync(|| root.render(component_of(&app))).unwrap();

    let set = slot.borrow().clone().unwrap();
    set.update(|n| n + 1);
    set.update(|n| n + 1);
    set.update(|n| n * 10);
    queue.flush_all();

    assert_eq!(renders.get(), 2);
    assert_eq!(host.to_markup(container), "<span>30</span>");
}

#[test]
fn test_unchanged_child_is_skipped() {
    let (host, container, _queue, root) = setup();
    let child_renders = Rc::new(Cell::new(0));
    let counted = child_renders.clone();
    let child = FunctionComponent::from_closure("Child", move |_: &mut Hooks, _: &Props| {
        counted.set(counted.get() + 1);
        Ok(h("i").build())
    });
    let child_element = component_of(&child).build();

    let slot = Rc::new(RefCell::new(None));
    let parent_slot = slot.clone();
    let element = child_element.clone();
    let parent = FunctionComponent::from_closure("Parent", move |hooks: &mut Hooks, _: &Props| {
        let (n, set_n) = hooks.use_state(|| 0);
        *parent_slot.borrow_mut() = Some(set_n);
        Ok(h("div").child(n).child(element.clone()).build())
    });

    root.flush_sync(|| root.render(component_of(&parent))).unwrap();
    let set = slot.borrow().clone().unwrap();
    root.flush_sync(|| set.set(5)).unwrap();

    assert_eq!(host.to_markup(container), "<div>5<i></i></div>");
    // Same element value means same props: the child bailed out.
    assert_eq!(child_renders.get(), 1);
}

// =============================================================================
// LANES
// =============================================================================

fn reducer_app(slot: Rc<RefCell<Option<Dispatch<Op>>>>, seen: Rc<RefCell<Vec<i64>>>) -> FunctionComponent {
    FunctionComponent::from_closure("Reducer", move |hooks: &mut Hooks, _: &Props| {
        let (value, dispatch) = hooks.use_reducer(
            |state: &i64, op: &Op| match op {
                Op::Add(n) => state + n,
                Op::Mul(n) => state * n,
            },
            1,
        );
        seen.borrow_mut().push(value);
        *slot.borrow_mut() = Some(dispatch);
        Ok(Node::from(value))
    })
}

enum Op {
    Add(i64),
    Mul(i64),
}

#[test]
fn test_skipped_update_is_rebased_in_order() {
    let (host, container, queue, root) = setup();
    let slot = Rc::new(RefCell::new(None));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let app = reducer_app(slot.clone(), seen.clone());
    root.flush_sync(|| root.render(component_of(&app))).unwrap();
    let dispatch = slot.borrow().clone().unwrap();

    // +1 at default priority, then x10 synchronously.
    dispatch.dispatch(Op::Add(1));
    root.flush_sync(|| dispatch.dispatch(Op::Mul(10))).unwrap();
    assert_eq!(host.to_markup(container), "10");

    queue.flush_all();
    assert_eq!(host.to_markup(container), "20");
    assert_eq!(*seen.borrow(), vec![1, 10, 20]);
}

#[test]
fn test_sync_work_runs_before_default() {
    let (_host, _container, queue, root) = setup();
    let slot = Rc::new(RefCell::new(None));
    let renders = Rc::new(Cell::new(0));
    let app = exposed_state(slot.clone(), renders.clone());
    root.flush_sync(|| root.render(component_of(&app))).unwrap();
    let set = slot.borrow().clone().unwrap();

    set.set(2);
    assert_eq!(root.pending_lanes(), Lanes::DEFAULT);
    root.with_priority(Lanes::SYNC, || set.set(3));
    assert_eq!(root.pending_lanes(), Lanes::DEFAULT | Lanes::SYNC);

    let ran_before = queue.run_log().len();
    queue.flush_all();
    assert_eq!(queue.run_log().get(ran_before), Some(&PriorityLevel::Immediate));
    assert_eq!(root.pending_lanes(), Lanes::empty());
}

#[test]
fn test_transition_renders_after_urgent_update() {
    let (host, container, queue, root) = setup();
    let slot = Rc::new(RefCell::new(None));
    let renders = Rc::new(Cell::new(0));
    let app = exposed_state(slot.clone(), renders.clone());
    root.flush_sync(|| root.render(component_of(&app))).unwrap();
    let set = slot.borrow().clone().unwrap();

    root.start_transition(|| set.set(100));
    assert!(root.pending_lanes().intersects(Lanes::TRANSITIONS));
    root.flush_sync(|| set.update(|n| n + 1)).unwrap();

    // Only the urgent update is visible; the transition is still pending.
    assert_eq!(host.to_markup(container), "<span>2</span>");
    assert!(root.pending_lanes().intersects(Lanes::TRANSITIONS));

    queue.flush_all();
    // Rebased in enqueue order: set(100) then +1.
    assert_eq!(host.to_markup(container), "<span>101</span>");
}

#[test]
fn test_update_after_unmount_is_ignored() {
    let (_host, _container, queue, root) = setup();
    let slot = Rc::new(RefCell::new(None));
    let renders = Rc::new(Cell::new(0));
    let app = exposed_state(slot.clone(), renders.clone());
    root.flush_sync(|| root.render(component_of(&app))).unwrap();
    let set = slot.borrow().clone().unwrap();

    root.unmount().unwrap();
    let scheduled = queue.scheduled_count();
    set.set(42);

    assert_eq!(queue.scheduled_count(), scheduled);
    assert_eq!(root.pending_lanes(), Lanes::empty());
}

// =============================================================================
// RENDER-PHASE UPDATES
// =============================================================================

#[test]
fn test_render_phase_update_reruns_in_place() {
    let (host, container, _queue, root) = setup();
    let renders = Rc::new(Cell::new(0));
    let counted = renders.clone();
    let app = FunctionComponent::from_closure("Settle", move |hooks: &mut Hooks, _: &Props| {
        counted.set(counted.get() + 1);
        let (n, set_n) = hooks.use_state(|| 0);
        if n < 3 {
            set_n.set(n + 1);
        }
        Ok(Node::from(n))
    });

    root.flush_sync(|| root.render(component_of(&app))).unwrap();

    assert_eq!(host.to_markup(container), "3");
    assert_eq!(renders.get(), 4);
    // Settled within one commit: only one text node was ever created.
    let texts = host
        .ops()
        .iter()
        .filter(|op| matches!(op, HostOp::CreateText { .. }))
        .count();
    assert_eq!(texts, 1);
}

#[test]
fn test_endless_render_phase_updates_fail() {
    let mut config = ReconcilerConfig::default();
    config.rerender_limit = 5;
    let (host, container, _queue, root) = setup_with(config);

    fn forever(hooks: &mut Hooks, _: &Props) -> RenderResult {
        let (n, set_n) = hooks.use_state(|| 0);
        set_n.set(n + 1);
        Ok(Node::from(n))
    }

    let result = root.flush_sync(|| root.render(component("Forever", forever)));

    assert!(matches!(result, Err(ReconcileError::TooManyRerenders { limit: 5 })));
    assert_eq!(host.to_markup(container), "");
}

// =============================================================================
// ERRORS
// =============================================================================

#[test]
fn test_render_error_commits_nothing() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(h("p").child("ok"))).unwrap();
    host.clear_ops();

    fn broken(_: &mut Hooks, _: &Props) -> RenderResult {
        Err(RenderError::new("boom"))
    }
    let result = root.flush_sync(|| root.render(h("div").child(h("b")).child(component("Broken", broken))));

    match result {
        Err(ReconcileError::Render { component, source }) => {
            assert_eq!(component, "Broken");
            assert_eq!(source.message(), "boom");
        }
        other => panic!("expected a render error, got {other:?}"),
    }
    assert!(host.ops().iter().all(|op| !op.is_placement() && !op.is_removal()));
    assert_eq!(host.to_markup(container), "<p>ok</p>");

    // The root still works afterwards.
    root.flush_sync(|| root.render(h("p").child("again"))).unwrap();
    assert_eq!(host.to_markup(container), "<p>again</p>");
}

#[test]
fn test_scheduled_render_error_is_stored() {
    let (host, container, queue, root) = setup();

    fn broken(_: &mut Hooks, _: &Props) -> RenderResult {
        Err(RenderError::new("scheduled boom"))
    }
    root.render(component("Broken", broken));
    queue.flush_all();

    assert!(matches!(root.take_error(), Some(ReconcileError::Render { .. })));
    assert!(root.take_error().is_none());
    assert_eq!(host.to_markup(container), "");
    assert_eq!(root.pending_lanes(), Lanes::empty());
}

type Slot<T> = Rc<RefCell<Option<SetState<T>>>>;

/// `div > [counter, bad]`, with the counter wrapped in `Outer` when `nested`.
/// `bad` throws once its flag is set.
fn counter_and_bad(counter_slot: Slot<i32>, bad_slot: Slot<bool>, nested: bool) -> Node {
    let counter = FunctionComponent::from_closure("Counter", move |hooks: &mut Hooks, _: &Props| {
        let (count, set_count) = hooks.use_state(|| 0);
        *counter_slot.borrow_mut() = Some(set_count);
        Ok(h("span").child(count).build())
    });
    let bad = FunctionComponent::from_closure("Bad", move |hooks: &mut Hooks, _: &Props| {
        let (broken, set_broken) = hooks.use_state(|| false);
        *bad_slot.borrow_mut() = Some(set_broken);
        if broken {
            return Err(RenderError::new("broken"));
        }
        Ok(h("i").build())
    });

    let counter = component_of(&counter).build();
    let first = if nested {
        let outer = FunctionComponent::from_closure("Outer", move |_: &mut Hooks, _: &Props| Ok(counter.clone()));
        component_of(&outer).build()
    } else {
        counter
    };
    h("div").child(first).child(component_of(&bad)).build()
}

fn is_render_error(result: Result<(), ReconcileError>, name: &str) -> bool {
    matches!(result, Err(ReconcileError::Render { component, .. }) if component == name)
}

#[test]
fn test_update_below_skipped_subtree_after_failed_render() {
    let (host, container, _queue, root) = setup();
    let (counter_slot, bad_slot): (Slot<i32>, Slot<bool>) = Default::default();
    root.flush_sync(|| root.render(counter_and_bad(counter_slot.clone(), bad_slot.clone(), true)))
        .unwrap();
    let set_count = counter_slot.borrow().clone().unwrap();
    let set_broken = bad_slot.borrow().clone().unwrap();

    assert!(is_render_error(root.flush_sync(|| set_broken.set(true)), "Bad"));
    assert_eq!(host.to_markup(container), "<div><span>0</span><i></i></div>");

    // `Outer` was skipped by the failed render; its child must still reach the root.
    root.flush_sync(|| set_count.set(1)).unwrap();
    assert_eq!(host.to_markup(container), "<div><span>1</span><i></i></div>");
    assert_eq!(root.pending_lanes(), Lanes::empty());
}

#[test]
fn test_failed_update_is_dropped() {
    let (host, container, _queue, root) = setup();
    let (counter_slot, bad_slot): (Slot<i32>, Slot<bool>) = Default::default();
    root.flush_sync(|| root.render(counter_and_bad(counter_slot.clone(), bad_slot.clone(), false)))
        .unwrap();
    let set_count = counter_slot.borrow().clone().unwrap();
    let set_broken = bad_slot.borrow().clone().unwrap();

    assert!(is_render_error(root.flush_sync(|| set_broken.set(true)), "Bad"));

    // An unrelated update renders from the last committed tree.
    root.flush_sync(|| set_count.set(1)).unwrap();
    assert_eq!(host.to_markup(container), "<div><span>1</span><i></i></div>");
    assert_eq!(root.pending_lanes(), Lanes::empty());

    // The dropped value is not the cell's value, so sending it again renders again.
    assert!(is_render_error(root.flush_sync(|| set_broken.set(true)), "Bad"));
    root.flush_sync(|| set_broken.set(false)).unwrap();
    assert_eq!(host.to_markup(container), "<div><span>1</span><i></i></div>");
}

#[test]
fn test_render_phase_update_to_another_component() {
    let (host, container, _queue, root) = setup();
    let slot: Slot<i32> = Rc::new(RefCell::new(None));

    let exposed = slot.clone();
    let b = FunctionComponent::from_closure("B", move |hooks: &mut Hooks, _: &Props| {
        let (value, set_value) = hooks.use_state(|| 0);
        *exposed.borrow_mut() = Some(set_value);
        Ok(h("b").child(value).build())
    });
    let a_renders = Rc::new(Cell::new(0));
    let renders = a_renders.clone();
    let a = FunctionComponent::from_closure("A", move |_: &mut Hooks, _: &Props| {
        renders.set(renders.get() + 1);
        if let Some(set_b) = slot.borrow().as_ref() {
            set_b.set(7);
        }
        Ok(h("a").build())
    });

    root.flush_sync(|| root.render(h("div").child(component_of(&b)).child(component_of(&a))))
        .unwrap();

    // Deferred until the first commit, then rendered before flush returns.
    assert_eq!(host.to_markup(container), "<div><b>7</b><a></a></div>");
    assert_eq!(a_renders.get(), 1);
    assert_eq!(root.pending_lanes(), Lanes::empty());
}

#[test]
fn test_changing_state_cell_count_is_fatal() {
    let (_host, _container, _queue, root) = setup();
    let slot: Rc<RefCell<Option<SetState<bool>>>> = Rc::new(RefCell::new(None));
    let shared = slot.clone();
    let app = FunctionComponent::from_closure("Conditional", move |hooks: &mut Hooks, _: &Props| {
        let (extra, set_extra) = hooks.use_state(|| false);
        *shared.borrow_mut() = Some(set_extra);
        if extra {
            let _ = hooks.use_state(|| 0u8);
        }
        Ok(Node::Empty)
    });
    root.flush_sync(|| root.render(component_of(&app))).unwrap();

    let set = slot.borrow().clone().unwrap();
    let err = root.flush_sync(|| set.set(true)).unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::StateCellCountMismatch {
            previous: 1,
            rendered: 2
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_nested_update_limit() {
    let mut config = ReconcilerConfig::default();
    config.nested_update_limit = 5;
    let (_host, _container, _queue, root) = setup_with(config);

    fn runaway(hooks: &mut Hooks, _: &Props) -> RenderResult {
        let (n, set_n) = hooks.use_state(|| 0);
        hooks.use_layout_effect(
            move || {
                set_n.set(n + 1);
                None
            },
            None::<()>,
        );
        Ok(Node::from(n))
    }

    let result = root.flush_sync(|| root.render(component("Runaway", runaway)));
    assert!(matches!(result, Err(ReconcileError::NestedUpdateLimit { limit: 5 })));
}
