//! Effect and lifecycle ordering across commits.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use spark_reconciler::{
    Cleanup, Component, FunctionComponent, HostHandle, Hooks, MemoryHost, Node, PropValue, Props, RenderResult, Root,
    SetState, Snapshot, TaskQueue, Updater, class, component, component_of, h,
};

type Log = RefCell<Vec<String>>;

fn setup() -> (Rc<MemoryHost>, HostHandle, Rc<TaskQueue>, Root) {
    let host = MemoryHost::new();
    let container = host.create_container();
    let queue = Rc::new(TaskQueue::new());
    let root = Root::new(host.clone(), container, queue.clone());
    (host, container, queue, root)
}

fn push(log: &Rc<Log>, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

fn take(log: &Rc<Log>) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

// =============================================================================
// FUNCTION COMPONENT EFFECTS
// =============================================================================

/// Logs layout and passive effect mounts and cleanups under `name`.
fn logging(name: &'static str, log: Rc<Log>, child: Option<Node>) -> FunctionComponent {
    FunctionComponent::from_closure(name, move |hooks: &mut Hooks, _: &Props| {
        let layout_log = log.clone();
        hooks.use_layout_effect(
            move || {
                push(&layout_log, format!("{name} layout"));
                let cleanup_log = layout_log.clone();
                let cleanup: Cleanup = Box::new(move || push(&cleanup_log, format!("{name} layout cleanup")));
                Some(cleanup)
            },
            None::<()>,
        );
        let passive_log = log.clone();
        hooks.use_effect(
            move || {
                push(&passive_log, format!("{name} passive"));
                let cleanup_log = passive_log.clone();
                let cleanup: Cleanup = Box::new(move || push(&cleanup_log, format!("{name} passive cleanup")));
                Some(cleanup)
            },
            None::<()>,
        );
        Ok(h("div").child(child.clone().unwrap_or_default()).build())
    })
}

#[test]
fn test_children_before_parents_layout_before_passive() {
    let (_host, _container, _queue, root) = setup();
    let log = Rc::new(Log::default());
    let child = logging("child", log.clone(), None);
    let parent = logging("parent", log.clone(), Some(component_of(&child).build()));

    root.flush_sync(|| root.render(component_of(&parent))).unwrap();
    root.flush_passive_effects();

    assert_eq!(
        take(&log),
        vec!["child layout", "parent layout", "child passive", "parent passive"]
    );
}

#[test]
fn test_passive_effects_run_from_a_task() {
    let (_host, _container, queue, root) = setup();
    let log = Rc::new(Log::default());
    let app = logging("app", log.clone(), None);

    root.render(component_of(&app));
    // Render task only.
    assert!(queue.run_next());
    assert_eq!(take(&log), vec!["app layout"]);

    queue.flush_all();
    assert_eq!(take(&log), vec!["app passive"]);
}

#[test]
fn test_cleanups_run_before_the_next_effects() {
    let (_host, _container, _queue, root) = setup();
    let log = Rc::new(Log::default());
    let app = logging("app", log.clone(), None);

    root.flush_sync(|| root.render(component_of(&app))).unwrap();
    root.flush_passive_effects();
    take(&log);

    root.flush_sync(|| root.render(component_of(&app))).unwrap();
    root.flush_passive_effects();

    assert_eq!(
        take(&log),
        vec![
            "app layout cleanup",
            "app layout",
            "app passive cleanup",
            "app passive",
        ]
    );
}

#[test]
fn test_unmount_runs_every_cleanup() {
    let (_host, _container, _queue, root) = setup();
    let log = Rc::new(Log::default());
    let child = logging("child", log.clone(), None);
    let parent = logging("parent", log.clone(), Some(component_of(&child).build()));
    root.flush_sync(|| root.render(component_of(&parent))).unwrap();
    root.flush_passive_effects();
    take(&log);

    root.unmount().unwrap();

    let entries = take(&log);
    assert_eq!(entries.len(), 4);
    for expected in [
        "child layout cleanup",
        "parent layout cleanup",
        "child passive cleanup",
        "parent passive cleanup",
    ] {
        assert!(entries.iter().any(|e| e == expected), "missing {expected}");
    }
    // Layout cleanups happen during the commit, passive ones after.
    let last_layout = entries.iter().rposition(|e| e.contains("layout")).unwrap();
    let first_passive = entries.iter().position(|e| e.contains("passive")).unwrap();
    assert!(last_layout < first_passive);
}

#[test]
fn test_effect_deps_gate_reruns() {
    let (_host, _container, _queue, root) = setup();
    let log = Rc::new(Log::default());
    let slot: Rc<RefCell<Option<SetState<(i32, i32)>>>> = Rc::new(RefCell::new(None));

    let effect_log = log.clone();
    let setter = slot.clone();
    let app = FunctionComponent::from_closure("Deps", move |hooks: &mut Hooks, _: &Props| {
        let ((watched, other), set) = hooks.use_state(|| (0, 0));
        *setter.borrow_mut() = Some(set);
        let log = effect_log.clone();
        hooks.use_effect(
            move || {
                push(&log, format!("watched {watched}"));
                None
            },
            Some(watched),
        );
        Ok(Node::from(other))
    });

    root.flush_sync(|| root.render(component_of(&app))).unwrap();
    root.flush_passive_effects();
    let set = slot.borrow().clone().unwrap();

    root.flush_sync(|| set.set((0, 1))).unwrap();
    root.flush_passive_effects();
    root.flush_sync(|| set.set((1, 1))).unwrap();
    root.flush_passive_effects();

    assert_eq!(take(&log), vec!["watched 0", "watched 1"]);
}

#[test]
fn test_layout_effect_update_renders_before_flush_returns() {
    let (host, container, _queue, root) = setup();

    fn measured(hooks: &mut Hooks, _: &Props) -> RenderResult {
        let (width, set_width) = hooks.use_state(|| 0);
        hooks.use_layout_effect(
            move || {
                set_width.set(120);
                None
            },
            Some(()),
        );
        Ok(h("div").prop("width", width).build())
    }

    root.flush_sync(|| root.render(component("Measured", measured)))
        .unwrap();

    assert_eq!(host.to_markup(container), r#"<div width="120"></div>"#);
}

#[test]
fn test_passive_effect_update_is_scheduled() {
    let (host, container, queue, root) = setup();

    fn loader(hooks: &mut Hooks, _: &Props) -> RenderResult {
        let (data, set_data) = hooks.use_state(|| String::from("loading"));
        hooks.use_effect(
            move || {
                set_data.set("ready".to_string());
                None
            },
            Some(()),
        );
        Ok(h("p").child(data).build())
    }

    root.flush_sync(|| root.render(component("Loader", loader)))
        .unwrap();
    root.flush_passive_effects();
    assert_eq!(host.to_markup(container), "<p>loading</p>");

    queue.flush_all();
    assert_eq!(host.to_markup(container), "<p>ready</p>");
}

// =============================================================================
// CLASS COMPONENTS
// =============================================================================

type UpdaterSlot = RefCell<Option<Updater<i32>>>;

struct Tracker {
    log: Rc<Log>,
    slot: Rc<UpdaterSlot>,
}

fn opaque<T: 'static>(props: &Props, name: &str) -> Rc<T> {
    match props.get(name) {
        Some(PropValue::Any(value)) => value.clone().downcast::<T>().unwrap(),
        _ => panic!("missing {name}"),
    }
}

impl Component for Tracker {
    type State = i32;

    fn create(props: &Props) -> Self {
        Tracker {
            log: opaque(props, "log"),
            slot: opaque(props, "slot"),
        }
    }

    fn initial_state(&self, _: &Props) -> i32 {
        0
    }

    fn render(&self, _: &Props, state: &i32, _: &Updater<i32>) -> RenderResult {
        push(&self.log, format!("render {state}"));
        Ok(h("b").child(*state).build())
    }

    fn should_update(&self, _: &Props, new_props: &Props, _: &i32, _: &i32) -> bool {
        !new_props.bool("frozen").unwrap_or(false)
    }

    fn did_mount(&mut self, _: &Props, state: &i32, updater: &Updater<i32>) {
        push(&self.log, format!("did_mount {state}"));
        *self.slot.borrow_mut() = Some(updater.clone());
    }

    fn snapshot_before_update(&mut self, _: &Props, prev_state: &i32) -> Option<Snapshot> {
        push(&self.log, format!("snapshot {prev_state}"));
        Some(Rc::new(*prev_state * 100))
    }

    fn did_update(&mut self, _: &Props, prev_state: &i32, snapshot: Option<Snapshot>, _: &Updater<i32>) {
        let snapshot = snapshot.and_then(|s| s.downcast_ref::<i32>().copied());
        push(&self.log, format!("did_update {prev_state} {snapshot:?}"));
    }

    fn will_unmount(&mut self) {
        push(&self.log, "will_unmount");
    }
}

fn tracker(log: &Rc<Log>, slot: &Rc<UpdaterSlot>, frozen: bool) -> Node {
    class::<Tracker>()
        .prop("log", PropValue::Any(log.clone() as Rc<dyn Any>))
        .prop("slot", PropValue::Any(slot.clone() as Rc<dyn Any>))
        .prop("frozen", frozen)
        .build()
}

#[test]
fn test_class_lifecycle() {
    let (host, container, _queue, root) = setup();
    let log = Rc::new(Log::default());
    let slot = Rc::new(UpdaterSlot::default());

    root.flush_sync(|| root.render(tracker(&log, &slot, false))).unwrap();
    assert_eq!(take(&log), vec!["render 0", "did_mount 0"]);

    let updater = slot.borrow().clone().unwrap();
    root.flush_sync(|| updater.set_state(|n, _| n + 1)).unwrap();
    assert_eq!(host.to_markup(container), "<b>1</b>");
    assert_eq!(take(&log), vec!["render 1", "snapshot 0", "did_update 0 Some(0)"]);

    root.unmount().unwrap();
    assert_eq!(take(&log), vec!["will_unmount"]);
    assert_eq!(host.to_markup(container), "");
}

#[test]
fn test_class_should_update_and_force_update() {
    let (host, container, _queue, root) = setup();
    let log = Rc::new(Log::default());
    let slot = Rc::new(UpdaterSlot::default());
    root.flush_sync(|| root.render(tracker(&log, &slot, true))).unwrap();
    take(&log);
    let updater = slot.borrow().clone().unwrap();

    root.flush_sync(|| updater.set_state(|n, _| n + 5)).unwrap();
    assert!(take(&log).is_empty());
    assert_eq!(host.to_markup(container), "<b>0</b>");

    // The skipped state was still kept.
    root.flush_sync(|| updater.force_update()).unwrap();
    assert_eq!(take(&log), vec!["render 5", "snapshot 5", "did_update 5 Some(500)"]);
    assert_eq!(host.to_markup(container), "<b>5</b>");
}

#[test]
fn test_class_set_state_batches() {
    let (host, container, queue, root) = setup();
    let log = Rc::new(Log::default());
    let slot = Rc::new(UpdaterSlot::default());
    root.flush_sync(|| root.render(tracker(&log, &slot, false))).unwrap();
    take(&log);
    let updater = slot.borrow().clone().unwrap();

    updater.set_state(|n, _| n + 1);
    updater.set_state(|n, _| n * 7);
    updater.replace_state(3);
    updater.set_state(|n, _| n + 1);
    queue.flush_all();

    assert_eq!(host.to_markup(container), "<b>4</b>");
    assert_eq!(log.borrow().iter().filter(|e| e.starts_with("render")).count(), 1);
}
