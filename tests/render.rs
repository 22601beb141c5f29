//! Rendering scenarios against the in-memory host.
//!
//! Each test mounts a tree into a `MemoryHost` container, changes it, and
//! checks both the resulting markup and the exact host operations a commit
//! performed.

use std::rc::Rc;

use spark_reconciler::{
    HostHandle, HostOp, Hooks, MemoryHost, Node, Props, RenderResult, Root, TaskQueue, component, fragment, h,
    text,
};

fn setup() -> (Rc<MemoryHost>, HostHandle, Rc<TaskQueue>, Root) {
    let host = MemoryHost::new();
    let container = host.create_container();
    let queue = Rc::new(TaskQueue::new());
    let root = Root::new(host.clone(), container, queue.clone());
    (host, container, queue, root)
}

fn keyed_list(keys: &[&str]) -> Node {
    h("ul")
        .children(keys.iter().map(|k| h("li").key(*k).child(*k)))
        .build()
}

fn count(ops: &[HostOp], f: impl Fn(&HostOp) -> bool) -> usize {
    ops.iter().filter(|op| f(op)).count()
}

// =============================================================================
// MOUNT
// =============================================================================

#[test]
fn test_mount_builds_markup() {
    let (host, container, _queue, root) = setup();

    root.flush_sync(|| root.render(h("div").prop("id", "app").child("hello")))
        .unwrap();

    assert_eq!(host.to_markup(container), r#"<div id="app">hello</div>"#);
    let ops = host.ops();
    // The whole tree is built off-screen and attached once.
    assert_eq!(count(&ops, HostOp::is_placement), 1);
    assert!(matches!(ops.last(), Some(HostOp::AppendToContainer { .. })));
}

#[test]
fn test_scheduled_render_runs_on_flush() {
    let (host, container, queue, root) = setup();

    root.render(h("p").child("later"));
    assert_eq!(host.to_markup(container), "");
    assert_eq!(queue.len(), 1);

    queue.flush_all();
    assert_eq!(host.to_markup(container), "<p>later</p>");
}

#[test]
fn test_fragments_and_components_are_transparent() {
    let (host, container, _queue, root) = setup();

    fn row(_: &mut Hooks, props: &Props) -> RenderResult {
        let label = props.str("label").unwrap_or_default().to_string();
        Ok(fragment([h("dt").child(label.clone()), h("dd").child(label)]).build())
    }

    root.flush_sync(|| {
        root.render(
            h("dl")
                .child(component("Row", row).prop("label", "a"))
                .child(component("Row", row).prop("label", "b")),
        )
    })
    .unwrap();

    assert_eq!(
        host.to_markup(container),
        "<dl><dt>a</dt><dd>a</dd><dt>b</dt><dd>b</dd></dl>"
    );
}

// =============================================================================
// UPDATES
// =============================================================================

fn counter(hooks: &mut Hooks, _: &Props) -> RenderResult {
    let (count, set_count) = hooks.use_state(|| 1);
    Ok(h("div")
        .child(h("div").child(count))
        .child(h("button").on("onclick", move || set_count.update(|n| n + 1)))
        .build())
}

#[test]
fn test_counter_click_is_one_text_update() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(component("Counter", counter))).unwrap();
    assert_eq!(host.to_markup(container), "<div><div>1</div><button></button></div>");
    host.clear_ops();

    let button = host.query(container, "button")[0];
    assert!(host.dispatch_event(button, "onclick"));
    root.flush_sync_work().unwrap();

    assert_eq!(host.to_markup(container), "<div><div>2</div><button></button></div>");
    let ops = host.ops();
    let text_updates: Vec<_> = ops
        .iter()
        .filter_map(|op| match op {
            HostOp::CommitTextUpdate { old, new, .. } => Some((old.as_str(), new.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(text_updates, vec![("1", "2")]);
    assert_eq!(count(&ops, HostOp::is_creation), 0);
    assert_eq!(count(&ops, HostOp::is_placement), 0);
    assert_eq!(count(&ops, HostOp::is_removal), 0);
}

#[test]
fn test_attribute_update() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(h("div").prop("class", "a"))).unwrap();
    host.clear_ops();

    root.flush_sync(|| root.render(h("div").prop("class", "b").prop("title", "t")))
        .unwrap();

    assert_eq!(host.to_markup(container), r#"<div class="b" title="t"></div>"#);
    let ops = host.ops();
    assert_eq!(ops.len(), 1);
    match &ops[0] {
        HostOp::CommitUpdate { changed, .. } => {
            assert_eq!(changed, &vec!["class".to_string(), "title".to_string()]);
        }
        other => panic!("unexpected op {other:?}"),
    }
}

#[test]
fn test_text_to_element_replaces_child() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(h("div").child("plain"))).unwrap();
    host.clear_ops();

    root.flush_sync(|| root.render(h("div").child(h("b").child("bold"))))
        .unwrap();

    assert_eq!(host.to_markup(container), "<div><b>bold</b></div>");
    let ops = host.ops();
    assert_eq!(count(&ops, HostOp::is_removal), 1);
    assert_eq!(count(&ops, HostOp::is_placement), 1);
}

#[test]
fn test_text_to_element_among_siblings() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(h("div").child("x").child(h("b")))).unwrap();
    let b = host.query(container, "b")[0];
    host.clear_ops();

    root.flush_sync(|| root.render(h("div").child(h("span")).child(h("b"))))
        .unwrap();

    assert_eq!(host.to_markup(container), "<div><span></span><b></b></div>");
    let ops = host.ops();
    assert_eq!(count(&ops, HostOp::is_removal), 1);
    assert_eq!(count(&ops, |op| matches!(op, HostOp::CreateInstance { .. })), 1);
    let placements: Vec<_> = ops.iter().filter(|op| op.is_placement()).collect();
    assert_eq!(placements.len(), 1);
    assert!(matches!(placements[0], HostOp::InsertBefore { before, .. } if *before == b));
    assert_eq!(host.query(container, "b"), vec![b]);
}

#[test]
fn test_direct_text_content_reset() {
    let (host, container, _queue, root) = setup();
    host.set_text_content_directly(true);

    root.flush_sync(|| root.render(h("p").child("inline"))).unwrap();
    assert_eq!(host.to_markup(container), "<p>inline</p>");
    // No text instance for a lone text child.
    assert!(!host.ops().iter().any(|op| matches!(op, HostOp::CreateText { .. })));
    host.clear_ops();

    root.flush_sync(|| root.render(h("p").child(h("i").child("x")).child(h("i").child("y"))))
        .unwrap();
    assert_eq!(host.to_markup(container), "<p><i>x</i><i>y</i></p>");
    assert!(host.ops().iter().any(|op| matches!(op, HostOp::ResetTextContent { .. })));
}

// =============================================================================
// KEYED LISTS
// =============================================================================

#[test]
fn test_keyed_move_is_one_placement() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(keyed_list(&["a", "b", "c"]))).unwrap();
    let items = host.query(container, "li");
    host.clear_ops();

    root.flush_sync(|| root.render(keyed_list(&["b", "a", "c"]))).unwrap();

    assert_eq!(
        host.to_markup(container),
        "<ul><li>b</li><li>a</li><li>c</li></ul>"
    );
    let ops = host.ops();
    assert_eq!(count(&ops, HostOp::is_creation), 0);
    assert_eq!(count(&ops, HostOp::is_removal), 0);
    let placements: Vec<_> = ops.iter().filter(|op| op.is_placement()).collect();
    assert_eq!(placements.len(), 1);
    // "a" moved in front of "c"; the instances themselves were kept.
    assert!(matches!(
        placements[0],
        HostOp::InsertBefore { child, before, .. } if *child == items[0] && *before == items[2]
    ));
    assert_eq!(host.query(container, "li"), vec![items[1], items[0], items[2]]);
}

#[test]
fn test_keyed_deletion() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(keyed_list(&["a", "b", "c"]))).unwrap();
    let items = host.query(container, "li");
    host.clear_ops();

    root.flush_sync(|| root.render(keyed_list(&["a", "c"]))).unwrap();

    assert_eq!(host.to_markup(container), "<ul><li>a</li><li>c</li></ul>");
    let ops = host.ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], HostOp::RemoveChild { child, .. } if *child == items[1]));
}

#[test]
fn test_keyed_insert_in_middle() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(keyed_list(&["a", "c"]))).unwrap();
    host.clear_ops();

    root.flush_sync(|| root.render(keyed_list(&["a", "b", "c"]))).unwrap();

    assert_eq!(
        host.to_markup(container),
        "<ul><li>a</li><li>b</li><li>c</li></ul>"
    );
    let ops = host.ops();
    assert_eq!(count(&ops, |op| matches!(op, HostOp::CreateInstance { .. })), 1);
    assert_eq!(count(&ops, |op| matches!(op, HostOp::InsertBefore { .. })), 1);
}

#[test]
fn test_reverse_list() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(keyed_list(&["a", "b", "c", "d"]))).unwrap();
    host.clear_ops();

    root.flush_sync(|| root.render(keyed_list(&["d", "c", "b", "a"]))).unwrap();

    assert_eq!(
        host.to_markup(container),
        "<ul><li>d</li><li>c</li><li>b</li><li>a</li></ul>"
    );
    let ops = host.ops();
    assert_eq!(count(&ops, HostOp::is_creation), 0);
    assert_eq!(count(&ops, HostOp::is_placement), 3);
}

#[test]
fn test_moving_a_component_moves_its_host_nodes() {
    let (host, container, _queue, root) = setup();

    fn pair(_: &mut Hooks, props: &Props) -> RenderResult {
        let id = props.str("id").unwrap_or_default().to_string();
        Ok(vec![h("span").child(format!("{id}1")), h("span").child(format!("{id}2"))].into())
    }
    let tree = |order: &[&str]| -> Node {
        h("div")
            .children(order.iter().map(|id| component("Pair", pair).key(*id).prop("id", *id)))
            .build()
    };

    root.flush_sync(|| root.render(tree(&["x", "y"]))).unwrap();
    root.flush_sync(|| root.render(tree(&["y", "x"]))).unwrap();

    assert_eq!(
        host.to_markup(container),
        "<div><span>y1</span><span>y2</span><span>x1</span><span>x2</span></div>"
    );
}

// =============================================================================
// UNMOUNT
// =============================================================================

#[test]
fn test_unmount_clears_container_and_releases_nodes() {
    let (host, container, _queue, root) = setup();
    root.flush_sync(|| root.render(h("div").child(text("bye")))).unwrap();

    root.unmount().unwrap();

    assert_eq!(host.to_markup(container), "");
    assert!(host.ops().iter().any(|op| matches!(op, HostOp::RemoveFromContainer { .. })));
    // Only the root's two buffers and the container remain.
    assert_eq!(root.node_count(), 2);
    assert_eq!(host.live_nodes(), 1);
}
