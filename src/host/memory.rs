//! MemoryHost - In-memory host that records every mutation.
//!
//! Used as the test renderer: build a tree, inspect it as markup, count the
//! operations a commit performed, and fire handler props as events.
//!
//! ```text
//! container #1
//! └── div #2 id="app"
//!     ├── "Count: " #3
//!     └── button #4 onclick=<handler>
//! ```
//!
//! Markup for the tree above is `<div id="app">Count: <button></button></div>`.
//! Handler props are not printed.
//!
//! Removing a node forgets its whole subtree; those handles go stale.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::{HostConfig, HostHandle, UpdatePayload};
use crate::lanes::Lanes;
use crate::primitives::{Node, PropValue, Props};

/// One recorded host call.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateInstance { handle: HostHandle, tag: String },
    CreateText { handle: HostHandle, text: String },
    AppendInitialChild { parent: HostHandle, child: HostHandle },
    CommitUpdate { instance: HostHandle, changed: Vec<String> },
    CommitTextUpdate { instance: HostHandle, old: String, new: String },
    ResetTextContent { instance: HostHandle },
    AppendChild { parent: HostHandle, child: HostHandle },
    AppendToContainer { container: HostHandle, child: HostHandle },
    InsertBefore { parent: HostHandle, child: HostHandle, before: HostHandle },
    InsertInContainerBefore { container: HostHandle, child: HostHandle, before: HostHandle },
    RemoveChild { parent: HostHandle, child: HostHandle },
    RemoveFromContainer { container: HostHandle, child: HostHandle },
    ClearContainer { container: HostHandle },
}

impl HostOp {
    /// Creation of an element or text instance.
    pub fn is_creation(&self) -> bool {
        matches!(self, HostOp::CreateInstance { .. } | HostOp::CreateText { .. })
    }

    /// Commit-phase insertion (append or insert-before).
    pub fn is_placement(&self) -> bool {
        matches!(
            self,
            HostOp::AppendChild { .. }
                | HostOp::AppendToContainer { .. }
                | HostOp::InsertBefore { .. }
                | HostOp::InsertInContainerBefore { .. }
        )
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, HostOp::RemoveChild { .. } | HostOp::RemoveFromContainer { .. })
    }
}

enum HostKind {
    Container,
    Element {
        tag: Rc<str>,
        attrs: BTreeMap<Rc<str>, PropValue>,
        text: Option<Rc<str>>,
    },
    Text(String),
}

struct HostNode {
    kind: HostKind,
    children: Vec<HostHandle>,
    parent: Option<HostHandle>,
}

#[derive(Default)]
struct Inner {
    nodes: FxHashMap<HostHandle, HostNode>,
    next: u64,
    ops: Vec<HostOp>,
}

impl Inner {
    fn insert(&mut self, kind: HostKind) -> HostHandle {
        self.next += 1;
        let handle = HostHandle(self.next);
        self.nodes.insert(
            handle,
            HostNode {
                kind,
                children: Vec::new(),
                parent: None,
            },
        );
        handle
    }

    fn detach(&mut self, child: HostHandle) {
        let parent = self.nodes.get_mut(&child).and_then(|node| node.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != child);
        }
    }

    fn append(&mut self, parent: HostHandle, child: HostHandle) {
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
    }

    fn insert_before(&mut self, parent: HostHandle, child: HostHandle, before: HostHandle) {
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&parent) {
            let at = node
                .children
                .iter()
                .position(|c| *c == before)
                .unwrap_or(node.children.len());
            node.children.insert(at, child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
    }

    /// Detach `child` from `parent` and forget its whole subtree.
    fn remove(&mut self, parent: HostHandle, child: HostHandle) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != child);
        }
        self.free(child);
    }

    fn free(&mut self, root: HostHandle) {
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if let Some(node) = self.nodes.remove(&handle) {
                stack.extend(node.children);
            }
        }
    }

    fn write_markup(&self, handle: HostHandle, out: &mut String) {
        let Some(node) = self.nodes.get(&handle) else {
            return;
        };
        match &node.kind {
            HostKind::Text(text) => out.push_str(text),
            HostKind::Container => {
                for child in &node.children {
                    self.write_markup(*child, out);
                }
            }
            HostKind::Element { tag, attrs, text } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attrs {
                    if !matches!(value, PropValue::Handler(_)) {
                        let _ = write!(out, " {name}=\"{value}\"");
                    }
                }
                out.push('>');
                if let Some(text) = text {
                    out.push_str(text);
                }
                for child in &node.children {
                    self.write_markup(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

/// In-memory [`HostConfig`].
#[derive(Default)]
pub struct MemoryHost {
    inner: RefCell<Inner>,
    event_priority: Cell<Option<Lanes>>,
    direct_text: Cell<bool>,
}

impl MemoryHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Let elements whose only child is text hold it as content instead of
    /// getting a text node.
    pub fn set_text_content_directly(&self, enabled: bool) {
        self.direct_text.set(enabled);
    }

    pub fn create_container(&self) -> HostHandle {
        self.inner.borrow_mut().insert(HostKind::Container)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every recorded operation, oldest first.
    pub fn ops(&self) -> Vec<HostOp> {
        self.inner.borrow().ops.clone()
    }

    /// Return and forget the recorded operations.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.inner.borrow_mut().ops)
    }

    pub fn clear_ops(&self) {
        self.inner.borrow_mut().ops.clear();
    }

    /// Serialize the subtree under `handle`.
    pub fn to_markup(&self, handle: HostHandle) -> String {
        let mut out = String::new();
        self.inner.borrow().write_markup(handle, &mut out);
        out
    }

    /// Instances and containers still held. Removed subtrees are freed.
    pub fn live_nodes(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn children(&self, handle: HostHandle) -> Vec<HostHandle> {
        self.inner
            .borrow()
            .nodes
            .get(&handle)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, handle: HostHandle) -> Option<HostHandle> {
        self.inner.borrow().nodes.get(&handle).and_then(|node| node.parent)
    }

    /// Elements with `tag` under `root`, in tree order.
    pub fn query(&self, root: HostHandle, tag: &str) -> Vec<HostHandle> {
        let inner = self.inner.borrow();
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let Some(node) = inner.nodes.get(&handle) else {
                continue;
            };
            if let HostKind::Element { tag: t, .. } = &node.kind {
                if &**t == tag {
                    found.push(handle);
                }
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    pub fn attr(&self, handle: HostHandle, name: &str) -> Option<PropValue> {
        match &self.inner.borrow().nodes.get(&handle)?.kind {
            HostKind::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Run `f` as if handling an event of the given priority.
    pub fn with_event_priority<R>(&self, lanes: Lanes, f: impl FnOnce() -> R) -> R {
        let previous = self.event_priority.replace(Some(lanes));
        let result = f();
        self.event_priority.set(previous);
        result
    }

    /// Fire the handler prop `name` of `handle` as a discrete event.
    /// Returns false if there is no such handler.
    pub fn dispatch_event(&self, handle: HostHandle, name: &str) -> bool {
        let Some(PropValue::Handler(handler)) = self.attr(handle, name) else {
            return false;
        };
        self.with_event_priority(Lanes::SYNC, || handler.call());
        true
    }

    fn record(&self, op: HostOp) {
        tracing::trace!(?op, "host");
        self.inner.borrow_mut().ops.push(op);
    }

    fn direct_text_of<'a>(&self, props: &'a Props) -> Option<&'a str> {
        match props.children() {
            Node::Text(text) if self.direct_text.get() => Some(&**text),
            _ => None,
        }
    }
}

impl HostConfig for MemoryHost {
    fn create_instance(&self, tag: &str, _props: &Props) -> HostHandle {
        let handle = self.inner.borrow_mut().insert(HostKind::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            text: None,
        });
        self.record(HostOp::CreateInstance {
            handle,
            tag: tag.to_string(),
        });
        handle
    }

    fn create_text_instance(&self, text: &str) -> HostHandle {
        let handle = self.inner.borrow_mut().insert(HostKind::Text(text.to_string()));
        self.record(HostOp::CreateText {
            handle,
            text: text.to_string(),
        });
        handle
    }

    fn append_initial_child(&self, parent: HostHandle, child: HostHandle) {
        self.inner.borrow_mut().append(parent, child);
        self.record(HostOp::AppendInitialChild { parent, child });
    }

    fn finalize_initial_children(&self, instance: HostHandle, _tag: &str, props: &Props) {
        let content = self.direct_text_of(props).map(Rc::from);
        let mut inner = self.inner.borrow_mut();
        if let Some(HostKind::Element { attrs, text, .. }) = inner.nodes.get_mut(&instance).map(|n| &mut n.kind) {
            *attrs = props.attrs().map(|(k, v)| (Rc::from(k), v.clone())).collect();
            *text = content;
        }
    }

    fn should_set_text_content(&self, _tag: &str, props: &Props) -> bool {
        self.direct_text_of(props).is_some()
    }

    fn prepare_update(
        &self,
        _instance: HostHandle,
        _tag: &str,
        old_props: &Props,
        new_props: &Props,
    ) -> Option<UpdatePayload> {
        let mut payload = UpdatePayload::diff(old_props, new_props).unwrap_or_default();
        let old_text = self.direct_text_of(old_props);
        let new_text = self.direct_text_of(new_props);
        if new_text.is_some() && old_text != new_text {
            payload
                .changes
                .push((Rc::from("children"), new_text.map(PropValue::from)));
        }
        if payload.is_empty() {
            None
        } else {
            Some(payload)
        }
    }

    fn commit_update(
        &self,
        instance: HostHandle,
        payload: &UpdatePayload,
        _tag: &str,
        _old_props: &Props,
        _new_props: &Props,
    ) {
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(HostKind::Element { attrs, text, .. }) = inner.nodes.get_mut(&instance).map(|n| &mut n.kind) {
                for (name, value) in &payload.changes {
                    match (&**name, value) {
                        ("children", Some(PropValue::Str(content))) => *text = Some(content.clone()),
                        (_, Some(value)) => {
                            attrs.insert(name.clone(), value.clone());
                        }
                        (_, None) => {
                            attrs.remove(name);
                        }
                    }
                }
            }
        }
        self.record(HostOp::CommitUpdate {
            instance,
            changed: payload.changes.iter().map(|(name, _)| name.to_string()).collect(),
        });
    }

    fn commit_text_update(&self, text_instance: HostHandle, old_text: &str, new_text: &str) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(&text_instance) {
            node.kind = HostKind::Text(new_text.to_string());
        }
        self.record(HostOp::CommitTextUpdate {
            instance: text_instance,
            old: old_text.to_string(),
            new: new_text.to_string(),
        });
    }

    fn reset_text_content(&self, instance: HostHandle) {
        if let Some(HostKind::Element { text, .. }) =
            self.inner.borrow_mut().nodes.get_mut(&instance).map(|n| &mut n.kind)
        {
            *text = None;
        }
        self.record(HostOp::ResetTextContent { instance });
    }

    fn append_child(&self, parent: HostHandle, child: HostHandle) {
        self.inner.borrow_mut().append(parent, child);
        self.record(HostOp::AppendChild { parent, child });
    }

    fn append_child_to_container(&self, container: HostHandle, child: HostHandle) {
        self.inner.borrow_mut().append(container, child);
        self.record(HostOp::AppendToContainer { container, child });
    }

    fn insert_before(&self, parent: HostHandle, child: HostHandle, before: HostHandle) {
        self.inner.borrow_mut().insert_before(parent, child, before);
        self.record(HostOp::InsertBefore { parent, child, before });
    }

    fn insert_in_container_before(&self, container: HostHandle, child: HostHandle, before: HostHandle) {
        self.inner.borrow_mut().insert_before(container, child, before);
        self.record(HostOp::InsertInContainerBefore {
            container,
            child,
            before,
        });
    }

    fn remove_child(&self, parent: HostHandle, child: HostHandle) {
        self.inner.borrow_mut().remove(parent, child);
        self.record(HostOp::RemoveChild { parent, child });
    }

    fn remove_child_from_container(&self, container: HostHandle, child: HostHandle) {
        self.inner.borrow_mut().remove(container, child);
        self.record(HostOp::RemoveFromContainer { container, child });
    }

    fn clear_container(&self, container: HostHandle) {
        {
            let mut inner = self.inner.borrow_mut();
            let children = inner
                .nodes
                .get_mut(&container)
                .map(|node| std::mem::take(&mut node.children))
                .unwrap_or_default();
            for child in children {
                inner.free(child);
            }
        }
        self.record(HostOp::ClearContainer { container });
    }

    fn current_event_priority(&self) -> Option<Lanes> {
        self.event_priority.get()
    }
}
