//! Host - The environment the reconciler mutates.
//!
//! The engine never touches host objects directly. It calls a [`HostConfig`]
//! with opaque [`HostHandle`]s it got back from `create_instance` /
//! `create_text_instance`, in the order the commit engine decides.
//!
//! - Render phase: `create_instance`, `create_text_instance`,
//!   `append_initial_child`, `finalize_initial_children`, `prepare_update`
//!   (instances built here are not attached to the container yet)
//! - Commit phase: everything else
//!
//! [`MemoryHost`] is an in-memory implementation that records every call.

mod memory;

pub use memory::*;

use std::rc::Rc;

use crate::lanes::Lanes;
use crate::primitives::{PropValue, Props};

/// Opaque reference to a host instance or container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub u64);

/// Property changes computed in the render phase and applied at commit.
/// `None` removes the property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePayload {
    pub changes: Vec<(Rc<str>, Option<PropValue>)>,
}

impl UpdatePayload {
    /// Attribute-level diff of two prop sets. Children are not included.
    pub fn diff(old: &Props, new: &Props) -> Option<Self> {
        let mut changes = Vec::new();
        for (name, value) in old.attrs() {
            if new.get(name).is_none() {
                changes.push((Rc::from(name), None));
            } else if new.get(name) != Some(value) {
                changes.push((Rc::from(name), new.get(name).cloned()));
            }
        }
        for (name, value) in new.attrs() {
            if old.get(name).is_none() {
                changes.push((Rc::from(name), Some(value.clone())));
            }
        }
        if changes.is_empty() {
            None
        } else {
            Some(Self { changes })
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Host adapter contract.
pub trait HostConfig {
    fn create_instance(&self, tag: &str, props: &Props) -> HostHandle;

    fn create_text_instance(&self, text: &str) -> HostHandle;

    fn append_initial_child(&self, parent: HostHandle, child: HostHandle);

    /// Apply initial properties once all children are appended.
    fn finalize_initial_children(&self, instance: HostHandle, tag: &str, props: &Props);

    /// True if the host renders this element's text children itself, so no
    /// text nodes are created for them.
    fn should_set_text_content(&self, tag: &str, props: &Props) -> bool;

    /// `None` means nothing to commit.
    fn prepare_update(
        &self,
        instance: HostHandle,
        tag: &str,
        old_props: &Props,
        new_props: &Props,
    ) -> Option<UpdatePayload>;

    fn commit_update(
        &self,
        instance: HostHandle,
        payload: &UpdatePayload,
        tag: &str,
        old_props: &Props,
        new_props: &Props,
    );

    fn commit_text_update(&self, text_instance: HostHandle, old_text: &str, new_text: &str);

    fn reset_text_content(&self, instance: HostHandle);

    fn append_child(&self, parent: HostHandle, child: HostHandle);

    fn append_child_to_container(&self, container: HostHandle, child: HostHandle);

    fn insert_before(&self, parent: HostHandle, child: HostHandle, before: HostHandle);

    fn insert_in_container_before(&self, container: HostHandle, child: HostHandle, before: HostHandle);

    fn remove_child(&self, parent: HostHandle, child: HostHandle);

    fn remove_child_from_container(&self, container: HostHandle, child: HostHandle);

    fn clear_container(&self, container: HostHandle);

    /// Lane of the event being dispatched, if any. Updates requested while
    /// handling it get this lane.
    fn current_event_priority(&self) -> Option<Lanes> {
        None
    }
}
