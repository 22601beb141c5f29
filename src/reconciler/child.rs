use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::engine::{Flags, NodeArena, NodeId, RenderNode, WorkTag};
use crate::lanes::Lanes;
use crate::primitives::{Element, ElementType, Key, Node, Props};

/// Identity of an old child in the fallback map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey {
    Key(Key),
    Index(usize),
}

/// Reconciles the children of one parent.
pub(crate) struct ChildReconciler<'a> {
    arena: &'a mut NodeArena,
    parent: NodeId,
    lanes: Lanes,
    track_side_effects: bool,
}

impl<'a> ChildReconciler<'a> {
    pub(crate) fn new(arena: &'a mut NodeArena, parent: NodeId, lanes: Lanes, track_side_effects: bool) -> Self {
        Self {
            arena,
            parent,
            lanes,
            track_side_effects,
        }
    }

    /// Reconcile `current_first` and its siblings against `new_child`.
    /// Returns the new first child.
    pub(crate) fn reconcile(&mut self, current_first: Option<NodeId>, new_child: &Node) -> Option<NodeId> {
        // A fragment at the top level is just its children.
        let new_child = match new_child {
            Node::Element(element) if element.ty == ElementType::Fragment => element.props.children(),
            other => other,
        };

        match new_child {
            Node::Element(element) => {
                let child = self.reconcile_single_element(current_first, element);
                Some(self.place_single_child(child))
            }
            Node::Text(text) if !text.is_empty() => {
                let child = self.reconcile_single_text(current_first, text);
                Some(self.place_single_child(child))
            }
            Node::List(children) => self.reconcile_children_array(current_first, children),
            _ => {
                self.delete_remaining_children(current_first);
                None
            }
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn delete_child(&mut self, child: NodeId) {
        if !self.track_side_effects {
            return;
        }
        let parent = &mut self.arena[self.parent];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, mut child: Option<NodeId>) {
        if !self.track_side_effects {
            return;
        }
        while let Some(id) = child {
            self.delete_child(id);
            child = self.arena[id].sibling;
        }
    }

    // =========================================================================
    // Node creation and reuse
    // =========================================================================

    fn use_node(&mut self, current: NodeId, props: Props) -> NodeId {
        let wip = self.arena.work_in_progress(current, props);
        let node = &mut self.arena[wip];
        node.index = 0;
        node.sibling = None;
        wip
    }

    fn allocate(&mut self, mut node: RenderNode) -> NodeId {
        node.lanes = self.lanes;
        node.parent = Some(self.parent);
        self.arena.allocate(node)
    }

    fn create_from_element(&mut self, element: &Element) -> NodeId {
        let tag = match &element.ty {
            ElementType::Host(_) => WorkTag::HostComponent,
            ElementType::Function(_) => WorkTag::FunctionComponent,
            ElementType::Class(_) => WorkTag::ClassComponent,
            ElementType::Fragment => WorkTag::Fragment,
        };
        let mut node = RenderNode::new(tag, element.props.clone(), element.key.clone());
        node.element_type = Some(element.ty.clone());
        self.allocate(node)
    }

    fn create_text(&mut self, text: &Rc<str>) -> NodeId {
        self.allocate(RenderNode::new(
            WorkTag::HostText,
            Props::from_children(Node::Text(text.clone())),
            None,
        ))
    }

    fn create_fragment(&mut self, children: Node, key: Option<Key>) -> NodeId {
        self.allocate(RenderNode::new(WorkTag::Fragment, Props::from_children(children), key))
    }

    /// Reuse `current` if it is a text node.
    fn update_text_node(&mut self, current: Option<NodeId>, text: &Rc<str>) -> NodeId {
        match current {
            Some(current) if self.arena[current].tag == WorkTag::HostText => {
                self.use_node(current, Props::from_children(Node::Text(text.clone())))
            }
            _ => self.create_text(text),
        }
    }

    /// Reuse `current` if it has the element's type.
    fn update_element(&mut self, current: Option<NodeId>, element: &Element) -> NodeId {
        if let Some(current) = current {
            let existing = &self.arena[current];
            let compatible = match &element.ty {
                ElementType::Fragment => existing.tag == WorkTag::Fragment,
                ty => existing.element_type.as_ref() == Some(ty),
            };
            if compatible {
                return self.use_node(current, element.props.clone());
            }
        }
        self.create_from_element(element)
    }

    /// Reuse `current` if it is a fragment (nested lists become fragments).
    fn update_fragment(&mut self, current: Option<NodeId>, children: &Rc<[Node]>) -> NodeId {
        match current {
            Some(current) if self.arena[current].tag == WorkTag::Fragment => {
                self.use_node(current, Props::from_children(Node::List(children.clone())))
            }
            _ => self.create_fragment(Node::List(children.clone()), None),
        }
    }

    fn create_child(&mut self, new_child: &Node) -> Option<NodeId> {
        match new_child {
            Node::Text(text) if !text.is_empty() => Some(self.create_text(text)),
            Node::Element(element) => Some(self.create_from_element(element)),
            Node::List(children) => Some(self.create_fragment(Node::List(children.clone()), None)),
            _ => None,
        }
    }

    // =========================================================================
    // Placement
    // =========================================================================

    fn place_child(&mut self, new: NodeId, last_placed_index: usize, new_index: usize) -> usize {
        let track = self.track_side_effects;
        let alternate = self.arena[new].alternate;
        let old_index = alternate.map(|current| self.arena[current].index);

        let node = &mut self.arena[new];
        node.index = new_index;
        if !track {
            return last_placed_index;
        }
        match old_index {
            Some(old_index) if old_index >= last_placed_index => old_index,
            // Moved behind something that stays, or brand new
            _ => {
                node.flags |= Flags::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn place_single_child(&mut self, new: NodeId) -> NodeId {
        if self.track_side_effects && self.arena[new].alternate.is_none() {
            self.arena[new].flags |= Flags::PLACEMENT;
        }
        new
    }

    fn link(&mut self, first: &mut Option<NodeId>, previous: &mut Option<NodeId>, new: NodeId) {
        self.arena.set_parent(new, Some(self.parent));
        match *previous {
            Some(previous) => self.arena[previous].sibling = Some(new),
            None => *first = Some(new),
        }
        *previous = Some(new);
    }

    // =========================================================================
    // Single child
    // =========================================================================

    fn reconcile_single_element(&mut self, current_first: Option<NodeId>, element: &Element) -> NodeId {
        let mut child = current_first;
        while let Some(id) = child {
            let next = self.arena[id].sibling;
            if self.arena[id].key == element.key {
                let existing = &self.arena[id];
                let compatible = match &element.ty {
                    ElementType::Fragment => existing.tag == WorkTag::Fragment,
                    ty => existing.element_type.as_ref() == Some(ty),
                };
                if compatible {
                    self.delete_remaining_children(next);
                    let reused = self.use_node(id, element.props.clone());
                    self.arena.set_parent(reused, Some(self.parent));
                    return reused;
                }
                // Same key, different type: nothing else can match.
                self.delete_remaining_children(Some(id));
                break;
            }
            self.delete_child(id);
            child = next;
        }
        self.create_from_element(element)
    }

    fn reconcile_single_text(&mut self, current_first: Option<NodeId>, text: &Rc<str>) -> NodeId {
        if let Some(first) = current_first {
            if self.arena[first].tag == WorkTag::HostText {
                let next = self.arena[first].sibling;
                self.delete_remaining_children(next);
                let reused = self.use_node(first, Props::from_children(Node::Text(text.clone())));
                self.arena.set_parent(reused, Some(self.parent));
                return reused;
            }
        }
        self.delete_remaining_children(current_first);
        self.create_text(text)
    }

    // =========================================================================
    // Lists
    // =========================================================================

    fn child_key(&self, id: NodeId) -> Option<&Key> {
        self.arena[id].key.as_ref()
    }

    /// Update `old` in place if its key matches. `None` ends the lockstep scan.
    fn update_slot(&mut self, old: Option<NodeId>, new_child: &Node) -> Option<NodeId> {
        let old_key = old.and_then(|id| self.child_key(id).cloned());
        match new_child {
            Node::Text(text) if !text.is_empty() => {
                if old_key.is_some() {
                    return None;
                }
                Some(self.update_text_node(old, text))
            }
            Node::Element(element) => {
                if element.key != old_key {
                    return None;
                }
                Some(self.update_element(old, element))
            }
            Node::List(children) => {
                if old_key.is_some() {
                    return None;
                }
                Some(self.update_fragment(old, children))
            }
            _ => None,
        }
    }

    fn map_remaining_children(&self, mut child: Option<NodeId>) -> FxHashMap<SlotKey, NodeId> {
        let mut map = FxHashMap::default();
        while let Some(id) = child {
            let node = &self.arena[id];
            let key = match &node.key {
                Some(key) => SlotKey::Key(key.clone()),
                None => SlotKey::Index(node.index),
            };
            map.insert(key, id);
            child = node.sibling;
        }
        map
    }

    fn slot_key(new_index: usize, new_child: &Node) -> SlotKey {
        match new_child {
            Node::Element(element) => match &element.key {
                Some(key) => SlotKey::Key(key.clone()),
                None => SlotKey::Index(new_index),
            },
            _ => SlotKey::Index(new_index),
        }
    }

    fn update_from_map(
        &mut self,
        map: &FxHashMap<SlotKey, NodeId>,
        new_index: usize,
        new_child: &Node,
    ) -> Option<NodeId> {
        let matched = map.get(&Self::slot_key(new_index, new_child)).copied();
        match new_child {
            Node::Text(text) if !text.is_empty() => Some(self.update_text_node(matched, text)),
            Node::Element(element) => Some(self.update_element(matched, element)),
            Node::List(children) => Some(self.update_fragment(matched, children)),
            _ => None,
        }
    }

    fn reconcile_children_array(&mut self, current_first: Option<NodeId>, new_children: &[Node]) -> Option<NodeId> {
        let mut first = None;
        let mut previous = None;
        let mut old = current_first;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        // Pass 1: walk both lists while keys line up.
        while let Some(old_id) = old {
            if new_index >= new_children.len() {
                break;
            }
            let (slot_old, next_old) = if self.arena[old_id].index > new_index {
                (None, Some(old_id))
            } else {
                (Some(old_id), self.arena[old_id].sibling)
            };

            let Some(new) = self.update_slot(slot_old, &new_children[new_index]) else {
                old = slot_old.or(next_old);
                break;
            };

            if self.track_side_effects {
                if let Some(slot_old) = slot_old {
                    if self.arena[new].alternate.is_none() {
                        // Same slot, but a fresh node: the old one goes.
                        self.delete_child(slot_old);
                    }
                }
            }
            last_placed_index = self.place_child(new, last_placed_index, new_index);
            self.link(&mut first, &mut previous, new);
            old = next_old;
            new_index += 1;
        }

        if new_index == new_children.len() {
            self.delete_remaining_children(old);
            return first;
        }

        // Pass 2: old list exhausted, the rest is new.
        if old.is_none() {
            for (index, new_child) in new_children.iter().enumerate().skip(new_index) {
                let Some(new) = self.create_child(new_child) else {
                    continue;
                };
                last_placed_index = self.place_child(new, last_placed_index, index);
                self.link(&mut first, &mut previous, new);
            }
            return first;
        }

        // Pass 3: match the rest by key (or position) through a map.
        let mut remaining = self.map_remaining_children(old);
        for (index, new_child) in new_children.iter().enumerate().skip(new_index) {
            let Some(new) = self.update_from_map(&remaining, index, new_child) else {
                continue;
            };
            if self.track_side_effects && self.arena[new].alternate.is_some() {
                remaining.remove(&Self::slot_key(index, new_child));
            }
            last_placed_index = self.place_child(new, last_placed_index, index);
            self.link(&mut first, &mut previous, new);
        }

        if self.track_side_effects {
            let mut leftovers: Vec<NodeId> = remaining.into_values().collect();
            leftovers.sort_by_key(|id| self.arena[*id].index);
            for id in leftovers {
                self.delete_child(id);
            }
        }

        first
    }
}
