//! Class components - Stateful components with lifecycle methods.
//!
//! A class component is a type implementing [`Component`]. One instance is
//! created per mounted position and lives until that position is deleted.
//! Its state goes through the same [`UpdateQueue`](crate::engine::UpdateQueue)
//! as root updates, so set-state calls are batched, prioritised and rebased
//! exactly like function component state.
//!
//! ```ignore
//! struct Clock;
//!
//! impl Component for Clock {
//!     type State = u64;
//!
//!     fn create(_: &Props) -> Self { Clock }
//!     fn initial_state(&self, _: &Props) -> u64 { 0 }
//!     fn render(&self, _: &Props, ticks: &u64, _: &Updater<u64>) -> RenderResult {
//!         Ok((*ticks).into())
//!     }
//! }
//! ```
//!
//! # Lifecycle order
//!
//! - render phase: `create` + `initial_state` (mount), `should_update`, `render`
//! - before mutation: `snapshot_before_update`
//! - mutation: `will_unmount` for deleted instances
//! - layout: `did_mount` / `did_update`

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::engine::{ClassState, NodeId, Payload, UpdateSender};
use crate::primitives::{Props, RenderResult};
use crate::root::{Shared, dispatch_class_update};

/// Value captured before mutation and handed to `did_update`.
pub type Snapshot = Rc<dyn Any>;

/// A stateful component.
pub trait Component: 'static {
    type State: Clone + PartialEq + 'static;

    fn create(props: &Props) -> Self
    where
        Self: Sized;

    fn initial_state(&self, props: &Props) -> Self::State;

    fn render(&self, props: &Props, state: &Self::State, updater: &Updater<Self::State>) -> RenderResult;

    /// Return false to skip rendering for this update.
    fn should_update(
        &self,
        _old_props: &Props,
        _new_props: &Props,
        _old_state: &Self::State,
        _new_state: &Self::State,
    ) -> bool {
        true
    }

    fn did_mount(&mut self, _props: &Props, _state: &Self::State, _updater: &Updater<Self::State>) {}

    fn snapshot_before_update(&mut self, _prev_props: &Props, _prev_state: &Self::State) -> Option<Snapshot> {
        None
    }

    fn did_update(
        &mut self,
        _prev_props: &Props,
        _prev_state: &Self::State,
        _snapshot: Option<Snapshot>,
        _updater: &Updater<Self::State>,
    ) {
    }

    fn will_unmount(&mut self) {}
}

// =============================================================================
// Updater
// =============================================================================

/// Untyped half of an [`Updater`]: where updates go.
#[derive(Clone)]
pub(crate) struct UpdateTarget {
    shared: Weak<Shared>,
    node: NodeId,
    sender: UpdateSender<ClassState>,
}

impl UpdateTarget {
    pub(crate) fn new(shared: Weak<Shared>, node: NodeId, sender: UpdateSender<ClassState>) -> Self {
        Self { shared, node, sender }
    }

    fn send(&self, payload: Payload<ClassState>) {
        if let Some(shared) = self.shared.upgrade() {
            dispatch_class_update(&shared, self.node, &self.sender, payload);
        }
    }
}

/// Schedules state changes on one class instance.
pub struct Updater<S> {
    target: UpdateTarget,
    _state: PhantomData<fn(S)>,
}

impl<S: Clone + 'static> Updater<S> {
    pub(crate) fn new(target: UpdateTarget) -> Self {
        Self {
            target,
            _state: PhantomData,
        }
    }

    /// Derive the next state from the latest state and props.
    pub fn set_state(&self, f: impl Fn(&S, &Props) -> S + 'static) {
        self.target.send(Payload::Updater(Rc::new(move |state: &ClassState, props: &Props| {
            match state.downcast_ref::<S>() {
                Some(state) => Rc::new(f(state, props)) as ClassState,
                None => state.clone(),
            }
        })));
    }

    pub fn replace_state(&self, state: S) {
        self.target.send(Payload::Replace(Rc::new(state)));
    }

    /// Render even if props and state are unchanged.
    pub fn force_update(&self) {
        self.target.send(Payload::Force);
    }
}

impl<S> Clone for Updater<S> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            _state: PhantomData,
        }
    }
}

// =============================================================================
// Type erasure
// =============================================================================

/// Object-safe face of [`Component`] over [`ClassState`].
trait ErasedComponent {
    fn initial_state(&self, props: &Props) -> ClassState;
    fn render(&self, props: &Props, state: &ClassState, target: &UpdateTarget) -> RenderResult;
    fn state_eq(&self, a: &ClassState, b: &ClassState) -> bool;
    fn should_update(&self, old_props: &Props, new_props: &Props, old: &ClassState, new: &ClassState) -> bool;
    fn did_mount(&mut self, props: &Props, state: &ClassState, target: &UpdateTarget);
    fn snapshot_before_update(&mut self, prev_props: &Props, prev_state: &ClassState) -> Option<Snapshot>;
    fn did_update(
        &mut self,
        prev_props: &Props,
        prev_state: &ClassState,
        snapshot: Option<Snapshot>,
        target: &UpdateTarget,
    );
    fn will_unmount(&mut self);
}

impl<C: Component> ErasedComponent for C {
    fn initial_state(&self, props: &Props) -> ClassState {
        Rc::new(Component::initial_state(self, props))
    }

    fn render(&self, props: &Props, state: &ClassState, target: &UpdateTarget) -> RenderResult {
        match state.downcast_ref::<C::State>() {
            Some(state) => Component::render(self, props, state, &Updater::new(target.clone())),
            None => Ok(crate::primitives::Node::Empty),
        }
    }

    fn state_eq(&self, a: &ClassState, b: &ClassState) -> bool {
        a.downcast_ref::<C::State>() == b.downcast_ref::<C::State>()
    }

    fn should_update(&self, old_props: &Props, new_props: &Props, old: &ClassState, new: &ClassState) -> bool {
        match (old.downcast_ref::<C::State>(), new.downcast_ref::<C::State>()) {
            (Some(old), Some(new)) => Component::should_update(self, old_props, new_props, old, new),
            _ => true,
        }
    }

    fn did_mount(&mut self, props: &Props, state: &ClassState, target: &UpdateTarget) {
        if let Some(state) = state.downcast_ref::<C::State>() {
            Component::did_mount(self, props, state, &Updater::new(target.clone()));
        }
    }

    fn snapshot_before_update(&mut self, prev_props: &Props, prev_state: &ClassState) -> Option<Snapshot> {
        let prev_state = prev_state.downcast_ref::<C::State>()?;
        Component::snapshot_before_update(self, prev_props, prev_state)
    }

    fn did_update(
        &mut self,
        prev_props: &Props,
        prev_state: &ClassState,
        snapshot: Option<Snapshot>,
        target: &UpdateTarget,
    ) {
        if let Some(prev_state) = prev_state.downcast_ref::<C::State>() {
            Component::did_update(self, prev_props, prev_state, snapshot, &Updater::new(target.clone()));
        }
    }

    fn will_unmount(&mut self) {
        Component::will_unmount(self);
    }
}

/// A mounted class component.
pub struct ClassInstance {
    component: Box<dyn ErasedComponent>,
    target: Option<UpdateTarget>,
    snapshot: Option<Snapshot>,
}

impl ClassInstance {
    pub(crate) fn attach(&mut self, target: UpdateTarget) {
        self.target = Some(target);
    }

    pub(crate) fn initial_state(&self, props: &Props) -> ClassState {
        self.component.initial_state(props)
    }

    pub(crate) fn render(&self, props: &Props, state: &ClassState) -> RenderResult {
        match &self.target {
            Some(target) => self.component.render(props, state, target),
            None => Ok(crate::primitives::Node::Empty),
        }
    }

    pub(crate) fn state_eq(&self, a: &ClassState, b: &ClassState) -> bool {
        self.component.state_eq(a, b)
    }

    pub(crate) fn should_update(
        &self,
        old_props: &Props,
        new_props: &Props,
        old: &ClassState,
        new: &ClassState,
    ) -> bool {
        self.component.should_update(old_props, new_props, old, new)
    }

    pub(crate) fn did_mount(&mut self, props: &Props, state: &ClassState) {
        if let Some(target) = &self.target {
            self.component.did_mount(props, state, target);
        }
    }

    pub(crate) fn capture_snapshot(&mut self, prev_props: &Props, prev_state: &ClassState) {
        self.snapshot = self.component.snapshot_before_update(prev_props, prev_state);
    }

    pub(crate) fn did_update(&mut self, prev_props: &Props, prev_state: &ClassState) {
        let snapshot = self.snapshot.take();
        if let Some(target) = &self.target {
            self.component.did_update(prev_props, prev_state, snapshot, target);
        }
    }

    pub(crate) fn will_unmount(&mut self) {
        self.component.will_unmount();
    }
}

impl fmt::Debug for ClassInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInstance")
            .field("has_snapshot", &self.snapshot.is_some())
            .finish()
    }
}

// =============================================================================
// ClassType
// =============================================================================

/// Element type of a class component. Identity is the Rust type.
#[derive(Clone, Copy)]
pub struct ClassType {
    id: TypeId,
    name: &'static str,
    construct: fn(&Props) -> Box<dyn ErasedComponent>,
}

fn construct<C: Component>(props: &Props) -> Box<dyn ErasedComponent> {
    Box::new(C::create(props))
}

impl ClassType {
    pub fn of<C: Component>() -> Self {
        let full = std::any::type_name::<C>();
        Self {
            id: TypeId::of::<C>(),
            name: full.rsplit("::").next().unwrap_or(full),
            construct: construct::<C>,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn instantiate(&self, props: &Props) -> ClassInstance {
        ClassInstance {
            component: (self.construct)(props),
            target: None,
            snapshot: None,
        }
    }
}

impl fmt::Debug for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
