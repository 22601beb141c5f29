//! State cells - queues, reducers, and the dispatch handles components keep.
//!
//! Every `use_state` / `use_reducer` call owns one [`HookQueue`], shared by
//! both buffers of the node and by every [`Dispatch`] handle it handed out.
//! Dispatching never touches the node directly: it pushes onto the queue and
//! lets the root decide whether to schedule, defer, or re-run the render.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::engine::NodeId;
use crate::lanes::Lanes;
use crate::root::{Shared, dispatch_state_update};

/// Type-erased state value.
pub type Value = Rc<dyn Any>;

/// Type-erased action.
pub type Action = Rc<dyn Any>;

/// Type-erased reducer. Identity (`Rc::ptr_eq`) decides whether an eager
/// result can be reused.
pub type Reducer = Rc<dyn Fn(&Value, &Action) -> Value>;

/// Result computed at dispatch time, valid only for the same reducer.
#[derive(Clone)]
pub struct EagerState {
    pub state: Value,
    pub reducer: Reducer,
}

/// One queued state-cell update.
#[derive(Clone)]
pub struct HookUpdate {
    pub lane: Lanes,
    pub action: Action,
    pub eager: Option<EagerState>,
}

/// Queue shared by both buffers of one state cell.
pub struct HookQueue {
    pub pending: Vec<HookUpdate>,
    pub last_rendered_reducer: Option<Reducer>,
    pub last_rendered_state: Option<Value>,
    /// Equality of two states of this cell's concrete type.
    pub eq: fn(&Value, &Value) -> bool,
}

pub type SharedQueue = Rc<RefCell<HookQueue>>;

/// Per-render record of one state cell.
#[derive(Clone)]
pub struct StateHook {
    pub memoized: Value,
    pub base_state: Value,
    pub base_queue: Vec<HookUpdate>,
    pub queue: SharedQueue,
}

impl StateHook {
    /// Move updates that arrived since the last render onto the base queue.
    pub fn absorb_pending(&mut self) {
        let pending: Vec<_> = self.queue.borrow_mut().pending.drain(..).collect();
        self.base_queue.extend(pending);
    }

    /// Forget every update in `lanes`, absorbed or still pending, and make
    /// this cell's committed value the last rendered one again.
    pub fn drop_lanes(&mut self, lanes: Lanes) {
        self.base_queue.retain(|update| !update.lane.includes_some(lanes));
        let mut queue = self.queue.borrow_mut();
        queue.pending.retain(|update| !update.lane.includes_some(lanes));
        queue.last_rendered_state = Some(self.memoized.clone());
    }
}

/// Equality used by state cells of type `T`.
pub fn values_equal<T: PartialEq + 'static>(a: &Value, b: &Value) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => Rc::ptr_eq(a, b),
    }
}

// =============================================================================
// use_state plumbing
// =============================================================================

/// Action accepted by [`SetState`].
pub enum SetStateAction<T> {
    Value(T),
    Updater(Rc<dyn Fn(&T) -> T>),
}

/// The reducer behind `use_state`: replace, or apply the updater.
pub fn basic_state_reducer<T: Clone + 'static>() -> Reducer {
    Rc::new(|state: &Value, action: &Action| -> Value {
        match action.downcast_ref::<SetStateAction<T>>() {
            Some(SetStateAction::Value(next)) => Rc::new(next.clone()),
            Some(SetStateAction::Updater(f)) => match state.downcast_ref::<T>() {
                Some(prev) => Rc::new(f(prev)),
                None => state.clone(),
            },
            None => state.clone(),
        }
    })
}

/// Wrap a typed reducer.
pub fn erase_reducer<S, A>(reducer: impl Fn(&S, &A) -> S + 'static) -> Reducer
where
    S: 'static,
    A: 'static,
{
    Rc::new(move |state: &Value, action: &Action| -> Value {
        match (state.downcast_ref::<S>(), action.downcast_ref::<A>()) {
            (Some(state), Some(action)) => Rc::new(reducer(state, action)),
            _ => state.clone(),
        }
    })
}

// =============================================================================
// Handles
// =============================================================================

/// Sends actions to one `use_reducer` cell.
///
/// Holding a handle does not keep the tree alive; dispatching after the
/// root or the component is gone does nothing.
pub struct Dispatch<A> {
    shared: Weak<Shared>,
    node: NodeId,
    queue: SharedQueue,
    _action: PhantomData<fn(A)>,
}

impl<A: 'static> Dispatch<A> {
    pub(crate) fn new(shared: Weak<Shared>, node: NodeId, queue: SharedQueue) -> Self {
        Self {
            shared,
            node,
            queue,
            _action: PhantomData,
        }
    }

    pub fn dispatch(&self, action: A) {
        if let Some(shared) = self.shared.upgrade() {
            dispatch_state_update(&shared, self.node, &self.queue, Rc::new(action));
        }
    }
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            node: self.node,
            queue: self.queue.clone(),
            _action: PhantomData,
        }
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch").field("node", &self.node).finish()
    }
}

/// Setter returned by `use_state`.
pub struct SetState<T> {
    inner: Dispatch<SetStateAction<T>>,
}

impl<T: 'static> SetState<T> {
    pub(crate) fn new(inner: Dispatch<SetStateAction<T>>) -> Self {
        Self { inner }
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.inner.dispatch(SetStateAction::Value(value));
    }

    /// Derive the value from the latest one.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        self.inner.dispatch(SetStateAction::Updater(Rc::new(f)));
    }
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState").field("node", &self.inner.node).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_state_reducer() {
        let reducer = basic_state_reducer::<i32>();
        let state: Value = Rc::new(4);

        let set: Action = Rc::new(SetStateAction::Value(9));
        let next = reducer(&state, &set);
        assert_eq!(next.downcast_ref::<i32>(), Some(&9));

        let double: Action = Rc::new(SetStateAction::<i32>::Updater(Rc::new(|n: &i32| n * 2)));
        let next = reducer(&state, &double);
        assert_eq!(next.downcast_ref::<i32>(), Some(&8));
    }

    #[test]
    fn test_erased_reducer_ignores_foreign_actions() {
        let reducer = erase_reducer(|state: &i32, delta: &i32| state + delta);
        let state: Value = Rc::new(1);
        let foreign: Action = Rc::new("nope");
        let next = reducer(&state, &foreign);
        assert!(Rc::ptr_eq(&next, &state));
    }

    #[test]
    fn test_values_equal() {
        let a: Value = Rc::new(String::from("x"));
        let b: Value = Rc::new(String::from("x"));
        let c: Value = Rc::new(String::from("y"));
        assert!(values_equal::<String>(&a, &b));
        assert!(!values_equal::<String>(&a, &c));
    }

    #[test]
    fn test_drop_lanes_restores_committed_value() {
        let committed: Value = Rc::new(1);
        let queue = Rc::new(RefCell::new(HookQueue {
            pending: Vec::new(),
            last_rendered_reducer: None,
            last_rendered_state: Some(Rc::new(7)),
            eq: values_equal::<i32>,
        }));
        let update = |lane| HookUpdate {
            lane,
            action: Rc::new(SetStateAction::Value(7)),
            eager: None,
        };
        queue.borrow_mut().pending.push(update(Lanes::SYNC));
        let mut hook = StateHook {
            memoized: committed.clone(),
            base_state: committed,
            base_queue: vec![update(Lanes::DEFAULT), update(Lanes::SYNC), update(Lanes::empty())],
            queue: queue.clone(),
        };

        hook.drop_lanes(Lanes::SYNC);

        let lanes: Vec<_> = hook.base_queue.iter().map(|u| u.lane).collect();
        assert_eq!(lanes, vec![Lanes::DEFAULT, Lanes::empty()]);
        assert!(queue.borrow().pending.is_empty());
        let last = queue.borrow().last_rendered_state.clone().unwrap();
        assert_eq!(last.downcast_ref::<i32>(), Some(&1));
    }

    #[test]
    fn test_dispatch_without_root_is_noop() {
        let queue = Rc::new(RefCell::new(HookQueue {
            pending: Vec::new(),
            last_rendered_reducer: None,
            last_rendered_state: None,
            eq: values_equal::<i32>,
        }));
        let node = NodeId {
            index: 0,
            generation: 0,
        };
        let setter = SetState::<i32>::new(Dispatch::new(Weak::new(), node, queue.clone()));
        setter.set(3);
        assert!(queue.borrow().pending.is_empty());
    }
}
