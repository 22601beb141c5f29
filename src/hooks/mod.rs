//! Hooks - Local state for function components.
//!
//! A function component receives a [`Hooks`] context for the duration of one
//! render and calls state cells on it in a fixed order:
//!
//! ```ignore
//! fn counter(hooks: &mut Hooks, _props: &Props) -> RenderResult {
//!     let (count, set_count) = hooks.use_state(|| 0);
//!     hooks.use_effect(move || { println!("count is {count}"); None }, Some(count));
//!     Ok(h("button").on("click", move || set_count.update(|n| n + 1)).child(count).into())
//! }
//! ```
//!
//! # Dispatch modes
//!
//! | mode       | when                                    | cells read from        |
//! |------------|-----------------------------------------|------------------------|
//! | `Mount`    | the node has never committed            | nothing (initialise)   |
//! | `Update`   | the node has a committed chain          | the committed chain    |
//! | `Rerender` | the body updated itself while rendering | the previous pass      |
//!
//! Cells are matched by position. Calling a different number of cells, or a
//! different kind of cell at a position, is a fatal error reported once the
//! body returns.

mod effect;
mod state;

pub use effect::*;
pub use state::*;

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::engine::{Flags, NodeId};
use crate::error::ReconcileError;
use crate::lanes::Lanes;
use crate::primitives::Cleanup;
use crate::root::Shared;

/// Mutable box returned by [`Hooks::use_ref`].
pub type Ref<T> = Rc<RefCell<T>>;

/// Which chain a render reads its cells from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatcher {
    Mount,
    Update,
    Rerender,
}

/// One state cell in a function component's chain.
#[derive(Clone)]
pub enum Hook {
    State(StateHook),
    Effect(Effect),
    Ref(Rc<dyn Any>),
    Memo {
        value: Rc<dyn Any>,
        deps: Option<Rc<dyn Any>>,
    },
}

impl Hook {
    pub fn kind(&self) -> &'static str {
        match self {
            Hook::State(_) => "state",
            Hook::Effect(_) => "effect",
            Hook::Ref(_) => "ref",
            Hook::Memo { .. } => "memo",
        }
    }
}

/// What one render of a function component produced.
pub(crate) struct HookOutput {
    pub hooks: Vec<Hook>,
    pub effects: Vec<Effect>,
    pub flags: Flags,
    pub skipped_lanes: Lanes,
    pub did_receive_update: bool,
}

/// Render context handed to function components.
pub struct Hooks {
    mode: Dispatcher,
    node: NodeId,
    shared: Weak<Shared>,
    render_lanes: Lanes,
    current: Vec<Hook>,
    previous_pass: Vec<Hook>,
    hooks: Vec<Hook>,
    effects: Vec<Effect>,
    flags: Flags,
    skipped_lanes: Lanes,
    did_receive_update: bool,
    error: Option<ReconcileError>,
}

impl Hooks {
    pub(crate) fn new(
        node: NodeId,
        shared: Weak<Shared>,
        render_lanes: Lanes,
        current: Option<Vec<Hook>>,
    ) -> Self {
        let mode = if current.is_some() {
            Dispatcher::Update
        } else {
            Dispatcher::Mount
        };
        Self {
            mode,
            node,
            shared,
            render_lanes,
            current: current.unwrap_or_default(),
            previous_pass: Vec::new(),
            hooks: Vec::new(),
            effects: Vec::new(),
            flags: Flags::empty(),
            skipped_lanes: Lanes::empty(),
            did_receive_update: false,
            error: None,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.mode
    }

    /// Lanes of the render in progress.
    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    /// Start another pass of the same render after a render-phase update.
    pub(crate) fn begin_rerender(&mut self) {
        self.previous_pass = std::mem::take(&mut self.hooks);
        self.effects.clear();
        self.flags = Flags::empty();
        self.mode = Dispatcher::Rerender;
    }

    /// Check the chain shape and hand back what the render produced.
    pub(crate) fn finish(&mut self) -> Result<HookOutput, ReconcileError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let expected = match self.mode {
            Dispatcher::Mount => None,
            Dispatcher::Update => Some(self.current.len()),
            Dispatcher::Rerender => Some(self.previous_pass.len()),
        };
        if let Some(previous) = expected {
            if previous != self.hooks.len() {
                return Err(ReconcileError::StateCellCountMismatch {
                    previous,
                    rendered: self.hooks.len(),
                });
            }
        }
        Ok(HookOutput {
            hooks: std::mem::take(&mut self.hooks),
            effects: std::mem::take(&mut self.effects),
            flags: self.flags,
            skipped_lanes: self.skipped_lanes,
            did_receive_update: self.did_receive_update,
        })
    }

    fn fail(&mut self, err: ReconcileError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// The cell this call lines up with, or `None` to initialise a new one.
    fn reference(&mut self, kind: &'static str) -> Option<Hook> {
        let index = self.hooks.len();
        let chain = match self.mode {
            Dispatcher::Mount => return None,
            Dispatcher::Update => &self.current,
            Dispatcher::Rerender => &self.previous_pass,
        };
        match chain.get(index) {
            Some(hook) if hook.kind() == kind => Some(hook.clone()),
            Some(hook) => {
                let previous = hook.kind();
                self.fail(ReconcileError::StateCellKindChanged {
                    index,
                    previous,
                    rendered: kind,
                });
                None
            }
            None => {
                let previous = chain.len();
                self.fail(ReconcileError::StateCellCountMismatch {
                    previous,
                    rendered: index + 1,
                });
                None
            }
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// A state cell. `init` runs on mount only.
    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> (T, SetState<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        let (value, queue) = self.state_cell(init, None, basic_state_reducer::<T>);
        let dispatch = Dispatch::new(self.shared.clone(), self.node, queue);
        (value, SetState::new(dispatch))
    }

    /// A state cell driven by `reducer`. The reducer may change between
    /// renders; the latest one is used.
    pub fn use_reducer<S, A>(
        &mut self,
        reducer: impl Fn(&S, &A) -> S + 'static,
        initial: S,
    ) -> (S, Dispatch<A>)
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
    {
        let reducer = erase_reducer(reducer);
        let (value, queue) = self.state_cell(|| initial, Some(reducer), identity_reducer);
        (value, Dispatch::new(self.shared.clone(), self.node, queue))
    }

    fn state_cell<S>(
        &mut self,
        init: impl FnOnce() -> S,
        reducer: Option<Reducer>,
        mount_reducer: impl FnOnce() -> Reducer,
    ) -> (S, SharedQueue)
    where
        S: Clone + PartialEq + 'static,
    {
        let Some(Hook::State(prev)) = self.reference("state") else {
            return self.mount_state(init, reducer.unwrap_or_else(mount_reducer));
        };

        let queue = prev.queue.clone();
        let stored = queue.borrow().last_rendered_reducer.clone();
        let reducer = match reducer.or(stored) {
            Some(reducer) => reducer,
            None => mount_reducer(),
        };
        let hook = match self.mode {
            Dispatcher::Rerender => self.rerender_state(prev, &reducer),
            _ => self.update_state(prev, &reducer),
        };

        match hook.memoized.downcast_ref::<S>() {
            Some(value) => {
                let value = value.clone();
                self.hooks.push(Hook::State(hook));
                (value, queue)
            }
            None => {
                self.fail(ReconcileError::StateCellKindChanged {
                    index: self.hooks.len(),
                    previous: "state",
                    rendered: "state of another type",
                });
                self.mount_state(init, reducer)
            }
        }
    }

    fn mount_state<S>(&mut self, init: impl FnOnce() -> S, reducer: Reducer) -> (S, SharedQueue)
    where
        S: Clone + PartialEq + 'static,
    {
        let value = init();
        let memoized: Value = Rc::new(value.clone());
        let queue = Rc::new(RefCell::new(HookQueue {
            pending: Vec::new(),
            last_rendered_reducer: Some(reducer),
            last_rendered_state: Some(memoized.clone()),
            eq: values_equal::<S>,
        }));
        self.hooks.push(Hook::State(StateHook {
            memoized: memoized.clone(),
            base_state: memoized,
            base_queue: Vec::new(),
            queue: queue.clone(),
        }));
        (value, queue)
    }

    /// Fold the base queue for this render's lanes.
    ///
    /// Pending updates were already moved onto the base queue before the
    /// body ran, so both buffers agree on what is outstanding.
    fn update_state(&mut self, mut hook: StateHook, reducer: &Reducer) -> StateHook {
        let mut state = hook.base_state.clone();
        let mut new_base_state = None;
        let mut new_base_queue: Vec<HookUpdate> = Vec::new();

        for update in std::mem::take(&mut hook.base_queue) {
            if !self.render_lanes.is_subset(update.lane) {
                if new_base_queue.is_empty() {
                    new_base_state = Some(state.clone());
                }
                self.skipped_lanes |= update.lane;
                new_base_queue.push(update);
                continue;
            }

            if !new_base_queue.is_empty() {
                new_base_queue.push(HookUpdate {
                    lane: Lanes::empty(),
                    ..update.clone()
                });
            }

            state = match &update.eager {
                Some(eager) if Rc::ptr_eq(&eager.reducer, reducer) => eager.state.clone(),
                _ => reducer(&state, &update.action),
            };
        }

        let eq = hook.queue.borrow().eq;
        if !eq(&state, &hook.memoized) {
            self.did_receive_update = true;
        }

        hook.base_state = new_base_state.unwrap_or_else(|| state.clone());
        hook.base_queue = new_base_queue;
        hook.memoized = state.clone();

        let mut queue = hook.queue.borrow_mut();
        queue.last_rendered_reducer = Some(reducer.clone());
        queue.last_rendered_state = Some(state);
        drop(queue);
        hook
    }

    /// Apply render-phase updates on top of the previous pass.
    fn rerender_state(&mut self, mut hook: StateHook, reducer: &Reducer) -> StateHook {
        let pending: Vec<_> = hook.queue.borrow_mut().pending.drain(..).collect();
        if pending.is_empty() {
            return hook;
        }

        let mut state = hook.memoized.clone();
        for update in &pending {
            state = reducer(&state, &update.action);
        }

        let eq = hook.queue.borrow().eq;
        if !eq(&state, &hook.memoized) {
            self.did_receive_update = true;
        }
        if hook.base_queue.is_empty() {
            hook.base_state = state.clone();
        }
        hook.memoized = state.clone();
        hook.queue.borrow_mut().last_rendered_state = Some(state);
        hook
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// A passive effect, run after the commit is painted. `deps: None` runs it
    /// after every commit.
    pub fn use_effect<D>(&mut self, create: impl Fn() -> Option<Cleanup> + 'static, deps: Option<D>)
    where
        D: PartialEq + 'static,
    {
        self.effect_cell(Flags::PASSIVE, HookFlags::PASSIVE, Rc::new(create), deps);
    }

    /// A layout effect, run synchronously during commit after host mutations.
    pub fn use_layout_effect<D>(
        &mut self,
        create: impl Fn() -> Option<Cleanup> + 'static,
        deps: Option<D>,
    ) where
        D: PartialEq + 'static,
    {
        self.effect_cell(Flags::UPDATE, HookFlags::LAYOUT, Rc::new(create), deps);
    }

    fn effect_cell<D>(&mut self, node_flags: Flags, phase: HookFlags, create: EffectCreate, deps: Option<D>)
    where
        D: PartialEq + 'static,
    {
        // Validates position and kind; the deps themselves are always compared
        // against the committed chain so a re-run pass cannot hide a change.
        let _ = self.reference("effect");
        let committed = match self.current.get(self.hooks.len()) {
            Some(Hook::Effect(effect)) => Some(effect.clone()),
            _ => None,
        };

        let effect = match committed {
            Some(prev) if deps_equal(deps.as_ref(), prev.deps.as_ref()) => Effect {
                tag: phase,
                create,
                inst: prev.inst,
                deps: prev.deps,
            },
            Some(prev) => {
                self.flags |= node_flags;
                Effect {
                    tag: phase | HookFlags::HAS_EFFECT,
                    create,
                    inst: prev.inst,
                    deps: deps.map(|d| Rc::new(d) as Rc<dyn Any>),
                }
            }
            None => {
                self.flags |= node_flags;
                Effect {
                    tag: phase | HookFlags::HAS_EFFECT,
                    create,
                    inst: Rc::default(),
                    deps: deps.map(|d| Rc::new(d) as Rc<dyn Any>),
                }
            }
        };

        self.effects.push(effect.clone());
        self.hooks.push(Hook::Effect(effect));
    }

    // =========================================================================
    // Refs and memoization
    // =========================================================================

    /// A mutable box that lives as long as the component.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Ref<T> {
        if let Some(Hook::Ref(existing)) = self.reference("ref") {
            match existing.clone().downcast::<RefCell<T>>() {
                Ok(cell) => {
                    self.hooks.push(Hook::Ref(existing));
                    return cell;
                }
                Err(_) => self.fail(ReconcileError::StateCellKindChanged {
                    index: self.hooks.len(),
                    previous: "ref",
                    rendered: "ref of another type",
                }),
            }
        }
        let cell = Rc::new(RefCell::new(init()));
        self.hooks.push(Hook::Ref(cell.clone()));
        cell
    }

    /// Recompute `compute` only when `deps` changed.
    pub fn use_memo<T, D>(&mut self, compute: impl FnOnce() -> T, deps: D) -> T
    where
        T: Clone + 'static,
        D: PartialEq + 'static,
    {
        if let Some(Hook::Memo { value, deps: prev }) = self.reference("memo") {
            if deps_equal(Some(&deps), prev.as_ref()) {
                if let Some(cached) = value.downcast_ref::<T>() {
                    let cached = cached.clone();
                    self.hooks.push(Hook::Memo { value, deps: prev });
                    return cached;
                }
            }
        }
        let value = compute();
        self.hooks.push(Hook::Memo {
            value: Rc::new(value.clone()),
            deps: Some(Rc::new(deps)),
        });
        value
    }

    /// A callback whose identity only changes with `deps`.
    pub fn use_callback<F, D>(&mut self, callback: F, deps: D) -> Rc<F>
    where
        F: 'static,
        D: PartialEq + 'static,
    {
        self.use_memo(|| Rc::new(callback), deps)
    }
}

/// Never used: `use_reducer` always passes its own reducer.
fn identity_reducer() -> Reducer {
    Rc::new(|state: &Value, _: &Action| state.clone())
}
