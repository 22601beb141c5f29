//! Root - Public entry point and root scheduling.
//!
//! A [`Root`] owns one container's engine. Everything that changes the tree
//! goes through here:
//!
//! - `Root::render` and state-cell / class updates pick a lane, enqueue,
//!   mark the path to the root, and make sure a root task is scheduled
//! - the scheduled task (or `flush_sync_work`) renders the most urgent
//!   lanes and commits the result
//! - passive effects run in their own task after the commit
//!
//! # Architecture
//!
//! ```text
//!          Root ──────────────┐
//!            │                │
//!          Rc<Shared>         │  Weak<Shared> held by handles
//!            │                │  (SetState, Dispatch, Updater)
//!   ┌────────┼──────────┐     │
//!   │        │          │     │
//! RefCell  deferred   render  │
//! <Engine>  updates   state ◄─┘
//! ```
//!
//! The engine lives in a `RefCell`. A dispatch that finds it borrowed came
//! from inside a render or a commit: updates to the component currently
//! rendering re-run its body in place, everything else is deferred and
//! flushed once the engine is released.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::commit::PassiveEffects;
use crate::config::ReconcilerConfig;
use crate::engine::{ClassState, Engine, NodeId, NodeQueue, Payload, QueuedUpdate, ScheduledCallback, UpdateSender};
use crate::error::{ReconcileError, ReconcileResult};
use crate::hooks::{Action, EagerState, HookUpdate, SharedQueue};
use crate::host::{HostConfig, HostHandle};
use crate::lanes::Lanes;
use crate::primitives::Node;
use crate::scheduler::{PriorityLevel, Scheduler};

/// The function component whose body is running.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderingNode {
    pub wip: NodeId,
    pub current: Option<NodeId>,
    pub lanes: Lanes,
}

type Deferred = Box<dyn FnOnce(&Rc<Shared>)>;

/// State shared by a root and every handle its components hold.
pub(crate) struct Shared {
    engine: RefCell<Engine>,
    host: Rc<dyn HostConfig>,
    scheduler: Rc<dyn Scheduler>,
    default_lane: Lanes,

    rendering: Cell<Option<RenderingNode>>,
    render_phase_update: Cell<bool>,
    committing: Cell<bool>,
    deferred: RefCell<Vec<Deferred>>,
    update_priority: Cell<Option<Lanes>>,
}

impl Shared {
    pub(crate) fn enter_render(&self, node: RenderingNode) {
        self.rendering.set(Some(node));
        self.render_phase_update.set(false);
    }

    pub(crate) fn exit_render(&self) {
        self.rendering.set(None);
        self.render_phase_update.set(false);
    }

    /// True once per render-phase update to the rendering component.
    pub(crate) fn take_render_phase_update(&self) -> bool {
        self.render_phase_update.replace(false)
    }

    /// Lane for an update dispatched right now.
    ///
    /// Commit-phase updates are synchronous; render-phase updates join the
    /// render in progress; then an explicit priority, the host's current
    /// event, and finally the configured default.
    fn request_update_lane(&self) -> Lanes {
        if self.committing.get() {
            return Lanes::SYNC;
        }
        if let Some(rendering) = self.rendering.get() {
            return rendering.lanes.highest_priority();
        }
        if let Some(lane) = self.update_priority.get() {
            return lane;
        }
        self.host.current_event_priority().unwrap_or(self.default_lane)
    }

    fn defer(&self, update: Deferred) {
        self.deferred.borrow_mut().push(update);
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Route one state-cell action.
pub(crate) fn dispatch_state_update(shared: &Rc<Shared>, node: NodeId, queue: &SharedQueue, action: Action) {
    if let Some(rendering) = shared.rendering.get() {
        if rendering.wip == node || rendering.current == Some(node) {
            tracing::warn!(?node, "state update during render, re-running component");
            queue.borrow_mut().pending.push(HookUpdate {
                lane: rendering.lanes.highest_priority(),
                action,
                eager: None,
            });
            shared.render_phase_update.set(true);
            return;
        }
    }

    let lane = shared.request_update_lane();
    match shared.engine.try_borrow_mut() {
        Ok(mut engine) => enqueue_state_update(shared, &mut engine, node, queue, action, lane),
        Err(_) => {
            tracing::trace!(?node, ?lane, "engine busy, deferring update");
            let queue = queue.clone();
            shared.defer(Box::new(move |shared| {
                if let Ok(mut engine) = shared.engine.try_borrow_mut() {
                    enqueue_state_update(shared, &mut engine, node, &queue, action, lane);
                }
            }));
        }
    }
}

fn enqueue_state_update(
    shared: &Rc<Shared>,
    engine: &mut Engine,
    node: NodeId,
    queue: &SharedQueue,
    action: Action,
    lane: Lanes,
) {
    if !engine.arena.contains(node) {
        tracing::trace!(?node, "update on unmounted node ignored");
        return;
    }

    let mut eager = None;
    if !engine.has_pending_lanes(node) {
        let (reducer, last) = {
            let q = queue.borrow();
            (q.last_rendered_reducer.clone(), q.last_rendered_state.clone())
        };
        if let (Some(reducer), Some(last)) = (reducer, last) {
            let state = reducer(&last, &action);
            let eq = queue.borrow().eq;
            if eq(&state, &last) {
                // Queued for the next render, which will get the same result.
                tracing::trace!(?node, "eager bail-out");
                queue.borrow_mut().pending.push(HookUpdate {
                    lane,
                    action,
                    eager: Some(EagerState { state, reducer }),
                });
                return;
            }
            eager = Some(EagerState { state, reducer });
        }
    }

    queue.borrow_mut().pending.push(HookUpdate { lane, action, eager });
    if engine.mark_update_lane_from_node_to_root(node, lane) {
        ensure_root_is_scheduled(shared, engine);
    }
}

/// Route one class update. Always deferred while the engine is busy.
pub(crate) fn dispatch_class_update(
    shared: &Rc<Shared>,
    node: NodeId,
    sender: &UpdateSender<ClassState>,
    payload: Payload<ClassState>,
) {
    let lane = shared.request_update_lane();
    let sender = sender.clone();
    let apply = move |shared: &Rc<Shared>| {
        let Ok(mut engine) = shared.engine.try_borrow_mut() else {
            return;
        };
        if !engine.arena.contains(node) {
            return;
        }
        sender.send(QueuedUpdate { lane, payload });
        if engine.mark_update_lane_from_node_to_root(node, lane) {
            ensure_root_is_scheduled(shared, &mut engine);
        }
    };

    if shared.engine.try_borrow_mut().is_ok() {
        apply(shared);
    } else {
        tracing::trace!(?node, ?lane, "engine busy, deferring class update");
        shared.defer(Box::new(apply));
    }
}

fn flush_deferred(shared: &Rc<Shared>) {
    loop {
        let batch = std::mem::take(&mut *shared.deferred.borrow_mut());
        if batch.is_empty() {
            return;
        }
        for update in batch {
            update(shared);
        }
    }
}

// =============================================================================
// Root scheduling
// =============================================================================

/// Keep exactly one root task, at the priority of the most urgent lanes.
fn ensure_root_is_scheduled(shared: &Rc<Shared>, engine: &mut Engine) {
    let next = engine.root_lanes.next_lanes();
    if next.is_empty() {
        if let Some(existing) = engine.callback.take() {
            shared.scheduler.cancel_callback(existing.handle);
        }
        return;
    }

    let priority = next.highest_priority();
    if let Some(existing) = engine.callback {
        if existing.priority == priority {
            return;
        }
        shared.scheduler.cancel_callback(existing.handle);
    }

    let weak = Rc::downgrade(shared);
    let level = priority.to_scheduler_priority();
    tracing::trace!(?priority, ?level, "schedule root");
    let handle = shared.scheduler.schedule_callback(
        level,
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                perform_work_on_root(&shared);
            }
        }),
    );
    engine.callback = Some(ScheduledCallback { handle, priority });
}

/// Body of the scheduled root task.
fn perform_work_on_root(shared: &Rc<Shared>) {
    flush_passive_effects(shared, false);

    let lanes = {
        let Ok(mut engine) = shared.engine.try_borrow_mut() else {
            return;
        };
        engine.callback = None;
        engine.root_lanes.next_lanes()
    };
    if lanes.is_empty() {
        return;
    }

    if let Err(err) = render_and_commit(shared, lanes) {
        tracing::error!(%err, ?lanes, "scheduled render failed");
        if let Ok(mut engine) = shared.engine.try_borrow_mut() {
            engine.error = Some(err);
        }
    }
}

/// Render `lanes` to completion and commit. Nothing is committed when the
/// render fails; the updates of the failed lanes are dropped.
fn render_and_commit(shared: &Rc<Shared>, lanes: Lanes) -> ReconcileResult<()> {
    let result = {
        let Ok(mut engine) = shared.engine.try_borrow_mut() else {
            tracing::warn!("root is already working");
            return Ok(());
        };
        engine.render_root(lanes).and_then(|finished| {
            shared.committing.set(true);
            let committed = engine.commit_root(finished, lanes);
            shared.committing.set(false);
            committed
        })
    };

    flush_deferred(shared);

    let Ok(mut engine) = shared.engine.try_borrow_mut() else {
        return result;
    };
    schedule_passive_effects(shared, &mut engine);

    let mut result = result;
    if result.is_ok() {
        result = check_nested_updates(&mut engine);
    }
    ensure_root_is_scheduled(shared, &mut engine);
    result
}

/// Synchronous work left behind by a commit counts as a nested update.
fn check_nested_updates(engine: &mut Engine) -> ReconcileResult<()> {
    if !engine.root_lanes.pending.includes_some(Lanes::SYNC) {
        engine.nested_updates = 0;
        return Ok(());
    }
    engine.nested_updates += 1;
    let limit = engine.config.nested_update_limit;
    if engine.nested_updates > limit {
        engine.nested_updates = 0;
        engine.root_lanes.mark_failed(Lanes::SYNC);
        return Err(ReconcileError::NestedUpdateLimit { limit });
    }
    Ok(())
}

fn schedule_passive_effects(shared: &Rc<Shared>, engine: &mut Engine) {
    let Some(pending) = engine.pending_passive.as_mut() else {
        return;
    };
    if pending.task.is_some() {
        return;
    }
    let weak = Rc::downgrade(shared);
    let handle = shared.scheduler.schedule_callback(
        PriorityLevel::Normal,
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                flush_passive_effects(&shared, true);
            }
        }),
    );
    pending.task = Some(handle);
}

/// Run the passive effects of the last commit, if any. Returns true if
/// there were any to run.
fn flush_passive_effects(shared: &Rc<Shared>, from_task: bool) -> bool {
    let taken = match shared.engine.try_borrow_mut() {
        Ok(mut engine) => engine.take_passive_effects(),
        Err(_) => return false,
    };
    let Some((effects, task)) = taken else {
        return false;
    };
    if let (Some(task), false) = (task, from_task) {
        shared.scheduler.cancel_callback(task);
    }

    let ran = run_passive(effects);
    flush_deferred(shared);
    ran
}

fn run_passive(effects: PassiveEffects) -> bool {
    let ran = !effects.is_empty();
    effects.run();
    ran
}

// =============================================================================
// Root
// =============================================================================

/// One container and the tree rendered into it.
pub struct Root {
    shared: Rc<Shared>,
    container: HostHandle,
}

impl Root {
    /// A root with the default configuration.
    pub fn new(host: Rc<dyn HostConfig>, container: HostHandle, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_config(host, container, scheduler, ReconcilerConfig::default())
    }

    pub fn with_config(
        host: Rc<dyn HostConfig>,
        container: HostHandle,
        scheduler: Rc<dyn Scheduler>,
        config: ReconcilerConfig,
    ) -> Self {
        let default_lane = config.default_lane();
        let shared = Rc::new_cyclic(|weak| Shared {
            engine: RefCell::new(Engine::new(host.clone(), container, config, weak.clone())),
            host,
            scheduler,
            default_lane,
            rendering: Cell::new(None),
            render_phase_update: Cell::new(false),
            committing: Cell::new(false),
            deferred: RefCell::new(Vec::new()),
            update_priority: Cell::new(None),
        });
        tracing::debug!(?container, "root created");
        Self { shared, container }
    }

    pub fn container(&self) -> HostHandle {
        self.container
    }

    /// Schedule `element` to replace whatever the root shows.
    pub fn render(&self, element: impl Into<Node>) {
        let element = element.into();
        let lane = self.shared.request_update_lane();
        let apply = move |shared: &Rc<Shared>| {
            let Ok(mut engine) = shared.engine.try_borrow_mut() else {
                return;
            };
            let root = engine.current;
            if let NodeQueue::Root(queue) = &engine.arena[root].update_queue {
                queue.enqueue(QueuedUpdate {
                    lane,
                    payload: Payload::Replace(element),
                });
            }
            if engine.mark_update_lane_from_node_to_root(root, lane) {
                ensure_root_is_scheduled(shared, &mut engine);
            }
        };

        if self.shared.engine.try_borrow_mut().is_ok() {
            apply(&self.shared);
        } else {
            self.shared.defer(Box::new(apply));
        }
    }

    /// Render and commit all pending synchronous work now.
    ///
    /// Returns the first error hit. Work that failed is dropped.
    pub fn flush_sync_work(&self) -> ReconcileResult<()> {
        let mut first_error = None;
        loop {
            flush_passive_effects(&self.shared, false);
            let lanes = match self.shared.engine.try_borrow() {
                Ok(engine) => engine.root_lanes.next_lanes(),
                Err(_) => break,
            };
            if !lanes.includes_some(Lanes::SYNC) {
                break;
            }
            if let Err(err) = render_and_commit(&self.shared, lanes) {
                tracing::debug!(%err, "sync render failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run `f` with synchronous update priority, then flush.
    pub fn flush_sync(&self, f: impl FnOnce()) -> ReconcileResult<()> {
        self.with_priority(Lanes::SYNC, f);
        self.flush_sync_work()
    }

    /// Run the passive effects of the last commit now instead of waiting for
    /// their task. Returns false if there were none.
    pub fn flush_passive_effects(&self) -> bool {
        flush_passive_effects(&self.shared, false)
    }

    /// Updates dispatched inside `f` get `lane`.
    pub fn with_priority<R>(&self, lane: Lanes, f: impl FnOnce() -> R) -> R {
        let previous = self.shared.update_priority.replace(Some(lane));
        let out = f();
        self.shared.update_priority.set(previous);
        out
    }

    /// Updates dispatched inside `f` share one transition lane.
    pub fn start_transition<R>(&self, f: impl FnOnce() -> R) -> R {
        let lane = match self.shared.engine.try_borrow_mut() {
            Ok(mut engine) => engine.transitions.claim(),
            Err(_) => Lanes::TRANSITION_1,
        };
        tracing::trace!(?lane, "start transition");
        self.with_priority(lane, f)
    }

    /// Remove everything from the container and run every cleanup.
    pub fn unmount(&self) -> ReconcileResult<()> {
        self.flush_sync(|| self.render(Node::Empty))?;
        flush_passive_effects(&self.shared, false);
        Ok(())
    }

    /// Lanes with work waiting.
    pub fn pending_lanes(&self) -> Lanes {
        self.shared
            .engine
            .try_borrow()
            .map(|engine| engine.root_lanes.pending)
            .unwrap_or_default()
    }

    /// The error of the last failed scheduled render, if not yet taken.
    pub fn take_error(&self) -> Option<ReconcileError> {
        self.shared.engine.try_borrow_mut().ok()?.error.take()
    }

    /// Live node buffers held by this root.
    pub fn node_count(&self) -> usize {
        self.shared.engine.try_borrow().map(|engine| engine.arena.len()).unwrap_or(0)
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("container", &self.container)
            .field("pending", &self.pending_lanes())
            .finish()
    }
}
