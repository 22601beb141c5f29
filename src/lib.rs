//! # spark-reconciler
//!
//! Incremental UI-tree reconciler with lane-based priority scheduling.
//!
//! Components describe what the UI should look like; the reconciler keeps a
//! tree of render nodes, works out the smallest set of host mutations that
//! turns the committed tree into the described one, and applies them through
//! a [`HostConfig`].
//!
//! ## Architecture
//!
//! ```text
//! update ─► lane ─► queue ─► mark path to root ─► Scheduler task
//!                                                      │
//!        ┌─────────────────────────────────────────────┘
//!        ▼
//!   work loop (begin ↓ / complete ↑)  ─►  commit  ─►  host mutations
//!        │                                  │
//!   child reconciler                  layout effects, then passive effects
//! ```
//!
//! Every tree position owns at most two node buffers: the one on screen and
//! the one being built. A commit flips which one is current.
//!
//! ## Modules
//!
//! - [`lanes`] - Priority bitmasks and root lane bookkeeping
//! - [`engine`] - Render nodes, their arena, update queues
//! - [`hooks`] - State cells and effects for function components
//! - [`class`] - Class components and their lifecycle
//! - [`primitives`] - Elements, props, and description builders
//! - [`host`] - Host adapter contract and an in-memory host
//! - [`scheduler`] - Scheduler contract and a deterministic task queue
//! - [`root`] - Public entry point
//!
//! ## Example
//!
//! ```ignore
//! let host = MemoryHost::new();
//! let container = host.create_container();
//! let queue = Rc::new(TaskQueue::new());
//! let root = Root::new(host.clone(), container, queue.clone());
//!
//! root.flush_sync(|| root.render(h("div").child("hello")))?;
//! assert_eq!(host.to_markup(container), "<div>hello</div>");
//! ```

pub mod class;
mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod host;
pub mod lanes;
pub mod primitives;
mod reconciler;
pub mod root;
pub mod scheduler;
mod work_loop;

pub use class::{Component, Snapshot, Updater};
pub use config::ReconcilerConfig;
pub use engine::NodeId;
pub use error::{ConfigError, ReconcileError, ReconcileResult, RenderError};
pub use hooks::{Dispatch, Hooks, Ref, SetState};
pub use host::{HostConfig, HostHandle, HostOp, MemoryHost, UpdatePayload};
pub use lanes::{LaneName, Lanes};
pub use primitives::{
    Cleanup, Element, ElementBuilder, ElementType, FunctionComponent, Key, Node, PropValue, Props,
    RenderResult, class, component, component_of, fragment, h, text,
};
pub use root::Root;
pub use scheduler::{PriorityLevel, Scheduler, TaskHandle, TaskQueue};
