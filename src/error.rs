//! Error types.
//!
//! Two families: [`RenderError`] is raised by component bodies and aborts
//! only the render pass it happened in. [`ReconcileError`] is what the
//! engine surfaces to callers; most of its variants are invariant
//! violations that point at a bug in component code or in the engine.

use std::borrow::Cow;

use thiserror::Error;

use crate::engine::NodeId;

/// An error thrown while evaluating a component body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RenderError {
    message: Cow<'static, str>,
}

impl RenderError {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by the reconciler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A component threw during begin work. Nothing was committed.
    #[error("render failed in {component}: {source}")]
    Render {
        /// Name of the component whose body failed.
        component: Cow<'static, str>,
        #[source]
        source: RenderError,
    },

    /// A component called a different number of state cells than it did in
    /// its previous render.
    #[error("rendered {rendered} state cells, previous render had {previous}")]
    StateCellCountMismatch { previous: usize, rendered: usize },

    /// The cell at a position changed kind or value type between renders.
    #[error("state cell {index} was a {previous} and is now a {rendered}")]
    StateCellKindChanged {
        index: usize,
        previous: &'static str,
        rendered: &'static str,
    },

    /// A component kept scheduling updates on itself while rendering.
    #[error("too many re-renders (limit {limit}); a component updates itself unconditionally while rendering")]
    TooManyRerenders { limit: u32 },

    /// Commits kept scheduling synchronous work on the same root.
    #[error("maximum update depth exceeded (limit {limit})")]
    NestedUpdateLimit { limit: u32 },

    /// Placement could not find a host ancestor.
    #[error("no host parent found above node {0:?}")]
    HostParentNotFound(NodeId),

    /// A host instance was about to be created for a node that already has one.
    #[error("node {0:?} already owns a host instance")]
    DoubleMount(NodeId),
}

impl ReconcileError {
    /// Fatal errors are engine or component-contract bugs. A [`Render`]
    /// error only aborted one pass and may be retried.
    ///
    /// [`Render`]: ReconcileError::Render
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReconcileError::Render { .. })
    }
}

/// Result type for reconciler operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}
