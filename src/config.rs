//! Reconciler configuration.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! rerender_limit = 25
//! nested_update_limit = 50
//! default_update_lane = "default"
//! trace_commits = false
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::lanes::{LaneName, Lanes};

/// Tunables for one root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// How many times a component may re-run in a single pass because it
    /// updated its own state while rendering.
    pub rerender_limit: u32,

    /// How many synchronous commits may follow each other when each one
    /// schedules more synchronous work from its effects.
    pub nested_update_limit: u32,

    /// Lane used for updates when the host reports no event priority and no
    /// explicit priority is in effect.
    pub default_update_lane: LaneName,

    /// Log a summary of every commit at `info`.
    pub trace_commits: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            rerender_limit: 25,
            nested_update_limit: 50,
            default_update_lane: LaneName::Default,
            trace_commits: false,
        }
    }
}

impl ReconcilerConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rerender_limit == 0 {
            return Err(ConfigError::Invalid("rerender_limit must be at least 1".into()));
        }
        if self.nested_update_limit == 0 {
            return Err(ConfigError::Invalid(
                "nested_update_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn default_lane(&self) -> Lanes {
        self.default_update_lane.lane()
    }
}
