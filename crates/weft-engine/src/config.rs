//! Engine configuration.

use serde::{Deserialize, Serialize};

/// What happens to the rest of an artifact's queue after an action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep executing later actions.
    #[default]
    Continue,
    /// Mark every later action failed without running it.
    Halt,
}

/// Configuration for artifact engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Queue behaviour after a failed action.
    pub failure_policy: FailurePolicy,

    /// Buffered status events per subscriber before old ones are dropped.
    pub status_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Continue,
            status_capacity: 1024,
        }
    }
}
