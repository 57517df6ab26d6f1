//! Execution records reported by artifact engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActionId, ActionKind, ActionStatus};

/// A single status transition of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// The artifact owning the action.
    pub artifact_id: String,

    /// Position of the action within the artifact.
    pub ordinal: u32,

    /// The status the action moved to.
    pub status: ActionStatus,

    /// Error message for failed actions.
    pub error: Option<String>,

    /// When the transition happened.
    pub at: DateTime<Utc>,
}

impl StatusEvent {
    /// Create a status event stamped with the current time.
    pub fn new(artifact_id: impl Into<String>, ordinal: u32, status: ActionStatus) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            ordinal,
            status,
            error: None,
            at: Utc::now(),
        }
    }

    /// Attach an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// The id of the action this event describes.
    pub fn action_id(&self) -> ActionId {
        ActionId::new(self.artifact_id.clone(), self.ordinal)
    }
}

/// Point-in-time view of one action held by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// The artifact owning the action.
    pub artifact_id: String,

    /// Position of the action within the artifact.
    pub ordinal: u32,

    /// What the action does.
    pub kind: ActionKind,

    /// Current status.
    pub status: ActionStatus,

    /// Whether the final content has arrived.
    pub ready: bool,

    /// Error message, set when the action failed.
    pub error: Option<String>,

    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the action reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ActionRecord {
    /// Wall-clock execution time in milliseconds, once finished.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        u64::try_from((finished - started).num_milliseconds()).ok()
    }
}
