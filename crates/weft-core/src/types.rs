//! Common types used across Weft.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of an action in its artifact's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Known to the engine but not started.
    Pending,
    /// Currently executing against the runtime.
    Running,
    /// Finished successfully.
    Complete,
    /// Finished with an error or a non-zero exit code.
    Failed,
    /// Stopped by a cancellation request.
    Aborted,
}

impl ActionStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Complete | ActionStatus::Failed | ActionStatus::Aborted
        )
    }

    /// Returns true if the action has not reached a terminal state.
    pub fn is_active(&self) -> bool {
        matches!(self, ActionStatus::Pending | ActionStatus::Running)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Complete => "complete",
            ActionStatus::Failed => "failed",
            ActionStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// The kind of work an action describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Write the payload to a file relative to the runtime root.
    File { file_path: String },
    /// Run the payload as a command line.
    Shell,
    /// An action type the parser does not know; carried through for the executor.
    Opaque { kind: String },
}

impl ActionKind {
    /// The wire name of this kind, as it appears in the `type` attribute.
    pub fn name(&self) -> &str {
        match self {
            ActionKind::File { .. } => "file",
            ActionKind::Shell => "shell",
            ActionKind::Opaque { kind } => kind,
        }
    }

    /// The target path, for file actions.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            ActionKind::File { file_path } => Some(file_path),
            _ => None,
        }
    }
}

/// Identifies one action: its artifact plus its ordinal within that artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId {
    /// The owning artifact.
    pub artifact_id: String,
    /// Zero-based position within the artifact.
    pub ordinal: u32,
}

impl ActionId {
    /// Create a new action id.
    pub fn new(artifact_id: impl Into<String>, ordinal: u32) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            ordinal,
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.artifact_id, self.ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_status_terminal() {
        assert!(ActionStatus::Complete.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
        assert!(ActionStatus::Aborted.is_terminal());
        assert!(!ActionStatus::Running.is_terminal());
        assert!(!ActionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_action_status_active() {
        assert!(ActionStatus::Pending.is_active());
        assert!(ActionStatus::Running.is_active());
        assert!(!ActionStatus::Aborted.is_active());
    }

    #[test]
    fn test_action_kind_names() {
        let file = ActionKind::File {
            file_path: "src/main.rs".into(),
        };
        assert_eq!(file.name(), "file");
        assert_eq!(file.file_path(), Some("src/main.rs"));
        assert_eq!(ActionKind::Shell.name(), "shell");
        assert_eq!(ActionKind::Shell.file_path(), None);

        let opaque = ActionKind::Opaque {
            kind: "preview".into(),
        };
        assert_eq!(opaque.name(), "preview");
    }

    #[test]
    fn test_action_kind_serde_shape() {
        let json = serde_json::to_value(ActionKind::File {
            file_path: "x.txt".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["file_path"], "x.txt");
    }

    #[test]
    fn test_action_id_display() {
        assert_eq!(ActionId::new("a1", 2).to_string(), "a1#2");
    }
}
