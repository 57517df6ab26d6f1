//! Error types for Weft.

use thiserror::Error;

/// Main error type for Weft operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeftError {
    /// A path was rejected before touching the filesystem.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A filesystem primitive failed.
    #[error("Filesystem error at '{path}': {message}")]
    Filesystem { path: String, message: String },

    /// A process could not be started.
    #[error("Failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    /// Waiting on or signalling a running process failed.
    #[error("Process error: {0}")]
    Process(String),

    /// No engine is known for the artifact.
    #[error("Unknown artifact: {artifact_id}")]
    UnknownArtifact { artifact_id: String },

    /// The artifact has no action with this ordinal.
    #[error("Unknown action {ordinal} in artifact {artifact_id}")]
    UnknownAction { artifact_id: String, ordinal: u32 },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WeftError {
    /// Returns true if retrying the same operation later could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WeftError::Filesystem { .. } | WeftError::Spawn { .. } | WeftError::Process(_)
        )
    }

    /// Build a filesystem error from an I/O error.
    pub fn filesystem(path: impl Into<String>, err: std::io::Error) -> Self {
        WeftError::Filesystem {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Build an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        WeftError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience Result type for Weft operations.
pub type Result<T> = std::result::Result<T, WeftError>;

impl From<serde_json::Error> for WeftError {
    fn from(err: serde_json::Error) -> Self {
        WeftError::Serialization(err.to_string())
    }
}
