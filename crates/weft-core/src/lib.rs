//! # Weft Core
//!
//! Core primitives shared by the Weft parser, runtimes and execution engine.
//!
//! This crate provides the fundamental building blocks:
//! - [`ActionKind`] - What an action does (file write, shell command, opaque)
//! - [`ActionStatus`] - Lifecycle state of an action
//! - [`DirectiveEvent`] / [`DirectiveHandler`] - Parser lifecycle events
//! - [`StatusEvent`] / [`ActionRecord`] - Execution state reported by engines
//! - [`WeftError`] - Error types

pub mod directive;
pub mod error;
pub mod record;
pub mod types;

// Re-exports for convenience
pub use directive::{DirectiveEvent, DirectiveHandler};
pub use error::{Result, WeftError};
pub use record::{ActionRecord, StatusEvent};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::directive::{DirectiveEvent, DirectiveHandler};
    pub use crate::error::{Result, WeftError};
    pub use crate::record::{ActionRecord, StatusEvent};
    pub use crate::types::{ActionId, ActionKind, ActionStatus};
}
