//! # Weft Runtime
//!
//! The side-effecting primitives actions execute against: directory
//! creation, file writes and process spawning.
//!
//! - [`Runtime`] - The interface engines depend on
//! - [`LocalRuntime`] - Real filesystem and processes, confined to a root
//! - [`MemoryRuntime`] - In-memory stand-in with an operation log

pub mod local;
pub mod memory;
pub mod path;
pub mod runtime;

pub use local::{LocalRuntime, LocalRuntimeConfig};
pub use memory::{MemoryRuntime, RuntimeOp, ScriptedCommand};
pub use path::{normalize_relative, parent_dir};
pub use runtime::{ProcessControl, Runtime, SpawnedProcess};
