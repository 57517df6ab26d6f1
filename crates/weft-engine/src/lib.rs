//! # Weft Engine
//!
//! Executes the actions of each artifact strictly in order against a
//! [`weft_runtime::Runtime`].
//!
//! - [`ArtifactEngine`] - Ordered queue and worker for one artifact
//! - [`Dispatcher`] - Routes parser events to per-artifact engines
//! - [`StatusHub`] - Broadcast of action status transitions
//! - [`OutputSink`] - Destination for shell output

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod hub;
pub mod queue;
pub mod sink;

pub use config::{EngineConfig, FailurePolicy};
pub use dispatcher::Dispatcher;
pub use engine::{ArtifactEngine, EngineContext};
pub use hub::StatusHub;
pub use sink::{OutputSink, TracingSink};
