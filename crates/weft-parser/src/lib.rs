//! # Weft Parser
//!
//! Incremental scanner for `<artifact>` / `<action>` directives embedded in
//! streamed model output.
//!
//! Text arrives in chunks of arbitrary size. Each call to
//! [`StreamParser::consume`] returns the display text that can already be
//! classified and reports directive lifecycle events to a
//! [`weft_core::DirectiveHandler`]. Anything that might still turn into a
//! tag is held back until later bytes settle it.

pub mod attrs;
pub mod config;
pub mod message;
pub mod stream;

pub use config::ParserConfig;
pub use message::{ArtifactElement, MessageParser};
pub use stream::StreamParser;
