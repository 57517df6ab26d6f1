//! Parser registry keyed by stream id.

use std::collections::HashMap;

use tracing::debug;
use weft_core::DirectiveHandler;

use crate::config::ParserConfig;
use crate::message::{ArtifactElement, MessageParser};

/// Owns one [`MessageParser`] per stream.
///
/// State is created on the first chunk for a stream and dropped by
/// [`finalize`](Self::finalize) or [`discard`](Self::discard).
#[derive(Default)]
pub struct StreamParser {
    config: ParserConfig,
    artifact_element: Option<ArtifactElement>,
    streams: HashMap<String, MessageParser>,
}

impl StreamParser {
    /// Create a parser registry with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser registry with custom configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Render a placeholder for every artifact into the display text.
    pub fn with_artifact_element(mut self, element: ArtifactElement) -> Self {
        self.artifact_element = Some(element);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Feed a chunk for `stream_id`, returning the display text it settles.
    pub fn consume<H>(&mut self, stream_id: &str, chunk: &str, handler: &mut H) -> String
    where
        H: DirectiveHandler + ?Sized,
    {
        if !self.streams.contains_key(stream_id) {
            debug!(stream_id, "Starting parser for new stream");
            let mut parser = MessageParser::new(stream_id, self.config.clone());
            if let Some(element) = &self.artifact_element {
                parser = parser.with_artifact_element(element.clone());
            }
            self.streams.insert(stream_id.to_string(), parser);
        }

        match self.streams.get_mut(stream_id) {
            Some(parser) => parser.consume(chunk, handler),
            None => String::new(),
        }
    }

    /// End `stream_id`, returning any unresolved text, and drop its state.
    pub fn finalize(&mut self, stream_id: &str) -> String {
        match self.streams.remove(stream_id) {
            Some(parser) => {
                debug!(stream_id, position = parser.position(), "Finalizing stream");
                parser.finalize()
            }
            None => String::new(),
        }
    }

    /// Drop a stream's state without flushing it.
    pub fn discard(&mut self, stream_id: &str) -> bool {
        self.streams.remove(stream_id).is_some()
    }

    /// Access the parser state of a live stream.
    pub fn stream(&self, stream_id: &str) -> Option<&MessageParser> {
        self.streams.get(stream_id)
    }

    /// Ids of streams that have not been finalized.
    pub fn active_streams(&self) -> Vec<&str> {
        self.streams.keys().map(String::as_str).collect()
    }

    /// Drop every stream.
    pub fn reset(&mut self) {
        self.streams.clear();
    }
}
