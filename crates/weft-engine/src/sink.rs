//! Destinations for shell output.

use tracing::debug;

/// Receives output produced by shell actions.
pub trait OutputSink: Send + Sync {
    /// Called for each chunk of output, in the order it was read.
    fn write(&self, artifact_id: &str, ordinal: u32, chunk: &str);
}

/// Logs output at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn write(&self, artifact_id: &str, ordinal: u32, chunk: &str) {
        debug!(artifact_id, ordinal, output = chunk.trim_end(), "Process output");
    }
}

impl<F> OutputSink for F
where
    F: Fn(&str, u32, &str) + Send + Sync,
{
    fn write(&self, artifact_id: &str, ordinal: u32, chunk: &str) {
        self(artifact_id, ordinal, chunk)
    }
}
