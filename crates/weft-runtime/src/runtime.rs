//! Runtime trait.

use async_trait::async_trait;
use tokio::sync::mpsc;
use weft_core::Result;

/// The external runtime that performs action side effects.
///
/// Paths are relative to a working root owned by the implementation.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Create a directory, including missing parents when `recursive` is set.
    /// Creating a directory that already exists is not an error.
    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()>;

    /// Write `content` to `path`, replacing any existing file.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Start `command` as a shell command line.
    async fn spawn(&self, command: &str) -> Result<SpawnedProcess>;
}

/// Control over a process started by [`Runtime::spawn`].
#[async_trait]
pub trait ProcessControl: Send {
    /// Wait for the process to exit and return its exit code.
    async fn wait(&mut self) -> Result<i32>;

    /// Terminate the process.
    async fn kill(&mut self) -> Result<()>;
}

/// A running process.
pub struct SpawnedProcess {
    /// Combined stdout/stderr, in the order it was read. Closes when the
    /// process's output ends.
    pub output: mpsc::Receiver<String>,

    /// Exit and kill handle.
    pub control: Box<dyn ProcessControl>,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess").finish_non_exhaustive()
    }
}
