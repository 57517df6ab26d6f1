//! In-memory runtime with scripted commands and an operation log.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use weft_core::{Result, WeftError};

use crate::path::{normalize_relative, parent_dir};
use crate::runtime::{ProcessControl, Runtime, SpawnedProcess};

/// Exit code reported by a scripted process after [`ProcessControl::kill`].
pub const KILLED_EXIT_CODE: i32 = 130;

/// A side effect observed by a [`MemoryRuntime`], in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeOp {
    /// A directory was created.
    CreateDir { path: String },
    /// A file write completed.
    WriteFile { path: String },
    /// A command was started.
    Spawn { command: String },
    /// A command exited.
    Exit { command: String, code: i32 },
    /// A command was killed.
    Kill { command: String },
}

/// How a command behaves when spawned on a [`MemoryRuntime`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedCommand {
    /// Output chunks, delivered immediately.
    pub output: Vec<String>,
    /// Exit code after the delay.
    pub exit_code: i32,
    /// How long the command runs.
    pub delay: Duration,
    /// When set, the command exits with 1 unless this file existed at spawn time.
    pub requires_file: Option<String>,
    /// When set, [`ProcessControl::kill`] fails with this message.
    pub kill_error: Option<String>,
}

impl ScriptedCommand {
    /// A command that succeeds immediately with no output.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(mut self, chunk: impl Into<String>) -> Self {
        self.output.push(chunk.into());
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requires_file(mut self, path: impl Into<String>) -> Self {
        self.requires_file = Some(path.into());
        self
    }

    pub fn fail_kill(mut self, message: impl Into<String>) -> Self {
        self.kill_error = Some(message.into());
        self
    }
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    ops: Vec<RuntimeOp>,
    write_delays: HashMap<String, Duration>,
    failing_paths: HashSet<String>,
    commands: HashMap<String, ScriptedCommand>,
}

impl MemoryState {
    fn dir_exists(&self, path: Option<&str>) -> bool {
        path.map_or(true, |p| self.dirs.contains(p))
    }
}

/// Runtime that keeps files in memory and plays back scripted commands.
#[derive(Clone, Default)]
pub struct MemoryRuntime {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRuntime {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    /// Script the behaviour of `command`. Unscripted commands exit 0.
    pub fn script(&self, command: impl Into<String>, behaviour: ScriptedCommand) {
        self.lock().commands.insert(command.into(), behaviour);
    }

    /// Make writes to `path` take `delay` before completing.
    pub fn delay_writes(&self, path: impl Into<String>, delay: Duration) {
        self.lock().write_delays.insert(path.into(), delay);
    }

    /// Make every operation on `path` fail.
    pub fn fail_path(&self, path: impl Into<String>) {
        self.lock().failing_paths.insert(path.into());
    }

    /// Content of a file, if written.
    pub fn file(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    /// All written files, sorted by path.
    pub fn files(&self) -> BTreeMap<String, String> {
        self.lock().files.clone()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    /// Every side effect so far, in order.
    pub fn ops(&self) -> Vec<RuntimeOp> {
        self.lock().ops.clone()
    }

    /// Index of the first logged op matching `pred`.
    pub fn position(&self, pred: impl Fn(&RuntimeOp) -> bool) -> Option<usize> {
        self.lock().ops.iter().position(pred)
    }

    fn check_path(&self, path: &str) -> Result<String> {
        let normalized = normalize_relative(path)?;
        if self.lock().failing_paths.contains(&normalized) {
            return Err(WeftError::Filesystem {
                path: path.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(normalized)
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Runtime for MemoryRuntime {
    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let normalized = self.check_path(path)?;
        let mut state = self.lock();

        if !recursive && !state.dir_exists(parent_dir(&normalized)) {
            return Err(WeftError::Filesystem {
                path: path.to_string(),
                message: "parent directory does not exist".to_string(),
            });
        }

        let mut current = Some(normalized.as_str());
        while let Some(dir) = current {
            state.dirs.insert(dir.to_string());
            current = parent_dir(dir);
        }
        state.ops.push(RuntimeOp::CreateDir { path: normalized });
        Ok(())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let normalized = self.check_path(path)?;

        let delay = self.lock().write_delays.get(&normalized).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if !state.dir_exists(parent_dir(&normalized)) {
            return Err(WeftError::Filesystem {
                path: path.to_string(),
                message: "parent directory does not exist".to_string(),
            });
        }
        if state.dirs.contains(&normalized) {
            return Err(WeftError::Filesystem {
                path: path.to_string(),
                message: "is a directory".to_string(),
            });
        }

        state.files.insert(normalized.clone(), content.to_string());
        state.ops.push(RuntimeOp::WriteFile { path: normalized });
        Ok(())
    }

    async fn spawn(&self, command: &str) -> Result<SpawnedProcess> {
        let mut state = self.lock();
        let script = state.commands.get(command).cloned().unwrap_or_default();
        let satisfied = script
            .requires_file
            .as_ref()
            .map_or(true, |path| state.files.contains_key(path));
        state.ops.push(RuntimeOp::Spawn {
            command: command.to_string(),
        });
        drop(state);

        debug!(command, "Scripted process spawned");

        let (tx, rx) = mpsc::channel(script.output.len().max(1));
        for chunk in &script.output {
            // capacity covers every chunk
            let _ = tx.try_send(chunk.clone());
        }

        Ok(SpawnedProcess {
            output: rx,
            control: Box::new(ScriptedProcess {
                command: command.to_string(),
                exit_code: if satisfied { script.exit_code } else { 1 },
                delay: script.delay,
                kill_error: script.kill_error,
                killed: false,
                exited: None,
                state: self.state.clone(),
            }),
        })
    }
}

struct ScriptedProcess {
    command: String,
    exit_code: i32,
    delay: Duration,
    kill_error: Option<String>,
    killed: bool,
    exited: Option<i32>,
    state: Arc<Mutex<MemoryState>>,
}

impl ScriptedProcess {
    fn finish(&mut self, code: i32) -> i32 {
        if self.exited.is_none() {
            self.exited = Some(code);
            lock_state(&self.state).ops.push(RuntimeOp::Exit {
                command: self.command.clone(),
                code,
            });
        }
        code
    }
}

#[async_trait]
impl ProcessControl for ScriptedProcess {
    async fn wait(&mut self) -> Result<i32> {
        if let Some(code) = self.exited {
            return Ok(code);
        }
        if self.killed {
            return Ok(self.finish(KILLED_EXIT_CODE));
        }

        tokio::time::sleep(self.delay).await;
        let code = self.exit_code;
        Ok(self.finish(code))
    }

    async fn kill(&mut self) -> Result<()> {
        if let Some(message) = &self.kill_error {
            return Err(WeftError::Process(message.clone()));
        }
        if self.exited.is_none() && !self.killed {
            self.killed = true;
            lock_state(&self.state).ops.push(RuntimeOp::Kill {
                command: self.command.clone(),
            });
        }
        Ok(())
    }
}
