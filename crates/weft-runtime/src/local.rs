//! Runtime backed by the local filesystem and `tokio::process`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use weft_core::{Result, WeftError};

use crate::path::normalize_relative;
use crate::runtime::{ProcessControl, Runtime, SpawnedProcess};

/// Exit code reported for a process that was terminated by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = 137;

const OUTPUT_CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 4096;

/// Configuration for [`LocalRuntime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalRuntimeConfig {
    /// Working root; every action path is resolved inside it.
    pub root: PathBuf,

    /// Shell used to run command lines.
    pub shell: String,

    /// Flag that makes the shell run its next argument as a command.
    pub shell_flag: String,

    /// Extra environment for spawned commands.
    pub env: BTreeMap<String, String>,
}

impl Default for LocalRuntimeConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        // keep package managers from stopping at interactive prompts
        env.insert("npm_config_yes".to_string(), "true".to_string());

        Self {
            root: PathBuf::from("."),
            shell: "sh".to_string(),
            shell_flag: "-c".to_string(),
            env,
        }
    }
}

/// Runtime that touches the real filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct LocalRuntime {
    config: LocalRuntimeConfig,
}

impl LocalRuntime {
    /// Create a runtime rooted at `root` with default shell settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(LocalRuntimeConfig {
            root: root.into(),
            ..LocalRuntimeConfig::default()
        })
    }

    /// Create a runtime with custom configuration.
    pub fn with_config(config: LocalRuntimeConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &PathBuf {
        &self.config.root
    }

    /// Resolve a relative action path to a location under the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = normalize_relative(path)?;
        Ok(self.config.root.join(relative))
    }
}

#[async_trait]
impl Runtime for LocalRuntime {
    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let target = self.resolve(path)?;
        debug!(path, recursive, "Creating directory");

        let result = if recursive {
            tokio::fs::create_dir_all(&target).await
        } else {
            match tokio::fs::create_dir(&target).await {
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && target.is_dir() => Ok(()),
                other => other,
            }
        };
        result.map_err(|e| WeftError::filesystem(path, e))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let target = self.resolve(path)?;
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| WeftError::filesystem(path, e))?;
        debug!(path, bytes = content.len(), "File written");
        Ok(())
    }

    async fn spawn(&self, command: &str) -> Result<SpawnedProcess> {
        let mut cmd = Command::new(&self.config.shell);
        cmd.arg(&self.config.shell_flag)
            .arg(command)
            .current_dir(&self.config.root)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group, so kill reaches everything the shell forks
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| WeftError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        info!(command, pid = ?child.id(), "Process spawned");

        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, tx));
        }

        Ok(SpawnedProcess {
            output: rx,
            control: Box::new(LocalProcess { child }),
        })
    }
}

/// Copy a pipe into the output channel until either side closes.
async fn forward_output<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read process output: {}", e);
                break;
            }
        }
    }
}

struct LocalProcess {
    child: Child,
}

#[async_trait]
impl ProcessControl for LocalProcess {
    async fn wait(&mut self) -> Result<i32> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| WeftError::Process(e.to_string()))?;
        Ok(status.code().unwrap_or(SIGNALLED_EXIT_CODE))
    }

    async fn kill(&mut self) -> Result<()> {
        // `id` is gone once the child has been reaped
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        #[cfg(unix)]
        kill_group(pid)?;
        #[cfg(not(unix))]
        let _ = pid;

        self.child
            .kill()
            .await
            .map_err(|e| WeftError::Process(e.to_string()))
    }
}

/// SIGKILL the process group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid).map_err(|e| WeftError::Process(e.to_string()))?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        // group already gone
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(WeftError::Process(format!("killpg {pid}: {e}"))),
    }
}
