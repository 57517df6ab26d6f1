//! Per-artifact execution engine.
//!
//! Each [`ArtifactEngine`] owns an ordered queue of actions and runs them one
//! at a time on a single worker task. The worker exists only while there is
//! runnable work and is started again by the next `enqueue`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, error, info, warn, Instrument};
use weft_core::{ActionKind, ActionRecord, ActionStatus, Result, StatusEvent};
use weft_runtime::{normalize_relative, parent_dir, Runtime, SpawnedProcess};

use crate::config::{EngineConfig, FailurePolicy};
use crate::hub::StatusHub;
use crate::queue::{ActionQueue, Enqueued, Job};
use crate::sink::{OutputSink, TracingSink};

/// Error recorded on actions skipped by [`FailurePolicy::Halt`].
pub const SKIPPED_ERROR: &str = "skipped after earlier failure";

/// Shared dependencies of every engine.
#[derive(Clone)]
pub struct EngineContext {
    /// Where side effects happen.
    pub runtime: Arc<dyn Runtime>,

    /// Status change fan-out, shared by all engines.
    pub hub: StatusHub,

    /// Destination for shell output.
    pub sink: Arc<dyn OutputSink>,

    /// Engine behaviour.
    pub config: EngineConfig,
}

impl EngineContext {
    /// Create a context with default configuration and a [`TracingSink`].
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        let config = EngineConfig::default();
        Self {
            runtime,
            hub: StatusHub::new(config.status_capacity),
            sink: Arc::new(TracingSink),
            config,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the configuration. The hub is rebuilt with the configured
    /// capacity, so call [`Self::with_hub`] afterwards to share an existing one.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.hub = StatusHub::new(config.status_capacity);
        self.config = config;
        self
    }

    pub fn with_hub(mut self, hub: StatusHub) -> Self {
        self.hub = hub;
        self
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("hub", &self.hub)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Inner {
    artifact_id: String,
    ctx: EngineContext,
    queue: Mutex<ActionQueue>,
    closed: AtomicBool,
    /// Woken whenever a worker exits.
    idle: Notify,
}

/// Ordered action queue and worker for one artifact.
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct ArtifactEngine {
    inner: Arc<Inner>,
}

impl ArtifactEngine {
    /// Create an engine for `artifact_id`.
    pub fn new(artifact_id: impl Into<String>, ctx: EngineContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                artifact_id: artifact_id.into(),
                ctx,
                queue: Mutex::new(ActionQueue::new()),
                closed: AtomicBool::new(false),
                idle: Notify::new(),
            }),
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.inner.artifact_id
    }

    /// Record an action as pending before its content is known.
    ///
    /// Returns `false` if the artifact is closed or the action is already known.
    pub fn register(&self, ordinal: u32, kind: ActionKind) -> bool {
        if self.reject_closed(ordinal) {
            return false;
        }
        let mut queue = self.inner.lock();
        if !queue.register(ordinal, kind) {
            return false;
        }
        self.inner.publish(StatusEvent::new(
            self.artifact_id(),
            ordinal,
            ActionStatus::Pending,
        ));
        true
    }

    /// Supply an action's final content and start the worker if it is idle.
    ///
    /// Returns `false` if the artifact is closed or the action already had content.
    pub fn enqueue(&self, ordinal: u32, kind: ActionKind, content: impl Into<String>) -> bool {
        if self.reject_closed(ordinal) {
            return false;
        }
        {
            let mut queue = self.inner.lock();
            match queue.supply(ordinal, kind, content.into()) {
                Enqueued::Duplicate => {
                    warn!(
                        artifact_id = %self.artifact_id(),
                        ordinal, "Ignoring duplicate enqueue"
                    );
                    return false;
                }
                Enqueued::Appended => self.inner.publish(StatusEvent::new(
                    self.artifact_id(),
                    ordinal,
                    ActionStatus::Pending,
                )),
                Enqueued::Ready => {}
            }
        }
        self.schedule();
        true
    }

    /// Request cancellation of one action.
    ///
    /// Returns `Ok(false)` if the action already reached a terminal status.
    pub fn cancel(&self, ordinal: u32) -> Result<bool> {
        let requested = self.inner.lock().cancel(self.artifact_id(), ordinal)?;
        if requested {
            info!(artifact_id = %self.artifact_id(), ordinal, "Cancellation requested");
        }
        Ok(requested)
    }

    /// Request cancellation of every unfinished action. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        self.inner.lock().cancel_all()
    }

    /// Mark the artifact closed. No further actions are accepted.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!(artifact_id = %self.artifact_id(), "Artifact closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Current status of one action.
    pub fn status(&self, ordinal: u32) -> Option<ActionStatus> {
        self.inner.lock().status(ordinal)
    }

    /// Point-in-time view of every action, in execution order.
    pub fn snapshot(&self) -> Vec<ActionRecord> {
        self.inner.lock().records(self.artifact_id())
    }

    /// True when nothing is running and nothing runnable is waiting.
    pub fn is_idle(&self) -> bool {
        self.inner.lock().is_idle()
    }

    /// Wait until [`Self::is_idle`] holds.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Subscribe to status changes. The hub is shared, so events from other
    /// artifacts on the same context are delivered too.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.ctx.hub.subscribe()
    }

    fn reject_closed(&self, ordinal: u32) -> bool {
        if self.is_closed() {
            warn!(
                artifact_id = %self.artifact_id(),
                ordinal, "Action arrived after artifact closed"
            );
            return true;
        }
        false
    }

    fn schedule(&self) {
        if !self.inner.lock().begin_drain() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let span = tracing::info_span!("artifact", id = %self.artifact_id());
                handle.spawn(drain(self.inner.clone()).instrument(span));
            }
            Err(e) => {
                error!(error = %e, "No async runtime available to execute actions");
                self.inner.lock().end_drain();
            }
        }
    }
}

impl std::fmt::Debug for ArtifactEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactEngine")
            .field("artifact_id", &self.inner.artifact_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ActionQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: StatusEvent) {
        self.ctx.hub.publish(event);
    }

    async fn execute(&self, job: &Job) -> Outcome {
        if job.token.is_cancelled() {
            return Outcome::Aborted;
        }
        let result = match &job.kind {
            ActionKind::File { file_path } => self.write_file(job, file_path).await,
            ActionKind::Shell => self.run_shell(job).await,
            ActionKind::Opaque { kind } => {
                return Outcome::Failed(format!("unsupported action kind '{kind}'"));
            }
        };
        result.unwrap_or_else(|e| Outcome::Failed(e.to_string()))
    }

    async fn write_file(&self, job: &Job, file_path: &str) -> Result<Outcome> {
        let path = normalize_relative(file_path)?;
        if let Some(dir) = parent_dir(&path) {
            self.ctx.runtime.create_dir(dir, true).await?;
        }
        if job.token.is_cancelled() {
            return Ok(Outcome::Aborted);
        }
        self.ctx.runtime.write_file(&path, &job.content).await?;
        info!(ordinal = job.ordinal, path = %path, "File written");
        Ok(Outcome::Complete)
    }

    async fn run_shell(&self, job: &Job) -> Result<Outcome> {
        let SpawnedProcess {
            output,
            mut control,
        } = self.ctx.runtime.spawn(&job.content).await?;
        info!(ordinal = job.ordinal, command = %job.content, "Command started");

        tokio::spawn(pump_output(
            self.ctx.sink.clone(),
            self.artifact_id.clone(),
            job.ordinal,
            output,
        ));

        let exited = tokio::select! {
            biased;
            result = control.wait() => Some(result),
            _ = job.token.cancelled() => None,
        };

        match exited {
            Some(result) => {
                let code = result?;
                if code == 0 {
                    Ok(Outcome::Complete)
                } else {
                    Ok(Outcome::Failed(format!("command exited with code {code}")))
                }
            }
            // a cancelled action stays aborted even if the process resists
            None => {
                if let Err(e) = control.kill().await {
                    warn!(ordinal = job.ordinal, error = %e, "Failed to kill cancelled command");
                    return Ok(Outcome::Aborted);
                }
                match control.wait().await {
                    Ok(code) => info!(ordinal = job.ordinal, code, "Command killed"),
                    Err(e) => warn!(ordinal = job.ordinal, error = %e, "Failed to reap killed command"),
                }
                Ok(Outcome::Aborted)
            }
        }
    }
}

/// How an action ended.
enum Outcome {
    Complete,
    Failed(String),
    Aborted,
}

impl Outcome {
    fn into_parts(self) -> (ActionStatus, Option<String>) {
        match self {
            Outcome::Complete => (ActionStatus::Complete, None),
            Outcome::Failed(error) => (ActionStatus::Failed, Some(error)),
            Outcome::Aborted => (ActionStatus::Aborted, None),
        }
    }
}

/// Worker loop: run queued actions in order until none is runnable.
async fn drain(inner: Arc<Inner>) {
    loop {
        let (job, halted) = {
            let mut queue = inner.lock();
            let Some(job) = queue.start_next() else {
                break;
            };
            inner.publish(StatusEvent::new(
                &inner.artifact_id,
                job.ordinal,
                ActionStatus::Running,
            ));
            (job, queue.is_halted())
        };

        debug!(ordinal = job.ordinal, kind = job.kind.name(), "Action running");

        let outcome = if halted {
            Outcome::Failed(SKIPPED_ERROR.to_string())
        } else {
            inner.execute(&job).await
        };
        let (status, error) = outcome.into_parts();

        match (&status, &error) {
            (ActionStatus::Failed, Some(reason)) => {
                error!(ordinal = job.ordinal, error = %reason, "Action failed")
            }
            _ => info!(ordinal = job.ordinal, %status, "Action finished"),
        }

        let mut queue = inner.lock();
        if status == ActionStatus::Failed
            && !halted
            && inner.ctx.config.failure_policy == FailurePolicy::Halt
        {
            queue.halt();
        }
        queue.finish(job.ordinal, status, error.clone());
        let mut event = StatusEvent::new(&inner.artifact_id, job.ordinal, status);
        event.error = error;
        inner.publish(event);
    }

    inner.idle.notify_waiters();
}

async fn pump_output(
    sink: Arc<dyn OutputSink>,
    artifact_id: String,
    ordinal: u32,
    mut output: mpsc::Receiver<String>,
) {
    while let Some(chunk) = output.recv().await {
        sink.write(&artifact_id, ordinal, &chunk);
    }
}
