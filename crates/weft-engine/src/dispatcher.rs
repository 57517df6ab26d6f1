//! Routes parser events to per-artifact engines.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{info, warn};
use weft_core::{ActionKind, ActionRecord, DirectiveHandler, Result, StatusEvent, WeftError};
use weft_runtime::Runtime;

use crate::engine::{ArtifactEngine, EngineContext};

/// Owns one [`ArtifactEngine`] per artifact and feeds them from parser events.
///
/// Artifacts execute independently of each other; only actions within the
/// same artifact are serialized.
#[derive(Debug)]
pub struct Dispatcher {
    ctx: EngineContext,
    /// Engines in the order their artifacts opened.
    engines: Mutex<Vec<ArtifactEngine>>,
}

impl Dispatcher {
    /// Create a dispatcher with a default context over `runtime`.
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self::with_context(EngineContext::new(runtime))
    }

    pub fn with_context(ctx: EngineContext) -> Self {
        Self {
            ctx,
            engines: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ArtifactEngine>> {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the engine for an artifact, or return the existing one if the
    /// id was already opened.
    pub fn open(&self, artifact_id: &str, title: &str) -> ArtifactEngine {
        let mut engines = self.lock();
        if let Some(existing) = engines.iter().find(|e| e.artifact_id() == artifact_id) {
            warn!(artifact_id, "Artifact id reused; keeping the existing queue");
            return existing.clone();
        }

        info!(artifact_id, title, "Artifact opened");
        let engine = ArtifactEngine::new(artifact_id, self.ctx.clone());
        engines.push(engine.clone());
        engine
    }

    /// Engine for `artifact_id`, if it was opened.
    pub fn engine(&self, artifact_id: &str) -> Option<ArtifactEngine> {
        self.lock()
            .iter()
            .find(|e| e.artifact_id() == artifact_id)
            .cloned()
    }

    /// Every engine, in opening order.
    pub fn engines(&self) -> Vec<ArtifactEngine> {
        self.lock().clone()
    }

    fn known(&self, artifact_id: &str, ordinal: u32) -> Option<ArtifactEngine> {
        let engine = self.engine(artifact_id);
        if engine.is_none() {
            warn!(artifact_id, ordinal, "Action for unknown artifact");
        }
        engine
    }

    /// Register a pending action on its artifact.
    pub fn register(&self, artifact_id: &str, ordinal: u32, kind: &ActionKind) -> bool {
        self.known(artifact_id, ordinal)
            .is_some_and(|engine| engine.register(ordinal, kind.clone()))
    }

    /// Hand an action's final content to its artifact's engine.
    pub fn enqueue(&self, artifact_id: &str, ordinal: u32, kind: &ActionKind, content: &str) -> bool {
        self.known(artifact_id, ordinal)
            .is_some_and(|engine| engine.enqueue(ordinal, kind.clone(), content))
    }

    pub fn close(&self, artifact_id: &str) {
        if let Some(engine) = self.engine(artifact_id) {
            engine.close();
        }
    }

    /// Request cancellation of one action.
    pub fn cancel(&self, artifact_id: &str, ordinal: u32) -> Result<bool> {
        let engine = self
            .engine(artifact_id)
            .ok_or_else(|| WeftError::UnknownArtifact {
                artifact_id: artifact_id.to_string(),
            })?;
        engine.cancel(ordinal)
    }

    /// Request cancellation of every unfinished action in every artifact.
    pub fn cancel_all(&self) -> usize {
        self.engines().iter().map(ArtifactEngine::cancel_all).sum()
    }

    /// Records for every action, grouped by artifact in opening order.
    pub fn snapshot(&self) -> Vec<ActionRecord> {
        self.engines()
            .iter()
            .flat_map(ArtifactEngine::snapshot)
            .collect()
    }

    /// Wait until every engine is idle, including engines opened while waiting.
    pub async fn settled(&self) {
        loop {
            let engines = self.engines();
            join_all(engines.iter().map(|engine| engine.settled())).await;

            let current = self.engines();
            if current.len() == engines.len() && current.iter().all(ArtifactEngine::is_idle) {
                return;
            }
        }
    }

    /// Subscribe to status changes from every artifact.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.ctx.hub.subscribe()
    }
}

/// Parser events are fed through a shared reference.
impl DirectiveHandler for &Dispatcher {
    fn artifact_opened(&mut self, artifact_id: &str, title: &str) {
        self.open(artifact_id, title);
    }

    fn action_ready(&mut self, artifact_id: &str, ordinal: u32, kind: &ActionKind) {
        self.register(artifact_id, ordinal, kind);
    }

    fn action_closed(&mut self, artifact_id: &str, ordinal: u32, kind: &ActionKind, content: &str) {
        self.enqueue(artifact_id, ordinal, kind, content);
    }

    fn artifact_closed(&mut self, artifact_id: &str) {
        self.close(artifact_id);
    }
}
