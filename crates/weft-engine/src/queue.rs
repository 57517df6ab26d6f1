//! Ordered action queue for a single artifact.
//!
//! The queue is a list of entries in arrival order plus a cursor to the next
//! entry to start. Only one entry is ever running: the worker takes the
//! entry under the cursor once its content has arrived, and takes the next
//! one only after reporting the previous one finished.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use weft_core::{ActionKind, ActionRecord, ActionStatus, Result, WeftError};

/// One action held by the queue.
#[derive(Debug, Clone)]
struct Entry {
    ordinal: u32,
    kind: ActionKind,
    /// Final content, once the closing tag has been parsed.
    content: Option<String>,
    status: ActionStatus,
    error: Option<String>,
    token: CancellationToken,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// Work handed to the worker for one action.
#[derive(Debug, Clone)]
pub struct Job {
    pub ordinal: u32,
    pub kind: ActionKind,
    pub content: String,
    pub token: CancellationToken,
}

/// Result of supplying an action's final content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Content accepted for an action that was already registered.
    Ready,
    /// The action was unknown and has been appended with its content.
    Appended,
    /// The action already had content; nothing changed.
    Duplicate,
}

/// Queue state for one artifact.
#[derive(Debug, Default)]
pub struct ActionQueue {
    entries: Vec<Entry>,
    /// Index of the next entry to start.
    next: usize,
    /// Whether a worker task currently owns the queue.
    draining: bool,
    /// Set once an action failed under the halting policy.
    halted: bool,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, ordinal: u32) -> Option<&Entry> {
        self.entries.iter().find(|e| e.ordinal == ordinal)
    }

    fn entry_mut(&mut self, ordinal: u32) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.ordinal == ordinal)
    }

    /// Record an action as pending. Returns false if it is already known.
    pub fn register(&mut self, ordinal: u32, kind: ActionKind) -> bool {
        if self.entry(ordinal).is_some() {
            return false;
        }
        self.entries.push(Entry {
            ordinal,
            kind,
            content: None,
            status: ActionStatus::Pending,
            error: None,
            token: CancellationToken::new(),
            started_at: None,
            finished_at: None,
        });
        true
    }

    /// Supply the final content of an action, appending it if unknown.
    pub fn supply(&mut self, ordinal: u32, kind: ActionKind, content: String) -> Enqueued {
        match self.entry_mut(ordinal) {
            Some(entry) if entry.content.is_some() => Enqueued::Duplicate,
            Some(entry) => {
                entry.kind = kind;
                entry.content = Some(content);
                Enqueued::Ready
            }
            None => {
                self.register(ordinal, kind);
                if let Some(entry) = self.entries.last_mut() {
                    entry.content = Some(content);
                }
                Enqueued::Appended
            }
        }
    }

    /// Claim the worker role. Returns false if a worker is already active.
    pub fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    /// Give up the worker role without running anything.
    pub fn end_drain(&mut self) {
        self.draining = false;
    }

    /// Take the next runnable action and mark it running. Releases the
    /// worker role and returns `None` when nothing is runnable.
    pub fn start_next(&mut self) -> Option<Job> {
        let runnable = self
            .entries
            .get(self.next)
            .is_some_and(|e| e.content.is_some());
        if !runnable {
            self.draining = false;
            return None;
        }

        let entry = &mut self.entries[self.next];
        self.next += 1;
        entry.status = ActionStatus::Running;
        entry.started_at = Some(Utc::now());

        Some(Job {
            ordinal: entry.ordinal,
            kind: entry.kind.clone(),
            content: entry.content.clone().unwrap_or_default(),
            token: entry.token.clone(),
        })
    }

    /// Record the terminal status of a running action.
    pub fn finish(&mut self, ordinal: u32, status: ActionStatus, error: Option<String>) {
        if let Some(entry) = self.entry_mut(ordinal) {
            entry.status = status;
            entry.error = error;
            entry.finished_at = Some(Utc::now());
        }
    }

    /// Request cancellation. Returns false if the action already finished.
    pub fn cancel(&mut self, artifact_id: &str, ordinal: u32) -> Result<bool> {
        let entry = self.entry(ordinal).ok_or_else(|| WeftError::UnknownAction {
            artifact_id: artifact_id.to_string(),
            ordinal,
        })?;
        if entry.status.is_terminal() {
            return Ok(false);
        }
        entry.token.cancel();
        Ok(true)
    }

    /// Request cancellation of every unfinished action.
    pub fn cancel_all(&mut self) -> usize {
        let mut count = 0;
        for entry in self.entries.iter().filter(|e| !e.status.is_terminal()) {
            entry.token.cancel();
            count += 1;
        }
        count
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn status(&self, ordinal: u32) -> Option<ActionStatus> {
        self.entry(ordinal).map(|e| e.status)
    }

    /// True when no worker is active and every action whose content has
    /// arrived is terminal. Actions still waiting for content are not
    /// counted, so a stream that ends mid-action still settles.
    pub fn is_idle(&self) -> bool {
        !self.draining
            && self
                .entries
                .iter()
                .all(|e| e.content.is_none() || e.status.is_terminal())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time records for every action, in queue order.
    pub fn records(&self, artifact_id: &str) -> Vec<ActionRecord> {
        self.entries
            .iter()
            .map(|e| ActionRecord {
                artifact_id: artifact_id.to_string(),
                ordinal: e.ordinal,
                kind: e.kind.clone(),
                status: e.status,
                ready: e.content.is_some(),
                error: e.error.clone(),
                started_at: e.started_at,
                finished_at: e.finished_at,
            })
            .collect()
    }
}
