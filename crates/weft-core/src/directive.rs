//! Directive lifecycle events produced by the streaming parser.
//!
//! Events are delivered synchronously and in document order through a
//! [`DirectiveHandler`]. A `Vec<DirectiveEvent>` is itself a handler that
//! simply records everything it is given.

use serde::{Deserialize, Serialize};

use crate::types::ActionKind;

/// A lifecycle event for an artifact or action tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DirectiveEvent {
    /// The opening artifact tag was fully parsed.
    ArtifactOpened { artifact_id: String, title: String },

    /// The opening action tag was fully parsed; the payload is still arriving.
    ActionReady {
        artifact_id: String,
        ordinal: u32,
        kind: ActionKind,
    },

    /// The closing action tag was seen; `content` is final.
    ActionClosed {
        artifact_id: String,
        ordinal: u32,
        kind: ActionKind,
        content: String,
    },

    /// The closing artifact tag was seen.
    ArtifactClosed { artifact_id: String },
}

impl DirectiveEvent {
    /// The artifact this event belongs to.
    pub fn artifact_id(&self) -> &str {
        match self {
            DirectiveEvent::ArtifactOpened { artifact_id, .. }
            | DirectiveEvent::ActionReady { artifact_id, .. }
            | DirectiveEvent::ActionClosed { artifact_id, .. }
            | DirectiveEvent::ArtifactClosed { artifact_id } => artifact_id,
        }
    }
}

/// Receives directive events while a chunk is being consumed.
///
/// Every method has an empty default so implementors only override what
/// they care about.
pub trait DirectiveHandler {
    /// Called when an artifact's opening tag attributes are known.
    fn artifact_opened(&mut self, _artifact_id: &str, _title: &str) {}

    /// Called when an action's opening tag attributes are known.
    fn action_ready(&mut self, _artifact_id: &str, _ordinal: u32, _kind: &ActionKind) {}

    /// Called when an action's closing tag is seen.
    fn action_closed(&mut self, _artifact_id: &str, _ordinal: u32, _kind: &ActionKind, _content: &str) {}

    /// Called when an artifact's closing tag is seen.
    fn artifact_closed(&mut self, _artifact_id: &str) {}

    /// Dispatch an owned event to the matching method.
    fn handle(&mut self, event: &DirectiveEvent) {
        match event {
            DirectiveEvent::ArtifactOpened { artifact_id, title } => {
                self.artifact_opened(artifact_id, title)
            }
            DirectiveEvent::ActionReady {
                artifact_id,
                ordinal,
                kind,
            } => self.action_ready(artifact_id, *ordinal, kind),
            DirectiveEvent::ActionClosed {
                artifact_id,
                ordinal,
                kind,
                content,
            } => self.action_closed(artifact_id, *ordinal, kind, content),
            DirectiveEvent::ArtifactClosed { artifact_id } => self.artifact_closed(artifact_id),
        }
    }
}

impl DirectiveHandler for Vec<DirectiveEvent> {
    fn artifact_opened(&mut self, artifact_id: &str, title: &str) {
        self.push(DirectiveEvent::ArtifactOpened {
            artifact_id: artifact_id.to_string(),
            title: title.to_string(),
        });
    }

    fn action_ready(&mut self, artifact_id: &str, ordinal: u32, kind: &ActionKind) {
        self.push(DirectiveEvent::ActionReady {
            artifact_id: artifact_id.to_string(),
            ordinal,
            kind: kind.clone(),
        });
    }

    fn action_closed(&mut self, artifact_id: &str, ordinal: u32, kind: &ActionKind, content: &str) {
        self.push(DirectiveEvent::ActionClosed {
            artifact_id: artifact_id.to_string(),
            ordinal,
            kind: kind.clone(),
            content: content.to_string(),
        });
    }

    fn artifact_closed(&mut self, artifact_id: &str) {
        self.push(DirectiveEvent::ArtifactClosed {
            artifact_id: artifact_id.to_string(),
        });
    }
}

impl<H: DirectiveHandler + ?Sized> DirectiveHandler for &mut H {
    fn artifact_opened(&mut self, artifact_id: &str, title: &str) {
        (**self).artifact_opened(artifact_id, title)
    }

    fn action_ready(&mut self, artifact_id: &str, ordinal: u32, kind: &ActionKind) {
        (**self).action_ready(artifact_id, ordinal, kind)
    }

    fn action_closed(&mut self, artifact_id: &str, ordinal: u32, kind: &ActionKind, content: &str) {
        (**self).action_closed(artifact_id, ordinal, kind, content)
    }

    fn artifact_closed(&mut self, artifact_id: &str) {
        (**self).artifact_closed(artifact_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_handler_records_in_order() {
        let mut events: Vec<DirectiveEvent> = Vec::new();
        events.artifact_opened("a1", "Demo");
        events.action_ready("a1", 0, &ActionKind::Shell);
        events.action_closed("a1", 0, &ActionKind::Shell, "ls");
        events.artifact_closed("a1");

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], DirectiveEvent::ArtifactOpened { .. }));
        assert!(matches!(events[3], DirectiveEvent::ArtifactClosed { .. }));
        assert!(events.iter().all(|e| e.artifact_id() == "a1"));
    }

    #[test]
    fn test_handle_replays_events() {
        let recorded = vec![
            DirectiveEvent::ArtifactOpened {
                artifact_id: "a1".into(),
                title: "t".into(),
            },
            DirectiveEvent::ArtifactClosed {
                artifact_id: "a1".into(),
            },
        ];

        let mut replayed: Vec<DirectiveEvent> = Vec::new();
        for event in &recorded {
            replayed.handle(event);
        }
        assert_eq!(recorded, replayed);
    }

    #[test]
    fn test_forwarding_through_mut_ref() {
        fn feed(mut handler: impl DirectiveHandler) {
            handler.artifact_closed("z");
        }

        let mut events: Vec<DirectiveEvent> = Vec::new();
        feed(&mut events);
        assert_eq!(events.len(), 1);
    }
}
