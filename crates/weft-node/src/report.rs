//! End-of-run execution report.

use std::fmt::Write;

use serde::Serialize;
use weft_core::{ActionKind, ActionRecord, ActionStatus};

/// Counts of actions by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub complete: usize,
    pub failed: usize,
    pub aborted: usize,
    /// Actions that never ran, usually because their content never arrived.
    pub pending: usize,
}

/// What happened to every action of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Stream id the transcript was parsed under.
    pub stream_id: String,

    /// Every action in artifact opening order.
    pub actions: Vec<ActionRecord>,

    pub summary: Summary,
}

impl Report {
    pub fn new(stream_id: impl Into<String>, actions: Vec<ActionRecord>) -> Self {
        let mut summary = Summary {
            total: actions.len(),
            ..Summary::default()
        };
        for action in &actions {
            match action.status {
                ActionStatus::Complete => summary.complete += 1,
                ActionStatus::Failed => summary.failed += 1,
                ActionStatus::Aborted => summary.aborted += 1,
                ActionStatus::Pending | ActionStatus::Running => summary.pending += 1,
            }
        }

        Self {
            stream_id: stream_id.into(),
            actions,
            summary,
        }
    }

    /// True when at least one action failed.
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text table, one row per action.
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<16} {:>3}  {:<8} {:<9} {:>8}  DETAIL",
            "ARTIFACT", "#", "KIND", "STATUS", "TIME"
        );
        for action in &self.actions {
            let time = action
                .duration_ms()
                .map(|ms| format!("{ms}ms"))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<16} {:>3}  {:<8} {:<9} {:>8}  {}",
                action.artifact_id,
                action.ordinal,
                action.kind.name(),
                action.status.to_string(),
                time,
                detail(action)
            );
        }
        let s = &self.summary;
        let _ = writeln!(
            out,
            "{} actions: {} complete, {} failed, {} aborted, {} pending",
            s.total, s.complete, s.failed, s.aborted, s.pending
        );
        out
    }
}

fn detail(action: &ActionRecord) -> String {
    if let Some(error) = &action.error {
        return error.clone();
    }
    match &action.kind {
        ActionKind::File { file_path } => file_path.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(ordinal: u32, kind: ActionKind, status: ActionStatus, error: Option<&str>) -> ActionRecord {
        let started = Utc::now();
        ActionRecord {
            artifact_id: "proj".into(),
            ordinal,
            kind,
            status,
            ready: true,
            error: error.map(str::to_string),
            started_at: Some(started),
            finished_at: Some(started + Duration::milliseconds(12)),
        }
    }

    fn sample() -> Report {
        Report::new(
            "turn-1",
            vec![
                record(
                    0,
                    ActionKind::File {
                        file_path: "src/index.js".into(),
                    },
                    ActionStatus::Complete,
                    None,
                ),
                record(
                    1,
                    ActionKind::Shell,
                    ActionStatus::Failed,
                    Some("command exited with code 1"),
                ),
                record(2, ActionKind::Shell, ActionStatus::Aborted, None),
            ],
        )
    }

    #[test]
    fn test_summary_counts() {
        let report = sample();
        assert_eq!(
            report.summary,
            Summary {
                total: 3,
                complete: 1,
                failed: 1,
                aborted: 1,
                pending: 0,
            }
        );
        assert!(report.has_failures());
        assert!(!Report::new("x", Vec::new()).has_failures());
    }

    #[test]
    fn test_table_rows() {
        let table = sample().to_table();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("src/index.js"));
        assert!(lines[1].contains("12ms"));
        assert!(lines[2].contains("command exited with code 1"));
        assert!(lines[3].contains("aborted"));
        assert_eq!(lines[4], "3 actions: 1 complete, 1 failed, 1 aborted, 0 pending");
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["stream_id"], "turn-1");
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["actions"][0]["kind"]["type"], "file");
        assert_eq!(json["actions"][2]["status"], "aborted");
    }
}
