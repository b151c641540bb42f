//! Append-only JSON-lines journal of run events.
//!
//! The journal is an operator aid. A write failure is logged and otherwise
//! ignored so it can never change the outcome of a run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::append_line;
use crate::orchestrator::state::PhaseStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStart {
        target: String,
        phases: Vec<String>,
        resume: bool,
    },
    PhaseStart {
        phase: String,
    },
    PhaseSkip {
        phase: String,
        reason: String,
    },
    TaskStart {
        phase: String,
        step: String,
        command: String,
        log: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
    TaskEnd {
        phase: String,
        step: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        ok: bool,
        elapsed_secs: f64,
    },
    StallAlert {
        phase: String,
        step: String,
        quiet_secs: u64,
        action: String,
    },
    Pause {
        phase: String,
        step: String,
    },
    Resume {
        phase: String,
        step: String,
        paused_secs: f64,
    },
    PhaseEnd {
        phase: String,
        status: PhaseStatus,
    },
    RunEnd {
        exit_code: i32,
        elapsed_secs: f64,
    },
}

#[derive(Serialize)]
struct EventLine<'a> {
    #[serde(flatten)]
    event: &'a RunEvent,
    run_id: &'a str,
    timestamp: DateTime<Utc>,
}

pub struct EventLog {
    path: PathBuf,
    run_id: String,
}

impl EventLog {
    pub fn new(path: PathBuf, run_id: &str) -> Self {
        Self {
            path,
            run_id: run_id.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: RunEvent) {
        let line = EventLine {
            event: &event,
            run_id: &self.run_id,
            timestamp: Utc::now(),
        };
        match serde_json::to_string(&line) {
            Ok(json) => append_line(&self.path, &json),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize run event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    fn read_events(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_events_are_tagged_json_lines() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("framework-run.jsonl"), "run-1");
        log.record(RunEvent::RunStart {
            target: "main".into(),
            phases: vec!["discovery".into(), "main".into()],
            resume: false,
        });
        log.record(RunEvent::PhaseEnd {
            phase: "discovery".into(),
            status: PhaseStatus::Completed,
        });

        let events = read_events(log.path());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "run_start");
        assert_eq!(events[0]["run_id"], "run-1");
        assert_eq!(events[0]["phases"][1], "main");
        assert!(events[0]["timestamp"].is_string());
        assert_eq!(events[1]["event"], "phase_end");
        assert_eq!(events[1]["status"], "completed");
    }

    #[test]
    fn test_optional_fields_omitted() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"), "r");
        log.record(RunEvent::TaskEnd {
            phase: "main".into(),
            step: "build".into(),
            exit_code: None,
            ok: false,
            elapsed_secs: 1.5,
        });
        let events = read_events(log.path());
        assert!(events[0].get("exit_code").is_none());
        assert_eq!(events[0]["ok"], false);
    }

    #[test]
    fn test_unwritable_journal_does_not_panic() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().to_path_buf(), "r");
        log.record(RunEvent::PhaseStart {
            phase: "main".into(),
        });
    }
}
