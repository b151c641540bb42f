use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::orchestrator::stall::StallAlert;

pub mod events;
pub mod summary;

pub use events::{EventLog, RunEvent};
pub use summary::SummaryReporter;

/// How a phase ended in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    /// `detail` is `exit=N`, `stalled`, `interrupted` or `spawn failed`.
    Failed { step: String, detail: String },
    Skipped,
    NotAttempted,
}

impl std::fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseOutcome::Completed => write!(f, "completed"),
            PhaseOutcome::Failed { step, detail } => {
                write!(f, "failed (step {} {})", step, detail)
            }
            PhaseOutcome::Skipped => write!(f, "skipped"),
            PhaseOutcome::NotAttempted => write!(f, "not attempted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    pub name: String,
    pub outcome: PhaseOutcome,
}

/// Everything the summary artifact reports about one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub exit_code: i32,
    pub phases: Vec<PhaseSummary>,
    pub stall_alerts: Vec<StallAlert>,
}

impl RunSummary {
    pub fn outcome(&self, phase: &str) -> Option<&PhaseOutcome> {
        self.phases
            .iter()
            .find(|p| p.name == phase)
            .map(|p| &p.outcome)
    }
}

/// Append one line to a side log. Failures are logged, never returned.
pub fn append_line(path: &Path, line: &str) {
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    })();
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "Failed to append to log");
    }
}

/// Record a stall alert in the alerts log with a timestamp prefix.
pub fn record_alert(alerts_file: &Path, alert: &StallAlert) {
    append_line(
        alerts_file,
        &format!(
            "{} {} action={}",
            Utc::now().to_rfc3339(),
            alert.message(),
            alert.action
        ),
    );
}
