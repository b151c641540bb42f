use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::RunSummary;
use crate::ui::format_hms;

/// Writes the markdown run summary, overwriting any previous one.
pub struct SummaryReporter {
    path: PathBuf,
}

impl SummaryReporter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the summary. Returns whether it landed on disk; failures are
    /// logged and never propagate.
    pub fn write(&self, summary: &RunSummary) -> bool {
        match self.try_write(summary) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Wrote run summary");
                true
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %format!("{e:#}"), "Failed to write run summary");
                false
            }
        }
    }

    fn try_write(&self, summary: &RunSummary) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, render(summary))
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// Markdown body of the summary artifact.
pub fn render(summary: &RunSummary) -> String {
    let phases: Vec<String> = if summary.phases.is_empty() {
        vec!["- (none)".to_string()]
    } else {
        summary
            .phases
            .iter()
            .map(|phase| format!("- {}: {}", phase.name, phase.outcome))
            .collect()
    };
    let alerts: Vec<String> = if summary.stall_alerts.is_empty() {
        vec!["- none".to_string()]
    } else {
        summary
            .stall_alerts
            .iter()
            .map(|alert| {
                format!(
                    "- {}/{} quiet {}s ({})",
                    alert.phase,
                    alert.step,
                    alert.quiet.as_secs(),
                    alert.action
                )
            })
            .collect()
    };

    format!(
        "# Orchestrator Run Summary\n\n\
         - Run ID: {}\n\
         - Target: {}\n\
         - Started: {}\n\
         - Finished: {}\n\
         - Elapsed: {}\n\
         - Exit code: {}\n\n\
         ## Phases\n{}\n\n\
         ## Stall alerts\n{}\n",
        summary.run_id,
        summary.target,
        summary.started_at.to_rfc3339(),
        summary.finished_at.to_rfc3339(),
        format_hms(summary.elapsed),
        summary.exit_code,
        phases.join("\n"),
        alerts.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{PhaseOutcome, PhaseSummary};
    use crate::orchestrator::stall::{StallAction, StallAlert};
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn summary() -> RunSummary {
        RunSummary {
            run_id: "run-1".into(),
            target: "post".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            elapsed: Duration::from_secs(3725),
            exit_code: 3,
            phases: vec![
                PhaseSummary {
                    name: "discovery".into(),
                    outcome: PhaseOutcome::Skipped,
                },
                PhaseSummary {
                    name: "main".into(),
                    outcome: PhaseOutcome::Failed {
                        step: "build".into(),
                        detail: "exit=3".into(),
                    },
                },
                PhaseSummary {
                    name: "post".into(),
                    outcome: PhaseOutcome::NotAttempted,
                },
            ],
            stall_alerts: vec![StallAlert {
                phase: "main".into(),
                step: "build".into(),
                log_path: PathBuf::from("main-build.log"),
                quiet: Duration::from_secs(901),
                action: StallAction::AlertOnly,
            }],
        }
    }

    #[test]
    fn test_render_lists_phases_and_alerts() {
        let text = render(&summary());
        assert!(text.starts_with("# Orchestrator Run Summary"));
        assert!(text.contains("- Elapsed: 01:02:05"));
        assert!(text.contains("- Exit code: 3"));
        assert!(text.contains("- discovery: skipped"));
        assert!(text.contains("- main: failed (step build exit=3)"));
        assert!(text.contains("- post: not attempted"));
        assert!(text.contains("- main/build quiet 901s (alert-only)"));
    }

    #[test]
    fn test_render_section_layout_when_empty() {
        let mut empty = summary();
        empty.phases.clear();
        empty.stall_alerts.clear();
        let text = render(&empty);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# Orchestrator Run Summary");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "- Run ID: run-1");
        assert_eq!(lines[3], "- Target: post");
        assert_eq!(lines[7], "- Exit code: 3");
        assert_eq!(&lines[8..], ["", "## Phases", "- (none)", "", "## Stall alerts", "- none"]);
        assert!(text.ends_with("- none\n"));
    }

    #[test]
    fn test_write_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs/orchestrator-run-summary.md");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale content from a previous run").unwrap();

        let reporter = SummaryReporter::new(path.clone());
        assert!(reporter.write(&summary()));
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale content"));
        assert!(content.contains("Run ID: run-1"));
    }

    #[test]
    fn test_write_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("docs");
        fs::write(&blocker, "a file where a directory should be").unwrap();
        let reporter = SummaryReporter::new(blocker.join("summary.md"));
        assert!(!reporter.write(&summary()));
    }
}
