use console::{Term, style};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit::append_line;
use crate::orchestrator::stall::StallAlert;
use crate::ui::icons::{ALERT, CHECK, CROSS, PAUSE, RUNNING, SKIP};

/// Point-in-time view of the run for `[STATUS]` lines.
#[derive(Debug, Clone)]
pub struct StatusSnapshot<'a> {
    pub phase: &'a str,
    pub run_id: &'a str,
    pub running: Option<&'a str>,
    pub done: usize,
    pub total: usize,
    pub elapsed: Duration,
}

/// Human-facing console output for a run.
///
/// Lines go to stdout; status lines are also appended to the status log so
/// they survive while console output is suppressed during a pause.
pub struct ProgressReporter {
    term: Term,
    status_file: PathBuf,
}

impl ProgressReporter {
    pub fn new(status_file: PathBuf) -> Self {
        Self {
            term: Term::stdout(),
            status_file,
        }
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    /// Print a line, falling back to `eprintln!` if stdout is unavailable.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.term.write_line(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn run_header(&self, run_id: &str, target: &str, phases: &[&str]) {
        self.print_line(format!(
            "{} run {} target={} phases={}",
            style("conductor").bold(),
            style(run_id).dim(),
            style(target).yellow().bold(),
            phases.join(",")
        ));
    }

    pub fn phase_start(&self, phase: &str, index: usize, total: usize) {
        self.print_line(format!(
            "\n{}Phase {} ({}/{})",
            RUNNING,
            style(phase).yellow().bold(),
            index,
            total
        ));
    }

    pub fn phase_skipped(&self, phase: &str) {
        self.print_line(format!(
            "{}[RESUME] skip {} (already completed)",
            SKIP,
            style(phase).dim()
        ));
    }

    pub fn phase_complete(&self, phase: &str) {
        self.print_line(format!(
            "{}Phase {} complete",
            CHECK,
            style(phase).green().bold()
        ));
    }

    pub fn phase_failed(&self, phase: &str, reason: &str) {
        self.print_line(format!(
            "{}Phase {} failed: {}",
            CROSS,
            style(phase).red().bold(),
            reason
        ));
    }

    pub fn step_start(&self, phase: &str, step: &str, log: &Path) {
        self.print_line(format!(
            "  {} {}/{} {}",
            style("→").cyan(),
            phase,
            style(step).cyan(),
            style(format!("(log: {})", log.display())).dim()
        ));
    }

    pub fn step_done(&self, phase: &str, step: &str, exit_code: i32, elapsed: Duration) {
        let code = if exit_code == 0 {
            style(format!("exit={}", exit_code)).green()
        } else {
            style(format!("exit={}", exit_code)).red()
        };
        self.print_line(format!(
            "  {} {}/{} {} elapsed={}",
            style("←").cyan(),
            phase,
            step,
            code,
            format_mmss(elapsed)
        ));
    }

    pub fn running(&self, phase: &str, step: &str, elapsed: Duration) {
        self.print_line(style(running_line(phase, step, elapsed)).dim().to_string());
    }

    /// Record a status line; `console` controls whether it is also printed.
    pub fn status(&self, snapshot: &StatusSnapshot<'_>, console: bool) {
        let line = status_line(snapshot);
        append_line(&self.status_file, &line);
        if console {
            self.print_line(style(line).dim().to_string());
        }
    }

    pub fn paused(&self, phase: &str, step: &str, marker: &Path) {
        self.print_line(format!(
            "{}{} {}/{} waiting for {} to be removed",
            PAUSE,
            style("[PAUSED]").yellow().bold(),
            phase,
            step,
            marker.display()
        ));
    }

    pub fn resumed(&self, phase: &str, step: &str, paused_for: Duration) {
        self.print_line(format!(
            "{} {}/{} after {}",
            style("[RESUMED]").green().bold(),
            phase,
            step,
            format_mmss(paused_for)
        ));
    }

    pub fn stall_alert(&self, alert: &StallAlert) {
        self.print_line(format!(
            "{}{} action={}",
            ALERT,
            style(alert.message()).red().bold(),
            alert.action
        ));
    }

    pub fn interrupted(&self) {
        self.print_line(format!(
            "{}{}",
            CROSS,
            style("Interrupted, stopping the current step").red()
        ));
    }
}

pub fn running_line(phase: &str, step: &str, elapsed: Duration) -> String {
    format!("[RUNNING] {}/{} elapsed={}", phase, step, format_mmss(elapsed))
}

pub fn status_line(s: &StatusSnapshot<'_>) -> String {
    format!(
        "[STATUS] phase={} run_id={} running={} done={}/{} elapsed={}",
        s.phase,
        s.run_id,
        s.running.unwrap_or("-"),
        s.done,
        s.total,
        format_hms(s.elapsed)
    )
}

/// `MM:SS`, with minutes growing past 59 rather than wrapping.
pub fn format_mmss(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn format_hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_duration_formats() {
        assert_eq!(format_mmss(Duration::from_secs(65)), "01:05");
        assert_eq!(format_mmss(Duration::from_secs(3725)), "62:05");
        assert_eq!(format_hms(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_hms(Duration::ZERO), "00:00:00");
    }

    #[test]
    fn test_running_line() {
        assert_eq!(
            running_line("discovery", "interview", Duration::from_secs(42)),
            "[RUNNING] discovery/interview elapsed=00:42"
        );
    }

    #[test]
    fn test_status_line() {
        let snapshot = StatusSnapshot {
            phase: "main",
            run_id: "run-1",
            running: Some("build"),
            done: 1,
            total: 3,
            elapsed: Duration::from_secs(61),
        };
        assert_eq!(
            status_line(&snapshot),
            "[STATUS] phase=main run_id=run-1 running=build done=1/3 elapsed=00:01:01"
        );
    }

    #[test]
    fn test_status_recorded_even_when_console_suppressed() {
        let dir = tempdir().unwrap();
        let reporter = ProgressReporter::new(dir.path().join("protocol-status.log"));
        let snapshot = StatusSnapshot {
            phase: "discovery",
            run_id: "r",
            running: None,
            done: 0,
            total: 1,
            elapsed: Duration::from_secs(5),
        };
        reporter.status(&snapshot, false);
        reporter.status(&snapshot, true);
        let content = std::fs::read_to_string(reporter.status_file()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("running=-"));
    }
}
