//! Log-mtime based liveness detection for the running step.
//!
//! The agent is opaque, so the only liveness signal is its log file being
//! modified. The detector is a small state machine driven by the scheduler's
//! poll loop; the clock is passed in so tests can drive it deterministically.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallState {
    Idle,
    Watching,
    Stale,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallAction {
    AlertOnly,
    Killed,
}

impl std::fmt::Display for StallAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StallAction::AlertOnly => write!(f, "alert-only"),
            StallAction::Killed => write!(f, "killed"),
        }
    }
}

/// A step went quiet for longer than the stall timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct StallAlert {
    pub phase: String,
    pub step: String,
    pub log_path: PathBuf,
    pub quiet: Duration,
    pub action: StallAction,
}

impl StallAlert {
    pub fn message(&self) -> String {
        format!(
            "[ALERT] step '{}/{}' stalled for {}s (log: {})",
            self.phase,
            self.step,
            self.quiet.as_secs(),
            self.log_path.display()
        )
    }
}

/// Last observed log activity for the current step.
#[derive(Debug, Clone)]
struct LogActivity {
    last_seen: Instant,
    last_mtime: Option<SystemTime>,
}

struct Watched {
    phase: String,
    step: String,
    log_path: PathBuf,
    activity: LogActivity,
    paused_at: Option<Instant>,
}

pub struct StallDetector {
    timeout: Duration,
    kill_enabled: bool,
    state: StallState,
    watched: Option<Watched>,
}

impl StallDetector {
    /// A zero `timeout` disables alerts entirely.
    pub fn new(timeout: Duration, kill_enabled: bool) -> Self {
        Self {
            timeout,
            kill_enabled,
            state: StallState::Idle,
            watched: None,
        }
    }

    pub fn state(&self) -> StallState {
        self.state
    }

    pub fn kill_enabled(&self) -> bool {
        self.kill_enabled
    }

    /// Begin watching a freshly started step.
    pub fn start(&mut self, phase: &str, step: &str, log_path: &Path, now: Instant) {
        self.watched = Some(Watched {
            phase: phase.to_string(),
            step: step.to_string(),
            log_path: log_path.to_path_buf(),
            activity: LogActivity {
                last_seen: now,
                last_mtime: log_mtime(log_path),
            },
            paused_at: None,
        });
        self.state = StallState::Watching;
    }

    /// Re-stat the log and evaluate staleness.
    pub fn tick(&mut self, now: Instant) -> Option<StallAlert> {
        let mtime = self.watched.as_ref().and_then(|w| log_mtime(&w.log_path));
        self.observe(mtime, now)
    }

    /// Evaluate staleness given the log's current modification time.
    pub fn observe(&mut self, mtime: Option<SystemTime>, now: Instant) -> Option<StallAlert> {
        if !matches!(self.state, StallState::Watching | StallState::Stale) {
            return None;
        }
        let watched = self.watched.as_mut()?;
        if watched.paused_at.is_some() {
            return None;
        }

        if mtime.is_some() && mtime != watched.activity.last_mtime {
            watched.activity.last_mtime = mtime;
            watched.activity.last_seen = now;
            self.state = StallState::Watching;
            return None;
        }

        if self.timeout.is_zero() || self.state == StallState::Stale {
            return None;
        }

        let quiet = now.saturating_duration_since(watched.activity.last_seen);
        if quiet <= self.timeout {
            return None;
        }

        self.state = StallState::Stale;
        Some(StallAlert {
            phase: watched.phase.clone(),
            step: watched.step.clone(),
            log_path: watched.log_path.clone(),
            quiet,
            action: if self.kill_enabled {
                StallAction::Killed
            } else {
                StallAction::AlertOnly
            },
        })
    }

    /// Stop the quiet-period clock while the step is paused.
    pub fn pause(&mut self, now: Instant) {
        if let Some(watched) = self.watched.as_mut()
            && watched.paused_at.is_none()
        {
            watched.paused_at = Some(now);
        }
    }

    /// Restart the clock, discounting the time spent paused.
    pub fn resume(&mut self, now: Instant) {
        if let Some(watched) = self.watched.as_mut()
            && let Some(paused_at) = watched.paused_at.take()
        {
            let paused_for = now.saturating_duration_since(paused_at);
            watched.activity.last_seen += paused_for;
        }
    }

    /// The stalled step was terminated.
    pub fn mark_killed(&mut self) {
        if self.state == StallState::Stale {
            self.state = StallState::Killed;
        }
    }

    /// The step's process exited; stop watching regardless of stall state.
    pub fn finish(&mut self) {
        self.watched = None;
        self.state = StallState::Idle;
    }
}

fn log_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn at(secs: u64) -> Option<SystemTime> {
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    fn watching(timeout: u64, kill: bool) -> (StallDetector, Instant) {
        let mut detector = StallDetector::new(Duration::from_secs(timeout), kill);
        let t0 = Instant::now();
        detector.start("main", "build", Path::new("/nonexistent/build.log"), t0);
        (detector, t0)
    }

    #[test]
    fn test_start_transitions_to_watching() {
        let (detector, _) = watching(10, false);
        assert_eq!(detector.state(), StallState::Watching);
    }

    #[test]
    fn test_alert_fires_only_after_timeout() {
        let (mut detector, t0) = watching(10, false);
        let poll = Duration::from_secs(2);

        let mut fired_at = None;
        for tick in 1..=10 {
            let now = t0 + poll * tick;
            if let Some(alert) = detector.observe(None, now) {
                fired_at = Some(now);
                assert_eq!(alert.action, StallAction::AlertOnly);
                assert!(alert.quiet > Duration::from_secs(10));
                break;
            }
        }
        let fired_at = fired_at.expect("alert should fire");
        let elapsed = fired_at - t0;
        assert!(elapsed > Duration::from_secs(10));
        assert!(elapsed <= Duration::from_secs(10) + poll);
        assert_eq!(detector.state(), StallState::Stale);
    }

    #[test]
    fn test_no_alert_at_exact_timeout() {
        let (mut detector, t0) = watching(10, false);
        assert!(detector.observe(None, t0 + Duration::from_secs(10)).is_none());
        assert!(detector.observe(None, t0 + Duration::from_secs(11)).is_some());
    }

    #[test]
    fn test_log_activity_resets_clock() {
        let (mut detector, t0) = watching(10, false);
        assert!(detector.observe(at(100), t0 + Duration::from_secs(8)).is_none());
        assert!(detector.observe(at(100), t0 + Duration::from_secs(16)).is_none());
        assert!(detector.observe(at(100), t0 + Duration::from_secs(19)).is_some());
    }

    #[test]
    fn test_alert_emitted_once_until_activity_resumes() {
        let (mut detector, t0) = watching(5, false);
        assert!(detector.observe(None, t0 + Duration::from_secs(6)).is_some());
        assert!(detector.observe(None, t0 + Duration::from_secs(8)).is_none());

        assert!(detector.observe(at(1), t0 + Duration::from_secs(9)).is_none());
        assert_eq!(detector.state(), StallState::Watching);
        assert!(detector.observe(at(1), t0 + Duration::from_secs(15)).is_some());
    }

    #[test]
    fn test_kill_policy_marks_action_and_state() {
        let (mut detector, t0) = watching(5, true);
        let alert = detector.observe(None, t0 + Duration::from_secs(6)).unwrap();
        assert_eq!(alert.action, StallAction::Killed);
        detector.mark_killed();
        assert_eq!(detector.state(), StallState::Killed);
        assert!(detector.observe(None, t0 + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_pause_suspends_clock() {
        let (mut detector, t0) = watching(10, false);
        detector.pause(t0 + Duration::from_secs(5));
        assert!(detector.observe(None, t0 + Duration::from_secs(100)).is_none());
        detector.resume(t0 + Duration::from_secs(100));

        // 5s quiet before the pause, so the alert is due 5s after resuming.
        assert!(detector.observe(None, t0 + Duration::from_secs(105)).is_none());
        assert!(detector.observe(None, t0 + Duration::from_secs(106)).is_some());
    }

    #[test]
    fn test_finish_returns_to_idle() {
        let (mut detector, t0) = watching(5, false);
        detector.observe(None, t0 + Duration::from_secs(6));
        detector.finish();
        assert_eq!(detector.state(), StallState::Idle);
        assert!(detector.observe(None, t0 + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_zero_timeout_disables_alerts() {
        let (mut detector, t0) = watching(0, true);
        assert!(detector.observe(None, t0 + Duration::from_secs(3600)).is_none());
    }

    #[test]
    fn test_tick_reads_real_log_mtime() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("step.log");
        std::fs::write(&log, "start\n").unwrap();

        let mut detector = StallDetector::new(Duration::from_secs(1), false);
        let t0 = Instant::now();
        detector.start("main", "build", &log, t0);
        assert!(detector.tick(t0 + Duration::from_millis(500)).is_none());
        let alert = detector.tick(t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(alert.step, "build");
        assert!(alert.message().contains("stalled for 2s"));
    }
}
