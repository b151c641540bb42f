use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::phase::{PhaseGraph, Step, default_log_name, render_template};

/// Behavioural knobs for a run.
///
/// Built once at startup and handed to each component's constructor; no
/// component reads the environment on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Cadence of `[RUNNING]` lines while a step executes (zero disables)
    pub progress_interval: Duration,
    /// Cadence of `[STATUS]` lines (zero disables)
    pub status_interval: Duration,
    /// Poll tick for liveness, stall and pause checks
    pub watch_poll: Duration,
    /// Quiet period before a stall alert fires (zero disables stall detection)
    pub stall_timeout: Duration,
    /// Terminate a stalled step instead of only alerting
    pub stall_kill: bool,
    /// How long a terminated child gets before it is force-killed
    pub kill_grace: Duration,
    /// Skip phases already completed in the persisted run state
    pub resume: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_secs(30),
            status_interval: Duration::from_secs(10),
            watch_poll: Duration::from_secs(2),
            stall_timeout: Duration::from_secs(900),
            stall_kill: false,
            kill_grace: Duration::from_secs(2),
            resume: false,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup function.
    ///
    /// Each knob accepts its bare name (`WATCH_POLL`) or the `FRAMEWORK_`
    /// prefixed name used by older installs; the bare name wins.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .or_else(|| lookup(&format!("FRAMEWORK_{}", name)))
                .filter(|v| !v.trim().is_empty())
        };
        let seconds = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            match get(name) {
                Some(value) => parse_seconds(name, &value),
                None => Ok(default),
            }
        };
        let poll = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            let value = seconds(name, default)?;
            if value < MIN_WATCH_POLL {
                return Err(ConfigError::InvalidSetting {
                    name: name.to_string(),
                    value: get(name).unwrap_or_default(),
                    expected: "a poll interval of at least 0.01 seconds",
                });
            }
            Ok(value)
        };

        let defaults = Self::default();
        Ok(Self {
            progress_interval: seconds("PROGRESS_INTERVAL", defaults.progress_interval)?,
            status_interval: seconds("STATUS_INTERVAL", defaults.status_interval)?,
            watch_poll: poll("WATCH_POLL", defaults.watch_poll)?,
            stall_timeout: seconds("STALL_TIMEOUT", defaults.stall_timeout)?,
            stall_kill: get("STALL_KILL").map(|v| truthy(&v)).unwrap_or(defaults.stall_kill),
            kill_grace: seconds("KILL_GRACE", defaults.kill_grace)?,
            resume: get("RESUME").map(|v| truthy(&v)).unwrap_or(defaults.resume),
        })
    }
}

/// Smallest accepted `WATCH_POLL`; zero would turn the poll loops into a spin.
pub const MIN_WATCH_POLL: Duration = Duration::from_millis(10);

/// `1`, `true`, `yes`, `on` (any case) are true; everything else is false.
pub fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_seconds(name: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| ConfigError::InvalidSetting {
            name: name.to_string(),
            value: value.to_string(),
            expected: "a non-negative number of seconds",
        })
}

/// Runtime configuration for a run.
///
/// Resolves every persisted path from the phase graph's layout hints, falling
/// back to the conventional `framework/` layout under the project root.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub state_file: PathBuf,
    pub summary_file: PathBuf,
    pub pause_marker: PathBuf,
    pub events_file: PathBuf,
    pub alerts_file: PathBuf,
    pub status_file: PathBuf,
    pub lock_file: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn new(graph: &PhaseGraph, settings: Settings) -> Self {
        let project_dir = graph.project_root.clone();
        let logs_dir = graph
            .logs_dir
            .clone()
            .unwrap_or_else(|| project_dir.join("framework").join("logs"));
        let state_file = graph
            .state_file
            .clone()
            .unwrap_or_else(|| logs_dir.join("run-state.json"));
        let summary_file = graph.summary_file.clone().unwrap_or_else(|| {
            project_dir
                .join("framework")
                .join("docs")
                .join("orchestrator-run-summary.md")
        });
        let pause_marker = graph
            .pause_marker
            .clone()
            .unwrap_or_else(|| logs_dir.join("discovery.paused"));

        Self {
            events_file: logs_dir.join("framework-run.jsonl"),
            alerts_file: logs_dir.join("protocol-alerts.log"),
            status_file: logs_dir.join("protocol-status.log"),
            lock_file: logs_dir.join("framework-run.lock"),
            project_dir,
            logs_dir,
            state_file,
            summary_file,
            pause_marker,
            settings,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.logs_dir).with_context(|| {
            format!("Failed to create logs directory: {}", self.logs_dir.display())
        })?;
        for file in [&self.state_file, &self.summary_file] {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }
        Ok(())
    }

    /// Log file for one step: `<logs_dir>/<phase>-<step>.log` unless the step
    /// names its own log template.
    pub fn step_log_path(
        &self,
        phase: &str,
        step: &Step,
        run_id: &str,
    ) -> Result<PathBuf, ConfigError> {
        match &step.log {
            Some(template) => {
                let rendered = render_template(
                    template,
                    &[
                        ("phase", phase),
                        ("step", &step.name),
                        ("run_id", run_id),
                        ("prompt", ""),
                        ("log", ""),
                    ],
                )?;
                let path = Path::new(&rendered);
                Ok(if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.logs_dir.join(path)
                })
            }
            None => Ok(self.logs_dir.join(default_log_name(phase, &step.name))),
        }
    }
}
