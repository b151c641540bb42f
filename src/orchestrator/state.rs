use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const STATE_VERSION: u32 = 1;

/// Persisted status of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseStatus::NotStarted => write!(f, "not-started"),
            PhaseStatus::InProgress => write!(f, "in-progress"),
            PhaseStatus::Completed => write!(f, "completed"),
            PhaseStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a single step once its process is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseRecord {
    pub status: PhaseStatus,
    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Which phases and steps have finished, keyed by phase name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseRecord>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            run_id: None,
            updated_at: None,
            phases: BTreeMap::new(),
        }
    }
}

impl RunState {
    pub fn status(&self, phase: &str) -> PhaseStatus {
        self.phases
            .get(phase)
            .map(|p| p.status)
            .unwrap_or_default()
    }

    pub fn is_phase_complete(&self, phase: &str) -> bool {
        self.status(phase) == PhaseStatus::Completed
    }
}

/// Owns the run state and its file. Every mutation is persisted atomically.
pub struct StateManager {
    state_file: PathBuf,
    state: RunState,
}

impl StateManager {
    /// Start from an empty state; the file is overwritten on first write.
    pub fn new(state_file: PathBuf) -> Self {
        Self {
            state_file,
            state: RunState::default(),
        }
    }

    /// Load persisted state. A missing or unreadable file yields an empty state.
    pub fn load(state_file: PathBuf) -> Self {
        let state = match fs::read_to_string(&state_file) {
            Ok(content) => match serde_json::from_str::<RunState>(&content) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        path = %state_file.display(),
                        error = %e,
                        "Ignoring unreadable run state"
                    );
                    RunState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RunState::default(),
            Err(e) => {
                tracing::warn!(
                    path = %state_file.display(),
                    error = %e,
                    "Ignoring unreadable run state"
                );
                RunState::default()
            }
        };
        Self { state_file, state }
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn set_run_id(&mut self, run_id: &str) {
        self.state.run_id = Some(run_id.to_string());
    }

    pub fn is_phase_complete(&self, phase: &str) -> bool {
        self.state.is_phase_complete(phase)
    }

    /// Mark a phase in progress, clearing step records from any earlier attempt.
    pub fn mark_phase_started(&mut self, phase: &str) -> Result<()> {
        let record = self.state.phases.entry(phase.to_string()).or_default();
        record.status = PhaseStatus::InProgress;
        record.steps.clear();
        record.updated_at = Some(Utc::now());
        self.persist()
    }

    pub fn mark_step_result(
        &mut self,
        phase: &str,
        step: &str,
        outcome: StepOutcome,
        exit_code: Option<i32>,
    ) -> Result<()> {
        let now = Utc::now();
        let record = self.state.phases.entry(phase.to_string()).or_default();
        if record.status == PhaseStatus::NotStarted {
            record.status = PhaseStatus::InProgress;
        }
        record.steps.insert(
            step.to_string(),
            StepRecord {
                outcome,
                exit_code,
                finished_at: now,
            },
        );
        record.updated_at = Some(now);
        self.persist()
    }

    pub fn mark_phase_result(&mut self, phase: &str, status: PhaseStatus) -> Result<()> {
        let record = self.state.phases.entry(phase.to_string()).or_default();
        record.status = status;
        record.updated_at = Some(Utc::now());
        self.persist()
    }

    /// Remove the state file and forget all progress.
    pub fn reset(&mut self) -> Result<()> {
        if self.state_file.exists() {
            fs::remove_file(&self.state_file).context("Failed to remove state file")?;
        }
        self.state = RunState::default();
        Ok(())
    }

    /// Write to a sibling temp file, fsync, then rename over the real file.
    fn persist(&mut self) -> Result<()> {
        self.state.updated_at = Some(Utc::now());
        let json =
            serde_json::to_string_pretty(&self.state).context("Failed to serialize run state")?;

        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let tmp = temp_path(&self.state_file);
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(json.as_bytes())
                .context("Failed to write run state")?;
            file.sync_all().context("Failed to sync run state")?;
        }
        fs::rename(&tmp, &self.state_file).with_context(|| {
            format!(
                "Failed to move run state into place at {}",
                self.state_file.display()
            )
        })?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_manager() -> (StateManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run-state.json");
        (StateManager::new(path), dir)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let mgr = StateManager::load(dir.path().join("absent.json"));
        assert!(mgr.state().phases.is_empty());
        assert!(!mgr.is_phase_complete("main"));
        assert_eq!(mgr.state().status("main"), PhaseStatus::NotStarted);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run-state.json");
        fs::write(&path, "{ half written").unwrap();
        let mgr = StateManager::load(path);
        assert!(mgr.state().phases.is_empty());
    }

    #[test]
    fn test_step_and_phase_results_roundtrip() {
        let (mut mgr, _dir) = make_manager();
        mgr.set_run_id("run-1");
        mgr.mark_phase_started("main").unwrap();
        mgr.mark_step_result("main", "build", StepOutcome::Succeeded, Some(0))
            .unwrap();
        assert_eq!(mgr.state().status("main"), PhaseStatus::InProgress);
        mgr.mark_phase_result("main", PhaseStatus::Completed).unwrap();

        let reloaded = StateManager::load(mgr.path().to_path_buf());
        assert!(reloaded.is_phase_complete("main"));
        assert_eq!(reloaded.state().run_id.as_deref(), Some("run-1"));
        let record = &reloaded.state().phases["main"].steps["build"];
        assert_eq!(record.outcome, StepOutcome::Succeeded);
        assert_eq!(record.exit_code, Some(0));
    }

    #[test]
    fn test_failed_phase_is_not_complete() {
        let (mut mgr, _dir) = make_manager();
        mgr.mark_step_result("main", "build", StepOutcome::Failed, Some(3))
            .unwrap();
        mgr.mark_phase_result("main", PhaseStatus::Failed).unwrap();
        assert!(!mgr.is_phase_complete("main"));
        assert_eq!(mgr.state().status("main"), PhaseStatus::Failed);
    }

    #[test]
    fn test_restart_clears_previous_step_records() {
        let (mut mgr, _dir) = make_manager();
        mgr.mark_step_result("main", "build", StepOutcome::Failed, Some(1))
            .unwrap();
        mgr.mark_phase_started("main").unwrap();
        assert!(mgr.state().phases["main"].steps.is_empty());
    }

    #[test]
    fn test_persist_leaves_no_temp_file() {
        let (mut mgr, dir) = make_manager();
        mgr.mark_phase_result("discovery", PhaseStatus::Completed)
            .unwrap();
        assert!(dir.path().join("run-state.json").exists());
        assert!(!dir.path().join("run-state.json.tmp").exists());
    }

    #[test]
    fn test_fresh_manager_overwrites_previous_state() {
        let (mut mgr, _dir) = make_manager();
        mgr.mark_phase_result("discovery", PhaseStatus::Completed)
            .unwrap();
        let path = mgr.path().to_path_buf();

        let mut fresh = StateManager::new(path.clone());
        fresh.mark_phase_started("main").unwrap();

        let reloaded = StateManager::load(path);
        assert!(!reloaded.is_phase_complete("discovery"));
        assert_eq!(reloaded.state().status("main"), PhaseStatus::InProgress);
    }

    #[test]
    fn test_reset_removes_file() {
        let (mut mgr, _dir) = make_manager();
        mgr.mark_phase_result("main", PhaseStatus::Completed).unwrap();
        mgr.reset().unwrap();
        assert!(!mgr.path().exists());
        assert!(!mgr.is_phase_complete("main"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PhaseStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(PhaseStatus::NotStarted.to_string(), "not-started");
    }
}
