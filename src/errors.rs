//! Typed error hierarchy for the conductor.
//!
//! Three top-level enums cover the failure classes that can change the
//! outcome of a run:
//! - `ConfigError`: the phase graph could not be loaded (fatal, before any phase runs)
//! - `OrchestratorError`: process supervision failures (spawn, signalling, locking)
//! - `StepFailure`: a single step did not succeed; fatal to its phase and the run

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading and validating the phase graph.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config format for {path} (expected .json, .yaml, .yml or .toml)")]
    UnsupportedFormat { path: PathBuf },

    #[error("project_root does not exist: {path}")]
    ProjectRootMissing { path: PathBuf },

    #[error("{context} is missing required field '{field}'")]
    MissingField { context: String, field: String },

    #[error("Config defines no phases")]
    NoPhases,

    #[error("Duplicate phase name: {name}")]
    DuplicatePhase { name: String },

    #[error("Phase '{phase}' defines step '{step}' more than once")]
    DuplicateStep { phase: String, step: String },

    #[error("Steps '{first}' and '{second}' would both log to {file}; set 'log' on one of them")]
    LogNameCollision {
        first: String,
        second: String,
        file: String,
    },

    #[error("Phase '{name}' has no steps")]
    EmptyPhase { name: String },

    #[error("Step '{phase}/{step}' references unknown runner '{runner}'")]
    UnknownRunner {
        phase: String,
        step: String,
        runner: String,
    },

    #[error("Step '{phase}/{step}' must set exactly one of 'runner' or 'command'")]
    AmbiguousTarget { phase: String, step: String },

    #[error("Runner '{name}' has an empty command")]
    EmptyCommand { name: String },

    #[error("Prompt file not found for step '{phase}/{step}': {path}")]
    PromptNotFound {
        phase: String,
        step: String,
        path: PathBuf,
    },

    #[error("Unknown template key '{{{key}}}' in: {template}")]
    UnknownTemplateKey { key: String, template: String },

    #[error("Unknown phase '{name}' (defined: {known})")]
    UnknownPhase { name: String, known: String },

    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid value '{value}' for {name}: expected {expected}")]
    InvalidSetting {
        name: String,
        value: String,
        expected: &'static str,
    },
}

/// Errors from the process supervision layer.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to spawn step '{step}': {source}")]
    SpawnFailed {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open step log at {path}: {source}")]
    LogOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },

    #[error("Another run holds the lock at {path}")]
    LockHeld { path: PathBuf },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a step did not complete successfully.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("Step '{step}' exited with non-zero code {code}")]
    NonZeroExit { step: String, code: i32 },

    #[error("Step '{step}' stalled for {quiet_secs}s and was terminated")]
    Stalled { step: String, quiet_secs: u64 },

    #[error("Step '{step}' was interrupted")]
    Interrupted { step: String },

    #[error(transparent)]
    Spawn(#[from] OrchestratorError),
}

/// Exit code used when no child exit code is available.
pub const GENERIC_FAILURE_CODE: i32 = 1;

/// Exit code for a fatal configuration error.
pub const CONFIG_ERROR_CODE: i32 = 2;

/// Exit code after an interrupt signal (128 + SIGINT).
pub const INTERRUPTED_CODE: i32 = 130;

impl StepFailure {
    /// Exit code the orchestrator should propagate for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            StepFailure::NonZeroExit { code, .. } if *code != 0 => *code,
            StepFailure::Interrupted { .. } => INTERRUPTED_CODE,
            _ => GENERIC_FAILURE_CODE,
        }
    }
}
