//! The `run` command: load, lock, schedule, report.

use anyhow::Result;
use std::path::Path;

use conductor::config::{Config, Settings};
use conductor::logging::init_logging;
use conductor::orchestrator::{RunLock, Scheduler};
use conductor::phase::PhaseGraph;

/// Returns the process exit code of the run.
pub async fn cmd_run(
    config_path: &Path,
    phase: Option<&str>,
    resume: bool,
    verbose: bool,
) -> Result<i32> {
    let graph = PhaseGraph::load(config_path)?;
    let mut settings = Settings::from_env()?;
    if resume {
        settings.resume = true;
    }
    let config = Config::new(&graph, settings);
    let _logging = init_logging(verbose, Some(&config.logs_dir))?;
    tracing::debug!(config = %config_path.display(), settings = ?config.settings, "Loaded phase graph");

    let mut scheduler = Scheduler::new(graph, config);
    let target = scheduler.resolve_target(phase)?;
    let _lock = RunLock::acquire(
        &scheduler.config().lock_file,
        scheduler.run_id(),
        &target,
    )?;

    let outcome = scheduler.run(&target).await?;
    if let Some(failure) = &outcome.failure {
        eprintln!("error: {}", failure);
    }
    Ok(outcome.exit_code)
}
