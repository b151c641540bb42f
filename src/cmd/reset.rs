//! The `reset` command: forget all persisted progress.

use anyhow::Result;
use dialoguer::Confirm;
use std::path::Path;

use conductor::config::{Config, Settings};
use conductor::errors::OrchestratorError;
use conductor::logging::init_logging;
use conductor::orchestrator::{RunLock, StateManager};
use conductor::phase::PhaseGraph;

pub fn cmd_reset(config_path: &Path, force: bool, verbose: bool) -> Result<()> {
    let _logging = init_logging(verbose, None)?;
    let graph = PhaseGraph::load(config_path)?;
    let config = Config::new(&graph, Settings::default());

    if RunLock::is_held(&config.lock_file) {
        return Err(OrchestratorError::LockHeld {
            path: config.lock_file.clone(),
        }
        .into());
    }

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will reset all phase progress. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let mut state = StateManager::load(config.state_file.clone());
    state.reset()?;
    tracing::info!(path = %config.state_file.display(), "Removed run state");

    println!("Reset complete");
    Ok(())
}
