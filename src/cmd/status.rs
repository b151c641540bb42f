//! The `status` command: persisted phase statuses at a glance.

use anyhow::Result;
use console::style;
use std::path::Path;

use conductor::config::{Config, Settings};
use conductor::logging::init_logging;
use conductor::orchestrator::state::{PhaseStatus, StepOutcome};
use conductor::orchestrator::{RunLock, StateManager, TargetPolicy};
use conductor::phase::PhaseGraph;

pub fn cmd_status(config_path: &Path, verbose: bool) -> Result<()> {
    let _logging = init_logging(verbose, None)?;
    let graph = PhaseGraph::load(config_path)?;
    let config = Config::new(&graph, Settings::default());
    let state = StateManager::load(config.state_file.clone());
    let run_state = state.state();

    println!();
    println!("Conductor Run Status");
    println!("====================");
    println!();
    println!("Config:  {}", config_path.display());
    println!("Project: {}", config.project_dir.display());
    if config.state_file.exists() {
        println!("State:   {}", config.state_file.display());
    } else {
        println!("State:   {} (not created yet)", config.state_file.display());
    }
    if let Some(run_id) = &run_state.run_id {
        println!("Run ID:  {}", run_id);
    }
    if let Some(updated) = run_state.updated_at {
        println!("Updated: {}", updated.format("%Y-%m-%d %H:%M:%S"));
    }

    if RunLock::is_held(&config.lock_file) {
        match RunLock::read_info(&config.lock_file) {
            Some(info) => println!(
                "Lock:    {} (run {} pid {} target {})",
                style("held").yellow(),
                info.run_id,
                info.pid,
                info.target
            ),
            None => println!("Lock:    {}", style("held").yellow()),
        }
    }

    let policy = TargetPolicy::from_graph(&graph, &config.logs_dir)?;
    println!("Default target: {}", policy.resolve(&config.project_dir)?);

    println!();
    println!("{:<20} {:<12} Steps", "Phase", "Status");
    println!("{:<20} {:<12} -----", "-----", "------");
    for phase in graph.phases() {
        let status = run_state.status(&phase.name);
        let record = run_state.phases.get(&phase.name);
        let succeeded = record
            .map(|r| {
                r.steps
                    .values()
                    .filter(|s| s.outcome == StepOutcome::Succeeded)
                    .count()
            })
            .unwrap_or(0);
        let failed_step = record.and_then(|r| {
            r.steps
                .iter()
                .find(|(_, s)| s.outcome == StepOutcome::Failed)
                .map(|(name, s)| match s.exit_code {
                    Some(code) => format!(" ({} exit={})", name, code),
                    None => format!(" ({})", name),
                })
        });

        let label = format!("{:<12}", status.to_string());
        let label = match status {
            PhaseStatus::Completed => style(label).green(),
            PhaseStatus::Failed => style(label).red(),
            PhaseStatus::InProgress => style(label).yellow(),
            PhaseStatus::NotStarted => style(label).dim(),
        };
        println!(
            "{:<20} {} {}/{}{}",
            phase.name,
            label,
            succeeded,
            phase.steps.len(),
            failed_step.unwrap_or_default()
        );
    }
    println!();
    Ok(())
}
