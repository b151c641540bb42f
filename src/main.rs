use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conductor::errors::{CONFIG_ERROR_CODE, ConfigError, GENERIC_FAILURE_CODE};

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Drive a coding agent through sequential protocol phases")]
pub struct Cli {
    /// Debug-level diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every phase up to and including the target phase
    Run {
        /// Phase graph file (.json, .yaml, .yml or .toml)
        #[arg(short, long)]
        config: PathBuf,

        /// Target phase (defaults to the empty/legacy destination policy)
        #[arg(short, long)]
        phase: Option<String>,

        /// Skip phases already completed in the persisted run state (same as RESUME=1)
        #[arg(long)]
        resume: bool,
    },
    /// Show persisted phase statuses
    Status {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Delete the persisted run state
    Reset {
        #[arg(short, long)]
        config: PathBuf,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match dispatch(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

/// Run the selected command and return the process exit code. Logging
/// guards live inside the commands so they flush before `exit`.
async fn dispatch(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Commands::Run {
            config,
            phase,
            resume,
        } => cmd::cmd_run(config, phase.as_deref(), *resume, cli.verbose).await,
        Commands::Status { config } => {
            cmd::cmd_status(config, cli.verbose)?;
            Ok(0)
        }
        Commands::Reset { config, force } => {
            cmd::cmd_reset(config, *force, cli.verbose)?;
            Ok(0)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        CONFIG_ERROR_CODE
    } else {
        GENERIC_FAILURE_CODE
    }
}
