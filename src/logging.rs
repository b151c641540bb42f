//! Tracing initialisation.
//!
//! Diagnostics always go to stderr. Runs also keep a plain-text copy in
//! `<logs_dir>/conductor.log` so unattended sessions leave a record.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_NAME: &str = "conductor.log";

/// Must be kept alive for the duration of the program; dropping it flushes
/// buffered file output.
pub struct LoggingHandle {
    pub _guard: Option<WorkerGuard>,
    pub log_file_path: Option<PathBuf>,
}

/// `--verbose` forces `debug`; otherwise `RUST_LOG` if set, else `info`.
pub fn filter_directive(verbose: bool, rust_log: Option<String>) -> String {
    if verbose {
        return "debug".to_string();
    }
    rust_log
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber. `logs_dir` adds the file layer.
pub fn init_logging(verbose: bool, logs_dir: Option<&Path>) -> Result<LoggingHandle> {
    let filter = EnvFilter::new(filter_directive(verbose, std::env::var("RUST_LOG").ok()));

    let (file_layer, guard, log_file_path) = match logs_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard), Some(dir.join(LOG_FILE_NAME)))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingHandle {
        _guard: guard,
        log_file_path,
    })
}
