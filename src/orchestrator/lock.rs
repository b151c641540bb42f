use anyhow::Context;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::errors::OrchestratorError;

/// Contents written into the lock file for whoever finds it held.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockInfo {
    pub run_id: String,
    pub target: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Exclusive advisory lock held for the lifetime of a run.
///
/// Released when dropped. The file itself stays in place; deleting it would
/// let two runs lock different inodes at the same path.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    // Held to keep the lock; released on drop
    _file: File,
}

impl RunLock {
    pub fn acquire(path: &Path, run_id: &str, target: &str) -> Result<Self, OrchestratorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
        }
        // No truncate before the lock is ours, or a loser would wipe the holder's info.
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(OrchestratorError::LockHeld {
                path: path.to_path_buf(),
            });
        }

        let info = LockInfo {
            run_id: run_id.to_string(),
            target: target.to_string(),
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let payload = serde_json::to_string(&info).context("Failed to serialize lock info")?;
        file.set_len(0).context("Failed to truncate lock file")?;
        file.seek(SeekFrom::Start(0))
            .context("Failed to rewind lock file")?;
        writeln!(file, "{}", payload).context("Failed to write lock file")?;
        file.sync_all().context("Failed to sync lock file")?;

        tracing::debug!(path = %path.display(), run_id, "Acquired run lock");
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether some process currently holds the lock. Never writes the file.
    pub fn is_held(path: &Path) -> bool {
        let Ok(file) = OpenOptions::new().read(true).write(true).open(path) else {
            return false;
        };
        // Dropping `file` releases the probe lock.
        file.try_lock_exclusive().is_err()
    }

    /// Read whatever the current or last holder wrote.
    pub fn read_info(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(content.trim()).ok()
    }
}
