use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

use crate::config::Config;
use crate::errors::OrchestratorError;
use crate::phase::{Step, render_template};

/// A running (or finished) step process.
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    pub phase: String,
    pub step: String,
    pub command: String,
    pub log_path: PathBuf,
    pub started_at: Instant,
    exit_code: Option<i32>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn record_exit(&mut self, status: ExitStatus) -> i32 {
        let code = exit_code_of(status);
        self.exit_code = Some(code);
        code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited(i32),
}

/// Spawns one agent process per step with output redirected to its log.
pub struct AgentRunner {
    project_dir: PathBuf,
    pause_marker: PathBuf,
    kill_grace: Duration,
}

impl AgentRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            project_dir: config.project_dir.clone(),
            pause_marker: config.pause_marker.clone(),
            kill_grace: config.settings.kill_grace,
        }
    }

    /// Spawn the step's command through `sh -c`, stdout and stderr to `log_path`.
    pub fn start(
        &self,
        phase: &str,
        step: &Step,
        run_id: &str,
        log_path: &Path,
    ) -> Result<ProcessHandle, OrchestratorError> {
        let prompt = step
            .prompt
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let log_display = log_path.display().to_string();
        let command = render_template(
            step.target.command_template(),
            &[
                ("prompt", &prompt),
                ("phase", phase),
                ("step", &step.name),
                ("run_id", run_id),
                ("log", &log_display),
            ],
        )
        .map_err(|e| OrchestratorError::Other(e.into()))?;

        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(|source| OrchestratorError::LogOpenFailed {
                path: log_path.to_path_buf(),
                source,
            })?;
        }
        let log_open_failed = |source| OrchestratorError::LogOpenFailed {
            path: log_path.to_path_buf(),
            source,
        };
        let stdout = fs::File::create(log_path).map_err(log_open_failed)?;
        let stderr = stdout.try_clone().map_err(log_open_failed)?;

        let workdir = step.workdir.as_deref().unwrap_or(&self.project_dir);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .env("CONDUCTOR_PHASE", phase)
            .env("CONDUCTOR_STEP", &step.name)
            .env("CONDUCTOR_RUN_ID", run_id)
            .env("CONDUCTOR_LOG", log_path)
            .env("CONDUCTOR_PAUSE_MARKER", &self.pause_marker)
            .envs(&step.env)
            .kill_on_drop(true);
        // Own process group so termination reaches the agent behind the shell.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| OrchestratorError::SpawnFailed {
            step: step.name.clone(),
            source,
        })?;
        let pid = child.id();
        tracing::debug!(phase, step = %step.name, ?pid, %command, "Spawned step process");

        Ok(ProcessHandle {
            child,
            pid,
            phase: phase.to_string(),
            step: step.name.clone(),
            command,
            log_path: log_path.to_path_buf(),
            started_at: Instant::now(),
            exit_code: None,
        })
    }

    /// Non-blocking liveness check.
    pub fn poll(&self, handle: &mut ProcessHandle) -> Result<ProcessStatus, OrchestratorError> {
        if let Some(code) = handle.exit_code {
            return Ok(ProcessStatus::Exited(code));
        }
        match handle.child.try_wait() {
            Ok(Some(status)) => Ok(ProcessStatus::Exited(handle.record_exit(status))),
            Ok(None) => Ok(ProcessStatus::Running),
            Err(e) => Err(OrchestratorError::Other(
                anyhow::Error::new(e).context(format!("Failed to poll step '{}'", handle.step)),
            )),
        }
    }

    /// Ask the step to stop. With `escalate`, force-kill after the grace window.
    ///
    /// Returns the status observed afterwards; without escalation a child that
    /// ignores the request is left running.
    pub async fn terminate(
        &self,
        handle: &mut ProcessHandle,
        escalate: bool,
    ) -> Result<ProcessStatus, OrchestratorError> {
        if let ProcessStatus::Exited(code) = self.poll(handle)? {
            return Ok(ProcessStatus::Exited(code));
        }

        tracing::info!(step = %handle.step, pid = ?handle.pid, escalate, "Terminating step process");
        request_shutdown(handle)?;

        match tokio::time::timeout(self.kill_grace, handle.child.wait()).await {
            Ok(Ok(status)) => return Ok(ProcessStatus::Exited(handle.record_exit(status))),
            Ok(Err(e)) => {
                return Err(OrchestratorError::Other(
                    anyhow::Error::new(e)
                        .context(format!("Failed to wait for step '{}'", handle.step)),
                ));
            }
            Err(_) if !escalate => return Ok(ProcessStatus::Running),
            Err(_) => {}
        }

        tracing::warn!(step = %handle.step, pid = ?handle.pid, "Grace period elapsed, killing step process");
        force_kill(handle);
        let status = handle.child.wait().await.map_err(|e| {
            OrchestratorError::Other(
                anyhow::Error::new(e).context(format!("Failed to reap step '{}'", handle.step)),
            )
        })?;
        Ok(ProcessStatus::Exited(handle.record_exit(status)))
    }
}

#[cfg(unix)]
fn request_shutdown(handle: &mut ProcessHandle) -> Result<(), OrchestratorError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = handle.pid else {
        return Ok(());
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(OrchestratorError::Signal {
            pid,
            message: e.to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn request_shutdown(handle: &mut ProcessHandle) -> Result<(), OrchestratorError> {
    handle.child.start_kill().map_err(|e| OrchestratorError::Signal {
        pid: handle.pid.unwrap_or(0),
        message: e.to_string(),
    })
}

fn force_kill(handle: &mut ProcessHandle) {
    #[cfg(unix)]
    if let Some(pid) = handle.pid {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    let _ = handle.child.start_kill();
}

/// Exit code, or `128 + signal` for a child killed by a signal.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
