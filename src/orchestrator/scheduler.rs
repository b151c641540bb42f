//! Top-level driver: walks the phase graph and supervises one step at a time.
//!
//! Control flow is a single polling loop. Each `watch_poll` tick checks the
//! child's liveness, the pause marker and the step log's mtime, then sleeps.
//! An interrupt (SIGINT/SIGTERM) wakes the sleep early, and the current child
//! is terminated before the run winds down.

use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::audit::{
    self, EventLog, PhaseOutcome, PhaseSummary, RunEvent, RunSummary, SummaryReporter,
};
use crate::config::{Config, MIN_WATCH_POLL};
use crate::errors::{GENERIC_FAILURE_CODE, StepFailure};
use crate::orchestrator::pause::{PauseController, PauseTransition};
use crate::orchestrator::runner::{AgentRunner, ProcessHandle, ProcessStatus};
use crate::orchestrator::stall::{StallAction, StallAlert, StallDetector};
use crate::orchestrator::state::{PhaseStatus, StateManager, StepOutcome};
use crate::orchestrator::target::TargetPolicy;
use crate::phase::{Phase, PhaseGraph, Step};
use crate::ui::{ProgressReporter, StatusSnapshot};

/// Result of a completed `run`.
#[derive(Debug)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub summary: RunSummary,
    /// The first step failure, if any.
    pub failure: Option<StepFailure>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

struct StepRun {
    exit_code: Option<i32>,
    failure: Option<StepFailure>,
    /// The step itself succeeded but the run must stop after it.
    halt: Option<StepFailure>,
}

impl StepRun {
    fn exited(step: &str, code: i32) -> Self {
        let failure = (code != 0).then(|| StepFailure::NonZeroExit {
            step: step.to_string(),
            code,
        });
        Self {
            exit_code: Some(code),
            failure,
            halt: None,
        }
    }

    fn failed(exit_code: Option<i32>, failure: StepFailure) -> Self {
        Self {
            exit_code,
            failure: Some(failure),
            halt: None,
        }
    }
}

/// Fires at a fixed interval; a zero interval never fires.
struct Cadence {
    interval: Duration,
    last: Instant,
}

impl Cadence {
    fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: now,
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        if self.interval.is_zero() || now.saturating_duration_since(self.last) < self.interval {
            return false;
        }
        self.last = now;
        true
    }
}

/// Sleep that wakes early when the shutdown future completes.
struct Interrupt {
    signal: Pin<Box<dyn Future<Output = ()> + Send>>,
    fired: bool,
}

impl Interrupt {
    fn new<F>(signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            signal: Box::pin(signal),
            fired: false,
        }
    }

    /// Returns true once the interrupt has fired.
    async fn sleep(&mut self, duration: Duration) -> bool {
        if self.fired {
            return true;
        }
        tokio::select! {
            _ = &mut self.signal => {
                self.fired = true;
                true
            }
            _ = tokio::time::sleep(duration) => false,
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if res.is_err() {
                            term.recv().await;
                        }
                    }
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Owns every component of a run; built once per invocation.
pub struct Scheduler {
    graph: PhaseGraph,
    config: Config,
    state: StateManager,
    runner: AgentRunner,
    stall: StallDetector,
    pause: PauseController,
    events: EventLog,
    reporter: SummaryReporter,
    progress: ProgressReporter,
    run_id: String,
    started: Instant,
    alerts: Vec<StallAlert>,
}

impl Scheduler {
    /// Wire up the components from `config`. With `resume` the persisted run
    /// state is loaded; otherwise the run starts empty and overwrites it.
    pub fn new(graph: PhaseGraph, config: Config) -> Self {
        let run_id = new_run_id();
        let settings = &config.settings;
        let state = if settings.resume {
            StateManager::load(config.state_file.clone())
        } else {
            StateManager::new(config.state_file.clone())
        };
        Self {
            runner: AgentRunner::new(&config),
            stall: StallDetector::new(settings.stall_timeout, settings.stall_kill),
            pause: PauseController::new(config.pause_marker.clone()),
            events: EventLog::new(config.events_file.clone(), &run_id),
            reporter: SummaryReporter::new(config.summary_file.clone()),
            progress: ProgressReporter::new(config.status_file.clone()),
            graph,
            config,
            state,
            run_id,
            started: Instant::now(),
            alerts: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn stall_alerts(&self) -> &[StallAlert] {
        &self.alerts
    }

    /// The explicit phase if given (validated), else the default target policy.
    pub fn resolve_target(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(name) = explicit {
            self.graph.phases_through(name)?;
            return Ok(name.to_string());
        }
        let policy = TargetPolicy::from_graph(&self.graph, &self.config.logs_dir)?;
        let target = policy.resolve(&self.config.project_dir)?;
        tracing::info!(target_phase = %target, "Selected default target phase");
        Ok(target.to_string())
    }

    /// Run every phase up to `target`, stopping on SIGINT/SIGTERM.
    pub async fn run(&mut self, target: &str) -> Result<RunOutcome> {
        self.run_until(target, shutdown_signal()).await
    }

    /// Run every phase up to `target`; `shutdown` completing interrupts the run.
    pub async fn run_until<F>(&mut self, target: &str, shutdown: F) -> Result<RunOutcome>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let phases = self.graph.phases_through(target)?.to_vec();
        self.config.ensure_directories()?;

        let started_at = Utc::now();
        self.started = Instant::now();
        self.alerts.clear();
        self.state.set_run_id(&self.run_id);
        let resume = self.config.settings.resume;

        let names: Vec<String> = phases.iter().map(|p| p.name.clone()).collect();
        tracing::info!(run_id = %self.run_id, target_phase = %target, resume, "Starting run");
        self.events.record(RunEvent::RunStart {
            target: target.to_string(),
            phases: names.clone(),
            resume,
        });
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.progress.run_header(&self.run_id, target, &name_refs);

        let mut interrupt = Interrupt::new(shutdown);
        let mut outcomes = Vec::with_capacity(phases.len());
        let mut failure: Option<StepFailure> = None;
        let mut fatal: Option<anyhow::Error> = None;

        for (index, phase) in phases.iter().enumerate() {
            if failure.is_some() || fatal.is_some() {
                outcomes.push(PhaseSummary {
                    name: phase.name.clone(),
                    outcome: PhaseOutcome::NotAttempted,
                });
                continue;
            }

            if resume && self.state.is_phase_complete(&phase.name) {
                tracing::info!(phase = %phase.name, "Skipping completed phase");
                self.events.record(RunEvent::PhaseSkip {
                    phase: phase.name.clone(),
                    reason: "already completed".to_string(),
                });
                self.progress.phase_skipped(&phase.name);
                outcomes.push(PhaseSummary {
                    name: phase.name.clone(),
                    outcome: PhaseOutcome::Skipped,
                });
                continue;
            }

            let outcome = match self
                .run_phase(phase, index, phases.len(), &mut interrupt)
                .await
            {
                Ok(None) => PhaseOutcome::Completed,
                Ok(Some((step, step_failure))) => {
                    let detail = failure_detail(&step_failure);
                    failure = Some(step_failure);
                    PhaseOutcome::Failed { step, detail }
                }
                Err(e) => {
                    tracing::error!(phase = %phase.name, error = %format!("{e:#}"), "Phase aborted");
                    if let Err(persist) = self.state.mark_phase_result(&phase.name, PhaseStatus::Failed)
                    {
                        tracing::warn!(phase = %phase.name, error = %format!("{persist:#}"), "Failed to record aborted phase");
                    }
                    self.events.record(RunEvent::PhaseEnd {
                        phase: phase.name.clone(),
                        status: PhaseStatus::Failed,
                    });
                    fatal = Some(e);
                    PhaseOutcome::Failed {
                        step: "-".to_string(),
                        detail: "error".to_string(),
                    }
                }
            };
            outcomes.push(PhaseSummary {
                name: phase.name.clone(),
                outcome,
            });
        }

        let exit_code = match (&failure, &fatal) {
            (Some(f), _) => f.exit_code(),
            (None, Some(_)) => GENERIC_FAILURE_CODE,
            (None, None) => 0,
        };
        let elapsed = self.started.elapsed();
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            target: target.to_string(),
            started_at,
            finished_at: Utc::now(),
            elapsed,
            exit_code,
            phases: outcomes,
            stall_alerts: self.alerts.clone(),
        };
        self.reporter.write(&summary);
        self.events.record(RunEvent::RunEnd {
            exit_code,
            elapsed_secs: elapsed.as_secs_f64(),
        });
        tracing::info!(run_id = %self.run_id, exit_code, "Run finished");

        if let Some(e) = fatal {
            return Err(e);
        }
        Ok(RunOutcome {
            exit_code,
            summary,
            failure,
        })
    }

    /// Execute one phase. Returns the failing step and why, if any.
    async fn run_phase(
        &mut self,
        phase: &Phase,
        index: usize,
        total: usize,
        interrupt: &mut Interrupt,
    ) -> Result<Option<(String, StepFailure)>> {
        self.state.mark_phase_started(&phase.name)?;
        self.events.record(RunEvent::PhaseStart {
            phase: phase.name.clone(),
        });
        self.progress.phase_start(&phase.name, index + 1, total);
        tracing::info!(phase = %phase.name, steps = phase.steps.len(), "Phase started");

        let step_count = phase.steps.len();
        for (i, step) in phase.steps.iter().enumerate() {
            let run = self
                .run_step(&phase.name, step, (i, step_count), interrupt)
                .await?;
            let step_failure = match run.failure {
                Some(failure) => {
                    self.state.mark_step_result(
                        &phase.name,
                        &step.name,
                        StepOutcome::Failed,
                        run.exit_code,
                    )?;
                    failure
                }
                None => {
                    self.state.mark_step_result(
                        &phase.name,
                        &step.name,
                        StepOutcome::Succeeded,
                        run.exit_code,
                    )?;
                    match run.halt {
                        Some(halt) => halt,
                        None => continue,
                    }
                }
            };

            self.state.mark_phase_result(&phase.name, PhaseStatus::Failed)?;
            self.events.record(RunEvent::PhaseEnd {
                phase: phase.name.clone(),
                status: PhaseStatus::Failed,
            });
            self.progress
                .phase_failed(&phase.name, &step_failure.to_string());
            tracing::error!(phase = %phase.name, step = %step.name, error = %step_failure, "Phase failed");
            return Ok(Some((step.name.clone(), step_failure)));
        }

        self.state
            .mark_phase_result(&phase.name, PhaseStatus::Completed)?;
        self.events.record(RunEvent::PhaseEnd {
            phase: phase.name.clone(),
            status: PhaseStatus::Completed,
        });
        self.progress.phase_complete(&phase.name);
        tracing::info!(phase = %phase.name, "Phase completed");
        Ok(None)
    }

    async fn run_step(
        &mut self,
        phase: &str,
        step: &Step,
        position: (usize, usize),
        interrupt: &mut Interrupt,
    ) -> Result<StepRun> {
        let interrupted = || StepFailure::Interrupted {
            step: step.name.clone(),
        };
        let log_path = self.config.step_log_path(phase, step, &self.run_id)?;

        if step.pausable {
            self.pause.reset();
            if self.wait_while_paused(phase, step, position, interrupt).await {
                return Ok(StepRun::failed(None, interrupted()));
            }
        }

        let mut handle = match self.runner.start(phase, step, &self.run_id, &log_path) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(phase, step = %step.name, error = %e, "Failed to start step");
                self.progress.step_done(phase, &step.name, GENERIC_FAILURE_CODE, Duration::ZERO);
                return Ok(StepRun::failed(None, StepFailure::Spawn(e)));
            }
        };
        self.events.record(RunEvent::TaskStart {
            phase: phase.to_string(),
            step: step.name.clone(),
            command: handle.command.clone(),
            log: log_path.clone(),
            pid: handle.pid(),
        });
        self.progress.step_start(phase, &step.name, &log_path);
        tracing::info!(phase, step = %step.name, pid = ?handle.pid(), "Step started");

        let started = handle.started_at;
        let settings = self.config.settings.clone();
        self.stall.start(phase, &step.name, &log_path, started);
        let mut progress = Cadence::new(settings.progress_interval, started);
        let mut status = Cadence::new(settings.status_interval, started);

        let outcome = loop {
            match self.runner.poll(&mut handle) {
                Ok(ProcessStatus::Exited(code)) => break StepRun::exited(&step.name, code),
                Ok(ProcessStatus::Running) => {}
                Err(e) => {
                    tracing::error!(phase, step = %step.name, error = %e, "Lost track of step process");
                    let code = self.stop(&mut handle).await;
                    break StepRun::failed(code, StepFailure::Spawn(e));
                }
            }

            let now = Instant::now();
            if step.pausable {
                self.observe_pause(phase, &step.name, now);
            }
            let paused = self.pause.is_paused();

            if !paused {
                if let Some(alert) = self.stall.tick(now) {
                    self.report_alert(&alert);
                    if alert.action == StallAction::Killed {
                        let code = self.stop(&mut handle).await;
                        self.stall.mark_killed();
                        break StepRun::failed(
                            code,
                            StepFailure::Stalled {
                                step: step.name.clone(),
                                quiet_secs: alert.quiet.as_secs(),
                            },
                        );
                    }
                }
                if progress.due(now) {
                    self.progress
                        .running(phase, &step.name, now.saturating_duration_since(started));
                }
            }
            if status.due(now) {
                self.emit_status(phase, Some(step.name.as_str()), position.0, position.1, !paused);
            }

            if interrupt.sleep(settings.watch_poll.max(MIN_WATCH_POLL)).await {
                self.progress.interrupted();
                tracing::warn!(phase, step = %step.name, "Interrupted, terminating step");
                let code = self.stop(&mut handle).await;
                break StepRun::failed(code, interrupted());
            }
        };
        self.stall.finish();

        let elapsed = started.elapsed();
        self.events.record(RunEvent::TaskEnd {
            phase: phase.to_string(),
            step: step.name.clone(),
            exit_code: outcome.exit_code,
            ok: outcome.failure.is_none(),
            elapsed_secs: elapsed.as_secs_f64(),
        });
        self.progress.step_done(
            phase,
            &step.name,
            outcome.exit_code.unwrap_or(GENERIC_FAILURE_CODE),
            elapsed,
        );
        tracing::info!(phase, step = %step.name, exit_code = ?outcome.exit_code, "Step finished");

        // Hold the next step while the operator still has the step paused.
        if step.pausable
            && outcome.failure.is_none()
            && self.wait_while_paused(phase, step, position, interrupt).await
        {
            return Ok(StepRun {
                halt: Some(interrupted()),
                ..outcome
            });
        }
        Ok(outcome)
    }

    /// Block while the pause marker exists. Returns true if interrupted.
    async fn wait_while_paused(
        &mut self,
        phase: &str,
        step: &Step,
        position: (usize, usize),
        interrupt: &mut Interrupt,
    ) -> bool {
        let poll = self.config.settings.watch_poll.max(MIN_WATCH_POLL);
        let mut status = Cadence::new(self.config.settings.status_interval, Instant::now());
        loop {
            let now = Instant::now();
            self.observe_pause(phase, &step.name, now);
            if !self.pause.is_paused() {
                return false;
            }
            if status.due(now) {
                self.emit_status(phase, Some(step.name.as_str()), position.0, position.1, false);
            }
            if interrupt.sleep(poll).await {
                return true;
            }
        }
    }

    fn observe_pause(&mut self, phase: &str, step: &str, now: Instant) {
        match self.pause.check(now) {
            Some(PauseTransition::Paused) => {
                self.stall.pause(now);
                tracing::info!(phase, step, marker = %self.pause.marker_path().display(), "Step paused");
                self.events.record(RunEvent::Pause {
                    phase: phase.to_string(),
                    step: step.to_string(),
                });
                self.progress
                    .paused(phase, step, self.pause.marker_path());
            }
            Some(PauseTransition::Resumed) => {
                self.stall.resume(now);
                let paused_for = self.pause.last_pause();
                tracing::info!(phase, step, paused_secs = paused_for.as_secs(), "Step resumed");
                self.events.record(RunEvent::Resume {
                    phase: phase.to_string(),
                    step: step.to_string(),
                    paused_secs: paused_for.as_secs_f64(),
                });
                self.progress.resumed(phase, step, paused_for);
            }
            None => {}
        }
    }

    fn report_alert(&mut self, alert: &StallAlert) {
        tracing::warn!(
            phase = %alert.phase,
            step = %alert.step,
            quiet_secs = alert.quiet.as_secs(),
            action = %alert.action,
            "Step stalled"
        );
        self.progress.stall_alert(alert);
        audit::record_alert(&self.config.alerts_file, alert);
        self.events.record(RunEvent::StallAlert {
            phase: alert.phase.clone(),
            step: alert.step.clone(),
            quiet_secs: alert.quiet.as_secs(),
            action: alert.action.to_string(),
        });
        self.alerts.push(alert.clone());
    }

    fn emit_status(&self, phase: &str, running: Option<&str>, done: usize, total: usize, console: bool) {
        self.progress.status(
            &StatusSnapshot {
                phase,
                run_id: &self.run_id,
                running,
                done,
                total,
                elapsed: self.started.elapsed(),
            },
            console,
        );
    }

    /// Terminate with escalation and return the observed exit code.
    async fn stop(&self, handle: &mut ProcessHandle) -> Option<i32> {
        match self.runner.terminate(handle, true).await {
            Ok(ProcessStatus::Exited(code)) => Some(code),
            Ok(ProcessStatus::Running) => None,
            Err(e) => {
                tracing::warn!(step = %handle.step, error = %e, "Failed to terminate step");
                None
            }
        }
    }
}

fn failure_detail(failure: &StepFailure) -> String {
    match failure {
        StepFailure::NonZeroExit { code, .. } => format!("exit={}", code),
        StepFailure::Stalled { .. } => "stalled".to_string(),
        StepFailure::Interrupted { .. } => "interrupted".to_string(),
        StepFailure::Spawn(_) => "spawn failed".to_string(),
    }
}

fn new_run_id() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}
