//! Pause-marker observation for interactive steps.
//!
//! A human (or the agent itself) creates the marker file to hold the
//! discovery interview and removes it to continue. The controller only
//! observes the file; it never creates or deletes it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    Runnable,
    Paused,
}

/// A change observed on the marker since the previous check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseTransition {
    Paused,
    Resumed,
}

pub struct PauseController {
    marker: PathBuf,
    state: PauseState,
    paused_since: Option<Instant>,
    total_paused: Duration,
    last_pause: Duration,
    pauses: u32,
}

impl PauseController {
    pub fn new(marker: PathBuf) -> Self {
        Self {
            marker,
            state: PauseState::Runnable,
            paused_since: None,
            total_paused: Duration::ZERO,
            last_pause: Duration::ZERO,
            pauses: 0,
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    pub fn state(&self) -> PauseState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == PauseState::Paused
    }

    /// Number of times a pause began since the last reset.
    pub fn pause_count(&self) -> u32 {
        self.pauses
    }

    /// Accumulated paused time since the last reset, excluding a pause in progress.
    pub fn total_paused(&self) -> Duration {
        self.total_paused
    }

    /// Length of the most recently finished pause.
    pub fn last_pause(&self) -> Duration {
        self.last_pause
    }

    /// Re-check the marker and report a transition if the state changed.
    pub fn check(&mut self, now: Instant) -> Option<PauseTransition> {
        let present = self.marker.exists();
        match (self.state, present) {
            (PauseState::Runnable, true) => {
                self.state = PauseState::Paused;
                self.paused_since = Some(now);
                self.pauses += 1;
                Some(PauseTransition::Paused)
            }
            (PauseState::Paused, false) => {
                self.state = PauseState::Runnable;
                if let Some(since) = self.paused_since.take() {
                    self.last_pause = now.saturating_duration_since(since);
                    self.total_paused += self.last_pause;
                }
                Some(PauseTransition::Resumed)
            }
            _ => None,
        }
    }

    /// Forget per-step bookkeeping before the next pausable step.
    pub fn reset(&mut self) {
        self.state = PauseState::Runnable;
        self.paused_since = None;
        self.total_paused = Duration::ZERO;
        self.last_pause = Duration::ZERO;
        self.pauses = 0;
    }
}
