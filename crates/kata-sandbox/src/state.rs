//! Visible sandbox state.
//!
//! Exactly one `SandboxState` is "current" per host instance. A monotonic
//! `run_id` distinguishes the live run from superseded ones: any pending
//! completion from a prior run must match the current id before it is
//! allowed to mutate visible state. That comparison is the entire
//! cancellation mechanism.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{EventLog, SandboxEvent};

/// Status of a sandbox run.
///
/// Transitions: `Idle -> Running -> {Success | Error | Timeout}`, and back
/// to `Idle` via [`crate::host::ExecutionHost::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run in progress.
    #[default]
    Idle,
    /// A run is evaluating.
    Running,
    /// The run completed without error.
    Success,
    /// The run failed (compile, resolution, preflight, or runtime).
    Error,
    /// The run exceeded its wall-clock budget.
    Timeout,
}

impl RunStatus {
    /// Returns `true` if this status ends a run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Timeout)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// The state published to UI collaborators after every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxState {
    /// Current run status.
    pub status: RunStatus,
    /// Entry file of the current (or last) run.
    pub active_file: String,
    /// Captured console events, in order, capped at
    /// [`crate::events::MAX_EVENTS`].
    pub events: Vec<SandboxEvent>,
    /// Formatted error message for `Error`/`Timeout` states.
    pub error_message: Option<String>,
    /// `true` if console output was capped.
    pub truncated: bool,
    /// Monotonic id of the run this state belongs to.
    pub run_id: u64,
    /// When the current run started.
    pub started_at: DateTime<Utc>,
    /// When this state was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Default for SandboxState {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxState {
    /// Creates an idle state with `run_id` 0.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            status: RunStatus::Idle,
            active_file: String::new(),
            events: Vec::new(),
            error_message: None,
            truncated: false,
            run_id: 0,
            started_at: now,
            updated_at: now,
        }
    }

    /// Resets to a fresh `Running` state for a new run.
    pub(crate) fn begin_run(&mut self, run_id: u64, active_file: &str) {
        let now = Utc::now();
        self.status = RunStatus::Running;
        self.active_file = active_file.to_string();
        self.events.clear();
        self.error_message = None;
        self.truncated = false;
        self.run_id = run_id;
        self.started_at = now;
        self.updated_at = now;
    }

    /// Commits a terminal outcome together with the run's captured events.
    pub(crate) fn finish_run(
        &mut self,
        status: RunStatus,
        log: EventLog,
        error_message: Option<String>,
    ) {
        debug_assert!(status.is_terminal());
        self.truncated = log.truncated();
        self.events = log.into_events();
        self.status = status;
        self.error_message = error_message;
        self.updated_at = Utc::now();
    }

    /// Returns to `Idle`, clearing run artifacts but keeping `run_id`.
    pub(crate) fn clear(&mut self) {
        self.status = RunStatus::Idle;
        self.active_file.clear();
        self.events.clear();
        self.error_message = None;
        self.truncated = false;
        self.updated_at = Utc::now();
    }
}
