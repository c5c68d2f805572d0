//! Kata Gate
//!
//! The attempt gate: a pure, total state machine governing submission
//! attempts, retry soft-blocks, and hint unlocks for one lesson.
//!
//! The reducer is the single source of truth; callers dispatch actions and
//! render the returned state. No action ever fails: inapplicable actions
//! return the state unchanged.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kata_lesson::CheckRunResult;

/// Highest hint tier the ladder carries.
pub const MAX_HINT_TIER: u8 = 3;

/// Where the gate is in the attempt lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    /// No attempt in flight; submissions are accepted.
    #[default]
    Idle,
    /// A submission is being checked.
    Attempting,
    /// The lesson is passed. Terminal: no action leaves this status.
    Passed,
    /// The last attempt failed; retries remain.
    Failed,
    /// The attempt budget is spent; the learner must dismiss the block
    /// before retrying.
    SoftBlocked,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Attempting => write!(f, "attempting"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::SoftBlocked => write!(f, "soft_blocked"),
        }
    }
}

/// The gate's full visible state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateState {
    /// Lifecycle position.
    pub status: GateStatus,
    /// Failed-or-in-flight attempts in the current cycle. Reset to 0 by a
    /// soft block.
    pub attempts: u32,
    /// Attempts allowed per cycle.
    pub max_attempts: u32,
    /// Check outcomes from the most recent attempt.
    pub check_results: Vec<CheckRunResult>,
    /// Unlocked hint tiers. Grows monotonically within a lesson; never
    /// re-locked by soft blocks or resets of the attempt counter.
    pub unlocked_hint_tiers: BTreeSet<u8>,
    /// Score from the most recent attempt.
    pub score: Option<u8>,
}

impl GateState {
    /// Creates an idle gate allowing `max_attempts` per cycle.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            status: GateStatus::Idle,
            attempts: 0,
            max_attempts,
            check_results: Vec::new(),
            unlocked_hint_tiers: BTreeSet::new(),
            score: None,
        }
    }
}

impl Default for GateState {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Everything that can happen to the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateAction {
    /// Adjusts the attempt budget without touching progress.
    Configure {
        /// New attempts-per-cycle budget.
        max_attempts: u32,
    },
    /// The learner submits; accepted from `Idle` and `Failed` only.
    SubmitAttempt,
    /// The check runner reports the attempt's outcome.
    CheckResult {
        /// Whether the attempt passed the lesson's gate condition.
        passed: bool,
        /// Per-check outcomes.
        check_results: Vec<CheckRunResult>,
        /// Weighted score for the attempt.
        score: Option<u8>,
    },
    /// The learner acknowledges a soft block.
    DismissSoftBlock,
    /// Starts the lesson over. Ignored once passed.
    Reset,
}

/// Applies `action` to `state`.
///
/// Pure and total: inapplicable actions (a `CheckResult` with no attempt
/// in flight, a submit while blocked) return the state unchanged, and
/// `Passed` absorbs everything except `Configure`.
#[must_use]
pub fn gate_reducer(state: &GateState, action: &GateAction) -> GateState {
    let mut next = state.clone();
    match action {
        GateAction::Configure { max_attempts } => {
            next.max_attempts = *max_attempts;
        }
        GateAction::SubmitAttempt => {
            if matches!(state.status, GateStatus::Idle | GateStatus::Failed) {
                next.attempts = state.attempts + 1;
                next.status = GateStatus::Attempting;
                debug!(attempt = next.attempts, max = next.max_attempts, "attempt started");
            }
        }
        GateAction::CheckResult {
            passed,
            check_results,
            score,
        } => {
            if state.status != GateStatus::Attempting {
                return next;
            }
            next.check_results.clone_from(check_results);
            next.score = *score;
            if *passed {
                next.status = GateStatus::Passed;
                debug!(attempts = next.attempts, "gate passed");
            } else {
                // One hint tier per failed attempt, up to the ladder top.
                if let Ok(tier) = u8::try_from(next.attempts) {
                    if (1..=MAX_HINT_TIER).contains(&tier) {
                        next.unlocked_hint_tiers.insert(tier);
                    }
                }
                if next.attempts >= next.max_attempts {
                    next.status = GateStatus::SoftBlocked;
                    next.attempts = 0;
                    debug!("attempt budget spent, soft-blocking");
                } else {
                    next.status = GateStatus::Failed;
                }
            }
        }
        GateAction::DismissSoftBlock => {
            if state.status == GateStatus::SoftBlocked {
                next.status = GateStatus::Idle;
            }
        }
        GateAction::Reset => {
            if state.status != GateStatus::Passed {
                next = GateState::new(state.max_attempts);
            }
        }
    }
    next
}
