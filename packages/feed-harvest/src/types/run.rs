//! Run lifecycle types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::types::record::AcceptedRecord;

/// Why pagination concluded that no more content will appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionCause {
    /// Consecutive captures revealed nothing new
    NoNewFragments,
    /// The reveal control is gone
    NoRevealControl,
    /// Transient failures outlasted the retry budget
    TransientFailures,
    /// The browser failed in a way retrying cannot fix
    DriverFailure,
}

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "cause", rename_all = "snake_case")]
pub enum StopReason {
    CapReached,
    Exhausted(ExhaustionCause),
    MaxCycles,
    /// Caller cancelled or the run deadline passed
    Cancelled,
}

impl StopReason {
    /// Outcome implied by this stop.
    pub fn outcome(&self) -> RunOutcome {
        match self {
            Self::CapReached
            | Self::Exhausted(ExhaustionCause::NoNewFragments)
            | Self::Exhausted(ExhaustionCause::NoRevealControl) => RunOutcome::Complete,
            Self::Exhausted(_) | Self::MaxCycles | Self::Cancelled => RunOutcome::Partial,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapReached => f.write_str("cap_reached"),
            Self::Exhausted(cause) => write!(f, "exhausted({:?})", cause),
            Self::MaxCycles => f.write_str("max_cycles"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal classification of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Cap reached or the feed ran out
    Complete,
    /// Stopped early; the records are valid but possibly incomplete
    Partial,
}

/// States of one extraction run.
///
/// `Init → Authenticated → Navigating → Paginating → Stopped →
/// Normalizing? → Done`, with `Failed` reachable from the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RunState {
    Init,
    Authenticated,
    Navigating,
    Paginating,
    Stopped(StopReason),
    Normalizing,
    Done(RunOutcome),
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, Authenticated)
                | (Init, Failed)
                | (Authenticated, Navigating)
                | (Authenticated, Failed)
                | (Navigating, Paginating)
                | (Navigating, Failed)
                | (Paginating, Stopped(_))
                | (Stopped(_), Normalizing)
                | (Stopped(_), Done(_))
                | (Normalizing, Done(_))
        )
    }
}

/// Everything a finished run hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target: String,
    pub max_results: usize,

    /// Accepted records in admission order
    pub records: Vec<AcceptedRecord>,

    pub stop_reason: StopReason,
    pub outcome: RunOutcome,

    /// Reveal actions performed
    pub reveal_cycles: usize,
    /// Distinct fragments captured
    pub fragments_seen: usize,
    /// Fragments the extractor discarded
    pub fragments_rejected: usize,
    /// Candidates the store refused
    pub candidates_refused: usize,
    /// Records whose normalization fell back to local fields
    pub normalization_fallbacks: usize,

    /// State trail, first to last
    pub states: Vec<RunState>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        self.outcome == RunOutcome::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_outcomes() {
        assert_eq!(StopReason::CapReached.outcome(), RunOutcome::Complete);
        assert_eq!(
            StopReason::Exhausted(ExhaustionCause::NoNewFragments).outcome(),
            RunOutcome::Complete
        );
        assert_eq!(
            StopReason::Exhausted(ExhaustionCause::TransientFailures).outcome(),
            RunOutcome::Partial
        );
        assert_eq!(StopReason::MaxCycles.outcome(), RunOutcome::Partial);
        assert_eq!(StopReason::Cancelled.outcome(), RunOutcome::Partial);
    }

    #[test]
    fn test_state_transitions() {
        use RunState::*;
        assert!(Init.can_transition_to(&Authenticated));
        assert!(Init.can_transition_to(&Failed));
        assert!(Navigating.can_transition_to(&Failed));
        assert!(!Paginating.can_transition_to(&Failed));
        assert!(Stopped(StopReason::MaxCycles).can_transition_to(&Normalizing));
        assert!(Normalizing.can_transition_to(&Done(RunOutcome::Complete)));
        assert!(!Done(RunOutcome::Complete).can_transition_to(&Init));
        assert!(Failed.is_terminal());
    }
}
