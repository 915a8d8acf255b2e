//! Verification status machine
//!
//! Statuses form a partial order; each stage accepts a closed predecessor set
//! and appends exactly one transition to the history. `FAILED` is absorbing:
//! no stage accepts it as a predecessor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a verification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Initialized,
    HistoricalContextLoaded,
    HistoricalContextNotFound,
    ImagesFetched,
    PromptPrepared,
    Turn1Started,
    Turn1Completed,
    Turn2Started,
    Turn2Completed,
    Completed,
    Failed,
}

impl VerificationStatus {
    /// Statuses from which this status may legally be entered.
    ///
    /// `Failed` may be entered from anywhere; nothing may be entered from
    /// `Failed` or `Completed`.
    #[must_use]
    pub fn valid_predecessors(self) -> &'static [VerificationStatus] {
        use VerificationStatus as S;
        match self {
            S::Initialized => &[],
            S::HistoricalContextLoaded | S::HistoricalContextNotFound => &[S::Initialized],
            // LAYOUT_VS_CHECKING skips the historical stage entirely.
            S::ImagesFetched => &[
                S::Initialized,
                S::HistoricalContextLoaded,
                S::HistoricalContextNotFound,
            ],
            S::PromptPrepared => &[S::ImagesFetched],
            S::Turn1Started => &[S::PromptPrepared],
            S::Turn1Completed => &[S::Turn1Started],
            S::Turn2Started => &[S::Turn1Completed],
            S::Turn2Completed => &[S::Turn2Started],
            S::Completed => &[S::Turn2Completed],
            S::Failed => &[
                S::Initialized,
                S::HistoricalContextLoaded,
                S::HistoricalContextNotFound,
                S::ImagesFetched,
                S::PromptPrepared,
                S::Turn1Started,
                S::Turn1Completed,
                S::Turn2Started,
                S::Turn2Completed,
            ],
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: VerificationStatus) -> bool {
        next.valid_predecessors().contains(&self)
    }

    /// Whether this status ends the workflow.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One appended entry in a verification's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    /// Status that was entered.
    pub status: VerificationStatus,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
    /// Worker function that performed the transition.
    pub function_name: String,
    /// Stage wall-clock time up to the transition.
    pub processing_time_ms: u64,
    /// Stage that appended the entry.
    pub stage: String,
}

/// Validate that a status sequence is a path through the status DAG.
///
/// Used by tests and by replay validation: each adjacent pair must be a legal
/// transition and only the last element may be terminal.
#[must_use]
pub fn is_valid_status_path(path: &[VerificationStatus]) -> bool {
    if path.is_empty() {
        return false;
    }
    if path[0] != VerificationStatus::Initialized {
        return false;
    }
    for pair in path.windows(2) {
        if pair[0].is_terminal() || !pair[0].can_transition_to(pair[1]) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use VerificationStatus as S;

    #[test]
    fn test_wire_spelling() {
        assert_eq!(S::HistoricalContextNotFound.to_string(), "HISTORICAL_CONTEXT_NOT_FOUND");
        assert_eq!(
            serde_json::to_string(&S::Turn1Completed).unwrap(),
            "\"TURN1_COMPLETED\""
        );
        let parsed: S = serde_json::from_str("\"IMAGES_FETCHED\"").unwrap();
        assert_eq!(parsed, S::ImagesFetched);
    }

    #[test]
    fn test_happy_path_layout_vs_checking() {
        let path = [
            S::Initialized,
            S::ImagesFetched,
            S::PromptPrepared,
            S::Turn1Started,
            S::Turn1Completed,
            S::Turn2Started,
            S::Turn2Completed,
            S::Completed,
        ];
        assert!(is_valid_status_path(&path));
    }

    #[test]
    fn test_happy_path_previous_vs_current() {
        for historical in [S::HistoricalContextLoaded, S::HistoricalContextNotFound] {
            let path = [
                S::Initialized,
                historical,
                S::ImagesFetched,
                S::PromptPrepared,
                S::Turn1Started,
                S::Turn1Completed,
                S::Turn2Started,
                S::Turn2Completed,
                S::Completed,
            ];
            assert!(is_valid_status_path(&path), "path via {historical:?}");
        }
    }

    #[test]
    fn test_failed_is_absorbing() {
        assert!(S::Turn1Started.can_transition_to(S::Failed));
        assert!(S::Initialized.can_transition_to(S::Failed));
        for status in [
            S::Initialized,
            S::ImagesFetched,
            S::Completed,
            S::Failed,
        ] {
            assert!(!S::Failed.can_transition_to(status), "FAILED -> {status:?}");
        }
    }

    #[test]
    fn test_rejects_skipped_stages() {
        assert!(!S::Initialized.can_transition_to(S::PromptPrepared));
        assert!(!S::ImagesFetched.can_transition_to(S::Turn1Started));
        assert!(!S::Turn1Completed.can_transition_to(S::Turn2Completed));
        assert!(!is_valid_status_path(&[S::Initialized, S::Turn1Started]));
    }

    #[test]
    fn test_rejects_transitions_after_terminal() {
        assert!(!is_valid_status_path(&[
            S::Initialized,
            S::Failed,
            S::ImagesFetched
        ]));
        assert!(!S::Completed.can_transition_to(S::Failed));
    }

    #[test]
    fn test_path_must_start_at_initialized() {
        assert!(!is_valid_status_path(&[]));
        assert!(!is_valid_status_path(&[S::ImagesFetched]));
        assert!(is_valid_status_path(&[S::Initialized]));
    }
}
