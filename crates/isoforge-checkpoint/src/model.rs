//! Checkpoint record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use isoforge_utils::types::{ItemId, PhaseId};

/// Lifecycle status of one phase.
///
/// `Running` persists across a crash: a record stuck in `Running` at load
/// time means the previous process died mid-phase, and the phase is re-run
/// from the top on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Known to the store but not yet started
    Pending,
    /// Work items are (or were, at crash time) executing
    Running,
    /// Every item succeeded
    Succeeded,
    /// Completed, but one or more best-effort items were skipped
    PartiallySucceeded,
    /// A required item failed; the pipeline halted here
    Failed,
}

impl PhaseStatus {
    /// Whether downstream phases may treat this phase as done.
    ///
    /// Partial success counts: a best-effort phase only has to have been
    /// attempted for its dependents to proceed.
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(self, PhaseStatus::Succeeded | PhaseStatus::PartiallySucceeded)
    }

    /// Whether this is a terminal state within a run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PhaseStatus::Succeeded | PhaseStatus::PartiallySucceeded | PhaseStatus::Failed
        )
    }
}

/// Persisted record of one phase's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// The phase this record describes
    pub phase: PhaseId,
    /// Current lifecycle status
    pub status: PhaseStatus,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
    /// Best-effort items skipped after exhausting their retry budget
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_items: Vec<ItemId>,
    /// Human-readable summary of the fatal failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl CheckpointRecord {
    /// Fresh record in the given status, stamped now.
    #[must_use]
    pub fn new(phase: PhaseId, status: PhaseStatus) -> Self {
        Self {
            phase,
            status,
            updated_at: Utc::now(),
            skipped_items: Vec::new(),
            failure: None,
        }
    }

    /// Transition to a new status, refreshing the timestamp.
    #[must_use]
    pub fn with_status(mut self, status: PhaseStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }

    /// Attach a fatal failure summary.
    #[must_use]
    pub fn with_failure(mut self, summary: impl Into<String>) -> Self {
        self.failure = Some(summary.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_includes_partial_success() {
        assert!(PhaseStatus::Succeeded.is_complete());
        assert!(PhaseStatus::PartiallySucceeded.is_complete());
        assert!(!PhaseStatus::Failed.is_complete());
        assert!(!PhaseStatus::Running.is_complete());
        assert!(!PhaseStatus::Pending.is_complete());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&PhaseStatus::PartiallySucceeded).unwrap();
        assert_eq!(json, r#""partially_succeeded""#);
    }

    #[test]
    fn empty_fields_are_omitted_from_json() {
        let record = CheckpointRecord::new(
            PhaseId::new("bootstrap").unwrap(),
            PhaseStatus::Succeeded,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("skipped_items"));
        assert!(!json.contains("failure"));
    }
}
