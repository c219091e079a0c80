//! Failure classification.
//!
//! Whether a failing work item aborts the pipeline is decided in exactly one
//! place, by an explicit three-way classification. No flag threaded through
//! the orchestrator, no ambient "continue on error" mode: the classifier's
//! answer is the whole policy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use isoforge_runner::ItemStatus;
use isoforge_utils::error::ConfigError;
use isoforge_utils::types::{ItemId, PhaseId};

use crate::{Plan, WorkItem};

/// Decision for a failed work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Run the item again; its retry budget is not exhausted
    Retry,
    /// Record the item as skipped and continue the phase
    TolerateAndContinue,
    /// Abort the pipeline
    Fatal,
}

/// Externally configured failure tolerance.
///
/// The set of components that are "expected to fail" is environment-specific
/// and drifts over time, so it lives in configuration: an item listed here is
/// treated as best-effort even if its plan entry is not flagged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailurePolicy {
    /// Phase id → tolerated item ids. Flattened so a config `[policy]`
    /// table reads `extras = ["fonts"]` rather than nesting a field name.
    #[serde(flatten)]
    tolerated: BTreeMap<PhaseId, BTreeSet<ItemId>>,
}

impl FailurePolicy {
    /// Mark an item as tolerated.
    pub fn tolerate(&mut self, phase: PhaseId, item: ItemId) {
        self.tolerated.entry(phase).or_default().insert(item);
    }

    /// Whether the policy tolerates failures of this item.
    #[must_use]
    pub fn is_tolerated(&self, phase: &PhaseId, item: &ItemId) -> bool {
        self.tolerated
            .get(phase)
            .is_some_and(|items| items.contains(item))
    }

    /// Reject policy entries that reference phases or items the plan does
    /// not define; a typo here would silently un-tolerate a flaky item.
    pub fn validate_against(&self, plan: &Plan) -> Result<(), ConfigError> {
        for (phase_id, items) in &self.tolerated {
            let Some(phase) = plan.get(phase_id) else {
                return Err(ConfigError::UnknownPolicyTarget {
                    kind: "phase".to_string(),
                    id: phase_id.to_string(),
                });
            };
            for item_id in items {
                if !phase.items.iter().any(|i| &i.id == item_id) {
                    return Err(ConfigError::UnknownPolicyTarget {
                        kind: "item".to_string(),
                        id: format!("{phase_id}/{item_id}"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Decides the fate of failed work items.
#[derive(Debug, Clone, Default)]
pub struct FailureClassifier {
    policy: FailurePolicy,
}

impl FailureClassifier {
    #[must_use]
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    /// Classify a failed attempt.
    ///
    /// `attempt` is 1-based. An item is best-effort if its plan entry says so
    /// or the external policy tolerates it. A timeout is at least as severe
    /// as a nonzero exit: on a required item it is fatal like any failure,
    /// and on a best-effort item it consumes the same retry budget.
    #[must_use]
    pub fn classify(
        &self,
        phase: &PhaseId,
        item: &WorkItem,
        status: ItemStatus,
        attempt: u32,
    ) -> Classification {
        debug_assert!(!status.success(), "classify called on a successful item");

        let best_effort = item.best_effort || self.policy.is_tolerated(phase, &item.id);
        if !best_effort {
            return Classification::Fatal;
        }
        if attempt <= item.max_retries {
            Classification::Retry
        } else {
            Classification::TolerateAndContinue
        }
    }
}
