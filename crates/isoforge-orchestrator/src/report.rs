//! Aggregate run reporting.

use serde::Serialize;
use std::fmt::Write as _;

use isoforge_checkpoint::PhaseStatus;
use isoforge_utils::types::{ItemId, PhaseId};

/// How the run as a whole ended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RunOutcome {
    /// Every phase completed (fully or partially)
    Completed,
    /// A required work item failed; the pipeline halted at `phase`
    FatalFailure {
        phase: PhaseId,
        item: ItemId,
        detail: String,
    },
    /// The run was cancelled; `phase` is where it stopped, if any phase
    /// had started
    Interrupted { phase: Option<PhaseId> },
}

/// Outcome of one phase within this run.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub id: PhaseId,
    pub status: PhaseStatus,
    /// Best-effort items skipped in this phase
    pub skipped: Vec<ItemId>,
    /// True when the phase was already complete in the checkpoint store and
    /// its work items were not re-executed
    pub from_checkpoint: bool,
}

/// Aggregate report returned by the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    /// Count of fully succeeded phases (including checkpointed ones).
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(PhaseStatus::Succeeded)
    }

    /// Count of partially succeeded phases.
    #[must_use]
    pub fn partially_succeeded(&self) -> usize {
        self.count(PhaseStatus::PartiallySucceeded)
    }

    /// Count of failed phases (0 or 1; a fatal failure halts the run).
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(PhaseStatus::Failed)
    }

    fn count(&self, status: PhaseStatus) -> usize {
        self.phases.iter().filter(|p| p.status == status).count()
    }

    /// Whether the pipeline reached the end of the plan.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }

    /// Multi-line human summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for phase in &self.phases {
            let suffix = if phase.from_checkpoint {
                " (from checkpoint)"
            } else {
                ""
            };
            let _ = write!(out, "  {}: {:?}{suffix}", phase.id, phase.status);
            if !phase.skipped.is_empty() {
                let skipped: Vec<&str> =
                    phase.skipped.iter().map(ItemId::as_str).collect();
                let _ = write!(out, " [skipped: {}]", skipped.join(", "));
            }
            out.push('\n');
        }
        let _ = match &self.outcome {
            RunOutcome::Completed => write!(
                out,
                "pipeline complete: {} succeeded, {} partially succeeded",
                self.succeeded(),
                self.partially_succeeded()
            ),
            RunOutcome::FatalFailure {
                phase,
                item,
                detail,
            } => write!(
                out,
                "pipeline failed at {phase}/{item}: {detail}\nresume with `isoforge build` (without --clean) to retry from this phase"
            ),
            RunOutcome::Interrupted { phase } => match phase {
                Some(phase) => write!(
                    out,
                    "pipeline interrupted during {phase}; checkpoint preserved, resume with `isoforge build`"
                ),
                None => write!(out, "pipeline interrupted before any phase started"),
            },
        };
        out
    }
}
