//! Pipeline plan model for isoforge.
//!
//! A plan is static configuration: an ordered list of phases, each holding
//! ordered work items. The declared order *is* the execution order, and
//! dependencies may only point backwards, which makes the list a valid
//! topological sort of the (linear) dependency DAG. Everything is validated
//! up front, before any subprocess runs.

mod policy;

pub use policy::{Classification, FailureClassifier, FailurePolicy};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use isoforge_runner::CommandSpec;
use isoforge_utils::error::PhaseError;
use isoforge_utils::types::{ItemId, PhaseId};

/// One external-tool invocation within a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Item identifier, unique within its phase
    pub id: ItemId,
    /// Program to invoke (resolved through the execution context's PATH)
    pub program: String,
    /// Arguments, passed as discrete elements
    #[serde(default)]
    pub args: Vec<String>,
    /// Whether this item may fail without aborting the phase
    #[serde(default)]
    pub best_effort: bool,
    /// Additional attempts granted after the first failure
    #[serde(default)]
    pub max_retries: u32,
    /// Per-item timeout in seconds; `None` inherits the pipeline default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl WorkItem {
    /// A required (non-best-effort) item with no retries.
    #[must_use]
    pub fn required(id: ItemId, program: impl Into<String>) -> Self {
        Self {
            id,
            program: program.into(),
            args: Vec::new(),
            best_effort: false,
            max_retries: 0,
            timeout_secs: None,
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Mark as best-effort with a retry budget.
    #[must_use]
    pub fn best_effort(mut self, max_retries: u32) -> Self {
        self.best_effort = true;
        self.max_retries = max_retries;
        self
    }

    /// Set a per-item timeout.
    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// The argv-style command spec for this item.
    #[must_use]
    pub fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.program).args(self.args.iter().map(String::as_str))
    }

    /// Effective timeout given the pipeline default.
    #[must_use]
    pub fn effective_timeout(&self, default: Option<Duration>) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs).or(default)
    }
}

/// A named, ordered stage of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    /// Phase identifier, unique within the plan
    pub id: PhaseId,
    /// Phases that must have completed before this one runs
    #[serde(default)]
    pub depends_on: Vec<PhaseId>,
    /// External tools this phase invokes; resolved before the pipeline starts
    #[serde(default)]
    pub tools: Vec<String>,
    /// Ordered work items (`[[phase.item]]` tables in the config file)
    #[serde(default, alias = "item")]
    pub items: Vec<WorkItem>,
    /// Worker-pool width for this phase's items; 1 = sequential (default)
    #[serde(default = "default_parallelism")]
    pub max_parallel: usize,
}

fn default_parallelism() -> usize {
    1
}

impl Phase {
    /// A sequential phase with the given items.
    #[must_use]
    pub fn new(id: PhaseId, items: Vec<WorkItem>) -> Self {
        Self {
            id,
            depends_on: Vec::new(),
            tools: Vec::new(),
            items,
            max_parallel: 1,
        }
    }

    /// Declare a dependency.
    #[must_use]
    pub fn depends_on(mut self, phase: PhaseId) -> Self {
        self.depends_on.push(phase);
        self
    }

    /// Declare required tools.
    #[must_use]
    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Allow bounded parallelism across this phase's items.
    #[must_use]
    pub fn max_parallel(mut self, width: usize) -> Self {
        self.max_parallel = width.max(1);
        self
    }
}

/// A validated, ordered pipeline plan.
#[derive(Debug, Clone)]
pub struct Plan {
    phases: Vec<Phase>,
}

impl Plan {
    /// Validate and build a plan.
    ///
    /// Rejects duplicate phase ids, duplicate item ids within a phase,
    /// dependencies on unknown phases, and forward dependencies.
    pub fn new(phases: Vec<Phase>) -> Result<Self, PhaseError> {
        let mut seen: HashSet<&PhaseId> = HashSet::new();
        for phase in &phases {
            if !seen.insert(&phase.id) {
                return Err(PhaseError::DuplicatePhase {
                    phase: phase.id.to_string(),
                });
            }

            let mut item_ids: HashSet<&ItemId> = HashSet::new();
            for item in &phase.items {
                if !item_ids.insert(&item.id) {
                    return Err(PhaseError::DuplicateItem {
                        phase: phase.id.to_string(),
                        item: item.id.to_string(),
                    });
                }
            }

            for dep in &phase.depends_on {
                if !seen.contains(dep) {
                    // Either the id does not exist at all, or it is declared
                    // later in the plan; distinguish for the error message.
                    if phases.iter().any(|p| &p.id == dep) {
                        return Err(PhaseError::ForwardDependency {
                            phase: phase.id.to_string(),
                            dependency: dep.to_string(),
                        });
                    }
                    return Err(PhaseError::UnknownDependency {
                        phase: phase.id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }
        Ok(Self { phases })
    }

    /// Phases in execution order.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Find a phase by id.
    #[must_use]
    pub fn get(&self, id: &PhaseId) -> Option<&Phase> {
        self.phases.iter().find(|p| &p.id == id)
    }

    /// Unique required tool names in first-use order.
    #[must_use]
    pub fn required_tools(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for phase in &self.phases {
            for tool in &phase.tools {
                if seen.insert(tool.as_str()) {
                    out.push(tool.as_str());
                }
            }
        }
        out
    }
}
