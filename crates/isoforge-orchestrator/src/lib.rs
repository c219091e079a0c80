//! Phase scheduling core for isoforge.
//!
//! The scheduler walks the plan's phases in declared order, skipping phases
//! the checkpoint store already records as complete. Work items run through
//! the process runner; every failure goes through the classifier, and a
//! single fatal classification halts the whole pipeline with the checkpoint
//! pointing at the failed phase. Cancellation stops launching new items,
//! waits for in-flight subprocesses, and reports a distinct interrupted
//! outcome so a later resume is not mistaken for a post-failure retry.

mod report;

pub use report::{PhaseReport, RunOutcome, RunReport};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use isoforge_checkpoint::{CheckpointRecord, CheckpointStore, PhaseStatus};
use isoforge_pipeline::{Classification, FailureClassifier, Phase, Plan, WorkItem};
use isoforge_runner::{ItemStatus, LogSink, ProcessRunner};
use isoforge_toolchain::{ExecutionContext, ToolLocator};
use isoforge_utils::IsoforgeError;
use isoforge_utils::error::{PhaseError, RunnerError};
use isoforge_utils::types::{ItemId, PhaseId};

/// Scheduler tuning knobs supplied by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerOptions {
    /// Timeout applied to items that declare none of their own
    pub default_timeout: Option<Duration>,
    /// Override every phase's worker-pool width (`--jobs`)
    pub jobs_override: Option<usize>,
}

/// Terminal outcome of one work item within a phase.
enum ItemOutcome {
    Succeeded,
    Skipped,
    Fatal(ItemStatus),
    /// Not started (or not restarted) because the phase is stopping
    NotRun,
}

/// The orchestration core.
pub struct PhaseScheduler<R: ProcessRunner + 'static> {
    runner: Arc<R>,
    classifier: Arc<FailureClassifier>,
    sink: Arc<LogSink>,
    cancel: Arc<AtomicBool>,
    options: SchedulerOptions,
}

impl<R: ProcessRunner + 'static> PhaseScheduler<R> {
    #[must_use]
    pub fn new(
        runner: R,
        classifier: FailureClassifier,
        sink: Arc<LogSink>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            runner: Arc::new(runner),
            classifier: Arc::new(classifier),
            sink,
            cancel: Arc::new(AtomicBool::new(false)),
            options,
        }
    }

    /// Flag observed between item launches; setting it requests cancellation.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Drive the whole plan.
    ///
    /// Required tools are resolved up front: a missing tool surfaces before
    /// any phase runs. The execution context (with any PATH augmentation
    /// from fallback resolution) is then fixed for the run.
    pub async fn run(
        &self,
        plan: &Plan,
        locator: &mut ToolLocator,
        store: &mut CheckpointStore,
    ) -> Result<RunReport, IsoforgeError> {
        for tool in plan.required_tools() {
            let path = locator.resolve_name(tool)?;
            tracing::debug!("tool {tool} resolved to {path}");
        }
        let ctx = locator.context().clone();

        let mut phases = Vec::new();
        for phase in plan.phases() {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(RunReport {
                    outcome: RunOutcome::Interrupted {
                        phase: Some(phase.id.clone()),
                    },
                    phases,
                });
            }

            if store.is_complete(&phase.id) {
                // Work already done in a previous run; do not repeat it.
                let (status, skipped) = store
                    .get(&phase.id)
                    .map(|r| (r.status, r.skipped_items.clone()))
                    .unwrap_or((PhaseStatus::Succeeded, Vec::new()));
                tracing::info!("phase {} already complete; skipping", phase.id);
                phases.push(PhaseReport {
                    id: phase.id.clone(),
                    status,
                    skipped,
                    from_checkpoint: true,
                });
                continue;
            }

            // Plan validation guarantees declaration order; the store can
            // still disagree after a manual checkpoint edit.
            for dep in &phase.depends_on {
                if !store.is_complete(dep) {
                    return Err(PhaseError::DependencyNotSatisfied {
                        phase: phase.id.to_string(),
                        dependency: dep.to_string(),
                    }
                    .into());
                }
            }

            tracing::info!("phase {} starting ({} items)", phase.id, phase.items.len());
            self.sink.phase_marker(&phase.id);
            store.save(CheckpointRecord::new(phase.id.clone(), PhaseStatus::Running))?;

            let width = self
                .options
                .jobs_override
                .unwrap_or(phase.max_parallel)
                .max(1);
            let exec = if width <= 1 || phase.items.len() <= 1 {
                self.run_phase_sequential(&ctx, phase).await
            } else {
                self.run_phase_parallel(&ctx, phase, width).await
            };
            let exec = match exec {
                Ok(exec) => exec,
                Err(e) => {
                    store.save(
                        CheckpointRecord::new(phase.id.clone(), PhaseStatus::Failed)
                            .with_failure(e.to_string()),
                    )?;
                    return Err(e.into());
                }
            };

            if let Some((item, status)) = exec.fatal {
                let summary = format!("{item}: {}", status.describe());
                tracing::error!("phase {} failed — {summary}", phase.id);
                let mut record = CheckpointRecord::new(phase.id.clone(), PhaseStatus::Failed)
                    .with_failure(summary);
                record.skipped_items = exec.skipped;
                store.save(record)?;
                phases.push(PhaseReport {
                    id: phase.id.clone(),
                    status: PhaseStatus::Failed,
                    skipped: Vec::new(),
                    from_checkpoint: false,
                });
                return Ok(RunReport {
                    outcome: RunOutcome::FatalFailure {
                        phase: phase.id.clone(),
                        item,
                        detail: format!("{}; see {}", status.describe(), self.sink.path()),
                    },
                    phases,
                });
            }

            if exec.interrupted {
                // The Running record stays; resume re-runs this phase.
                self.sink.annotate(&format!("phase {} interrupted", phase.id));
                return Ok(RunReport {
                    outcome: RunOutcome::Interrupted {
                        phase: Some(phase.id.clone()),
                    },
                    phases,
                });
            }

            let status = if exec.skipped.is_empty() {
                PhaseStatus::Succeeded
            } else {
                PhaseStatus::PartiallySucceeded
            };
            let mut record = CheckpointRecord::new(phase.id.clone(), status);
            record.skipped_items = exec.skipped.clone();
            store.save(record)?;
            tracing::info!("phase {} {:?}", phase.id, status);
            phases.push(PhaseReport {
                id: phase.id.clone(),
                status,
                skipped: exec.skipped,
                from_checkpoint: false,
            });
        }

        Ok(RunReport {
            outcome: RunOutcome::Completed,
            phases,
        })
    }

    async fn run_phase_sequential(
        &self,
        ctx: &ExecutionContext,
        phase: &Phase,
    ) -> Result<PhaseExecution, RunnerError> {
        let mut exec = PhaseExecution::default();
        for item in &phase.items {
            if self.cancel.load(Ordering::SeqCst) {
                exec.interrupted = true;
                break;
            }
            let outcome = execute_item(
                self.runner.as_ref(),
                &self.classifier,
                &self.sink,
                &self.cancel,
                ctx,
                &phase.id,
                item,
                self.options.default_timeout,
            )
            .await?;
            match outcome {
                ItemOutcome::Succeeded => {}
                ItemOutcome::Skipped => exec.skipped.push(item.id.clone()),
                ItemOutcome::Fatal(status) => {
                    exec.fatal = Some((item.id.clone(), status));
                    break;
                }
                ItemOutcome::NotRun => {
                    exec.interrupted = true;
                    break;
                }
            }
        }
        Ok(exec)
    }

    async fn run_phase_parallel(
        &self,
        ctx: &ExecutionContext,
        phase: &Phase,
        width: usize,
    ) -> Result<PhaseExecution, RunnerError> {
        let semaphore = Arc::new(Semaphore::new(width));
        // Set on the first fatal outcome so queued items never start; the
        // run-wide cancel flag has the same effect.
        let stop = Arc::new(AtomicBool::new(false));
        let mut join = JoinSet::new();

        for item in phase.items.clone() {
            let runner = Arc::clone(&self.runner);
            let classifier = Arc::clone(&self.classifier);
            let sink = Arc::clone(&self.sink);
            let cancel = Arc::clone(&self.cancel);
            let stop = Arc::clone(&stop);
            let semaphore = Arc::clone(&semaphore);
            let ctx = ctx.clone();
            let phase_id = phase.id.clone();
            let default_timeout = self.options.default_timeout;

            join.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (item.id.clone(), Ok(ItemOutcome::NotRun));
                };
                if stop.load(Ordering::SeqCst) || cancel.load(Ordering::SeqCst) {
                    return (item.id.clone(), Ok(ItemOutcome::NotRun));
                }
                let result = execute_item(
                    runner.as_ref(),
                    &classifier,
                    &sink,
                    &cancel,
                    &ctx,
                    &phase_id,
                    &item,
                    default_timeout,
                )
                .await;
                if matches!(result, Ok(ItemOutcome::Fatal(_)) | Err(_)) {
                    stop.store(true, Ordering::SeqCst);
                }
                (item.id.clone(), result)
            });
        }

        let mut exec = PhaseExecution::default();
        let mut first_error: Option<RunnerError> = None;
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((id, Ok(outcome))) => match outcome {
                    ItemOutcome::Succeeded | ItemOutcome::NotRun => {}
                    ItemOutcome::Skipped => exec.skipped.push(id),
                    ItemOutcome::Fatal(status) => {
                        if exec.fatal.is_none() {
                            exec.fatal = Some((id, status));
                        }
                    }
                },
                Ok((id, Err(e))) => {
                    tracing::error!("item {id} runner error: {e}");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    tracing::error!("worker task failed: {join_err}");
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        // Completion order is nondeterministic; keep the record stable.
        exec.skipped.sort();
        if self.cancel.load(Ordering::SeqCst) && exec.fatal.is_none() {
            exec.interrupted = true;
        }
        Ok(exec)
    }
}

#[derive(Default)]
struct PhaseExecution {
    skipped: Vec<ItemId>,
    fatal: Option<(ItemId, ItemStatus)>,
    interrupted: bool,
}

/// Run one work item to a terminal outcome, retrying as the classifier
/// allows. Attempt numbering is 1-based; `max_retries` grants that many
/// additional attempts after the first failure.
#[allow(clippy::too_many_arguments)]
async fn execute_item<R: ProcessRunner + ?Sized>(
    runner: &R,
    classifier: &FailureClassifier,
    sink: &LogSink,
    cancel: &AtomicBool,
    ctx: &ExecutionContext,
    phase: &PhaseId,
    item: &WorkItem,
    default_timeout: Option<Duration>,
) -> Result<ItemOutcome, RunnerError> {
    let timeout = item.effective_timeout(default_timeout);
    let mut attempt: u32 = 1;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return Ok(ItemOutcome::NotRun);
        }

        let spec = item.command();
        sink.item_begin(phase, &item.id, &spec.render());
        let status = runner.run(&spec, ctx, sink, &item.id, timeout).await?;
        sink.item_end(&item.id, &status.describe());

        if status.success() {
            if attempt > 1 {
                tracing::info!("{phase}/{} succeeded on attempt {attempt}", item.id);
            }
            return Ok(ItemOutcome::Succeeded);
        }

        match classifier.classify(phase, item, status, attempt) {
            Classification::Retry => {
                sink.annotate(&format!(
                    "{phase}/{}: {} on attempt {attempt}; retrying",
                    item.id,
                    status.describe()
                ));
                tracing::warn!(
                    "{phase}/{} failed ({}); retrying",
                    item.id,
                    status.describe()
                );
                attempt += 1;
            }
            Classification::TolerateAndContinue => {
                sink.annotate(&format!(
                    "{phase}/{}: {} after {attempt} attempt(s); tolerated, item skipped",
                    item.id,
                    status.describe()
                ));
                tracing::warn!("{phase}/{} skipped after {attempt} attempt(s)", item.id);
                return Ok(ItemOutcome::Skipped);
            }
            Classification::Fatal => {
                sink.annotate(&format!(
                    "{phase}/{}: {} — fatal, aborting pipeline",
                    item.id,
                    status.describe()
                ));
                return Ok(ItemOutcome::Fatal(status));
            }
        }
    }
}
