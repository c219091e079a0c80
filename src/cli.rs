//! Command-line interface for isoforge.

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use isoforge_checkpoint::CheckpointStore;
use isoforge_orchestrator::{PhaseScheduler, RunOutcome, SchedulerOptions};
use isoforge_pipeline::FailureClassifier;
use isoforge_runner::{LogSink, NativeRunner};
use isoforge_toolchain::{ExecutionContext, ToolCache, ToolLocator};
use isoforge_utils::exit_codes::error_to_exit_code;
use isoforge_utils::{ExitCode, IsoforgeError};

use crate::config::PipelineConfig;
use crate::doctor::{self, CheckStatus};
use crate::lock::RunLock;

/// isoforge - staged build orchestrator for bootable system images
#[derive(Parser)]
#[command(name = "isoforge")]
#[command(about = "Staged build orchestrator for bootable system images")]
#[command(long_about = r#"
isoforge drives a multi-phase pipeline of external tool invocations
(bootstrapper, package installer, filesystem builder, ISO packager) with
durable checkpoints: a failed or interrupted run resumes at the phase it
stopped in, never from the top.

EXAMPLES:
  # Run the pipeline described by isoforge.toml (discovered upward from cwd)
  sudo isoforge build

  # Resume after a fatal failure (default: completed phases are skipped)
  sudo isoforge build

  # Start over, discarding checkpoints
  sudo isoforge build --clean

  # Start over and also drop cached tool resolutions
  sudo isoforge build --fresh

  # Show what would run without spawning anything
  isoforge build --dry-run

  # Inspect checkpoint state
  isoforge status
  isoforge status --json

  # Preflight the environment
  isoforge doctor

EXIT CODES:
  0  success (fully or partially succeeded phases)
  1  a required external tool is missing
  2  fatal phase failure, corrupt checkpoint, or unmet privilege requirement
  3  interrupted; checkpoint preserved for resume

CONFIGURATION:
  isoforge.toml declares the phases ([[phase]] tables with [[phase.item]]
  work items), required tools, fallback tool directories ([tools]) and the
  failure-tolerance policy ([policy]). State lives in .isoforge/ next to it.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the pipeline, resuming from the last checkpoint
    Build {
        /// Reset the checkpoint store before running
        #[arg(long)]
        clean: bool,

        /// Like --clean, and also drop cached tool resolutions
        #[arg(long)]
        fresh: bool,

        /// Print the plan without spawning anything
        #[arg(long)]
        dry_run: bool,

        /// Override every phase's worker-pool width
        #[arg(long)]
        jobs: Option<usize>,

        /// Default per-item timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show checkpoint state for this project
    Status {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Run preflight environment checks
    Doctor,

    /// Reset the checkpoint store and tool cache
    Clean,
}

/// CLI entry point: parse, dispatch, map errors to exit codes.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = isoforge_utils::logging::init_tracing(cli.debug) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return Err(ExitCode::FATAL);
        }
    };

    match runtime.block_on(dispatch(&cli)) {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            Err(error_to_exit_code(&e))
        }
    }
}

fn config_path(cli: &Cli) -> Option<Utf8PathBuf> {
    cli.config
        .as_ref()
        .and_then(|p| Utf8PathBuf::from_path_buf(p.clone()).ok())
}

async fn dispatch(cli: &Cli) -> Result<ExitCode, IsoforgeError> {
    let explicit = config_path(cli);
    match &cli.command {
        Command::Build {
            clean,
            fresh,
            dry_run,
            jobs,
            timeout_secs,
        } => {
            run_build(
                explicit.as_deref(),
                BuildFlags {
                    clean: *clean || *fresh,
                    fresh: *fresh,
                    dry_run: *dry_run,
                    jobs: *jobs,
                    timeout_secs: *timeout_secs,
                },
            )
            .await
        }
        Command::Status { json } => run_status(explicit.as_deref(), *json),
        Command::Doctor => run_doctor(explicit.as_deref()),
        Command::Clean => run_clean(explicit.as_deref()),
    }
}

struct BuildFlags {
    clean: bool,
    fresh: bool,
    dry_run: bool,
    jobs: Option<usize>,
    timeout_secs: Option<u64>,
}

async fn run_build(
    explicit: Option<&Utf8Path>,
    flags: BuildFlags,
) -> Result<ExitCode, IsoforgeError> {
    let config = PipelineConfig::load(explicit)?;
    config.layout.ensure()?;

    if flags.dry_run {
        print_plan(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let mut lock = RunLock::new(&config.layout.run_lock)?;
    let _guard = lock.try_acquire()?;

    if flags.clean {
        CheckpointStore::wipe(&config.layout.checkpoints)?;
        tracing::info!("checkpoint store reset");
    }
    if flags.fresh {
        ToolCache::invalidate(&config.layout.tool_cache)?;
        tracing::info!("tool cache dropped");
    }

    let ctx = ExecutionContext::capture();
    if config.require_root {
        ctx.require_elevation()?;
    }

    let mut store = CheckpointStore::open(config.layout.checkpoints.clone())?;

    let mut fallback_dirs = config.extra_fallback_dirs.clone();
    fallback_dirs.extend(ctx.default_fallback_dirs());
    let mut locator = ToolLocator::new(ctx)
        .with_fallback_dirs(fallback_dirs)
        .with_cache(ToolCache::open(config.layout.tool_cache.clone()));

    let sink = std::sync::Arc::new(LogSink::create_in(&config.layout.logs_dir)?);
    tracing::info!("logging run output to {}", sink.path());

    let scheduler = PhaseScheduler::new(
        NativeRunner::new(),
        FailureClassifier::new(config.policy.clone()),
        std::sync::Arc::clone(&sink),
        SchedulerOptions {
            default_timeout: flags
                .timeout_secs
                .map(Duration::from_secs)
                .or(config.default_timeout),
            jobs_override: flags.jobs,
        },
    );

    // First ctrl-c requests a graceful stop: no new items launch, in-flight
    // subprocesses are awaited, the checkpoint is persisted.
    let cancel = scheduler.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing in-flight items, then stopping");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = scheduler.run(&config.plan, &mut locator, &mut store).await?;
    println!("{}", report.render());

    Ok(match report.outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::FatalFailure { .. } => ExitCode::FATAL,
        RunOutcome::Interrupted { .. } => ExitCode::INTERRUPTED,
    })
}

fn print_plan(config: &PipelineConfig) {
    println!("plan ({} phases):", config.plan.phases().len());
    for phase in config.plan.phases() {
        let deps = if phase.depends_on.is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = phase.depends_on.iter().map(|d| d.as_str()).collect();
            format!("  (after {})", names.join(", "))
        };
        println!("  {}{deps}", phase.id);
        for item in &phase.items {
            let mut notes = Vec::new();
            if item.best_effort {
                notes.push(format!("best-effort, {} retries", item.max_retries));
            }
            if let Some(secs) = item.timeout_secs {
                notes.push(format!("timeout {secs}s"));
            }
            let suffix = if notes.is_empty() {
                String::new()
            } else {
                format!("  [{}]", notes.join("; "))
            };
            println!("    {}: {}{suffix}", item.id, item.command().render());
        }
    }
}

fn run_status(explicit: Option<&Utf8Path>, json: bool) -> Result<ExitCode, IsoforgeError> {
    let config = PipelineConfig::load(explicit)?;
    let store = CheckpointStore::open(config.layout.checkpoints.clone())?;

    if json {
        let records: Vec<_> = store.records().collect();
        match serde_json::to_string_pretty(&records) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("error: failed to serialize status: {e}");
                return Ok(ExitCode::FATAL);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    if store.records().next().is_none() {
        println!("no checkpoints recorded; run `isoforge build`");
        return Ok(ExitCode::SUCCESS);
    }

    for phase in config.plan.phases() {
        let status = store.status_of(&phase.id);
        let mut line = format!("  {}: {:?}", phase.id, status);
        if let Some(record) = store.get(&phase.id) {
            if !record.skipped_items.is_empty() {
                let skipped: Vec<&str> = record
                    .skipped_items
                    .iter()
                    .map(|i| i.as_str())
                    .collect();
                line.push_str(&format!(" [skipped: {}]", skipped.join(", ")));
            }
            if let Some(failure) = &record.failure {
                line.push_str(&format!(" — {failure}"));
            }
        }
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_doctor(explicit: Option<&Utf8Path>) -> Result<ExitCode, IsoforgeError> {
    let checks = doctor::run_checks(explicit);

    let mut any_fail = false;
    let mut tool_fail = false;
    for check in &checks {
        let tag = match check.status {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        };
        println!("{tag}  {} — {}", check.name, check.details);
        if check.status == CheckStatus::Fail {
            any_fail = true;
            if check.name.starts_with("tool:") {
                tool_fail = true;
            }
        }
    }

    Ok(if tool_fail {
        ExitCode::TOOL_MISSING
    } else if any_fail {
        ExitCode::FATAL
    } else {
        ExitCode::SUCCESS
    })
}

fn run_clean(explicit: Option<&Utf8Path>) -> Result<ExitCode, IsoforgeError> {
    let config = PipelineConfig::load(explicit)?;
    CheckpointStore::wipe(&config.layout.checkpoints)?;
    ToolCache::invalidate(&config.layout.tool_cache)?;
    println!("checkpoint store and tool cache reset");
    Ok(ExitCode::SUCCESS)
}
