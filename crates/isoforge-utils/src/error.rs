//! Error taxonomy for isoforge.
//!
//! The taxonomy mirrors the failure modes of the pipeline: configuration
//! problems, missing external tools, subprocess execution failures, persisted
//! checkpoint problems, and phase-level orchestration errors. Tolerable work
//! item failures never appear here — they are absorbed by the failure
//! classifier and recorded on the phase checkpoint instead. Anything that
//! reaches [`IsoforgeError`] aborts the run.

use thiserror::Error;

/// Top-level error type for the isoforge pipeline.
#[derive(Debug, Error)]
pub enum IsoforgeError {
    /// Configuration loading or validation failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// External tool resolution or privilege requirement failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Subprocess execution failed (spawn/io, not a nonzero exit)
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Checkpoint store could not be read or written
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Phase orchestration error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Another isoforge process holds the run lock
    #[error("another isoforge process is already running (lock file: {path})")]
    LockHeld { path: String },

    /// The run was cancelled by an external interrupt
    #[error("run interrupted; checkpoint preserved for resume")]
    Interrupted,

    /// Catch-all for io errors that are not attributable to a component
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file was found searching upward from the working dir
    #[error(
        "no isoforge.toml found searching upward from {searched_from}; \
         create one describing the pipeline phases (see `isoforge build --help`)"
    )]
    NotFound { searched_from: String },

    /// The configuration file could not be read
    #[error("failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// The configuration file could not be parsed
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    /// A phase or item identifier did not validate
    #[error("invalid {kind} identifier {id:?}: {reason}")]
    InvalidIdentifier {
        kind: String,
        id: String,
        reason: String,
    },

    /// A policy entry referenced a phase or item the plan does not define
    #[error("failure policy references unknown {kind} {id:?}")]
    UnknownPolicyTarget { kind: String, id: String },
}

/// Tool resolution and privilege errors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A required external tool was not found anywhere
    #[error(
        "required tool '{tool}' not found; searched PATH and: {}\n  hint: {hint}",
        .attempted.join(", ")
    )]
    NotFound {
        tool: String,
        attempted: Vec<String>,
        hint: String,
    },

    /// The pipeline requires elevated privileges that this process lacks
    #[error("insufficient privileges: {detail}")]
    PermissionDenied { detail: String },
}

/// Subprocess runner errors.
///
/// A command that runs and exits nonzero is *not* an error at this layer —
/// the exit status is returned to the caller for classification. These
/// variants cover the cases where no meaningful child status exists.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The child process could not be spawned
    #[error("failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    /// Child output could not be captured
    #[error("failed to capture output of '{program}': {reason}")]
    CaptureFailed { program: String, reason: String },

    /// The log sink could not be created or written
    #[error("log sink error at {path}: {reason}")]
    Sink { path: String, reason: String },
}

/// Checkpoint store errors.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The checkpoint file exists but cannot be parsed.
    ///
    /// The store refuses to guess a partial state; the operator must either
    /// repair the file or reset with `--clean`.
    #[error(
        "checkpoint file {path} is corrupt ({reason}); \
         refusing to guess progress — run `isoforge clean` or `isoforge build --clean` to reset"
    )]
    Corrupt { path: String, reason: String },

    /// The checkpoint file could not be written
    #[error("failed to write checkpoint file {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    /// The checkpoint file could not be read (io, not parse)
    #[error("failed to read checkpoint file {path}: {reason}")]
    ReadFailed { path: String, reason: String },
}

/// Phase orchestration errors.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Two phases share an identifier
    #[error("duplicate phase id '{phase}' in pipeline definition")]
    DuplicatePhase { phase: String },

    /// A phase depends on an id that no phase defines
    #[error("phase '{phase}' depends on unknown phase '{dependency}'")]
    UnknownDependency { phase: String, dependency: String },

    /// A phase depends on a phase declared after it (the plan is a flat
    /// total order; dependencies must point backwards)
    #[error("phase '{phase}' depends on '{dependency}', which is declared later in the plan")]
    ForwardDependency { phase: String, dependency: String },

    /// A phase was asked to run before its dependencies completed
    #[error("phase '{phase}' cannot run: dependency '{dependency}' has not completed")]
    DependencyNotSatisfied { phase: String, dependency: String },

    /// Two items within one phase share an identifier
    #[error("duplicate item id '{item}' in phase '{phase}'")]
    DuplicateItem { phase: String, item: String },
}
