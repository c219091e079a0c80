//! isoforge - staged build orchestrator for bootable system images.
//!
//! The pipeline assembles a bootable image by driving external packaging
//! tools (bootstrapper, package installer, filesystem builder, ISO packager,
//! bootloader installer) through an ordered sequence of phases. This crate
//! is the CLI surface; the machinery lives in the workspace members:
//!
//! - `isoforge-toolchain` — tool resolution and the execution context
//! - `isoforge-runner` — subprocess execution with exit-status fidelity
//! - `isoforge-pipeline` — plan model and failure classification
//! - `isoforge-checkpoint` — durable resume state
//! - `isoforge-orchestrator` — the phase scheduler

pub mod cli;
pub mod config;
pub mod doctor;
mod lock;

pub use config::PipelineConfig;
pub use isoforge_checkpoint::{CheckpointRecord, CheckpointStore, PhaseStatus};
pub use isoforge_orchestrator::{PhaseScheduler, RunOutcome, RunReport, SchedulerOptions};
pub use isoforge_utils::{ExitCode, IsoforgeError};
