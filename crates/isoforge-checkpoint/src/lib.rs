//! Durable checkpoint store for isoforge.
//!
//! The checkpoint file is the single source of truth for resume decisions:
//! which phases already completed, which phase a fatal failure stopped at,
//! and which best-effort items were skipped along the way. Every save
//! rewrites the whole document atomically, so a process kill mid-write
//! leaves either the previous state or the new state on disk, never a
//! mixture.

mod model;
mod store;

pub use model::{CheckpointRecord, PhaseStatus};
pub use store::CheckpointStore;
