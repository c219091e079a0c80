//! Shared infrastructure for the isoforge workspace.
//!
//! Everything here is consumed by more than one member crate: the error
//! taxonomy, the process exit code table, atomic file writes, state-directory
//! layout, logging initialization, and the small identifier types that name
//! phases and work items.

pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod types;

pub use error::IsoforgeError;
pub use exit_codes::ExitCode;
pub use types::{ItemId, PhaseId};
