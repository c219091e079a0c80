//! External tool resolution for isoforge.
//!
//! The packaging tools this pipeline drives are frequently installed in
//! user-scoped locations (`~/.local/bin`, `~/.cargo/bin`) that vanish from
//! PATH once the process runs under `sudo`. This crate locates each required
//! tool — ambient PATH first, then a configured list of fallback directories
//! covering both the invoking user's home and the elevated user's home — and
//! folds every fallback hit into a single [`ExecutionContext`] whose
//! augmented PATH is inherited by all subsequent subprocess spawns.

mod cache;
mod context;
mod locator;

pub use cache::ToolCache;
pub use context::ExecutionContext;
pub use locator::{ToolLocator, ToolSpec};
