//! Atomic file writes.
//!
//! Checkpoint and cache files are written with the temp-file + fsync + rename
//! discipline: a reader (including a reader that starts after this process is
//! killed mid-write) observes either the previous content or the new content,
//! never a partial mixture. The temp file is created in the target's own
//! directory so the final rename stays on one filesystem.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically replace `path` with `content`.
///
/// Creates missing parent directories. The write is durable before the
/// rename: the temp file is fsynced first.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory: {parent}"))?;
    }

    let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in: {dir}"))?;

    temp.write_all(content.as_bytes())
        .context("failed to write temp file")?;
    temp.as_file().sync_all().context("failed to fsync temp file")?;

    temp.persist(path.as_std_path())
        .map_err(|e| anyhow::Error::from(e.error))
        .with_context(|| format!("failed to atomically replace {path}"))?;

    Ok(())
}
