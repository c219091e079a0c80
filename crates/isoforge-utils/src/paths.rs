//! State-directory layout and config discovery.
//!
//! All persisted run state lives under a `.isoforge/` directory next to the
//! pipeline configuration file, so repeated invocations against the same
//! working tree resume consistently.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Name of the pipeline configuration file discovered by upward search.
pub const CONFIG_FILE_NAME: &str = "isoforge.toml";

/// Name of the state directory created next to the configuration file.
pub const STATE_DIR_NAME: &str = ".isoforge";

/// Well-known paths for one project's persisted state.
#[derive(Debug, Clone)]
pub struct StateLayout {
    /// The `.isoforge/` directory itself
    pub state_dir: Utf8PathBuf,
    /// Checkpoint store file
    pub checkpoints: Utf8PathBuf,
    /// Persistent tool-resolution cache
    pub tool_cache: Utf8PathBuf,
    /// Run lock file
    pub run_lock: Utf8PathBuf,
    /// Per-run log files
    pub logs_dir: Utf8PathBuf,
}

impl StateLayout {
    /// Layout rooted at the directory containing the config file.
    #[must_use]
    pub fn for_project(project_root: &Utf8Path) -> Self {
        let state_dir = project_root.join(STATE_DIR_NAME);
        Self {
            checkpoints: state_dir.join("checkpoints.json"),
            tool_cache: state_dir.join("toolcache.json"),
            run_lock: state_dir.join("run.lock"),
            logs_dir: state_dir.join("logs"),
            state_dir,
        }
    }

    /// Create the state directory and logs directory if absent.
    pub fn ensure(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.logs_dir)?;
        Ok(())
    }
}

/// Search upward from `start` for a directory containing [`CONFIG_FILE_NAME`].
///
/// Returns the path of the config file, or `None` if the filesystem root is
/// reached without a hit.
#[must_use]
pub fn discover_config(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}
