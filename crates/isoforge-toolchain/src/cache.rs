//! Persistent cache of resolved tool paths.
//!
//! Resolution results are remembered across runs so a multi-invocation build
//! session does not re-walk the fallback directories every time. The cache is
//! advisory: every entry is re-verified (file still present and executable)
//! before reuse, and an unreadable cache file is treated as empty rather than
//! an error. `--fresh` deletes the file outright.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

use isoforge_utils::atomic_write::write_file_atomic;

const CACHE_SCHEMA_VERSION: &str = "1";

/// One cached resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTool {
    /// Absolute path the tool resolved to
    pub path: Utf8PathBuf,
    /// When the resolution happened
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    schema_version: String,
    tools: BTreeMap<String, CachedTool>,
}

/// Tool-resolution cache backed by a JSON file in the state directory.
#[derive(Debug)]
pub struct ToolCache {
    path: Utf8PathBuf,
    tools: BTreeMap<String, CachedTool>,
}

impl ToolCache {
    /// Open the cache at `path`, tolerating an absent or unreadable file.
    #[must_use]
    pub fn open(path: Utf8PathBuf) -> Self {
        let tools = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<CacheFile>(&content) {
                Ok(file) if file.schema_version == CACHE_SCHEMA_VERSION => file.tools,
                Ok(file) => {
                    tracing::debug!(
                        "tool cache {path} has schema {}, expected {CACHE_SCHEMA_VERSION}; ignoring",
                        file.schema_version
                    );
                    BTreeMap::new()
                }
                Err(e) => {
                    tracing::debug!("tool cache {path} unreadable ({e}); starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, tools }
    }

    /// Look up a cached resolution by tool name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CachedTool> {
        self.tools.get(name)
    }

    /// Record a resolution and persist the cache.
    pub fn insert(&mut self, name: &str, path: Utf8PathBuf) {
        self.tools.insert(
            name.to_string(),
            CachedTool {
                path,
                resolved_at: Utc::now(),
            },
        );
        self.persist();
    }

    /// Drop a stale entry and persist the cache.
    pub fn remove(&mut self, name: &str) {
        if self.tools.remove(name).is_some() {
            self.persist();
        }
    }

    fn persist(&self) {
        let file = CacheFile {
            schema_version: CACHE_SCHEMA_VERSION.to_string(),
            tools: self.tools.clone(),
        };
        let json = match serde_json::to_string_pretty(&file) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("failed to serialize tool cache: {e}");
                return;
            }
        };
        // Cache persistence is best-effort; resolution already succeeded.
        if let Err(e) = write_file_atomic(&self.path, &json) {
            tracing::warn!("failed to write tool cache {}: {e}", self.path);
        }
    }

    /// Delete a cache file on disk (used by `--fresh` and `clean`).
    pub fn invalidate(path: &Utf8Path) -> std::io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
