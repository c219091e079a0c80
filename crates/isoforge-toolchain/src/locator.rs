//! Tool lookup across PATH and fallback install locations.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;

use isoforge_utils::error::ToolError;

use crate::cache::ToolCache;
use crate::context::ExecutionContext;

/// A required external tool and where it may live.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Logical tool name used in errors, the cache, and the config
    pub name: String,
    /// Executable file name to search for (usually equal to `name`)
    pub command: String,
    /// Per-tool candidate directories searched before the global fallbacks
    pub candidates: Vec<Utf8PathBuf>,
}

impl ToolSpec {
    /// A tool whose executable name matches its logical name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            command: name.clone(),
            name,
            candidates: Vec::new(),
        }
    }

    /// Add a per-tool candidate directory.
    #[must_use]
    pub fn candidate(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.candidates.push(dir.into());
        self
    }
}

/// Resolves external tools and owns the [`ExecutionContext`].
///
/// Resolution order: the context's PATH, then the tool's own candidate
/// directories, then the locator's global fallback directories. A hit outside
/// PATH prepends the containing directory to the context's PATH, so every
/// subsequent subprocess spawn and every subsequent lookup inherits it.
/// Results are memoized for the run; the persistent cache (if attached) is
/// consulted first and re-verified before reuse.
#[derive(Debug)]
pub struct ToolLocator {
    ctx: ExecutionContext,
    fallback_dirs: Vec<Utf8PathBuf>,
    cache: Option<ToolCache>,
    resolved: HashMap<String, Utf8PathBuf>,
}

impl ToolLocator {
    /// Create a locator over `ctx` with the context's default fallback dirs.
    #[must_use]
    pub fn new(ctx: ExecutionContext) -> Self {
        let fallback_dirs = ctx.default_fallback_dirs();
        Self {
            ctx,
            fallback_dirs,
            cache: None,
            resolved: HashMap::new(),
        }
    }

    /// Replace the global fallback directory list (config override).
    #[must_use]
    pub fn with_fallback_dirs(mut self, dirs: Vec<Utf8PathBuf>) -> Self {
        self.fallback_dirs = dirs;
        self
    }

    /// Attach a persistent tool cache.
    #[must_use]
    pub fn with_cache(mut self, cache: ToolCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The execution context, including any PATH augmentation so far.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Resolve a tool by bare name.
    pub fn resolve_name(&mut self, name: &str) -> Result<Utf8PathBuf, ToolError> {
        self.resolve(&ToolSpec::named(name))
    }

    /// Resolve a tool to an absolute executable path.
    pub fn resolve(&mut self, spec: &ToolSpec) -> Result<Utf8PathBuf, ToolError> {
        if let Some(path) = self.resolved.get(&spec.name) {
            return Ok(path.clone());
        }

        if let Some(path) = self.take_cached(&spec.name) {
            tracing::debug!("tool '{}' resolved from cache: {path}", spec.name);
            self.adopt(spec, path.clone());
            return Ok(path);
        }

        if let Some(path) = self.search_path(&spec.command) {
            tracing::debug!("tool '{}' found on PATH: {path}", spec.name);
            self.adopt(spec, path.clone());
            return Ok(path);
        }

        let mut attempted = Vec::new();
        let mut found = None;
        for dir in spec.candidates.iter().chain(self.fallback_dirs.iter()) {
            let candidate = dir.join(&spec.command);
            if is_executable(&candidate) {
                found = Some(candidate);
                break;
            }
            attempted.push(dir.to_string());
        }
        if let Some(path) = found {
            tracing::info!(
                "tool '{}' found in fallback directory; adding {} to PATH",
                spec.name,
                path.parent().map(Utf8Path::as_str).unwrap_or("?")
            );
            self.adopt(spec, path.clone());
            return Ok(path);
        }

        Err(ToolError::NotFound {
            tool: spec.name.clone(),
            attempted,
            hint: format!(
                "install {} or add its directory to [tools].fallback_dirs in isoforge.toml",
                spec.name
            ),
        })
    }

    /// Cached path for `name`, dropped from the cache if no longer executable.
    fn take_cached(&mut self, name: &str) -> Option<Utf8PathBuf> {
        let cache = self.cache.as_mut()?;
        let path = cache.get(name)?.path.clone();
        if is_executable(&path) {
            Some(path)
        } else {
            tracing::debug!("cached path for '{name}' is stale ({path}); re-resolving");
            cache.remove(name);
            None
        }
    }

    fn search_path(&self, command: &str) -> Option<Utf8PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| "/".into());
        let found = which::which_in(command, Some(self.ctx.path_value()), cwd).ok()?;
        Utf8PathBuf::from_path_buf(found).ok()
    }

    /// Memoize a resolution, persist it to the cache, and make sure its
    /// directory is on the context PATH.
    fn adopt(&mut self, spec: &ToolSpec, path: Utf8PathBuf) {
        if let Some(dir) = path.parent() {
            let dir = dir.to_owned();
            self.ctx.prepend_path(&dir);
        }
        if let Some(cache) = self.cache.as_mut() {
            cache.insert(&spec.name, path.clone());
        }
        self.resolved.insert(spec.name.clone(), path);
    }
}

#[cfg(unix)]
fn is_executable(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.as_std_path()
        .metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Utf8Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[cfg(unix)]
    fn install_fake_tool(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn finds_tool_in_fallback_dir_and_augments_path() {
        let dir = TempDir::new().unwrap();
        let tools_dir = utf8(&dir);
        install_fake_tool(&tools_dir, "mkimagefs");

        let ctx = ExecutionContext::with_path("/nonexistent-path-entry");
        let mut locator =
            ToolLocator::new(ctx).with_fallback_dirs(vec![tools_dir.clone()]);

        let path = locator.resolve_name("mkimagefs").unwrap();
        assert_eq!(path, tools_dir.join("mkimagefs"));
        assert!(locator.context().path_contains(&tools_dir));
    }

    #[cfg(unix)]
    #[test]
    fn resolution_is_memoized_for_the_run() {
        let dir = TempDir::new().unwrap();
        let tools_dir = utf8(&dir);
        let installed = install_fake_tool(&tools_dir, "mkimagefs");

        let ctx = ExecutionContext::with_path("/nonexistent-path-entry");
        let mut locator =
            ToolLocator::new(ctx).with_fallback_dirs(vec![tools_dir.clone()]);

        locator.resolve_name("mkimagefs").unwrap();
        // Deleting the binary must not matter: the path is memoized.
        fs::remove_file(&installed).unwrap();
        let path = locator.resolve_name("mkimagefs").unwrap();
        assert_eq!(path, installed);
    }

    #[test]
    fn not_found_reports_every_attempted_directory() {
        let ctx = ExecutionContext::with_path("/nonexistent-path-entry");
        let mut locator = ToolLocator::new(ctx).with_fallback_dirs(vec![
            Utf8PathBuf::from("/nowhere/one"),
            Utf8PathBuf::from("/nowhere/two"),
        ]);

        let err = locator.resolve_name("missing-tool").unwrap_err();
        match err {
            ToolError::NotFound {
                tool, attempted, ..
            } => {
                assert_eq!(tool, "missing-tool");
                assert_eq!(attempted, vec!["/nowhere/one", "/nowhere/two"]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn stale_cache_entry_is_dropped_and_reresolved() {
        let dir = TempDir::new().unwrap();
        let tools_dir = utf8(&dir);
        let cache_file = tools_dir.join("toolcache.json");

        // Cache points at a path that no longer exists.
        let mut cache = ToolCache::open(cache_file.clone());
        cache.insert("mkimagefs", tools_dir.join("gone"));

        install_fake_tool(&tools_dir, "mkimagefs");
        let ctx = ExecutionContext::with_path("/nonexistent-path-entry");
        let mut locator = ToolLocator::new(ctx)
            .with_fallback_dirs(vec![tools_dir.clone()])
            .with_cache(ToolCache::open(cache_file));

        let path = locator.resolve_name("mkimagefs").unwrap();
        assert_eq!(path, tools_dir.join("mkimagefs"));
    }

    #[cfg(unix)]
    #[test]
    fn per_tool_candidates_searched_before_global_fallbacks() {
        let specific = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        let specific_dir = utf8(&specific);
        let global_dir = utf8(&global);
        install_fake_tool(&specific_dir, "grub-mkstandalone");
        install_fake_tool(&global_dir, "grub-mkstandalone");

        let ctx = ExecutionContext::with_path("/nonexistent-path-entry");
        let mut locator =
            ToolLocator::new(ctx).with_fallback_dirs(vec![global_dir]);

        let spec = ToolSpec::named("grub-mkstandalone").candidate(specific_dir.clone());
        let path = locator.resolve(&spec).unwrap();
        assert_eq!(path, specific_dir.join("grub-mkstandalone"));
    }
}
