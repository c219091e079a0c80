//! Execution environment for subprocess spawns.

use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::ffi::{OsStr, OsString};

use isoforge_utils::error::ToolError;

/// The environment under which every pipeline subprocess is launched.
///
/// Captured once at pipeline start and threaded explicitly into each spawn,
/// instead of mutating the process-global environment. The only mutation it
/// ever sees is PATH augmentation performed by the tool locator when a tool
/// is found in a fallback directory.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    path: OsString,
    elevated: bool,
    invoking_user: Option<String>,
    invoking_home: Option<Utf8PathBuf>,
    own_home: Option<Utf8PathBuf>,
}

impl ExecutionContext {
    /// Capture the ambient environment of the current process.
    ///
    /// When running under `sudo`, `SUDO_USER` identifies the invoking user;
    /// their home directory is consulted for user-scoped tool installs even
    /// though the elevated process's own `HOME` points elsewhere.
    #[must_use]
    pub fn capture() -> Self {
        let invoking_user = env::var("SUDO_USER").ok().filter(|u| !u.is_empty());
        let invoking_home = invoking_user.as_deref().map(home_of_user);
        let own_home = dirs::home_dir().and_then(|p| Utf8PathBuf::from_path_buf(p).ok());

        Self {
            path: env::var_os("PATH").unwrap_or_default(),
            elevated: effective_user_is_root(),
            invoking_user,
            invoking_home,
            own_home,
        }
    }

    /// Construct a context with an explicit PATH value.
    ///
    /// Test seam; not part of public API stability guarantees.
    #[must_use]
    pub fn with_path(path: impl Into<OsString>) -> Self {
        Self {
            path: path.into(),
            elevated: false,
            invoking_user: None,
            invoking_home: None,
            own_home: dirs::home_dir().and_then(|p| Utf8PathBuf::from_path_buf(p).ok()),
        }
    }

    /// The (possibly augmented) PATH value subprocesses inherit.
    #[must_use]
    pub fn path_value(&self) -> &OsStr {
        &self.path
    }

    /// Whether the effective user is root.
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    /// The invoking user's name when running under `sudo`.
    #[must_use]
    pub fn invoking_user(&self) -> Option<&str> {
        self.invoking_user.as_deref()
    }

    /// The invoking user's home directory when running under `sudo`.
    #[must_use]
    pub fn invoking_home(&self) -> Option<&Utf8Path> {
        self.invoking_home.as_deref()
    }

    /// The current process's own home directory.
    #[must_use]
    pub fn own_home(&self) -> Option<&Utf8Path> {
        self.own_home.as_deref()
    }

    /// Whether `dir` is already one of the PATH entries.
    #[must_use]
    pub fn path_contains(&self, dir: &Utf8Path) -> bool {
        env::split_paths(&self.path).any(|p| p == dir.as_std_path())
    }

    /// Prepend a directory to PATH so later spawns and lookups see it first.
    ///
    /// No-op if the directory is already present. Called by the tool locator
    /// when a tool is discovered in a fallback directory.
    pub(crate) fn prepend_path(&mut self, dir: &Utf8Path) {
        if self.path_contains(dir) {
            return;
        }
        let mut entries = vec![dir.as_std_path().to_path_buf()];
        entries.extend(env::split_paths(&self.path));
        match env::join_paths(entries) {
            Ok(joined) => self.path = joined,
            // A path entry containing the separator cannot be joined; keep
            // the existing PATH rather than produce a broken one.
            Err(e) => tracing::warn!("cannot add {dir} to PATH: {e}"),
        }
    }

    /// Fail unless the process runs with elevated privileges.
    ///
    /// The bootstrap and filesystem phases manipulate device nodes and
    /// ownership, which requires root.
    pub fn require_elevation(&self) -> Result<(), ToolError> {
        if self.elevated {
            return Ok(());
        }
        Err(ToolError::PermissionDenied {
            detail: "this pipeline requires root; re-run under sudo".to_string(),
        })
    }

    /// Default fallback directories for user-scoped tool installs, most
    /// specific first: the invoking user's directories, then this process's
    /// own, then the system-wide fallback.
    #[must_use]
    pub fn default_fallback_dirs(&self) -> Vec<Utf8PathBuf> {
        let mut dirs_out: Vec<Utf8PathBuf> = Vec::new();
        let mut push = |dir: Utf8PathBuf| {
            if !dirs_out.contains(&dir) {
                dirs_out.push(dir);
            }
        };

        for home in [self.invoking_home.as_ref(), self.own_home.as_ref()]
            .into_iter()
            .flatten()
        {
            push(home.join(".local/bin"));
            push(home.join(".cargo/bin"));
        }
        push(Utf8PathBuf::from("/usr/local/bin"));

        dirs_out
    }
}

/// Home directory of a named user.
///
/// Conventional layout only; a passwd lookup is deliberately avoided so the
/// context can be captured without nss access inside minimal chroots.
fn home_of_user(user: &str) -> Utf8PathBuf {
    if user == "root" {
        Utf8PathBuf::from("/root")
    } else {
        Utf8PathBuf::from("/home").join(user)
    }
}

#[cfg(unix)]
fn effective_user_is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(not(unix))]
fn effective_user_is_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_puts_directory_first() {
        let mut ctx = ExecutionContext::with_path("/usr/bin:/bin");
        ctx.prepend_path(Utf8Path::new("/opt/tools/bin"));

        let entries: Vec<_> = env::split_paths(ctx.path_value()).collect();
        assert_eq!(entries[0], std::path::Path::new("/opt/tools/bin"));
        assert!(ctx.path_contains(Utf8Path::new("/usr/bin")));
    }

    #[test]
    fn prepend_is_idempotent() {
        let mut ctx = ExecutionContext::with_path("/usr/bin");
        ctx.prepend_path(Utf8Path::new("/opt/tools/bin"));
        ctx.prepend_path(Utf8Path::new("/opt/tools/bin"));

        let count = env::split_paths(ctx.path_value())
            .filter(|p| p == std::path::Path::new("/opt/tools/bin"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn home_layout_for_sudo_users() {
        assert_eq!(home_of_user("root"), Utf8Path::new("/root"));
        assert_eq!(home_of_user("builder"), Utf8Path::new("/home/builder"));
    }

    #[test]
    fn fallback_dirs_end_with_system_fallback() {
        let ctx = ExecutionContext::with_path("/usr/bin");
        let dirs = ctx.default_fallback_dirs();
        assert_eq!(dirs.last().unwrap(), Utf8Path::new("/usr/local/bin"));
    }

    #[test]
    fn require_elevation_fails_without_root_marker() {
        let ctx = ExecutionContext::with_path("/usr/bin");
        assert!(ctx.require_elevation().is_err());
    }
}
