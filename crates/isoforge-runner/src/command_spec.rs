//! Argv-style command specification.

use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;

use isoforge_toolchain::ExecutionContext;

/// Specification for a command to execute.
///
/// All process execution goes through this type to ensure argv-style
/// invocation: arguments are discrete `OsString` elements, never a shell
/// string, so nothing the configuration file contains can be interpreted by
/// a shell.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The program to execute
    pub program: OsString,
    /// Arguments as discrete elements (NOT shell strings)
    pub args: Vec<OsString>,
    /// Optional working directory
    pub cwd: Option<PathBuf>,
    /// Environment overrides applied on top of the execution context
    pub env: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    /// Create a new `CommandSpec` for the given program.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set an environment variable override.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line for log markers and error messages.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }

    /// Build a `tokio::process::Command` under the given execution context.
    ///
    /// The context's augmented PATH is applied first so fallback-resolved
    /// tool directories are visible to the child; per-spec overrides win.
    #[must_use]
    pub fn to_command(&self, ctx: &ExecutionContext) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.env("PATH", ctx.path_value());

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd
    }
}
