//! Process execution with exit-status fidelity.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use isoforge_toolchain::ExecutionContext;
use isoforge_utils::error::RunnerError;
use isoforge_utils::types::ItemId;

use crate::command_spec::CommandSpec;
use crate::log_sink::LogSink;

/// Terminal status of one work item's subprocess.
///
/// `TimedOut` is distinct from any exit code: classification must be able to
/// treat an overrunning required tool as fatal even if the kill races a
/// zero exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// The command exited on its own with this code
    Exited(i32),
    /// The command was terminated by a signal (unix)
    Signaled(i32),
    /// The command exceeded its allotted time and was killed
    TimedOut,
}

impl ItemStatus {
    /// True only for a clean zero exit.
    #[must_use]
    pub fn success(self) -> bool {
        matches!(self, ItemStatus::Exited(0))
    }

    /// Short description for log markers and failure summaries.
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            ItemStatus::Exited(code) => format!("exit code {code}"),
            ItemStatus::Signaled(sig) => format!("killed by signal {sig}"),
            ItemStatus::TimedOut => "timed out".to_string(),
        }
    }
}

/// Trait for work item execution.
///
/// Implementations MUST return the invoked command's own status: no
/// intermediary consumer of the command's output may contribute its exit
/// code. Output duplication happens inside the runner, which reads the
/// child's pipes itself and forwards lines to the sink.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Execute `spec` under `ctx`, streaming combined output into `sink`.
    ///
    /// Returns the child's terminal status. `Err` is reserved for the cases
    /// where no child status exists (spawn failure, pipe setup failure); a
    /// nonzero exit or timeout is an `Ok` status for the classifier.
    async fn run(
        &self,
        spec: &CommandSpec,
        ctx: &ExecutionContext,
        sink: &LogSink,
        item: &ItemId,
        timeout: Option<Duration>,
    ) -> Result<ItemStatus, RunnerError>;
}

/// Runner that spawns commands directly on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRunner;

impl NativeRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for NativeRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        ctx: &ExecutionContext,
        sink: &LogSink,
        item: &ItemId,
        timeout: Option<Duration>,
    ) -> Result<ItemStatus, RunnerError> {
        let program = spec.program.to_string_lossy().into_owned();

        let mut cmd = spec.to_command(ctx);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| RunnerError::CaptureFailed {
            program: program.clone(),
            reason: "stdout pipe missing".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| RunnerError::CaptureFailed {
            program: program.clone(),
            reason: "stderr pipe missing".to_string(),
        })?;

        // Drain both pipes in this task, concurrently with the wait. The
        // child's status comes from wait() and nowhere else.
        let wait_and_drain = async {
            let (status, (), ()) = tokio::join!(
                child.wait(),
                drain_lines(stdout, sink, item),
                drain_lines(stderr, sink, item),
            );
            status
        };

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait_and_drain).await {
                Ok(status) => status,
                Err(_elapsed) => {
                    tracing::warn!(
                        "'{program}' exceeded {}s; killing",
                        limit.as_secs()
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Ok(ItemStatus::TimedOut);
                }
            },
            None => wait_and_drain.await,
        };

        let status = status.map_err(|e| RunnerError::CaptureFailed {
            program,
            reason: e.to_string(),
        })?;

        Ok(status_of(status))
    }
}

async fn drain_lines<R>(reader: R, sink: &LogSink, item: &ItemId)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => sink.item_line(item, &line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("output stream of '{item}' closed early: {e}");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn status_of(status: ExitStatus) -> ItemStatus {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => ItemStatus::Exited(code),
        None => ItemStatus::Signaled(status.signal().unwrap_or(0)),
    }
}

#[cfg(not(unix))]
fn status_of(status: ExitStatus) -> ItemStatus {
    ItemStatus::Exited(status.code().unwrap_or(-1))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    fn sink_in(dir: &TempDir) -> LogSink {
        let path =
            Utf8PathBuf::from_path_buf(dir.path().join("run.log")).unwrap();
        LogSink::at_path(path).unwrap()
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    fn ambient_ctx() -> ExecutionContext {
        ExecutionContext::with_path(std::env::var_os("PATH").unwrap_or_default())
    }

    #[tokio::test]
    async fn returns_the_commands_own_exit_code_while_logging() {
        let dir = TempDir::new().unwrap();
        let sink = sink_in(&dir);
        let item = ItemId::new("fixture").unwrap();

        let status = NativeRunner::new()
            .run(
                &sh("echo captured-line; exit 42"),
                &ambient_ctx(),
                &sink,
                &item,
                None,
            )
            .await
            .unwrap();

        // The status is the fixture's, not the logging path's.
        assert_eq!(status, ItemStatus::Exited(42));
        let log = fs::read_to_string(sink.path()).unwrap();
        assert!(log.contains("[fixture] captured-line"));
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let dir = TempDir::new().unwrap();
        let sink = sink_in(&dir);
        let item = ItemId::new("ok").unwrap();

        let status = NativeRunner::new()
            .run(&sh("exit 0"), &ambient_ctx(), &sink, &item, None)
            .await
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn stderr_is_forwarded_to_the_sink() {
        let dir = TempDir::new().unwrap();
        let sink = sink_in(&dir);
        let item = ItemId::new("noisy").unwrap();

        let status = NativeRunner::new()
            .run(
                &sh("echo complaint >&2; exit 3"),
                &ambient_ctx(),
                &sink,
                &item,
                None,
            )
            .await
            .unwrap();

        assert_eq!(status, ItemStatus::Exited(3));
        let log = fs::read_to_string(sink.path()).unwrap();
        assert!(log.contains("[noisy] complaint"));
    }

    #[tokio::test]
    async fn overrunning_command_reports_timed_out() {
        let dir = TempDir::new().unwrap();
        let sink = sink_in(&dir);
        let item = ItemId::new("slow").unwrap();

        let started = std::time::Instant::now();
        let status = NativeRunner::new()
            .run(
                &sh("sleep 30"),
                &ambient_ctx(),
                &sink,
                &item,
                Some(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        assert_eq!(status, ItemStatus::TimedOut);
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn child_inherits_the_contexts_path() {
        let dir = TempDir::new().unwrap();
        let sink = sink_in(&dir);
        let item = ItemId::new("env").unwrap();

        let ctx = ExecutionContext::with_path("/isoforge-marker-dir:/usr/bin:/bin");
        let status = NativeRunner::new()
            .run(&sh("echo \"$PATH\""), &ctx, &sink, &item, None)
            .await
            .unwrap();

        assert_eq!(status, ItemStatus::Exited(0));
        let log = fs::read_to_string(sink.path()).unwrap();
        assert!(log.contains("/isoforge-marker-dir"));
    }

    #[tokio::test]
    async fn unspawnable_program_is_an_error_not_a_status() {
        let dir = TempDir::new().unwrap();
        let sink = sink_in(&dir);
        let item = ItemId::new("ghost").unwrap();

        let result = NativeRunner::new()
            .run(
                &CommandSpec::new("/nonexistent/definitely-missing"),
                &ambient_ctx(),
                &sink,
                &item,
                None,
            )
            .await;
        assert!(matches!(result, Err(RunnerError::SpawnFailed { .. })));
    }
}
