//! Append-only per-run log file.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Mutex;

use isoforge_utils::error::RunnerError;
use isoforge_utils::types::{ItemId, PhaseId};

/// Shared, serialized log sink for one pipeline run.
///
/// All writers go through one internal lock, so the output of concurrently
/// running work items never interleaves within a line. Each item's output is
/// framed by begin/end markers carrying the item id, which keeps a parallel
/// phase's log attributable even though lines from different items may
/// alternate between frames.
#[derive(Debug)]
pub struct LogSink {
    path: Utf8PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl LogSink {
    /// Create a timestamped log file under `logs_dir`.
    pub fn create_in(logs_dir: &Utf8Path) -> Result<Self, RunnerError> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        Self::at_path(logs_dir.join(format!("run-{stamp}.log")))
    }

    /// Open (append, create) a log file at an explicit path.
    pub fn at_path(path: Utf8PathBuf) -> Result<Self, RunnerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RunnerError::Sink {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| RunnerError::Sink {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Mark the start of a phase.
    pub fn phase_marker(&self, phase: &PhaseId) {
        let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        self.write_line(&format!("===== phase {phase} [{stamp}] ====="));
    }

    /// Mark the start of a work item, echoing the command line.
    pub fn item_begin(&self, phase: &PhaseId, item: &ItemId, cmdline: &str) {
        self.write_line(&format!("--- {phase}/{item}: {cmdline}"));
    }

    /// Forward one line of child output.
    pub fn item_line(&self, item: &ItemId, line: &str) {
        self.write_line(&format!("[{item}] {line}"));
    }

    /// Mark the end of a work item with its final status.
    pub fn item_end(&self, item: &ItemId, status: &str) {
        self.write_line(&format!("--- {item}: {status}"));
    }

    /// Record a classified-failure annotation or other orchestrator note.
    pub fn annotate(&self, note: &str) {
        self.write_line(&format!("!! {note}"));
    }

    fn write_line(&self, line: &str) {
        // Append-only, best-effort once the sink exists: a failed log write
        // must never change the outcome of the work item it describes.
        match self.writer.lock() {
            Ok(mut w) => {
                if writeln!(w, "{line}").and_then(|()| w.flush()).is_err() {
                    tracing::warn!("log sink write failed at {}", self.path);
                }
            }
            Err(poisoned) => {
                let mut w = poisoned.into_inner();
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }
}
