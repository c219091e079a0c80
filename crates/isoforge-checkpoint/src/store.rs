//! Checkpoint persistence.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

use isoforge_utils::atomic_write::write_file_atomic;
use isoforge_utils::error::CheckpointError;
use isoforge_utils::types::PhaseId;

use crate::model::{CheckpointRecord, PhaseStatus};

const CHECKPOINT_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    schema_version: String,
    phases: BTreeMap<PhaseId, CheckpointRecord>,
}

/// Store for phase checkpoint records, backed by one JSON document.
///
/// An absent or empty file means "no phase completed yet". An unparseable
/// file is [`CheckpointError::Corrupt`]: the store never guesses a partial
/// state, the operator resets explicitly.
#[derive(Debug)]
pub struct CheckpointStore {
    path: Utf8PathBuf,
    phases: BTreeMap<PhaseId, CheckpointRecord>,
}

impl CheckpointStore {
    /// Open the store at `path`, loading any existing records.
    pub fn open(path: Utf8PathBuf) -> Result<Self, CheckpointError> {
        let phases = Self::load_file(&path)?;
        Ok(Self { path, phases })
    }

    fn load_file(
        path: &Utf8PathBuf,
    ) -> Result<BTreeMap<PhaseId, CheckpointRecord>, CheckpointError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(e) => {
                return Err(CheckpointError::ReadFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let file: CheckpointFile =
            serde_json::from_str(&content).map_err(|e| CheckpointError::Corrupt {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        if file.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(CheckpointError::Corrupt {
                path: path.to_string(),
                reason: format!(
                    "unsupported schema version {:?} (expected {CHECKPOINT_SCHEMA_VERSION:?})",
                    file.schema_version
                ),
            });
        }

        Ok(file.phases)
    }

    /// Record a phase's state and persist the whole document atomically.
    pub fn save(&mut self, record: CheckpointRecord) -> Result<(), CheckpointError> {
        self.phases.insert(record.phase.clone(), record);
        self.persist()
    }

    fn persist(&self) -> Result<(), CheckpointError> {
        let file = CheckpointFile {
            schema_version: CHECKPOINT_SCHEMA_VERSION.to_string(),
            phases: self.phases.clone(),
        };
        let json =
            serde_json::to_string_pretty(&file).map_err(|e| CheckpointError::WriteFailed {
                path: self.path.to_string(),
                reason: e.to_string(),
            })?;
        write_file_atomic(&self.path, &json).map_err(|e| CheckpointError::WriteFailed {
            path: self.path.to_string(),
            reason: e.to_string(),
        })
    }

    /// The record for a phase, if one exists.
    #[must_use]
    pub fn get(&self, phase: &PhaseId) -> Option<&CheckpointRecord> {
        self.phases.get(phase)
    }

    /// Whether a phase completed (fully or partially) in a previous run.
    #[must_use]
    pub fn is_complete(&self, phase: &PhaseId) -> bool {
        self.phases
            .get(phase)
            .is_some_and(|r| r.status.is_complete())
    }

    /// All records in stable (phase id) order.
    #[must_use]
    pub fn records(&self) -> impl Iterator<Item = &CheckpointRecord> {
        self.phases.values()
    }

    /// Effective status of a phase; absent records read as `Pending`.
    #[must_use]
    pub fn status_of(&self, phase: &PhaseId) -> PhaseStatus {
        self.phases
            .get(phase)
            .map_or(PhaseStatus::Pending, |r| r.status)
    }

    /// Drop all records and delete the backing file.
    pub fn reset(&mut self) -> Result<(), CheckpointError> {
        self.phases.clear();
        Self::wipe(&self.path)
    }

    /// Delete a checkpoint file without loading it first.
    ///
    /// `--clean` must work even when the file is corrupt, so this bypasses
    /// the parse that [`CheckpointStore::open`] performs.
    pub fn wipe(path: &camino::Utf8Path) -> Result<(), CheckpointError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::WriteFailed {
                path: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_path(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("checkpoints.json")).unwrap()
    }

    fn phase(id: &str) -> PhaseId {
        PhaseId::new(id).unwrap()
    }

    #[test]
    fn absent_file_means_nothing_completed() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(store_path(&dir)).unwrap();
        assert!(!store.is_complete(&phase("bootstrap")));
        assert_eq!(store.status_of(&phase("bootstrap")), PhaseStatus::Pending);
    }

    #[test]
    fn empty_file_means_nothing_completed() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        fs::write(&path, "").unwrap();
        let store = CheckpointStore::open(path).unwrap();
        assert_eq!(store.records().count(), 0);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        let mut store = CheckpointStore::open(path.clone()).unwrap();
        store
            .save(CheckpointRecord::new(phase("bootstrap"), PhaseStatus::Succeeded))
            .unwrap();
        store
            .save(
                CheckpointRecord::new(phase("packages"), PhaseStatus::Failed)
                    .with_failure("pacman: exit code 1"),
            )
            .unwrap();

        let reopened = CheckpointStore::open(path).unwrap();
        assert!(reopened.is_complete(&phase("bootstrap")));
        assert!(!reopened.is_complete(&phase("packages")));
        assert_eq!(
            reopened.get(&phase("packages")).unwrap().failure.as_deref(),
            Some("pacman: exit code 1")
        );
    }

    #[test]
    fn corrupt_file_is_refused_with_the_path_named() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        fs::write(&path, "{\"schema_version\": \"1\", \"phases\": {").unwrap();

        let err = CheckpointStore::open(path.clone()).unwrap_err();
        match err {
            CheckpointError::Corrupt { path: p, .. } => assert_eq!(p, path.to_string()),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn unknown_schema_version_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        fs::write(&path, "{\"schema_version\": \"99\", \"phases\": {}}").unwrap();
        assert!(matches!(
            CheckpointStore::open(path),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn a_crashed_writer_cannot_corrupt_prior_state() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        let mut store = CheckpointStore::open(path.clone()).unwrap();
        store
            .save(CheckpointRecord::new(phase("bootstrap"), PhaseStatus::Succeeded))
            .unwrap();

        // A kill mid-write leaves a half-written temp file next to the
        // canonical one; it must not affect what load returns.
        fs::write(dir.path().join(".tmpXYZ123"), "{\"schema_ver").unwrap();

        let reopened = CheckpointStore::open(path).unwrap();
        assert!(reopened.is_complete(&phase("bootstrap")));
    }

    #[test]
    fn reset_clears_records_and_file() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        let mut store = CheckpointStore::open(path.clone()).unwrap();
        store
            .save(CheckpointRecord::new(phase("iso"), PhaseStatus::Succeeded))
            .unwrap();
        store.reset().unwrap();

        assert!(!path.exists());
        let reopened = CheckpointStore::open(path).unwrap();
        assert_eq!(reopened.records().count(), 0);
        // Reset twice is fine.
        let mut reopened = reopened;
        reopened.reset().unwrap();
    }

    #[test]
    fn skipped_items_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        let mut record =
            CheckpointRecord::new(phase("extras"), PhaseStatus::PartiallySucceeded);
        record.skipped_items = vec![isoforge_utils::types::ItemId::new("aur-helper").unwrap()];

        let mut store = CheckpointStore::open(path.clone()).unwrap();
        store.save(record).unwrap();

        let reopened = CheckpointStore::open(path).unwrap();
        let loaded = reopened.get(&phase("extras")).unwrap();
        assert_eq!(loaded.skipped_items.len(), 1);
        assert_eq!(loaded.skipped_items[0].as_str(), "aur-helper");
    }
}
