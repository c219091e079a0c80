//! Run lock.
//!
//! One orchestrator process per state directory: the checkpoint store and
//! log sink are single-writer resources, and two concurrent builds would
//! also fight over the image staging directories. The lock is advisory
//! (fd-lock) and released by the OS when the process exits, so a crashed
//! run never wedges the next one.

use camino::Utf8Path;
use std::fs::{File, OpenOptions};

use fd_lock::{RwLock, RwLockWriteGuard};
use isoforge_utils::IsoforgeError;

/// Exclusive lock over one project's run state.
pub struct RunLock {
    path: String,
    lock: RwLock<File>,
}

impl RunLock {
    /// Open (creating if needed) the lock file.
    pub fn new(path: &Utf8Path) -> Result<Self, IsoforgeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            path: path.to_string(),
            lock: RwLock::new(file),
        })
    }

    /// Try to take the exclusive lock without blocking.
    ///
    /// Hold the returned guard for the duration of the run.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, IsoforgeError> {
        let path = self.path.clone();
        self.lock
            .try_write()
            .map_err(|_| IsoforgeError::LockHeld { path })
    }
}
