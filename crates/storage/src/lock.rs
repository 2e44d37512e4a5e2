// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS-native exclusive compute lock per step directory.
//!
//! The lock is an advisory exclusive file lock on `.state/lock`, acquired
//! non-blocking. The file's contents describe the holder so that other
//! workers can report who they are waiting for; the lock itself, not the
//! contents, is the mutual-exclusion primitive.

use crate::state::{internal_dir, lock_path, Owner};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const BREAK_RETRIES: u32 = 5;
const BREAK_BACKOFF: Duration = Duration::from_millis(50);

/// Errors from lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Holder description written into the lock file on acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub owner: Owner,
    pub acquired_at: DateTime<Utc>,
}

/// An acquired exclusive lock. Released explicitly or on drop; release is
/// idempotent.
pub struct LockHandle {
    file: Option<File>,
    path: PathBuf,
}

impl LockHandle {
    /// Unlock and close the lock file. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!(path = %self.path.display(), error = %e, "failed to unlock");
            }
            debug!(path = %self.path.display(), "released compute lock");
        }
    }

    /// Whether this handle still holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Non-blocking acquisition and holder inspection for compute locks.
pub struct ComputeLock;

impl ComputeLock {
    /// Try to acquire the exclusive lock for a step directory.
    ///
    /// Returns `None` when another process holds it. On success the holder
    /// info is written into the lock file.
    pub fn try_acquire(
        dir: &Path,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<Option<LockHandle>, LockError> {
        let path = lock_path(dir);
        fs::create_dir_all(internal_dir(dir)).map_err(|e| LockError::Io {
            path: internal_dir(dir),
            source: e,
        })?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::Io {
                path: path.clone(),
                source: e,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                return Ok(None);
            }
            Err(e) => {
                return Err(LockError::Io {
                    path,
                    source: e,
                })
            }
        }

        let info = LockInfo {
            owner: owner.clone(),
            acquired_at: now,
        };
        if let Err(e) = write_lock_info(&file, &info) {
            // Holder info is advisory; the lock is already ours.
            warn!(path = %path.display(), error = %e, "failed to write lock holder info");
        }
        debug!(path = %path.display(), pid = owner.pid, "acquired compute lock");
        Ok(Some(LockHandle {
            file: Some(file),
            path,
        }))
    }

    /// Peek at the recorded holder without acquiring.
    pub fn holder_info(dir: &Path) -> Option<LockInfo> {
        let bytes = fs::read(lock_path(dir)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Acquire for preemption: if plain acquisition is contested, break the
    /// prior lock file (delete and recreate) with a bounded retry.
    ///
    /// Two workers racing here are linearized by the OS lock; the loser
    /// observes the winner's fresh attempt record and falls back to
    /// following.
    pub fn break_and_acquire(
        dir: &Path,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<Option<LockHandle>, LockError> {
        for retry in 0..BREAK_RETRIES {
            if let Some(handle) = Self::try_acquire(dir, owner, now)? {
                return Ok(Some(handle));
            }
            let path = lock_path(dir);
            debug!(path = %path.display(), retry, "breaking contested lock file");
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LockError::Io { path, source: e }),
            }
            std::thread::sleep(BREAK_BACKOFF * (retry + 1));
        }
        Self::try_acquire(dir, owner, now)
    }
}

fn write_lock_info(file: &File, info: &LockInfo) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    let mut f = file;
    f.set_len(0)?;
    f.seek(SeekFrom::Start(0))?;
    let mut body = serde_json::to_vec(info).unwrap_or_default();
    body.push(b'\n');
    f.write_all(&body)?;
    f.flush()
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
