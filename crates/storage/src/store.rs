// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read/write access to per-step state records.
//!
//! Writes go through a temp-file-then-rename commit so that concurrent
//! readers never see a torn record; the rename of `state.json` is the commit
//! point for every transition, including success (the `.state/success`
//! marker is written only after the rename returns). The store itself does
//! not serialize concurrent writers; the compute lock does.

use crate::state::{
    state_path, success_path, AttemptStatus, ResultStatus, State, SCHEMA_VERSION,
};
use cairn_core::CacheTtl;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Transient-IO retry budget for atomic writes.
const WRITE_RETRIES: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(25);

/// Errors from state-record operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("corrupt state file at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error(
        "state file at {path} has schema version {found} (supported: {supported}); \
         migrate or remove the directory"
    )]
    MigrationRequired {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

struct CachedRead {
    state: State,
    read_at: Instant,
}

/// State-record store with an optional per-directory read cache.
///
/// Cross-process freshness is governed by the TTL alone; callers that
/// require strict freshness construct the store with [`CacheTtl::Never`] or
/// call [`StateStore::read_fresh`].
pub struct StateStore {
    ttl: CacheTtl,
    cache: Mutex<HashMap<PathBuf, CachedRead>>,
}

impl StateStore {
    pub fn new(ttl: CacheTtl) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Read the state record, serving a cached copy within the TTL.
    ///
    /// A missing file reads as [`State::absent`].
    pub fn read(&self, dir: &Path) -> Result<State, StateError> {
        if let CacheTtl::Never = self.ttl {
            return self.read_disk(dir);
        }
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(dir) {
                let fresh = match self.ttl {
                    CacheTtl::Forever => true,
                    CacheTtl::Ttl(ttl) => entry.read_at.elapsed() <= ttl,
                    CacheTtl::Never => false,
                };
                if fresh {
                    return Ok(entry.state.clone());
                }
            }
        }
        let state = self.read_disk(dir)?;
        self.cache.lock().insert(
            dir.to_path_buf(),
            CachedRead {
                state: state.clone(),
                read_at: Instant::now(),
            },
        );
        Ok(state)
    }

    /// Read the state record from disk, bypassing the cache.
    pub fn read_fresh(&self, dir: &Path) -> Result<State, StateError> {
        let state = self.read_disk(dir)?;
        if !matches!(self.ttl, CacheTtl::Never) {
            self.cache.lock().insert(
                dir.to_path_buf(),
                CachedRead {
                    state: state.clone(),
                    read_at: Instant::now(),
                },
            );
        }
        Ok(state)
    }

    fn read_disk(&self, dir: &Path) -> Result<State, StateError> {
        let path = state_path(dir);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(State::absent());
            }
            Err(e) => return Err(StateError::Io { path, source: e }),
        };
        let state: State =
            serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if state.schema_version != SCHEMA_VERSION {
            return Err(StateError::MigrationRequired {
                path,
                found: state.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(state)
    }

    /// Serialize to a temp file in the same directory, fsync, and rename
    /// over `state.json`. The rename is the commit point.
    pub fn write_atomic(&self, dir: &Path, state: &State) -> Result<(), StateError> {
        let path = state_path(dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut body = serde_json::to_vec_pretty(state)?;
        body.push(b'\n');

        let mut last_err = None;
        for retry in 0..WRITE_RETRIES {
            match write_rename(&path, &body) {
                Ok(()) => {
                    if !matches!(self.ttl, CacheTtl::Never) {
                        self.cache.lock().insert(
                            dir.to_path_buf(),
                            CachedRead {
                                state: state.clone(),
                                read_at: Instant::now(),
                            },
                        );
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        retry,
                        error = %e,
                        "state write failed, retrying"
                    );
                    last_err = Some(e);
                    std::thread::sleep(WRITE_BACKOFF * (retry + 1));
                }
            }
        }
        Err(StateError::Io {
            path,
            source: last_err.unwrap_or_else(|| std::io::Error::other("write failed")),
        })
    }

    /// Read-modify-write. Callers MUST hold the compute lock; the store does
    /// not serialize concurrent updaters.
    ///
    /// `updated_at` is stamped with `max(now, previous)` so it never goes
    /// backwards under clock skew.
    pub fn update(
        &self,
        dir: &Path,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut State),
    ) -> Result<State, StateError> {
        let mut state = self.read_disk(dir)?;
        f(&mut state);
        state.updated_at = now.max(state.updated_at);
        self.write_atomic(dir, &state)?;
        Ok(state)
    }

    /// Commit a successful compute: result → success (stamping
    /// `created_at`), the matching attempt → success with `ended_at`, then
    /// the success marker once the state rename has returned.
    pub fn mark_success(
        &self,
        dir: &Path,
        attempt_id: &str,
        now: DateTime<Utc>,
    ) -> Result<State, StateError> {
        let state = self.update(dir, now, |state| {
            state.result.status = ResultStatus::Success;
            if state.result.created_at.is_none() {
                state.result.created_at = Some(now);
            }
            if let Some(attempt) = state.attempt.as_mut() {
                if attempt.id == attempt_id {
                    attempt.status = AttemptStatus::Success;
                    attempt.ended_at = Some(now);
                }
            }
        })?;

        let marker = success_path(dir);
        let mut file = File::create(&marker).map_err(|e| StateError::Io {
            path: marker.clone(),
            source: e,
        })?;
        file.write_all(b"")
            .and_then(|_| file.sync_all())
            .map_err(|e| StateError::Io {
                path: marker,
                source: e,
            })?;
        Ok(state)
    }

    /// Evict a stale attempt. Caller must have re-acquired the lock.
    pub fn mark_preempted(&self, dir: &Path, now: DateTime<Utc>) -> Result<State, StateError> {
        self.update(dir, now, |state| {
            if let Some(attempt) = state.attempt.as_mut() {
                if attempt.status.is_open() {
                    attempt.status = AttemptStatus::Preempted;
                    attempt.ended_at = Some(now);
                }
            }
        })
    }

    /// Force-recompute reset: remove the success marker, then demote the
    /// result to incomplete. Artifacts are left in place; `create` must be
    /// idempotent or overwriting.
    pub fn reset_for_recompute(&self, dir: &Path, now: DateTime<Utc>) -> Result<(), StateError> {
        let marker = success_path(dir);
        match fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StateError::Io {
                    path: marker,
                    source: e,
                })
            }
        }
        if state_path(dir).exists() {
            self.update(dir, now, |state| {
                if state.result.status == ResultStatus::Success {
                    state.result.status = ResultStatus::Incomplete;
                }
            })?;
        }
        Ok(())
    }

    /// Whether the success marker file exists.
    pub fn success_marker_exists(dir: &Path) -> bool {
        success_path(dir).is_file()
    }

    /// Drop any cached read for `dir`.
    pub fn invalidate(&self, dir: &Path) {
        self.cache.lock().remove(dir);
    }
}

fn write_rename(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(body)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
