// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative per-step state record and its on-disk layout.
//!
//! Everything a worker needs to classify a step directory lives in
//! `.state/state.json`. The record is written only via atomic rename, so
//! readers never observe a torn file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current state-record schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Internal directory name inside each step directory.
pub const INTERNAL_DIR: &str = ".state";

pub(crate) const STATE_FILE: &str = "state.json";
pub(crate) const SUCCESS_MARKER: &str = "success";
pub(crate) const LOCK_FILE: &str = "lock";
pub(crate) const METADATA_FILE: &str = "metadata.json";
pub(crate) const LOG_FILE: &str = "log";

/// `<dir>/.state`
pub fn internal_dir(dir: &Path) -> PathBuf {
    dir.join(INTERNAL_DIR)
}

/// `<dir>/.state/state.json`
pub fn state_path(dir: &Path) -> PathBuf {
    internal_dir(dir).join(STATE_FILE)
}

/// `<dir>/.state/success`
pub fn success_path(dir: &Path) -> PathBuf {
    internal_dir(dir).join(SUCCESS_MARKER)
}

/// `<dir>/.state/lock`
pub fn lock_path(dir: &Path) -> PathBuf {
    internal_dir(dir).join(LOCK_FILE)
}

/// `<dir>/.state/metadata.json`
pub fn metadata_path(dir: &Path) -> PathBuf {
    internal_dir(dir).join(METADATA_FILE)
}

/// `<dir>/.state/log`
pub fn log_path(dir: &Path) -> PathBuf {
    internal_dir(dir).join(LOG_FILE)
}

/// Terminal-or-not status of the cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// No compute has been recorded for this directory.
    Absent,
    /// A compute started at some point but has not succeeded.
    Incomplete,
    /// Artifacts are complete; the success marker exists.
    Success,
    /// The last compute failed terminally.
    Failed,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Absent => write!(f, "absent"),
            ResultStatus::Incomplete => write!(f, "incomplete"),
            ResultStatus::Success => write!(f, "success"),
            ResultStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status of a single leader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Queued,
    Running,
    Success,
    Failed,
    Crashed,
    Cancelled,
    Preempted,
}

impl AttemptStatus {
    /// Whether the attempt claims to still be working (subject to lease
    /// checks; an open attempt with an expired lease is stale, not live).
    pub fn is_open(&self) -> bool {
        matches!(self, AttemptStatus::Queued | AttemptStatus::Running)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Queued => write!(f, "queued"),
            AttemptStatus::Running => write!(f, "running"),
            AttemptStatus::Success => write!(f, "success"),
            AttemptStatus::Failed => write!(f, "failed"),
            AttemptStatus::Crashed => write!(f, "crashed"),
            AttemptStatus::Cancelled => write!(f, "cancelled"),
            AttemptStatus::Preempted => write!(f, "preempted"),
        }
    }
}

/// Identity of the process that owns an attempt or a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub pid: u32,
    pub host: String,
    pub user: String,
}

impl Owner {
    /// Owner record for the current process.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            user: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

/// Error captured from a failed compute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// One leader session: lock acquired, compute driven, lock released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Unique per lock acquisition.
    pub id: String,
    /// Monotonic per directory.
    pub number: u32,
    /// Adapter identity (`"local"` or a backend id).
    pub backend: String,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub lease_duration_sec: f64,
    /// `heartbeat_at + lease_duration`.
    pub lease_expires_at: DateTime<Utc>,
    pub owner: Owner,
    /// Opaque backend metadata (job ids, submit parameters).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scheduler: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AttemptError>,
}

impl Attempt {
    /// Whether the holder's own record proves it alive at `now`.
    ///
    /// A lease expiring exactly at `now` is expired. An open attempt whose
    /// heartbeat has not progressed within `stale_timeout` is stale even if
    /// its lease has somehow not lapsed.
    pub fn is_live(&self, now: DateTime<Utc>, stale_timeout: Duration) -> bool {
        if !self.status.is_open() {
            return false;
        }
        if self.lease_expires_at <= now {
            return false;
        }
        let gap = now.signed_duration_since(self.heartbeat_at);
        match chrono::Duration::from_std(stale_timeout) {
            Ok(stale) => gap <= stale,
            Err(_) => true,
        }
    }

    /// Stale: still claiming to work, but the liveness evidence has lapsed.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_timeout: Duration) -> bool {
        self.status.is_open() && !self.is_live(now, stale_timeout)
    }
}

/// Cached-result half of the state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// The authoritative state record (`.state/state.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub schema_version: u32,
    pub result: ResultRecord,
    pub attempt: Option<Attempt>,
    pub updated_at: DateTime<Utc>,
}

impl State {
    /// The record a directory has before anything was ever written.
    pub fn absent() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            result: ResultRecord {
                status: ResultStatus::Absent,
                created_at: None,
            },
            attempt: None,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Attempt number the next acquisition should use.
    pub fn next_attempt_number(&self) -> u32 {
        self.attempt.as_ref().map(|a| a.number + 1).unwrap_or(1)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
