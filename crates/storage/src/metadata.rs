// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable metadata sidecar, written once per step directory.
//!
//! The sidecar records how a directory came to exist: who computed it, from
//! which source state, and the exact canonical configuration. Later attempts
//! verify the stored fingerprint against their own; a mismatch means
//! canonicalization is non-deterministic, which is a bug to surface rather
//! than a record to overwrite.

use crate::state::{metadata_path, Owner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from metadata operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt metadata at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error(
        "fingerprint drift in {dir}: stored {stored}, recomputed {current}; \
         canonicalization is not deterministic"
    )]
    Drift {
        dir: PathBuf,
        stored: String,
        current: String,
    },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source-control state captured at first compute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    pub dirty: bool,
}

/// Contents of `.state/metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub namespace: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub owner: Owner,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
    /// Pretty view of the canonical configuration.
    pub config: serde_json::Value,
}

/// Write-once access to the metadata sidecar.
pub struct MetadataStore;

impl MetadataStore {
    /// Write the sidecar if absent; otherwise verify the stored fingerprint
    /// matches `meta.fingerprint`.
    pub fn ensure_written(dir: &Path, meta: &Metadata) -> Result<(), MetadataError> {
        if let Some(existing) = Self::read(dir)? {
            if existing.fingerprint != meta.fingerprint {
                return Err(MetadataError::Drift {
                    dir: dir.to_path_buf(),
                    stored: existing.fingerprint,
                    current: meta.fingerprint.clone(),
                });
            }
            return Ok(());
        }

        let path = metadata_path(dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MetadataError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut body = serde_json::to_vec_pretty(meta)?;
        body.push(b'\n');

        let tmp = path.with_extension("json.tmp");
        let io_err = |p: &Path, e: std::io::Error| MetadataError::Io {
            path: p.to_path_buf(),
            source: e,
        };
        {
            let mut file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
            file.write_all(&body)
                .and_then(|_| file.sync_all())
                .map_err(|e| io_err(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Read the sidecar, if present.
    pub fn read(dir: &Path) -> Result<Option<Metadata>, MetadataError> {
        let path = metadata_path(dir);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MetadataError::Io { path, source: e }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| MetadataError::Corrupt {
                path,
                message: e.to_string(),
            })
    }

    /// Raw JSON view for read-only observers; `None` on any failure.
    pub fn read_raw(dir: &Path) -> Option<serde_json::Value> {
        let bytes = fs::read(metadata_path(dir)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
