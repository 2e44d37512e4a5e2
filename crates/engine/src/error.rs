// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine runtime

use cairn_adapters::AdapterError;
use cairn_core::InvalidConfig;
use cairn_storage::{LockError, MetadataError, StateError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by `load_or_create`.
///
/// Lock contention and lease staleness are classification outcomes handled
/// inside the runner, never surfaced here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid step configuration: {0}")]
    InvalidConfig(#[from] InvalidConfig),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("compute failed for {dir}: [{kind}] {message}")]
    ComputeFailed {
        dir: PathBuf,
        kind: String,
        message: String,
    },

    #[error("preemption budget exhausted for {dir} after {preemptions} preemptions")]
    ExceededPreemptions { dir: PathBuf, preemptions: u32 },

    #[error("timed out after {waited:?} waiting for another worker on {dir}")]
    WaitTimeout { dir: PathBuf, waited: Duration },

    #[error("dirty worktree for version-controlled step {namespace}: {reason}")]
    DirtyWorktree { namespace: String, reason: String },

    #[error(
        "fingerprint drift in {dir}: stored {stored}, recomputed {current}; \
         canonicalization is not deterministic"
    )]
    FingerprintDrift {
        dir: PathBuf,
        stored: String,
        current: String,
    },

    #[error("metadata error: {0}")]
    Metadata(MetadataError),

    #[error("cancelled")]
    Cancelled,
}

impl From<MetadataError> for RunError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::Drift {
                dir,
                stored,
                current,
            } => RunError::FingerprintDrift {
                dir,
                stored,
                current,
            },
            other => RunError::Metadata(other),
        }
    }
}
