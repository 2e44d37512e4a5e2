// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Execution backends and environment probes for cairn.
//!
//! An [`Adapter`] runs a step's compute somewhere (the default runs it on a
//! local worker thread) and reports its status through an idempotent poll. A
//! [`SourceProbe`] captures the source-control state used for metadata and
//! the dirty-worktree interlock.

mod local;
mod probe;
mod subprocess;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{AdapterCall, FakeAdapter, FakeOutcome, FakeToken};

pub use local::{LocalAdapter, LocalToken};
pub use probe::{GitProbe, GitState, SourceProbe, StaticProbe};
pub use subprocess::run_with_timeout;

use async_trait::async_trait;
use cairn_core::DynStep;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors from adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("submit failed: {0}")]
    Submit(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Status reported by [`Adapter::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Running,
    Success,
    Failed { kind: String, message: String },
    Cancelled,
}

/// Pluggable execution backend for step computes.
///
/// `poll` and `cancel` are idempotent: polling a finished token keeps
/// reporting the same terminal status, and cancelling twice is harmless.
#[async_trait]
pub trait Adapter: Clone + Send + Sync + 'static {
    /// Token tracking one submitted compute.
    type Token: Send + Sync;

    /// Backend identity recorded in `attempt.backend`.
    fn id(&self) -> &str;

    /// Opaque backend metadata recorded in `attempt.scheduler` (job ids,
    /// submit parameters). Default: empty.
    fn scheduler_info(&self, _token: &Self::Token) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }

    /// Begin executing the step's compute with `dir` as its artifact
    /// directory.
    async fn submit(
        &self,
        step: Arc<dyn DynStep>,
        dir: &Path,
    ) -> Result<Self::Token, AdapterError>;

    /// Report the current status of a submitted compute.
    async fn poll(&self, token: &Self::Token) -> Result<PollStatus, AdapterError>;

    /// Best-effort cancellation; `poll` subsequently reports `Cancelled`.
    async fn cancel(&self, token: &Self::Token) -> Result<(), AdapterError>;
}
