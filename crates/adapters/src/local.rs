// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local execution backend.
//!
//! Runs the step's compute on a dedicated worker thread so the submitting
//! task (and its heartbeat) stays responsive during long computations. The
//! thread parks its result in a shared slot that `poll` observes.

use crate::{Adapter, AdapterError, PollStatus};
use async_trait::async_trait;
use cairn_core::{DynStep, StepError};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Backend id recorded in attempt records.
const LOCAL_BACKEND_ID: &str = "local";

/// Token for a compute running on a local worker thread.
#[derive(Clone)]
pub struct LocalToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    namespace: String,
    result: Mutex<Option<Result<(), StepError>>>,
    cancelled: AtomicBool,
}

/// Runs computes on local worker threads.
#[derive(Clone, Default)]
pub struct LocalAdapter;

impl LocalAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Adapter for LocalAdapter {
    type Token = LocalToken;

    fn id(&self) -> &str {
        LOCAL_BACKEND_ID
    }

    async fn submit(
        &self,
        step: Arc<dyn DynStep>,
        dir: &Path,
    ) -> Result<Self::Token, AdapterError> {
        let token = LocalToken {
            inner: Arc::new(TokenInner {
                namespace: step.namespace(),
                result: Mutex::new(None),
                cancelled: AtomicBool::new(false),
            }),
        };

        let inner = Arc::clone(&token.inner);
        let dir = dir.to_path_buf();
        std::thread::Builder::new()
            .name(format!("cairn-compute-{}", inner.namespace))
            .spawn(move || {
                debug!(namespace = %inner.namespace, dir = %dir.display(), "compute started");
                let result = step.create_discarding(&dir);
                *inner.result.lock() = Some(result);
            })
            .map_err(|e| AdapterError::Submit(e.to_string()))?;

        Ok(token)
    }

    async fn poll(&self, token: &Self::Token) -> Result<PollStatus, AdapterError> {
        if token.inner.cancelled.load(Ordering::SeqCst) {
            return Ok(PollStatus::Cancelled);
        }
        let slot = token.inner.result.lock();
        Ok(match slot.as_ref() {
            None => PollStatus::Running,
            Some(Ok(())) => PollStatus::Success,
            Some(Err(e)) => PollStatus::Failed {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        })
    }

    /// The worker thread cannot be interrupted; the token is marked so the
    /// eventual result is discarded and `poll` reports `Cancelled`.
    async fn cancel(&self, token: &Self::Token) -> Result<(), AdapterError> {
        token.inner.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
