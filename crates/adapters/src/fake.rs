// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake execution adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::{Adapter, AdapterError, PollStatus};
use async_trait::async_trait;
use cairn_core::DynStep;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    Submit { namespace: String, dir: PathBuf },
    Poll { namespace: String },
    Cancel { namespace: String },
}

/// Scripted outcome for one submit.
#[derive(Debug, Clone)]
pub struct FakeOutcome {
    /// How many polls report `Running` before the terminal status.
    pub polls_until_done: u32,
    pub terminal: PollStatus,
    /// Actually run the step's `create` so artifacts exist on disk.
    pub run_create: bool,
}

impl FakeOutcome {
    pub fn success() -> Self {
        Self {
            polls_until_done: 0,
            terminal: PollStatus::Success,
            run_create: true,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            polls_until_done: 0,
            terminal: PollStatus::Failed {
                kind: "failed".to_string(),
                message: message.to_string(),
            },
            run_create: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            polls_until_done: 0,
            terminal: PollStatus::Cancelled,
            run_create: false,
        }
    }

    pub fn running_for(polls: u32) -> Self {
        Self {
            polls_until_done: polls,
            ..Self::success()
        }
    }
}

/// Token handed out by [`FakeAdapter`].
pub struct FakeToken {
    namespace: String,
    outcome: FakeOutcome,
    polls_seen: Mutex<u32>,
    cancelled: Mutex<bool>,
}

struct FakeAdapterState {
    /// Outcome scripts keyed by namespace; consumed front-to-back.
    plans: HashMap<String, VecDeque<FakeOutcome>>,
    calls: Vec<AdapterCall>,
}

/// Fake execution adapter for testing.
///
/// By default every submit succeeds immediately and runs the real `create`
/// so artifacts land on disk; per-namespace scripts override that.
#[derive(Clone)]
pub struct FakeAdapter {
    inner: Arc<Mutex<FakeAdapterState>>,
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeAdapterState {
                plans: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next submit of `namespace`.
    pub fn plan(&self, namespace: &str, outcome: FakeOutcome) {
        self.inner
            .lock()
            .plans
            .entry(namespace.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.inner.lock().calls.clone()
    }

    /// Number of submits recorded for a namespace.
    pub fn submit_count(&self, namespace: &str) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, AdapterCall::Submit { namespace: ns, .. } if ns == namespace))
            .count()
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    type Token = FakeToken;

    fn id(&self) -> &str {
        "fake"
    }

    async fn submit(
        &self,
        step: Arc<dyn DynStep>,
        dir: &Path,
    ) -> Result<Self::Token, AdapterError> {
        let namespace = step.namespace();
        let outcome = {
            let mut inner = self.inner.lock();
            inner.calls.push(AdapterCall::Submit {
                namespace: namespace.clone(),
                dir: dir.to_path_buf(),
            });
            inner
                .plans
                .get_mut(&namespace)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(FakeOutcome::success)
        };

        if outcome.run_create {
            step.create_discarding(dir)
                .map_err(|e| AdapterError::Submit(e.to_string()))?;
        }

        Ok(FakeToken {
            namespace,
            outcome,
            polls_seen: Mutex::new(0),
            cancelled: Mutex::new(false),
        })
    }

    async fn poll(&self, token: &Self::Token) -> Result<PollStatus, AdapterError> {
        self.inner.lock().calls.push(AdapterCall::Poll {
            namespace: token.namespace.clone(),
        });
        if *token.cancelled.lock() {
            return Ok(PollStatus::Cancelled);
        }
        let mut seen = token.polls_seen.lock();
        if *seen < token.outcome.polls_until_done {
            *seen += 1;
            return Ok(PollStatus::Running);
        }
        Ok(token.outcome.terminal.clone())
    }

    async fn cancel(&self, token: &Self::Token) -> Result<(), AdapterError> {
        self.inner.lock().calls.push(AdapterCall::Cancel {
            namespace: token.namespace.clone(),
        });
        *token.cancelled.lock() = true;
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
