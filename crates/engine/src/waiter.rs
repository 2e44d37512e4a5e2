// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Follower wait loop.
//!
//! A follower polls the state file until the attempt it is following reaches
//! a terminal result or stops looking alive. It never preempts on its own
//! schedule: staleness is judged solely from the holder's lease and
//! heartbeat record, so a follower that has waited "too long" for a healthy
//! leader keeps waiting (or times out with an error of its own).

use crate::cancel::CancelFlag;
use crate::error::RunError;
use crate::heartbeat::utc_from_epoch_ms;
use cairn_core::{format_elapsed, Clock, Config};
use cairn_storage::{ResultStatus, State, StateStore};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Why the wait ended.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The directory reached `success` or `failed`.
    Terminal(State),
    /// No live attempt remains; the caller re-classifies (and may lead or
    /// preempt).
    AttemptGone(State),
}

/// Poll until the followed attempt resolves.
///
/// `max_wait` of zero times out immediately unless the state is already
/// terminal.
pub(crate) async fn wait<C: Clock>(
    store: &StateStore,
    dir: &Path,
    config: &Config,
    max_wait: Option<Duration>,
    clock: &C,
    cancel: &CancelFlag,
) -> Result<WaitOutcome, RunError> {
    let started = clock.now();
    let mut last_log = started;

    loop {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let state = store.read_fresh(dir)?;
        let now = utc_from_epoch_ms(clock.epoch_ms());

        match state.result.status {
            ResultStatus::Success => return Ok(WaitOutcome::Terminal(state)),
            ResultStatus::Failed => {
                let live = state
                    .attempt
                    .as_ref()
                    .map(|a| a.is_live(now, config.stale_timeout))
                    .unwrap_or(false);
                // A live attempt over a failed result is a retry in
                // progress; keep following it.
                if !live {
                    return Ok(WaitOutcome::Terminal(state));
                }
            }
            ResultStatus::Absent | ResultStatus::Incomplete => {
                let live = state
                    .attempt
                    .as_ref()
                    .map(|a| a.is_live(now, config.stale_timeout))
                    .unwrap_or(false);
                if !live {
                    return Ok(WaitOutcome::AttemptGone(state));
                }
            }
        }

        let waited = clock.now().saturating_duration_since(started);
        if let Some(max) = max_wait {
            if waited >= max {
                return Err(RunError::WaitTimeout {
                    dir: dir.to_path_buf(),
                    waited,
                });
            }
        }

        if clock.now().saturating_duration_since(last_log) >= config.wait_log_every {
            last_log = clock.now();
            let holder = state
                .attempt
                .as_ref()
                .map(|a| format!("{}@{} (attempt {})", a.owner.user, a.owner.host, a.number))
                .unwrap_or_else(|| "unknown".to_string());
            info!(
                dir = %dir.display(),
                holder = %holder,
                elapsed = %format_elapsed(waited.as_secs()),
                "waiting for another worker"
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
        }
    }
}

#[cfg(test)]
#[path = "waiter_tests.rs"]
mod tests;
