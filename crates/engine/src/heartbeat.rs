// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease-refreshing heartbeat task for the lock holder.
//!
//! While a leader computes, a background task periodically advances
//! `attempt.heartbeat_at` and `attempt.lease_expires_at`. Writes share the
//! leader's per-session write mutex so heartbeat updates never interleave
//! with the runner's own state transitions for the same directory.

use cairn_core::Clock;
use cairn_storage::StateStore;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Convert an epoch-milliseconds clock reading to a UTC timestamp.
pub(crate) fn utc_from_epoch_ms(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Handle to a running heartbeat task.
pub struct HeartbeatHandle {
    shutdown: watch::Sender<bool>,
    failed: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Whether the heartbeat hit a write failure and gave up. The runner
    /// observes this between polls and aborts the attempt.
    pub fn failed(&self) -> bool {
        *self.failed.borrow()
    }

    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Start a heartbeat for one attempt.
///
/// Every `interval` the task stamps `heartbeat_at = now` and
/// `lease_expires_at = now + lease` on the matching open attempt. It exits
/// on [`HeartbeatHandle::stop`] or after a failed state write (raising the
/// failure flag).
pub(crate) fn start<C: Clock>(
    store: Arc<StateStore>,
    dir: PathBuf,
    attempt_id: String,
    lease: Duration,
    interval: Duration,
    clock: C,
    write_guard: Arc<Mutex<()>>,
) -> HeartbeatHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let (failed_tx, failed_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let lease_chrono = chrono::Duration::from_std(lease)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately and refreshes the lease the
        // leader wrote at acquisition.
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    let now = utc_from_epoch_ms(clock.epoch_ms());
                    let result = {
                        let _guard = write_guard.lock();
                        store.update(&dir, now, |state| {
                            if let Some(attempt) = state.attempt.as_mut() {
                                if attempt.id == attempt_id && attempt.status.is_open() {
                                    attempt.heartbeat_at = now;
                                    attempt.lease_expires_at = now + lease_chrono;
                                }
                            }
                        })
                    };
                    match result {
                        Ok(state) => {
                            let ours = state
                                .attempt
                                .as_ref()
                                .map(|a| a.id == attempt_id && a.status.is_open())
                                .unwrap_or(false);
                            if !ours {
                                // The attempt ended or was taken over;
                                // nothing left to keep alive.
                                debug!(dir = %dir.display(), "heartbeat attempt gone, exiting");
                                break;
                            }
                            debug!(dir = %dir.display(), "heartbeat");
                        }
                        Err(e) => {
                            warn!(
                                dir = %dir.display(),
                                error = %e,
                                "heartbeat write failed, signalling abort"
                            );
                            let _ = failed_tx.send(true);
                            break;
                        }
                    }
                }
            }
        }
    });

    HeartbeatHandle {
        shutdown: shutdown_tx,
        failed: failed_rx,
        task,
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
