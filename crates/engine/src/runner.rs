// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `load_or_create` orchestrator.
//!
//! One entry point drives a step through the protocol: resolve dependencies
//! first (each with its own lease), classify the directory's state, then
//! either lead (lock → attempt record → heartbeat → adapter poll loop →
//! finalize) or follow (wait for the holder's terminal state). Stale holders
//! are preempted under a bounded budget; every state mutation happens behind
//! the directory's compute lock.

use crate::cancel::CancelFlag;
use crate::error::RunError;
use crate::heartbeat::{self, utc_from_epoch_ms};
use crate::waiter::{self, WaitOutcome};
use cairn_adapters::{
    Adapter, GitProbe, GitState, LocalAdapter, PollStatus, SourceProbe,
};
use cairn_core::{canonical_value, Clock, Config, DynStep, Fingerprint, Step, StepError, SystemClock};
use cairn_storage::{
    Attempt, AttemptError, AttemptLog, AttemptStatus, ComputeLock, GitInfo, LockHandle, Metadata,
    MetadataStore, Owner, ResultStatus, State, StateStore,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Runner wired to the local adapter, the git probe and the system clock.
pub type LocalRunner = Runner<LocalAdapter, GitProbe, SystemClock>;

impl LocalRunner {
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, LocalAdapter::new(), GitProbe::new(), SystemClock)
    }
}

/// What a leader session left behind.
enum LeadOutcome {
    /// Success committed (or discovered already committed).
    Done,
    /// The attempt was preempted/cancelled-as-preempted; eligible to requeue.
    Requeue,
}

/// Orchestrates `load_or_create` for steps sharing one storage root.
pub struct Runner<A: Adapter, P: SourceProbe, C: Clock> {
    config: Config,
    store: Arc<StateStore>,
    adapter: A,
    probe: P,
    clock: C,
    cancel: CancelFlag,
    owner: Owner,
    /// Directories already force-reset by this runner; the reset happens
    /// once per process, not on every call.
    forced: Mutex<HashSet<PathBuf>>,
}

impl<A: Adapter, P: SourceProbe, C: Clock> Runner<A, P, C> {
    pub fn with_parts(config: Config, adapter: A, probe: P, clock: C) -> Self {
        let store = Arc::new(StateStore::new(config.cache_metadata_ttl));
        Self {
            config,
            store,
            adapter,
            probe,
            clock,
            cancel: CancelFlag::new(),
            owner: Owner::current(),
            forced: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flag observed between polls and dependency resolutions; wire it to a
    /// signal handler for ctrl-c support.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        utc_from_epoch_ms(self.clock.epoch_ms())
    }

    /// Load the step's output, computing it first if no worker has.
    ///
    /// The output is always materialized through [`Step::load`]; when the
    /// cached artifacts turn out unreadable the cache entry is demoted and
    /// computed once more.
    pub async fn load_or_create<S: Step + Clone>(&self, step: &S) -> Result<S::Output, RunError> {
        let erased: Arc<dyn DynStep> = Arc::new(step.clone());
        let mut reloaded = false;
        loop {
            let dir = self.ensure_computed(Arc::clone(&erased)).await?;
            match step.load(&dir) {
                Ok(output) => return Ok(output),
                Err(StepError::Io(e)) if !reloaded => {
                    warn!(
                        dir = %dir.display(),
                        error = %e,
                        "cached artifacts unreadable, recomputing"
                    );
                    self.store.reset_for_recompute(&dir, self.now_utc())?;
                    reloaded = true;
                }
                Err(e) => {
                    return Err(RunError::ComputeFailed {
                        dir,
                        kind: e.kind().to_string(),
                        message: format!("load failed: {e}"),
                    })
                }
            }
        }
    }

    /// Ensure the step's directory holds a successful result, returning the
    /// directory. Used directly for erased dependencies.
    pub async fn ensure_computed(&self, step: Arc<dyn DynStep>) -> Result<PathBuf, RunError> {
        self.ensure_boxed(step).await
    }

    fn ensure_boxed<'a>(
        &'a self,
        step: Arc<dyn DynStep>,
    ) -> Pin<Box<dyn Future<Output = Result<PathBuf, RunError>> + Send + 'a>> {
        Box::pin(self.ensure_inner(step))
    }

    async fn ensure_inner(&self, step: Arc<dyn DynStep>) -> Result<PathBuf, RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        // Dependencies first. Each nested step has its own directory, lock
        // and lease; nothing is held across the recursion.
        for (_name, value) in step.fields() {
            for dep in value.steps() {
                self.ensure_boxed(dep).await?;
                if self.cancel.is_cancelled() {
                    return Err(RunError::Cancelled);
                }
            }
        }

        let fingerprint = Fingerprint::of(step.as_ref())?;
        let version_controlled = step.version_controlled();
        let dir = fingerprint.dir(&self.config.root_for(version_controlled));

        if version_controlled && !self.config.ignore_git_diff {
            self.gate_worktree(&fingerprint).await?;
        }

        let force = step.force_recompute()
            || self.config.force_recompute.contains(fingerprint.namespace());
        if force && self.forced.lock().insert(dir.clone()) {
            info!(dir = %dir.display(), "force recompute: discarding cached success");
            self.store.reset_for_recompute(&dir, self.now_utc())?;
        }

        let mut preemptions: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            let state = self.store.read(&dir)?;
            if state.result.status == ResultStatus::Success
                && StateStore::success_marker_exists(&dir)
            {
                return Ok(dir);
            }

            let now = self.now_utc();
            let live = state
                .attempt
                .as_ref()
                .map(|a| a.is_live(now, self.config.stale_timeout))
                .unwrap_or(false);

            if live {
                // Follower: wait for the holder's terminal state.
                match waiter::wait(
                    &self.store,
                    &dir,
                    &self.config,
                    step.max_wait_time(),
                    &self.clock,
                    &self.cancel,
                )
                .await?
                {
                    WaitOutcome::Terminal(terminal) => {
                        if terminal.result.status == ResultStatus::Success {
                            continue;
                        }
                        return Err(compute_failed_error(&dir, &terminal));
                    }
                    WaitOutcome::AttemptGone(_) => continue,
                }
            }

            let stale = state
                .attempt
                .as_ref()
                .map(|a| a.is_stale(now, self.config.stale_timeout))
                .unwrap_or(false);

            if stale {
                if preemptions >= self.config.preempt_max {
                    return Err(RunError::ExceededPreemptions { dir, preemptions });
                }
                match ComputeLock::break_and_acquire(&dir, &self.owner, now)? {
                    Some(lock) => {
                        let fresh = self.store.read_fresh(&dir)?;
                        if fresh.result.status == ResultStatus::Success
                            && StateStore::success_marker_exists(&dir)
                        {
                            continue; // raced with a finishing worker
                        }
                        let still_stale = fresh
                            .attempt
                            .as_ref()
                            .map(|a| a.is_stale(self.now_utc(), self.config.stale_timeout))
                            .unwrap_or(false);
                        if still_stale {
                            let evicted = self.store.mark_preempted(&dir, self.now_utc())?;
                            preemptions += 1;
                            if let Some(old) = evicted.attempt.as_ref() {
                                info!(
                                    dir = %dir.display(),
                                    attempt = old.number,
                                    holder_pid = old.owner.pid,
                                    "preempted stale attempt"
                                );
                                AttemptLog::new(&dir)
                                    .append(old.number, "preempted: lease expired");
                            }
                        }
                        match self.lead(Arc::clone(&step), &dir, &fingerprint, lock).await? {
                            LeadOutcome::Done => continue,
                            LeadOutcome::Requeue => {
                                preemptions += 1;
                                if preemptions >= self.config.preempt_max {
                                    return Err(RunError::ExceededPreemptions {
                                        dir,
                                        preemptions,
                                    });
                                }
                                continue;
                            }
                        }
                    }
                    None => {
                        // Lost the preemption race; the winner's attempt
                        // shows up on the next classification.
                        self.pause().await?;
                        continue;
                    }
                }
            }

            // No live or stale attempt. A failed result is terminal.
            if state.result.status == ResultStatus::Failed {
                return Err(compute_failed_error(&dir, &state));
            }

            // Candidate leader.
            match ComputeLock::try_acquire(&dir, &self.owner, now)? {
                Some(lock) => {
                    match self.lead(Arc::clone(&step), &dir, &fingerprint, lock).await? {
                        LeadOutcome::Done => continue,
                        LeadOutcome::Requeue => {
                            preemptions += 1;
                            if preemptions >= self.config.preempt_max {
                                return Err(RunError::ExceededPreemptions { dir, preemptions });
                            }
                            continue;
                        }
                    }
                }
                None => {
                    self.pause().await?;
                    continue;
                }
            }
        }
    }

    /// Leader path: attempt record, metadata, heartbeat, adapter poll loop,
    /// finalize. The lock is released on every exit path.
    async fn lead(
        &self,
        step: Arc<dyn DynStep>,
        dir: &Path,
        fingerprint: &Fingerprint,
        mut lock: LockHandle,
    ) -> Result<LeadOutcome, RunError> {
        let log = AttemptLog::new(dir);
        let write_guard = Arc::new(Mutex::new(()));

        // Someone may have finished between classification and acquisition.
        let state = self.store.read_fresh(dir)?;
        if state.result.status == ResultStatus::Success
            && StateStore::success_marker_exists(dir)
        {
            lock.release();
            return Ok(LeadOutcome::Done);
        }

        let now = self.now_utc();
        let attempt_id = Uuid::new_v4().to_string();
        let number = state.next_attempt_number();
        let lease = chrono::Duration::from_std(self.config.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));

        let attempt = Attempt {
            id: attempt_id.clone(),
            number,
            backend: self.adapter.id().to_string(),
            status: AttemptStatus::Running,
            started_at: now,
            heartbeat_at: now,
            lease_duration_sec: self.config.lease_duration.as_secs_f64(),
            lease_expires_at: now + lease,
            owner: self.owner.clone(),
            scheduler: BTreeMap::new(),
            ended_at: None,
            error: None,
        };
        {
            let _g = write_guard.lock();
            self.store.update(dir, now, |s| {
                if s.result.status == ResultStatus::Absent {
                    s.result.status = ResultStatus::Incomplete;
                }
                s.attempt = Some(attempt.clone());
            })?;
        }
        if number > 1 {
            log.separator();
        }
        log.append(
            number,
            &format!(
                "attempt started (backend {}, pid {})",
                self.adapter.id(),
                self.owner.pid
            ),
        );

        // Metadata sidecar: written on the first acquisition, verified on
        // every later one.
        let canonical = canonical_value(step.as_ref())?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let git = self.probe.probe(&cwd).await;
        let meta = Metadata {
            namespace: fingerprint.namespace().to_string(),
            fingerprint: fingerprint.hash().to_string(),
            created_at: now,
            owner: self.owner.clone(),
            git: git_info(&git),
            config: canonical,
        };
        if let Err(e) = MetadataStore::ensure_written(dir, &meta) {
            let err: RunError = e.into();
            log.append(number, &format!("aborted: {err}"));
            let _ = self.end_attempt(
                dir,
                &write_guard,
                &attempt_id,
                AttemptStatus::Failed,
                Some(AttemptError {
                    kind: "metadata".to_string(),
                    message: err.to_string(),
                    traceback: None,
                }),
                false,
            );
            lock.release();
            return Err(err);
        }

        let hb = heartbeat::start(
            Arc::clone(&self.store),
            dir.to_path_buf(),
            attempt_id.clone(),
            self.config.lease_duration,
            self.config.heartbeat_interval,
            self.clock.clone(),
            Arc::clone(&write_guard),
        );

        let token = match self.adapter.submit(Arc::clone(&step), dir).await {
            Ok(token) => token,
            Err(e) => {
                hb.stop().await;
                log.append(number, &format!("submit failed: {e}"));
                let _ = self.end_attempt(
                    dir,
                    &write_guard,
                    &attempt_id,
                    AttemptStatus::Failed,
                    Some(AttemptError {
                        kind: "submit".to_string(),
                        message: e.to_string(),
                        traceback: None,
                    }),
                    true,
                );
                lock.release();
                return Err(RunError::Adapter(e));
            }
        };

        let scheduler = self.adapter.scheduler_info(&token);
        if !scheduler.is_empty() {
            let result = {
                let _g = write_guard.lock();
                self.store.update(dir, self.now_utc(), |s| {
                    if let Some(a) = s.attempt.as_mut() {
                        if a.id == attempt_id {
                            a.scheduler = scheduler.clone();
                        }
                    }
                })
            };
            if let Err(e) = result {
                let _ = self.adapter.cancel(&token).await;
                hb.stop().await;
                lock.release();
                return Err(e.into());
            }
        }

        // Poll loop: drive the adapter, observing cancellation and
        // heartbeat failures between iterations.
        loop {
            if hb.failed() {
                let _ = self.adapter.cancel(&token).await;
                hb.stop().await;
                log.append(number, "heartbeat write failed; aborting attempt");
                let _ = self.end_attempt(
                    dir,
                    &write_guard,
                    &attempt_id,
                    AttemptStatus::Crashed,
                    Some(AttemptError {
                        kind: "heartbeat".to_string(),
                        message: "heartbeat write failed".to_string(),
                        traceback: None,
                    }),
                    false,
                );
                lock.release();
                return Err(RunError::ComputeFailed {
                    dir: dir.to_path_buf(),
                    kind: "heartbeat".to_string(),
                    message: "heartbeat write failed; attempt aborted".to_string(),
                });
            }

            if self.cancel.is_cancelled() {
                let _ = self.adapter.cancel(&token).await;
                hb.stop().await;
                let status = if self.config.cancelled_is_preempted {
                    AttemptStatus::Preempted
                } else {
                    AttemptStatus::Cancelled
                };
                log.append(number, &format!("attempt {status}"));
                let _ = self.end_attempt(dir, &write_guard, &attempt_id, status, None, false);
                lock.release();
                return Err(RunError::Cancelled);
            }

            let status = match self.adapter.poll(&token).await {
                Ok(status) => status,
                Err(e) => {
                    hb.stop().await;
                    log.append(number, &format!("backend poll failed: {e}"));
                    let _ = self.end_attempt(
                        dir,
                        &write_guard,
                        &attempt_id,
                        AttemptStatus::Crashed,
                        Some(AttemptError {
                            kind: "backend".to_string(),
                            message: e.to_string(),
                            traceback: None,
                        }),
                        false,
                    );
                    lock.release();
                    return Err(RunError::Adapter(e));
                }
            };

            match status {
                PollStatus::Running => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                PollStatus::Success => {
                    hb.stop().await;
                    {
                        let _g = write_guard.lock();
                        self.store.mark_success(dir, &attempt_id, self.now_utc())?;
                    }
                    log.append(number, "compute succeeded");
                    lock.release();
                    return Ok(LeadOutcome::Done);
                }
                PollStatus::Failed { kind, message } => {
                    hb.stop().await;
                    log.append(number, &format!("compute failed: {message}"));
                    self.end_attempt(
                        dir,
                        &write_guard,
                        &attempt_id,
                        AttemptStatus::Failed,
                        Some(AttemptError {
                            kind: kind.clone(),
                            message: message.clone(),
                            traceback: None,
                        }),
                        true,
                    )?;
                    lock.release();
                    return Err(RunError::ComputeFailed {
                        dir: dir.to_path_buf(),
                        kind,
                        message,
                    });
                }
                PollStatus::Cancelled => {
                    hb.stop().await;
                    if self.config.cancelled_is_preempted {
                        log.append(number, "backend cancelled; requeueing as preempted");
                        self.end_attempt(
                            dir,
                            &write_guard,
                            &attempt_id,
                            AttemptStatus::Preempted,
                            None,
                            false,
                        )?;
                        lock.release();
                        return Ok(LeadOutcome::Requeue);
                    }
                    log.append(number, "backend cancelled");
                    self.end_attempt(
                        dir,
                        &write_guard,
                        &attempt_id,
                        AttemptStatus::Cancelled,
                        Some(AttemptError {
                            kind: "cancelled".to_string(),
                            message: "backend cancelled the attempt".to_string(),
                            traceback: None,
                        }),
                        true,
                    )?;
                    lock.release();
                    return Err(RunError::ComputeFailed {
                        dir: dir.to_path_buf(),
                        kind: "cancelled".to_string(),
                        message: "backend cancelled the attempt".to_string(),
                    });
                }
            }
        }
    }

    fn end_attempt(
        &self,
        dir: &Path,
        guard: &Mutex<()>,
        attempt_id: &str,
        status: AttemptStatus,
        error: Option<AttemptError>,
        fail_result: bool,
    ) -> Result<(), RunError> {
        let now = self.now_utc();
        let _g = guard.lock();
        self.store.update(dir, now, |s| {
            if fail_result {
                s.result.status = ResultStatus::Failed;
            }
            if let Some(a) = s.attempt.as_mut() {
                if a.id == attempt_id {
                    a.status = status;
                    a.ended_at = Some(now);
                    if error.is_some() {
                        a.error = error;
                    }
                }
            }
        })?;
        Ok(())
    }

    /// Safety interlock for version-controlled steps: refuse to compute from
    /// an unclean source state.
    async fn gate_worktree(&self, fingerprint: &Fingerprint) -> Result<(), RunError> {
        let namespace = fingerprint.namespace().to_string();
        let cwd = std::env::current_dir().map_err(|e| RunError::DirtyWorktree {
            namespace: namespace.clone(),
            reason: format!("cannot determine working directory: {e}"),
        })?;
        let git = self.probe.probe(&cwd).await;

        if !git.repo {
            if self.config.require_git {
                return Err(RunError::DirtyWorktree {
                    namespace,
                    reason: "no git repository found".to_string(),
                });
            }
            return Ok(());
        }
        if git.dirty {
            return Err(RunError::DirtyWorktree {
                namespace,
                reason: "uncommitted changes in worktree".to_string(),
            });
        }
        if git.remote_url.is_none() && self.config.require_git_remote {
            return Err(RunError::DirtyWorktree {
                namespace,
                reason: "no git remote configured".to_string(),
            });
        }
        Ok(())
    }

    /// Short pause between classification rounds when contested.
    async fn pause(&self) -> Result<(), RunError> {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => Ok(()),
            _ = self.cancel.cancelled() => Err(RunError::Cancelled),
        }
    }
}

fn git_info(state: &GitState) -> Option<GitInfo> {
    if !state.repo {
        return None;
    }
    Some(GitInfo {
        commit: state.commit.clone(),
        remote_url: state.remote_url.clone(),
        dirty: state.dirty,
    })
}

fn compute_failed_error(dir: &Path, state: &State) -> RunError {
    let (kind, message) = state
        .attempt
        .as_ref()
        .and_then(|a| a.error.as_ref())
        .map(|e| (e.kind.clone(), e.message.clone()))
        .unwrap_or_else(|| {
            (
                "unknown".to_string(),
                "step previously failed with no recorded error".to_string(),
            )
        });
    RunError::ComputeFailed {
        dir: dir.to_path_buf(),
        kind,
        message,
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
