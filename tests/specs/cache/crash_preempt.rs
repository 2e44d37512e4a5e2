// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S3: a crashed leader's stale attempt is preempted and recomputed.

use crate::prelude::*;
use cairn_storage::{Attempt, AttemptStatus, Owner, ResultStatus};
use std::collections::BTreeMap;

/// Seed the state a leader leaves behind when its process dies: a running
/// attempt whose lease has lapsed with no heartbeat progress. The OS
/// released its lock with the process, so no lock file contends.
fn seed_dead_leader(step: &Exp, base: &std::path::Path) {
    let dir = step.dir(base);
    let past = chrono::Utc::now() - chrono::Duration::seconds(3600);
    store()
        .update(&dir, past, |s| {
            s.result.status = ResultStatus::Incomplete;
            s.attempt = Some(Attempt {
                id: "crashed-leader".to_string(),
                number: 1,
                backend: "local".to_string(),
                status: AttemptStatus::Running,
                started_at: past,
                heartbeat_at: past,
                lease_duration_sec: 0.1,
                lease_expires_at: past + chrono::Duration::milliseconds(100),
                owner: Owner {
                    pid: 999_999,
                    host: "dead-host".to_string(),
                    user: "ghost".to_string(),
                },
                scheduler: BTreeMap::new(),
                ended_at: None,
                error: None,
            });
        })
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_attempt_is_preempted_and_work_proceeds() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(11);
    seed_dead_leader(&step, base.path());

    let out = worker(base.path()).load_or_create(&step).await.unwrap();
    assert_eq!(out, 11);
    assert_eq!(step.creates(), 1);

    let state = store().read(&step.dir(base.path())).unwrap();
    assert_eq!(state.result.status, ResultStatus::Success);
    let attempt = state.attempt.unwrap();
    assert_eq!(attempt.number, 2, "preemption increments the attempt number");
    assert_eq!(attempt.status, AttemptStatus::Success);
    assert_ne!(attempt.id, "crashed-leader");
}

#[tokio::test(flavor = "multi_thread")]
async fn attempt_numbers_strictly_increase_across_attempts() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(12);
    seed_dead_leader(&step, base.path());

    worker(base.path()).load_or_create(&step).await.unwrap();
    let after_preempt = store()
        .read(&step.dir(base.path()))
        .unwrap()
        .attempt
        .unwrap()
        .number;
    assert_eq!(after_preempt, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn follower_takes_over_once_the_lease_lapses() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(13);
    let dir = step.dir(base.path());

    // An attempt that still looks alive for a moment, then never heartbeats
    // again: the follower first waits, then preempts.
    let now = chrono::Utc::now();
    store()
        .update(&dir, now, |s| {
            s.result.status = ResultStatus::Incomplete;
            s.attempt = Some(Attempt {
                id: "silent-leader".to_string(),
                number: 1,
                backend: "local".to_string(),
                status: AttemptStatus::Running,
                started_at: now,
                heartbeat_at: now,
                lease_duration_sec: 0.15,
                lease_expires_at: now + chrono::Duration::milliseconds(150),
                owner: Owner {
                    pid: 999_998,
                    host: "silent-host".to_string(),
                    user: "ghost".to_string(),
                },
                scheduler: BTreeMap::new(),
                ended_at: None,
                error: None,
            });
        })
        .unwrap();

    let out = worker(base.path()).load_or_create(&step).await.unwrap();
    assert_eq!(out, 13);

    let state = store().read(&dir).unwrap();
    assert_eq!(state.result.status, ResultStatus::Success);
    assert_eq!(state.attempt.unwrap().number, 2);
}
