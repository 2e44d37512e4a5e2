// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cairn_core::{CacheTtl, SystemClock};
use cairn_storage::{Attempt, AttemptStatus, Owner, ResultStatus};
use chrono::TimeZone;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn seed_attempt(store: &StateStore, dir: &std::path::Path, id: &str) {
    store
        .update(dir, ts(100), |s| {
            s.result.status = ResultStatus::Incomplete;
            s.attempt = Some(Attempt {
                id: id.to_string(),
                number: 1,
                backend: "local".to_string(),
                status: AttemptStatus::Running,
                started_at: ts(100),
                heartbeat_at: ts(100),
                lease_duration_sec: 1.0,
                lease_expires_at: ts(101),
                owner: Owner {
                    pid: 1,
                    host: "h".to_string(),
                    user: "u".to_string(),
                },
                scheduler: BTreeMap::new(),
                ended_at: None,
                error: None,
            });
        })
        .unwrap();
}

#[test]
fn epoch_ms_conversion() {
    assert_eq!(utc_from_epoch_ms(0), DateTime::<Utc>::UNIX_EPOCH);
    assert_eq!(utc_from_epoch_ms(1_000), ts(1));
}

#[tokio::test]
async fn refreshes_lease_for_matching_attempt() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::new(CacheTtl::Never));
    seed_attempt(&store, dir.path(), "hb-att");

    let hb = start(
        Arc::clone(&store),
        dir.path().to_path_buf(),
        "hb-att".to_string(),
        Duration::from_secs(60),
        Duration::from_millis(10),
        SystemClock,
        Arc::new(Mutex::new(())),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!hb.failed());
    hb.stop().await;

    let state = store.read(dir.path()).unwrap();
    let attempt = state.attempt.unwrap();
    assert!(attempt.heartbeat_at > ts(100));
    assert!(attempt.lease_expires_at > attempt.heartbeat_at);
    assert!(state.updated_at >= attempt.heartbeat_at);
}

#[tokio::test]
async fn leaves_foreign_attempt_untouched() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::new(CacheTtl::Never));
    seed_attempt(&store, dir.path(), "someone-else");

    let hb = start(
        Arc::clone(&store),
        dir.path().to_path_buf(),
        "hb-att".to_string(),
        Duration::from_secs(60),
        Duration::from_millis(10),
        SystemClock,
        Arc::new(Mutex::new(())),
    );
    tokio::time::sleep(Duration::from_millis(40)).await;
    hb.stop().await;

    let attempt = store.read(dir.path()).unwrap().attempt.unwrap();
    assert_eq!(attempt.heartbeat_at, ts(100));
    assert_eq!(attempt.lease_expires_at, ts(101));
}

#[tokio::test]
async fn leaves_closed_attempt_untouched() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::new(CacheTtl::Never));
    seed_attempt(&store, dir.path(), "hb-att");
    store
        .update(dir.path(), ts(200), |s| {
            if let Some(a) = s.attempt.as_mut() {
                a.status = AttemptStatus::Preempted;
                a.ended_at = Some(ts(200));
            }
        })
        .unwrap();

    let hb = start(
        Arc::clone(&store),
        dir.path().to_path_buf(),
        "hb-att".to_string(),
        Duration::from_secs(60),
        Duration::from_millis(10),
        SystemClock,
        Arc::new(Mutex::new(())),
    );
    tokio::time::sleep(Duration::from_millis(40)).await;
    hb.stop().await;

    let attempt = store.read(dir.path()).unwrap().attempt.unwrap();
    assert_eq!(attempt.heartbeat_at, ts(100));
}

#[tokio::test]
async fn write_failure_raises_the_failed_flag() {
    let dir = tempdir().unwrap();
    // A plain file where `.state` should be makes every write fail.
    let step_dir = dir.path().join("step");
    std::fs::create_dir_all(&step_dir).unwrap();
    std::fs::write(step_dir.join(".state"), b"in the way").unwrap();

    let store = Arc::new(StateStore::new(CacheTtl::Never));
    let hb = start(
        store,
        step_dir,
        "hb-att".to_string(),
        Duration::from_secs(60),
        Duration::from_millis(10),
        SystemClock,
        Arc::new(Mutex::new(())),
    );

    for _ in 0..100 {
        if hb.failed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(hb.failed());
    hb.stop().await;
}

#[tokio::test]
async fn stop_exits_promptly() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::new(CacheTtl::Never));
    seed_attempt(&store, dir.path(), "hb-att");

    let hb = start(
        store,
        dir.path().to_path_buf(),
        "hb-att".to_string(),
        Duration::from_secs(60),
        Duration::from_secs(3600),
        SystemClock,
        Arc::new(Mutex::new(())),
    );
    tokio::time::timeout(Duration::from_secs(1), hb.stop())
        .await
        .unwrap();
}
