// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S4 and invariant 4: concurrent workers agree on one compute.

use crate::prelude::*;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn late_follower_reuses_the_leaders_result() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::slow(4, Duration::from_millis(200));

    let leader = tokio::spawn({
        let base = base.path().to_path_buf();
        let step = step.clone();
        async move { worker(&base).load_or_create(&step).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let follower = tokio::spawn({
        let base = base.path().to_path_buf();
        let step = step.clone();
        async move { worker(&base).load_or_create(&step).await }
    });

    let leader_out = leader.await.unwrap().unwrap();
    let follower_out = follower.await.unwrap().unwrap();

    assert_eq!(leader_out, 4);
    assert_eq!(follower_out, 4);
    assert_eq!(step.creates(), 1, "create ran once across both workers");
}

#[tokio::test(flavor = "multi_thread")]
async fn many_concurrent_workers_compute_at_most_once() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::slow(5, Duration::from_millis(100));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let base = base.path().to_path_buf();
        let step = step.clone();
        tasks.push(tokio::spawn(async move {
            worker(&base).load_or_create(&step).await
        }));
    }

    let mut outputs = Vec::new();
    for task in tasks {
        outputs.push(task.await.unwrap().unwrap());
    }

    assert!(outputs.iter().all(|out| *out == 5));
    assert_eq!(step.creates(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_dependency_steps_touch_no_nested_locks() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(6);

    worker(base.path()).load_or_create(&step).await.unwrap();

    // Only this step's own directory exists under the root.
    let data_root = spec_config(base.path()).root_for(false);
    let mut dirs = Vec::new();
    let mut pending = vec![data_root];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().map(|n| n == ".state").unwrap_or(false) {
                    dirs.push(dir.clone());
                } else {
                    pending.push(path);
                }
            }
        }
    }
    assert_eq!(dirs.len(), 1);
}
