// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S6: nested dependencies resolve depth-first and cache independently.

use crate::prelude::*;

#[tokio::test(flavor = "multi_thread")]
async fn first_call_runs_dependency_then_parent() {
    let base = tempfile::tempdir().unwrap();
    let prep = Prep::new("toy");
    let train = Train::new(prep.clone(), 3);

    let out = worker(base.path()).load_or_create(&train).await.unwrap();
    assert_eq!(out, 3);
    assert_eq!(prep.creates(), 1);
    assert_eq!(train.creates(), 1);

    // Both directories exist with success markers.
    assert!(cairn_storage::StateStore::success_marker_exists(&step_dir(
        base.path(),
        &prep
    )));
    assert!(cairn_storage::StateStore::success_marker_exists(&step_dir(
        base.path(),
        &train
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn second_call_runs_neither() {
    let base = tempfile::tempdir().unwrap();
    let prep = Prep::new("toy");
    let train = Train::new(prep.clone(), 3);

    worker(base.path()).load_or_create(&train).await.unwrap();
    worker(base.path()).load_or_create(&train).await.unwrap();

    assert_eq!(prep.creates(), 1);
    assert_eq!(train.creates(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_the_parent_recomputes_only_the_parent() {
    let base = tempfile::tempdir().unwrap();
    let prep = Prep::new("toy");
    let train = Train::new(prep.clone(), 3);

    worker(base.path()).load_or_create(&train).await.unwrap();
    std::fs::remove_dir_all(step_dir(base.path(), &train)).unwrap();

    let out = worker(base.path()).load_or_create(&train).await.unwrap();
    assert_eq!(out, 3);
    assert_eq!(prep.creates(), 1, "dependency untouched");
    assert_eq!(train.creates(), 2, "parent recomputed");
}

#[tokio::test(flavor = "multi_thread")]
async fn dependency_configuration_flows_into_the_parent_fingerprint() {
    let base = tempfile::tempdir().unwrap();
    let toy = Train::new(Prep::new("toy"), 3);
    let full = Train::new(Prep::new("full"), 3);

    assert_ne!(step_dir(base.path(), &toy), step_dir(base.path(), &full));
}
