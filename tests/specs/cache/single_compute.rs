// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S1: a single successful compute, then reuse from a fresh process.

use crate::prelude::*;
use cairn_storage::{AttemptStatus, MetadataStore, ResultStatus, StateStore};

#[tokio::test(flavor = "multi_thread")]
async fn first_call_computes_and_persists_everything() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(1);

    let out = worker(base.path()).load_or_create(&step).await.unwrap();
    assert_eq!(out, 1);

    let dir = step.dir(base.path());
    assert!(dir.join("value.json").is_file(), "artifact written");
    assert!(StateStore::success_marker_exists(&dir), "success marker");

    let state = store().read(&dir).unwrap();
    assert_eq!(state.result.status, ResultStatus::Success);
    assert!(state.result.created_at.is_some());
    let attempt = state.attempt.unwrap();
    assert_eq!(attempt.number, 1);
    assert_eq!(attempt.status, AttemptStatus::Success);
    assert!(attempt.ended_at.is_some());

    let metadata = MetadataStore::read(&dir).unwrap().unwrap();
    assert_eq!(metadata.namespace, "specs.Exp");
    assert_eq!(metadata.config["__type__"], "specs.Exp");
}

#[tokio::test(flavor = "multi_thread")]
async fn second_process_loads_without_compute() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(1);

    worker(base.path()).load_or_create(&step).await.unwrap();
    let out = worker(base.path()).load_or_create(&step).await.unwrap();

    assert_eq!(out, 1);
    assert_eq!(step.creates(), 1);
    assert_eq!(step.loads(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn two_calls_in_one_process_load_twice_create_once() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(2);
    let runner = worker(base.path());

    runner.load_or_create(&step).await.unwrap();
    runner.load_or_create(&step).await.unwrap();

    assert_eq!(step.creates(), 1);
    assert_eq!(step.loads(), 2);
}
