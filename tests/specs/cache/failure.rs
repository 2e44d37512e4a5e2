// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S5: a failed compute is terminal until forced.

use crate::prelude::*;
use cairn_engine::RunError;
use cairn_storage::{AttemptStatus, ResultStatus};

#[tokio::test(flavor = "multi_thread")]
async fn failure_is_recorded_and_terminal() {
    let base = tempfile::tempdir().unwrap();
    let step = Boom::new();

    let err = worker(base.path()).load_or_create(&step).await.unwrap_err();
    match &err {
        RunError::ComputeFailed { kind, message, .. } => {
            assert_eq!(kind, "failed");
            assert!(message.contains("boom"));
        }
        other => panic!("expected ComputeFailed, got {other}"),
    }

    let dir = step_dir(base.path(), &step);
    let state = store().read(&dir).unwrap();
    assert_eq!(state.result.status, ResultStatus::Failed);
    let attempt = state.attempt.unwrap();
    assert_eq!(attempt.status, AttemptStatus::Failed);
    let error = attempt.error.unwrap();
    assert_eq!(error.kind, "failed");
    assert!(error.message.contains("boom"));

    // Subsequent calls fail without re-running create, even from a fresh
    // worker.
    let err = worker(base.path()).load_or_create(&step).await.unwrap_err();
    assert!(matches!(err, RunError::ComputeFailed { .. }));
    assert_eq!(step.creates(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_state_file_is_surfaced_not_repaired() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(30);

    worker(base.path()).load_or_create(&step).await.unwrap();
    let dir = step.dir(base.path());
    std::fs::write(cairn_storage::state_path(&dir), b"{definitely not json").unwrap();

    let err = worker(base.path()).load_or_create(&step).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::State(cairn_storage::StateError::Corrupt { .. })
    ));
    // Artifacts are untouched.
    assert!(dir.join("value.json").is_file());
}
