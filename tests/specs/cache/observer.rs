// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The read-only scanner observes runner-produced state without coordination.

use crate::prelude::*;
use cairn_engine::RunError;
use cairn_storage::{ResultStatus, ScanFilter, Scanner};

#[tokio::test(flavor = "multi_thread")]
async fn scanner_sees_successes_and_failures() {
    let base = tempfile::tempdir().unwrap();
    let good = Exp::new(40);
    let bad = Boom::new();

    let runner = worker(base.path());
    runner.load_or_create(&good).await.unwrap();
    let err = runner.load_or_create(&bad).await.unwrap_err();
    assert!(matches!(err, RunError::ComputeFailed { .. }));

    let scanner = Scanner::new(base.path());
    let all = scanner.scan(&ScanFilter::default());
    assert_eq!(all.len(), 2);

    let failed_only = scanner.scan(&ScanFilter {
        result_status: Some(ResultStatus::Failed),
        ..Default::default()
    });
    assert_eq!(failed_only.len(), 1);
    assert_eq!(failed_only[0].namespace, "specs.Boom");

    let stats = scanner.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.failed_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn detail_includes_state_and_metadata() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(41);
    worker(base.path()).load_or_create(&step).await.unwrap();

    let scanner = Scanner::new(base.path());
    let summaries = scanner.scan(&ScanFilter {
        namespace_prefix: Some("specs.Exp".to_string()),
        ..Default::default()
    });
    assert_eq!(summaries.len(), 1);

    let detail = scanner
        .detail(&summaries[0].namespace, &summaries[0].hash)
        .unwrap();
    assert_eq!(detail.state["result"]["status"], "success");
    let metadata = detail.metadata.unwrap();
    assert_eq!(metadata["namespace"], "specs.Exp");
    assert_eq!(metadata["fingerprint"], summaries[0].hash);
}

#[tokio::test(flavor = "multi_thread")]
async fn attempt_log_records_the_attempt() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(42);
    worker(base.path()).load_or_create(&step).await.unwrap();

    let log = std::fs::read_to_string(cairn_storage::log_path(&step.dir(base.path()))).unwrap();
    assert!(log.contains("[attempt 1] attempt started"));
    assert!(log.contains("[attempt 1] compute succeeded"));
}
