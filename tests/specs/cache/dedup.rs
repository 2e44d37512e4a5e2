// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S2: distinct instances with equal configuration share one directory.

use crate::prelude::*;

#[tokio::test(flavor = "multi_thread")]
async fn equal_configs_share_a_step_directory() {
    let base = tempfile::tempdir().unwrap();
    let first = Exp::new(3);
    let second = Exp::new(3);

    assert_eq!(first.dir(base.path()), second.dir(base.path()));

    worker(base.path()).load_or_create(&first).await.unwrap();
    let out = worker(base.path()).load_or_create(&second).await.unwrap();

    assert_eq!(out, 3);
    assert_eq!(first.creates(), 1);
    assert_eq!(second.creates(), 0, "second instance sees the first's success");
}

#[tokio::test(flavor = "multi_thread")]
async fn different_configs_use_different_directories() {
    let base = tempfile::tempdir().unwrap();
    let first = Exp::new(3);
    let second = Exp::new(4);

    assert_ne!(first.dir(base.path()), second.dir(base.path()));

    let runner = worker(base.path());
    runner.load_or_create(&first).await.unwrap();
    runner.load_or_create(&second).await.unwrap();

    assert_eq!(first.creates(), 1);
    assert_eq!(second.creates(), 1);
}
