// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invariant 7: force_recompute discards a prior success and runs again.

use crate::prelude::*;
use cairn_core::{ConfigValue, Step, StepError};
use cairn_storage::StateStore;
use std::path::Path;

/// Exp with the force flag raised.
#[derive(Clone)]
struct ForcedExp(Exp);

impl Step for ForcedExp {
    type Output = i64;

    fn namespace(&self) -> String {
        "specs.Exp".to_string()
    }

    fn fields(&self) -> Vec<(&'static str, ConfigValue)> {
        self.0.fields()
    }

    fn force_recompute(&self) -> bool {
        true
    }

    fn create(&self, dir: &Path) -> Result<i64, StepError> {
        self.0.create(dir)
    }

    fn load(&self, dir: &Path) -> Result<i64, StepError> {
        self.0.load(dir)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn force_recompute_bumps_the_attempt_number() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(8);

    worker(base.path()).load_or_create(&step).await.unwrap();
    let first = store().read(&step.dir(base.path())).unwrap();
    assert_eq!(first.attempt.unwrap().number, 1);

    let forced = ForcedExp(step.clone());
    let out = worker(base.path()).load_or_create(&forced).await.unwrap();
    assert_eq!(out, 8);
    assert_eq!(step.creates(), 2);

    let second = store().read(&step.dir(base.path())).unwrap();
    assert_eq!(second.attempt.unwrap().number, 2);
    assert!(StateStore::success_marker_exists(&step.dir(base.path())));
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test(flavor = "multi_thread")]
async fn force_applies_once_per_process() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(9);
    let forced = ForcedExp(step.clone());

    let runner = worker(base.path());
    runner.load_or_create(&forced).await.unwrap();
    runner.load_or_create(&forced).await.unwrap();

    // The same runner resets only once; the second call is a cache hit.
    assert_eq!(step.creates(), 1);

    // A fresh worker (new process) forces again.
    worker(base.path()).load_or_create(&forced).await.unwrap();
    assert_eq!(step.creates(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn config_namespace_set_forces_recompute() {
    let base = tempfile::tempdir().unwrap();
    let step = Exp::new(10);

    worker(base.path()).load_or_create(&step).await.unwrap();

    let mut config = spec_config(base.path());
    config.force_recompute.insert("specs.Exp".to_string());
    let runner = cairn_engine::Runner::with_parts(
        config,
        cairn_adapters::LocalAdapter::new(),
        cairn_adapters::StaticProbe::clean(),
        cairn_core::SystemClock,
    );
    runner.load_or_create(&step).await.unwrap();

    assert_eq!(step.creates(), 2);
}
