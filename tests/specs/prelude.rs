// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers for behavioral specifications.

#![allow(dead_code)]

use cairn_adapters::{LocalAdapter, StaticProbe};
use cairn_core::{CacheTtl, Config, ConfigValue, Step, StepError, SystemClock};
use cairn_engine::Runner;
use cairn_storage::StateStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type SpecRunner = Runner<LocalAdapter, StaticProbe, SystemClock>;

/// Aggressive intervals for fast tests.
pub fn spec_config(base: &Path) -> Config {
    Config {
        base_root: base.to_path_buf(),
        poll_interval: Duration::from_millis(10),
        wait_log_every: Duration::from_millis(100),
        stale_timeout: Duration::from_millis(200),
        lease_duration: Duration::from_millis(100),
        heartbeat_interval: Duration::from_millis(20),
        cache_metadata_ttl: CacheTtl::Never,
        ..Config::default()
    }
}

/// A fresh runner over `base`, standing in for one worker process.
pub fn worker(base: &Path) -> SpecRunner {
    Runner::with_parts(
        spec_config(base),
        LocalAdapter::new(),
        StaticProbe::clean(),
        SystemClock,
    )
}

/// Strict-freshness store for assertions.
pub fn store() -> StateStore {
    StateStore::new(CacheTtl::Never)
}

/// Step writing `value.json`; counts create/load invocations across clones.
#[derive(Clone)]
pub struct Exp {
    pub value: i64,
    pub delay: Duration,
    pub creates: Arc<AtomicUsize>,
    pub loads: Arc<AtomicUsize>,
}

impl Exp {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            delay: Duration::ZERO,
            creates: Arc::new(AtomicUsize::new(0)),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slow(value: i64, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(value)
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn dir(&self, base: &Path) -> PathBuf {
        step_dir(base, self)
    }
}

impl Step for Exp {
    type Output = i64;

    fn namespace(&self) -> String {
        "specs.Exp".to_string()
    }

    fn fields(&self) -> Vec<(&'static str, ConfigValue)> {
        vec![("value", self.value.into())]
    }

    fn create(&self, dir: &Path) -> Result<i64, StepError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        std::fs::write(dir.join("value.json"), serde_json::to_vec(&self.value)?)?;
        Ok(self.value)
    }

    fn load(&self, dir: &Path) -> Result<i64, StepError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let bytes = std::fs::read(dir.join("value.json"))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Step that always fails.
#[derive(Clone)]
pub struct Boom {
    pub creates: Arc<AtomicUsize>,
}

impl Boom {
    pub fn new() -> Self {
        Self {
            creates: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

impl Step for Boom {
    type Output = ();

    fn namespace(&self) -> String {
        "specs.Boom".to_string()
    }

    fn fields(&self) -> Vec<(&'static str, ConfigValue)> {
        vec![]
    }

    fn create(&self, _dir: &Path) -> Result<(), StepError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Err(StepError::failed("boom"))
    }

    fn load(&self, _dir: &Path) -> Result<(), StepError> {
        Ok(())
    }
}

/// `Train(dataset=Prep(...))` pair for nested-dependency specs.
#[derive(Clone)]
pub struct Prep {
    pub name: String,
    pub creates: Arc<AtomicUsize>,
}

impl Prep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            creates: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

impl Step for Prep {
    type Output = String;

    fn namespace(&self) -> String {
        "specs.Prep".to_string()
    }

    fn fields(&self) -> Vec<(&'static str, ConfigValue)> {
        vec![("name", self.name.clone().into())]
    }

    fn create(&self, dir: &Path) -> Result<String, StepError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        std::fs::write(dir.join("dataset.txt"), self.name.as_bytes())?;
        Ok(self.name.clone())
    }

    fn load(&self, dir: &Path) -> Result<String, StepError> {
        Ok(String::from_utf8_lossy(&std::fs::read(dir.join("dataset.txt"))?).into_owned())
    }
}

#[derive(Clone)]
pub struct Train {
    pub dataset: Prep,
    pub epochs: i64,
    pub creates: Arc<AtomicUsize>,
}

impl Train {
    pub fn new(dataset: Prep, epochs: i64) -> Self {
        Self {
            dataset,
            epochs,
            creates: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

impl Step for Train {
    type Output = i64;

    fn namespace(&self) -> String {
        "specs.Train".to_string()
    }

    fn fields(&self) -> Vec<(&'static str, ConfigValue)> {
        vec![
            ("dataset", ConfigValue::step(self.dataset.clone())),
            ("epochs", self.epochs.into()),
        ]
    }

    fn create(&self, dir: &Path) -> Result<i64, StepError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        std::fs::write(dir.join("model.json"), self.epochs.to_string())?;
        Ok(self.epochs)
    }

    fn load(&self, dir: &Path) -> Result<i64, StepError> {
        let text = std::fs::read_to_string(dir.join("model.json"))?;
        text.parse().map_err(|_| StepError::failed("bad model.json"))
    }
}

/// Resolve a step's data directory under `base`.
pub fn step_dir<S: Step>(base: &Path, step: &S) -> PathBuf {
    let config = spec_config(base);
    cairn_core::Fingerprint::of(step as &dyn cairn_core::DynStep)
        .unwrap()
        .dir(&config.root_for(step.version_controlled()))
}
