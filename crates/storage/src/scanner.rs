// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only observer over the on-disk cache.
//!
//! Walks the storage roots for `.state/state.json` files and summarizes
//! them. Observers require no coordination with running workers: state files
//! are written by atomic rename, so any read sees a complete record.
//! Unreadable directories are skipped with a warning rather than failing the
//! whole scan.

use crate::metadata::MetadataStore;
use crate::state::{state_path, AttemptStatus, ResultStatus, State, INTERNAL_DIR, STATE_FILE};
use crate::store::StateStore;
use cairn_core::{config::roots_of, CacheTtl};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One step directory, summarized.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub namespace: String,
    pub hash: String,
    /// Last namespace component.
    pub class_name: String,
    pub result_status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_status: Option<AttemptStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_number: Option<u32>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Full detail for one step directory.
#[derive(Debug, Clone, Serialize)]
pub struct StepDetail {
    #[serde(flatten)]
    pub summary: StepSummary,
    pub directory: PathBuf,
    pub state: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Aggregate counts over a scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub total: usize,
    pub by_result_status: BTreeMap<String, usize>,
    pub by_attempt_status: BTreeMap<String, usize>,
    pub running_count: usize,
    pub queued_count: usize,
    pub failed_count: usize,
    pub success_count: usize,
}

/// Filters applied during a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub result_status: Option<ResultStatus>,
    pub attempt_status: Option<AttemptStatus>,
    pub namespace_prefix: Option<String>,
}

/// Filesystem scanner over both storage roots.
pub struct Scanner {
    roots: Vec<PathBuf>,
    store: StateStore,
}

impl Scanner {
    /// Scanner over `<base>/data` and `<base>/git`.
    pub fn new(base_root: &Path) -> Self {
        Self {
            roots: roots_of(base_root).into_iter().collect(),
            store: StateStore::new(CacheTtl::Never),
        }
    }

    /// Scan for step directories, newest first.
    pub fn scan(&self, filter: &ScanFilter) -> Vec<StepSummary> {
        let mut summaries = Vec::new();
        for root in self.existing_roots() {
            for dir in find_step_dirs(&root) {
                let state = match self.store.read(&dir) {
                    Ok(state) => state,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "skipping unreadable state");
                        continue;
                    }
                };
                let summary = summarize(&state, &dir, &root);
                if let Some(want) = filter.result_status {
                    if summary.result_status != want {
                        continue;
                    }
                }
                if let Some(want) = filter.attempt_status {
                    if summary.attempt_status != Some(want) {
                        continue;
                    }
                }
                if let Some(prefix) = &filter.namespace_prefix {
                    if !summary.namespace.starts_with(prefix.as_str()) {
                        continue;
                    }
                }
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// Full detail for one step directory, or `None` if it does not exist
    /// under either root.
    pub fn detail(&self, namespace: &str, hash: &str) -> Option<StepDetail> {
        let mut rel = PathBuf::new();
        for part in namespace.split('.') {
            rel.push(part);
        }
        rel.push(hash);

        for root in self.existing_roots() {
            let dir = root.join(&rel);
            if !state_path(&dir).is_file() {
                continue;
            }
            let state = match self.store.read(&dir) {
                Ok(state) => state,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "unreadable state");
                    continue;
                }
            };
            let raw = serde_json::to_value(&state).unwrap_or(serde_json::Value::Null);
            return Some(StepDetail {
                summary: summarize(&state, &dir, &root),
                directory: dir.clone(),
                state: raw,
                metadata: MetadataStore::read_raw(&dir),
            });
        }
        None
    }

    /// Aggregate statistics over every step directory.
    pub fn stats(&self) -> ScanStats {
        let mut stats = ScanStats::default();
        for summary in self.scan(&ScanFilter::default()) {
            stats.total += 1;
            *stats
                .by_result_status
                .entry(summary.result_status.to_string())
                .or_insert(0) += 1;
            match summary.result_status {
                ResultStatus::Success => stats.success_count += 1,
                ResultStatus::Failed => stats.failed_count += 1,
                _ => {}
            }
            if let Some(status) = summary.attempt_status {
                *stats
                    .by_attempt_status
                    .entry(status.to_string())
                    .or_insert(0) += 1;
                match status {
                    AttemptStatus::Running => stats.running_count += 1,
                    AttemptStatus::Queued => stats.queued_count += 1,
                    _ => {}
                }
            }
        }
        stats
    }

    fn existing_roots(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.roots.iter().filter(|r| r.exists()).cloned()
    }
}

fn summarize(state: &State, dir: &Path, root: &Path) -> StepSummary {
    let (namespace, hash) = parse_namespace(dir, root);
    let class_name = namespace
        .rsplit('.')
        .next()
        .unwrap_or(namespace.as_str())
        .to_string();
    StepSummary {
        namespace,
        hash,
        class_name,
        result_status: state.result.status,
        attempt_status: state.attempt.as_ref().map(|a| a.status),
        attempt_number: state.attempt.as_ref().map(|a| a.number),
        updated_at: state.updated_at,
        started_at: state.attempt.as_ref().map(|a| a.started_at),
    }
}

/// Split a step directory path into `(namespace, hash)` relative to a root.
///
/// `/root/my_project/pipelines/Train/abc123` → `("my_project.pipelines.Train", "abc123")`
fn parse_namespace(dir: &Path, root: &Path) -> (String, String) {
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() < 2 {
        return (parts.join("."), String::new());
    }
    let hash = parts[parts.len() - 1].clone();
    let namespace = parts[..parts.len() - 1].join(".");
    (namespace, hash)
}

/// Find all directories containing `.state/state.json` under a root.
fn find_step_dirs(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if path.file_name().map(|n| n == INTERNAL_DIR).unwrap_or(false) {
                if path.join(STATE_FILE).is_file() {
                    found.push(dir.clone());
                }
                continue;
            }
            pending.push(path);
        }
    }
    found
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod tests;
