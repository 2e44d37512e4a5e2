// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source-control state probe.
//!
//! Captures the git state of the working directory for metadata records and
//! for the dirty-worktree interlock on version-controlled steps.

use crate::subprocess::{run_with_timeout, GIT_PROBE_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Observed source-control state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitState {
    /// Whether a git repository was found at all.
    pub repo: bool,
    pub commit: Option<String>,
    pub remote_url: Option<String>,
    /// Uncommitted changes present.
    pub dirty: bool,
}

/// Probe for the source-control state of a working directory.
#[async_trait]
pub trait SourceProbe: Clone + Send + Sync + 'static {
    async fn probe(&self, cwd: &Path) -> GitState;
}

/// Probes by shelling out to `git`.
#[derive(Clone, Default)]
pub struct GitProbe;

impl GitProbe {
    pub fn new() -> Self {
        Self
    }

    async fn git_stdout(cwd: &Path, args: &[&str], description: &str) -> Option<String> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(cwd);
        match run_with_timeout(cmd, GIT_PROBE_TIMEOUT, description).await {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "git probe command failed");
                None
            }
        }
    }
}

#[async_trait]
impl SourceProbe for GitProbe {
    async fn probe(&self, cwd: &Path) -> GitState {
        let commit = Self::git_stdout(cwd, &["rev-parse", "HEAD"], "git rev-parse").await;
        if commit.is_none() {
            return GitState::default();
        }

        let remote_url =
            Self::git_stdout(cwd, &["remote", "get-url", "origin"], "git remote get-url").await;
        let dirty = Self::git_stdout(cwd, &["status", "--porcelain"], "git status")
            .await
            .map(|s| !s.is_empty())
            // an unreadable status is treated as dirty
            .unwrap_or(true);

        GitState {
            repo: true,
            commit,
            remote_url,
            dirty,
        }
    }
}

/// Probe returning a fixed state; for tests and for environments without
/// source control.
#[derive(Clone, Default)]
pub struct StaticProbe {
    state: GitState,
}

impl StaticProbe {
    pub fn new(state: GitState) -> Self {
        Self { state }
    }

    /// A clean, committed worktree with a remote.
    pub fn clean() -> Self {
        Self::new(GitState {
            repo: true,
            commit: Some("0000000000000000000000000000000000000000".to_string()),
            remote_url: Some("git@example.invalid:test.git".to_string()),
            dirty: false,
        })
    }

    /// A repository with uncommitted changes.
    pub fn dirty() -> Self {
        Self::new(GitState {
            repo: true,
            commit: Some("0000000000000000000000000000000000000000".to_string()),
            remote_url: Some("git@example.invalid:test.git".to_string()),
            dirty: true,
        })
    }
}

#[async_trait]
impl SourceProbe for StaticProbe {
    async fn probe(&self, _cwd: &Path) -> GitState {
        self.state.clone()
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
