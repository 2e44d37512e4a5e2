// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-attempt log inside the step directory.
//!
//! Writes human-readable timestamped lines to `.state/log`. Each `append()`
//! call opens, writes, and closes the file. Failures are logged via tracing
//! but do not propagate — logging must not break the protocol.

use crate::state::{internal_dir, log_path};
use chrono::{SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only logger for one step directory.
pub struct AttemptLog {
    dir: PathBuf,
}

impl AttemptLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Append a log line for the given attempt.
    ///
    /// Format: `2026-01-30T08:14:09Z [attempt 2] message`
    pub fn append(&self, attempt_number: u32, message: &str) {
        let line = format!(
            "{} [attempt {}] {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            attempt_number,
            message
        );
        if let Err(e) = self.write_line(&line) {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to write attempt log"
            );
        }
    }

    /// Append a separator line between attempts.
    pub fn separator(&self) {
        if let Err(e) = self.write_line("----------------------------------------\n") {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to write attempt log separator"
            );
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(internal_dir(&self.dir))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path(&self.dir))?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
#[path = "attempt_log_tests.rs"]
mod tests;
