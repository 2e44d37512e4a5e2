// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized configuration, loaded from `CAIRN_*` environment variables.
//!
//! A `Config` is constructed once at process start and threaded through the
//! runner; tests build one directly and never touch the environment.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors surfaced at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// How long `StateStore` may serve cached reads of a step's state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    /// Every read goes to disk.
    Never,
    /// Cached entries never expire (invalidated only by local writes).
    Forever,
    /// Cached entries are served for at most this long.
    Ttl(Duration),
}

/// Tunables for the cache protocol. All durations come from `*_SECS`
/// environment variables; see `from_env` for the variable names.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage root; `data/` and `git/` subtrees live underneath.
    pub base_root: PathBuf,
    /// Follower and leader poll cadence.
    pub poll_interval: Duration,
    /// How often a waiting follower logs progress.
    pub wait_log_every: Duration,
    /// Heartbeat gap beyond which a queued/running attempt is stale.
    pub stale_timeout: Duration,
    /// Lease length granted by each heartbeat.
    pub lease_duration: Duration,
    /// Heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// Preemption budget per step before the step fails.
    pub preempt_max: u32,
    /// Skip the dirty-worktree interlock for version-controlled steps.
    pub ignore_git_diff: bool,
    /// Treat a missing git repository as a dirty worktree.
    pub require_git: bool,
    /// Treat a missing git remote as a dirty worktree.
    pub require_git_remote: bool,
    /// Namespaces forced to recompute regardless of cached success.
    pub force_recompute: BTreeSet<String>,
    /// Coerce cancelled attempts into requeuable preemptions.
    pub cancelled_is_preempted: bool,
    /// TTL for cached state-file reads.
    pub cache_metadata_ttl: CacheTtl,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Variables (defaults in parentheses): `CAIRN_ROOT` (`./cairn-data`),
    /// `CAIRN_POLL_INTERVAL_SECS` (10), `CAIRN_WAIT_LOG_EVERY_SECS` (10),
    /// `CAIRN_STALE_AFTER_SECS` (1800), `CAIRN_LEASE_SECS` (120),
    /// `CAIRN_HEARTBEAT_SECS` (lease/3, min 1), `CAIRN_PREEMPT_MAX` (5),
    /// `CAIRN_IGNORE_DIFF` (false), `CAIRN_REQUIRE_GIT` (true),
    /// `CAIRN_REQUIRE_GIT_REMOTE` (true), `CAIRN_FORCE_RECOMPUTE` (empty),
    /// `CAIRN_CANCELLED_IS_PREEMPTED` (false), `CAIRN_CACHE_METADATA` (5m).
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_root = match std::env::var("CAIRN_ROOT") {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => PathBuf::from("cairn-data"),
        };
        let base_root = absolutize(base_root);

        let lease_duration = env_secs("CAIRN_LEASE_SECS", 120.0)?;
        let heartbeat_interval = match std::env::var("CAIRN_HEARTBEAT_SECS") {
            Ok(v) => parse_secs("CAIRN_HEARTBEAT_SECS", &v)?,
            Err(_) => default_heartbeat(lease_duration),
        };

        Ok(Self {
            base_root,
            poll_interval: env_secs("CAIRN_POLL_INTERVAL_SECS", 10.0)?,
            wait_log_every: env_secs("CAIRN_WAIT_LOG_EVERY_SECS", 10.0)?,
            stale_timeout: env_secs("CAIRN_STALE_AFTER_SECS", 1800.0)?,
            lease_duration,
            heartbeat_interval,
            preempt_max: env_u32("CAIRN_PREEMPT_MAX", 5)?,
            ignore_git_diff: env_bool("CAIRN_IGNORE_DIFF"),
            require_git: env_bool_default_true("CAIRN_REQUIRE_GIT"),
            require_git_remote: env_bool_default_true("CAIRN_REQUIRE_GIT_REMOTE"),
            force_recompute: env_namespace_set("CAIRN_FORCE_RECOMPUTE"),
            cancelled_is_preempted: env_bool("CAIRN_CANCELLED_IS_PREEMPTED"),
            cache_metadata_ttl: match std::env::var("CAIRN_CACHE_METADATA") {
                Ok(v) => parse_cache_ttl("CAIRN_CACHE_METADATA", &v)?,
                Err(_) => CacheTtl::Ttl(Duration::from_secs(300)),
            },
        })
    }

    /// Root directory for artifacts; version-controlled steps live under
    /// `git/`, everything else under `data/`.
    pub fn root_for(&self, version_controlled: bool) -> PathBuf {
        if version_controlled {
            self.base_root.join("git")
        } else {
            self.base_root.join("data")
        }
    }
}

impl Default for Config {
    /// Defaults matching `from_env` with an empty environment, except the
    /// root, which stays relative for the caller to place.
    fn default() -> Self {
        let lease_duration = Duration::from_secs(120);
        Self {
            base_root: PathBuf::from("cairn-data"),
            poll_interval: Duration::from_secs(10),
            wait_log_every: Duration::from_secs(10),
            stale_timeout: Duration::from_secs(1800),
            lease_duration,
            heartbeat_interval: default_heartbeat(lease_duration),
            preempt_max: 5,
            ignore_git_diff: false,
            require_git: true,
            require_git_remote: true,
            force_recompute: BTreeSet::new(),
            cancelled_is_preempted: false,
            cache_metadata_ttl: CacheTtl::Ttl(Duration::from_secs(300)),
        }
    }
}

fn default_heartbeat(lease: Duration) -> Duration {
    let third = lease / 3;
    third.max(Duration::from_secs(1))
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir().map(|cwd| cwd.join(&path)).unwrap_or(path)
    }
}

fn env_secs(var: &'static str, default: f64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(v) => parse_secs(var, &v),
        Err(_) => Duration::try_from_secs_f64(default).map_err(|e| ConfigError::Invalid {
            var,
            value: default.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: "expected a number of seconds".to_string(),
    })?;
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: "seconds must be finite and non-negative".to_string(),
    })
}

fn env_u32(var: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value: v.clone(),
            reason: "expected a non-negative integer".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn env_bool(var: &str) -> bool {
    std::env::var(var).map(|v| is_truthy(&v)).unwrap_or(false)
}

fn env_bool_default_true(var: &str) -> bool {
    std::env::var(var).map(|v| is_truthy(&v)).unwrap_or(true)
}

fn env_namespace_set(var: &str) -> BTreeSet<String> {
    std::env::var(var)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a cache TTL: `never`, `forever`, or `<num>[smh]` (unit defaults to
/// seconds).
fn parse_cache_ttl(var: &'static str, value: &str) -> Result<CacheTtl, ConfigError> {
    let v = value.trim().to_lowercase();
    match v.as_str() {
        "never" | "0" | "false" | "no" => return Ok(CacheTtl::Never),
        "forever" | "inf" | "true" | "yes" | "1" => return Ok(CacheTtl::Forever),
        _ => {}
    }

    let (num_str, suffix) = v
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| (&v[..i], v[i..].trim()))
        .unwrap_or((v.as_str(), ""));

    let invalid = |reason: &str| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| invalid("use 'never', 'forever', or a duration like '5m', '1h', '30s'"))?;
    let multiplier = match suffix {
        "" | "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return Err(invalid("unknown duration suffix; expected s, m or h")),
    };
    let secs = num * multiplier;
    Duration::try_from_secs_f64(secs)
        .map(CacheTtl::Ttl)
        .map_err(|_| invalid("duration must be finite and non-negative"))
}

/// Path helper used by tests and the CLI: the two artifact roots under a base.
pub fn roots_of(base: &Path) -> [PathBuf; 2] {
    [base.join("data"), base.join("git")]
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
