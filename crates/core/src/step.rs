// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The user-facing [`Step`] trait and its object-safe mirror [`DynStep`].
//!
//! A step is an immutable configuration value that names a computation. The
//! typed trait carries the output type; the erased trait is what flows through
//! [`crate::ConfigValue::Step`] fields so that nested dependencies of
//! different output types can be resolved uniformly.

use crate::value::ConfigValue;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error raised by a step's `create` or `load` hook.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

impl StepError {
    /// Construct a failure with a plain message.
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::Failed(message.into())
    }

    /// Short kind tag recorded in `attempt.error.type`.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Io(_) => "io",
            StepError::Json(_) => "serialization",
            StepError::Failed(_) => "failed",
        }
    }
}

/// A typed, immutable configuration object that names a computation.
///
/// Implementors declare their configuration via [`Step::fields`] (in
/// declaration order) and provide the two artifact hooks: `create` performs
/// the computation and writes artifacts into the step directory; `load`
/// reconstructs the output from artifacts already on disk.
///
/// Steps must be cheap to clone: the engine clones them into `Arc`s when
/// handing computations to an execution adapter.
pub trait Step: Send + Sync + 'static {
    /// The value produced by this step.
    type Output;

    /// Fully-qualified, dot-separated type name. Determines the on-disk
    /// namespace directory. Two step types must never share a namespace.
    fn namespace(&self) -> String
    where
        Self: Sized,
    {
        std::any::type_name::<Self>().replace("::", ".")
    }

    /// Declared fields in declaration order.
    fn fields(&self) -> Vec<(&'static str, ConfigValue)>;

    /// Whether artifacts belong under the version-controlled root.
    fn version_controlled(&self) -> bool {
        false
    }

    /// Whether to discard a previous success and recompute.
    fn force_recompute(&self) -> bool {
        false
    }

    /// Upper bound on how long a follower waits for another worker's result.
    fn max_wait_time(&self) -> Option<Duration> {
        None
    }

    /// Perform the computation, writing any artifacts into `dir`.
    fn create(&self, dir: &Path) -> Result<Self::Output, StepError>;

    /// Reconstruct the output from artifacts in `dir`.
    fn load(&self, dir: &Path) -> Result<Self::Output, StepError>;
}

/// Object-safe mirror of [`Step`], provided for every `Step` implementor.
///
/// Nested step dependencies are carried as `Arc<dyn DynStep>` so the runner
/// can fingerprint and resolve them without knowing their output types.
pub trait DynStep: Send + Sync {
    fn namespace(&self) -> String;
    fn fields(&self) -> Vec<(&'static str, ConfigValue)>;
    fn version_controlled(&self) -> bool;
    fn force_recompute(&self) -> bool;
    fn max_wait_time(&self) -> Option<Duration>;

    /// Run the computation, discarding the typed output.
    ///
    /// The output is rematerialized through [`Step::load`] by whichever
    /// caller needs it; artifacts on disk are the contract.
    fn create_discarding(&self, dir: &Path) -> Result<(), StepError>;
}

impl<S: Step> DynStep for S {
    fn namespace(&self) -> String {
        Step::namespace(self)
    }

    fn fields(&self) -> Vec<(&'static str, ConfigValue)> {
        Step::fields(self)
    }

    fn version_controlled(&self) -> bool {
        Step::version_controlled(self)
    }

    fn force_recompute(&self) -> bool {
        Step::force_recompute(self)
    }

    fn max_wait_time(&self) -> Option<Duration> {
        Step::max_wait_time(self)
    }

    fn create_discarding(&self, dir: &Path) -> Result<(), StepError> {
        Step::create(self, dir).map(|_| ())
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
