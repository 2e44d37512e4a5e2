// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named step collections with fingerprint deduplication.
//!
//! A `StepSet` gathers the steps of an experiment suite under human-readable
//! names, including steps nested inside sequence and mapping values. Two
//! entries with the same fingerprint are the same computation, so only the
//! first is kept; later names become aliases of the surviving entry.

use crate::fingerprint::{Fingerprint, InvalidConfig};
use crate::step::{DynStep, Step};
use crate::value::ConfigValue;
use std::collections::HashMap;
use std::sync::Arc;

/// An entry in a [`StepSet`].
#[derive(Clone)]
pub struct StepEntry {
    pub name: String,
    pub fingerprint: Fingerprint,
    pub step: Arc<dyn DynStep>,
}

/// A named, fingerprint-deduplicated collection of steps.
#[derive(Default)]
pub struct StepSet {
    entries: Vec<StepEntry>,
    by_hash: HashMap<String, usize>,
    names: HashMap<String, usize>,
}

impl StepSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed step under a name.
    pub fn insert<S: Step>(&mut self, name: &str, step: S) -> Result<(), InvalidConfig> {
        self.insert_dyn(name, Arc::new(step))
    }

    /// Register an erased step under a name.
    ///
    /// A step whose fingerprint is already present is not added again; the
    /// new name becomes an alias resolving to the existing entry. The first
    /// registration of a name wins.
    pub fn insert_dyn(
        &mut self,
        name: &str,
        step: Arc<dyn DynStep>,
    ) -> Result<(), InvalidConfig> {
        let fingerprint = Fingerprint::of(step.as_ref())?;
        let index = match self.by_hash.get(fingerprint.hash()) {
            Some(&existing) => existing,
            None => {
                let index = self.entries.len();
                self.by_hash.insert(fingerprint.hash().to_string(), index);
                self.entries.push(StepEntry {
                    name: name.to_string(),
                    fingerprint,
                    step,
                });
                index
            }
        };
        self.names.entry(name.to_string()).or_insert(index);
        Ok(())
    }

    /// Register every step reachable through a value. Steps inside mappings
    /// take the mapping key as their name; steps inside sequences inherit
    /// `name`.
    pub fn insert_value(&mut self, name: &str, value: &ConfigValue) -> Result<(), InvalidConfig> {
        match value {
            ConfigValue::Step(step) => self.insert_dyn(name, Arc::clone(step)),
            ConfigValue::Seq(items) => {
                for item in items {
                    self.insert_value(name, item)?;
                }
                Ok(())
            }
            ConfigValue::Map(entries) => {
                for (key, val) in entries {
                    self.insert_value(key, val)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// All distinct steps, in insertion order.
    pub fn all(&self) -> &[StepEntry] {
        &self.entries
    }

    /// Look up a step by any name it was registered under.
    pub fn by_name(&self, name: &str) -> Option<&StepEntry> {
        self.names.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
