// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical form and stable fingerprints for steps.
//!
//! The canonical form of a step is a recursively expanded JSON tree:
//! `{"__type__": namespace, "fields": [[name, value], ...]}` with fields in
//! declaration order, mapping keys sorted, and sequences in order. The
//! fingerprint is the SHA-256 of the compact canonical encoding, truncated to
//! 16 hex characters. Every cache-hit decision and every inter-worker
//! agreement hinges on this being pure.

use crate::step::DynStep;
use crate::value::ConfigValue;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Truncated length of the hex digest.
const HASH_LEN: usize = 16;

/// Canonicalization failures.
#[derive(Debug, Error)]
pub enum InvalidConfig {
    #[error("configuration cycle through step {namespace}")]
    Cycle { namespace: String },
    #[error("non-finite float in field {field:?} of step {namespace}")]
    NonFiniteFloat { namespace: String, field: String },
}

/// A step's stable identity: namespace plus configuration hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    namespace: String,
    hash: String,
}

impl Fingerprint {
    /// Derive the fingerprint of a step.
    pub fn of(step: &dyn DynStep) -> Result<Self, InvalidConfig> {
        let bytes = canonical_bytes(step)?;
        let digest = Sha256::digest(&bytes);
        let hex = format!("{:x}", digest);
        Ok(Self {
            namespace: step.namespace(),
            hash: hex[..HASH_LEN].to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Step directory under `root`: one path segment per namespace part,
    /// then the hash.
    pub fn dir(&self, root: &Path) -> PathBuf {
        let mut dir = root.to_path_buf();
        for part in self.namespace.split('.') {
            dir.push(part);
        }
        dir.push(&self.hash);
        dir
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.hash)
    }
}

/// Compute the canonical JSON tree of a step.
///
/// Fails on configuration cycles (detected by pointer identity along the
/// current expansion path) and on non-finite floats, which have no canonical
/// JSON encoding.
pub fn canonical_value(step: &dyn DynStep) -> Result<Value, InvalidConfig> {
    let mut path = Vec::new();
    canonical_step(step, thin_ptr(step), &mut path)
}

/// Compact canonical byte encoding: UTF-8 JSON, no whitespace, sorted map keys.
pub fn canonical_bytes(step: &dyn DynStep) -> Result<Vec<u8>, InvalidConfig> {
    let value = canonical_value(step)?;
    // Infallible: the tree contains no non-finite numbers or foreign types.
    Ok(serde_json::to_vec(&value).unwrap_or_default())
}

fn thin_ptr(step: &dyn DynStep) -> *const () {
    step as *const dyn DynStep as *const ()
}

fn canonical_step(
    step: &dyn DynStep,
    ptr: *const (),
    path: &mut Vec<*const ()>,
) -> Result<Value, InvalidConfig> {
    if path.contains(&ptr) {
        return Err(InvalidConfig::Cycle {
            namespace: step.namespace(),
        });
    }
    path.push(ptr);

    let namespace = step.namespace();
    let mut fields = Vec::new();
    for (name, value) in step.fields() {
        let canonical = canonical_field(&namespace, name, &value, path)?;
        fields.push(json!([name, canonical]));
    }

    path.pop();
    Ok(json!({ "__type__": namespace, "fields": fields }))
}

fn canonical_field(
    namespace: &str,
    field: &str,
    value: &ConfigValue,
    path: &mut Vec<*const ()>,
) -> Result<Value, InvalidConfig> {
    Ok(match value {
        ConfigValue::Null => Value::Null,
        ConfigValue::Bool(v) => Value::Bool(*v),
        ConfigValue::Int(v) => Value::from(*v),
        ConfigValue::Float(v) => {
            serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .ok_or_else(|| InvalidConfig::NonFiniteFloat {
                    namespace: namespace.to_string(),
                    field: field.to_string(),
                })?
        }
        ConfigValue::Str(v) => Value::from(v.clone()),
        ConfigValue::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(canonical_field(namespace, field, item, path)?);
            }
            Value::Array(out)
        }
        ConfigValue::Map(entries) => {
            // BTreeMap iteration is already key-sorted
            let mut map = serde_json::Map::new();
            for (key, val) in entries {
                map.insert(key.clone(), canonical_field(namespace, field, val, path)?);
            }
            Value::Object(map)
        }
        ConfigValue::Step(nested) => {
            let ptr = std::sync::Arc::as_ptr(nested) as *const ();
            canonical_step(nested.as_ref(), ptr, path)?
        }
    })
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
