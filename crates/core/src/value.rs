// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursively-composed configuration values.
//!
//! A step's declared fields are `(name, ConfigValue)` pairs. The enum is
//! closed: only representable values can appear in a configuration, so
//! canonicalization never meets an unsupported kind at runtime.

use crate::step::{DynStep, Step};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A configuration field value.
///
/// Mappings are keyed by `String` and held sorted (`BTreeMap`), matching the
/// canonical form. Sequences preserve order. Nested steps are erased to
/// `Arc<dyn DynStep>`.
#[derive(Clone)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
    Step(Arc<dyn DynStep>),
}

impl ConfigValue {
    /// Wrap a typed step as a nested dependency value.
    pub fn step<S: Step>(step: S) -> Self {
        ConfigValue::Step(Arc::new(step))
    }

    /// Collect the step dependencies reachable through this value.
    ///
    /// Descends through sequences and mappings but not into the fields of
    /// nested steps; each step resolves its own dependencies when it is
    /// itself computed.
    pub fn steps(&self) -> Vec<Arc<dyn DynStep>> {
        let mut out = Vec::new();
        self.collect_steps(&mut out);
        out
    }

    fn collect_steps(&self, out: &mut Vec<Arc<dyn DynStep>>) {
        match self {
            ConfigValue::Step(step) => out.push(Arc::clone(step)),
            ConfigValue::Seq(items) => {
                for item in items {
                    item.collect_steps(out);
                }
            }
            ConfigValue::Map(entries) => {
                for value in entries.values() {
                    value.collect_steps(out);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Null => write!(f, "Null"),
            ConfigValue::Bool(v) => write!(f, "Bool({})", v),
            ConfigValue::Int(v) => write!(f, "Int({})", v),
            ConfigValue::Float(v) => write!(f, "Float({})", v),
            ConfigValue::Str(v) => write!(f, "Str({:?})", v),
            ConfigValue::Seq(v) => f.debug_tuple("Seq").field(v).finish(),
            ConfigValue::Map(v) => f.debug_tuple("Map").field(v).finish(),
            ConfigValue::Step(s) => write!(f, "Step({})", s.namespace()),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int(v as i64)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        ConfigValue::Int(v as i64)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Str(v)
    }
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => ConfigValue::Null,
        }
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(v: Vec<T>) -> Self {
        ConfigValue::Seq(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ConfigValue>> From<BTreeMap<String, T>> for ConfigValue {
    fn from(v: BTreeMap<String, T>) -> Self {
        ConfigValue::Map(v.into_iter().map(|(k, val)| (k, val.into())).collect())
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
