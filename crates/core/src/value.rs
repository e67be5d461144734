// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The config value tree, and dotted-path access over it.
//!
//! Mirrors a JSON document (`Value` converts losslessly to and from
//! `serde_json::Value`) but is its own type so the config loader and the
//! `ConfigField`-style get/set/update operations don't have to reach into
//! `serde_json::Map` directly.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RaptorError;

/// A config value: a JSON-like tree with insertion-ordered maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn map() -> Self {
        Value::Map(IndexMap::new())
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Fetch a single path segment (no dots) from this value, which must be
    /// a [`Value::Map`].
    fn get_field<'a>(&'a self, field: &str) -> Result<&'a Value, RaptorError> {
        match self.as_map().and_then(|m| m.get(field)) {
            Some(v) => Ok(v),
            None => Err(RaptorError::ConfigFieldError {
                reason: format!("no such field: {field}"),
            }),
        }
    }

    /// Walk a dotted path (`"a.b.c"`) and return the value at its end.
    pub fn get_path(&self, path: &str) -> Result<&Value, RaptorError> {
        let mut cur = self;
        for segment in path.split('.') {
            cur = cur.get_field(segment)?;
        }
        Ok(cur)
    }

    /// Walk a dotted path, creating intermediate maps as needed, and
    /// overwrite the value at its end.
    ///
    /// `self` must already be a [`Value::Map`] (or the root segment's
    /// write will fail).
    pub fn set_path(&mut self, path: &str, new_value: Value) -> Result<(), RaptorError> {
        let segments: Vec<&str> = path.split('.').collect();
        self.set_path_segments(&segments, new_value)
    }

    fn set_path_segments(&mut self, segments: &[&str], new_value: Value) -> Result<(), RaptorError> {
        let Some((head, rest)) = segments.split_first() else {
            return Err(RaptorError::ConfigFieldError {
                reason: "empty path".to_string(),
            });
        };
        let map = self.as_map_mut().ok_or_else(|| RaptorError::ConfigFieldError {
            reason: format!("cannot set field {head:?} on a non-map value"),
        })?;
        if rest.is_empty() {
            map.insert((*head).to_string(), new_value);
            return Ok(());
        }
        let child = map
            .entry((*head).to_string())
            .or_insert_with(Value::map);
        child.set_path_segments(rest, new_value)
    }

    /// Merge `patch` into `self` at `path`.
    ///
    /// When both the existing value and `patch` are maps, keys are merged
    /// one level deep (patch keys overwrite, anything else is left alone —
    /// this does not recurse past one level, matching the original
    /// `ConfigField.update` behavior). Otherwise `patch` simply replaces
    /// the value at `path`.
    pub fn update_path(&mut self, path: &str, patch: Value) -> Result<(), RaptorError> {
        let existing = self.get_path(path).ok().cloned();
        match (existing, &patch) {
            (Some(Value::Map(mut base)), Value::Map(incoming)) => {
                for (k, v) in incoming.clone() {
                    base.insert(k, v);
                }
                self.set_path(path, Value::Map(base))
            }
            _ => self.set_path(path, patch),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(l) => serde_json::Value::Array(l.into_iter().map(Into::into).collect()),
            Value::Map(m) => {
                serde_json::Value::Object(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}
