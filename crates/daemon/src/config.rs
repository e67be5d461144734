// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-disk JSON configuration document, and the merge-load semantics
//! `loadConfig` applies when hot-reloading it into a running supervisor.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use raptor_core::{RaptorError, Value};
use raptor_service::ServiceConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config field error: {0}")]
    Field(#[from] RaptorError),
    #[error("SERVICES.{name} is not a valid service config: {source}")]
    BadServiceConfig {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

const DEFAULT_LOG_DIR: &str = "/tmp/pyraptord/logs";
const DEFAULT_LOG_FILE: &str = "pyraptord_${unique}.txt";
const DEFAULT_PID_FILE: &str = "pyraptord_pid.txt";

/// The supervisor's configuration: a typed view over the top-level fields,
/// backed by the full [`Value`] document so `getConfig`/`setConfig` can walk
/// arbitrary dotted paths the typed view doesn't know about.
pub struct Config {
    raw: Value,
    pub log_dir: PathBuf,
    pub log_file: String,
    pub pid_file: String,
    pub ports: Option<PathBuf>,
    pub services: IndexMap<String, ServiceConfig>,
    pub startup_group: Vec<String>,
}

impl Config {
    /// Parse a freshly-loaded document into a [`Config`], applying defaults
    /// for every field the document omits.
    pub fn from_value(raw: Value) -> Result<Self, ConfigError> {
        let mut cfg = Config {
            raw,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_file: DEFAULT_LOG_FILE.to_string(),
            pid_file: DEFAULT_PID_FILE.to_string(),
            ports: None,
            services: IndexMap::new(),
            startup_group: Vec::new(),
        };
        cfg.reparse()?;
        Ok(cfg)
    }

    /// Load the document from `path` on disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let json: serde_json::Value = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_value(Value::from(json))
    }

    /// Whole document, for `getConfig("")`-style introspection or snapshotting.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn get_path(&self, path: &str) -> Result<Value, RaptorError> {
        self.raw.get_path(path).cloned()
    }

    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), ConfigError> {
        self.raw.set_path(path, value)?;
        self.reparse()
    }

    pub fn update_path(&mut self, path: &str, patch: Value) -> Result<(), ConfigError> {
        self.raw.update_path(path, patch)?;
        self.reparse()
    }

    /// Apply `loadConfig`'s merge semantics: every top-level key in `patch`
    /// is merged one level deep into the existing value at that key (via
    /// [`Value::update_path`], which itself falls back to a full replace
    /// whenever either side isn't a map) — so a scalar or list key is simply
    /// replaced, and a nested-map key like `SERVICES` only has its direct
    /// children overwritten, with siblings left untouched.
    pub fn merge_load(&mut self, patch: Value) -> Result<(), ConfigError> {
        let Value::Map(top) = patch else {
            return Err(ConfigError::Field(RaptorError::config_field_error(
                "config document must be a JSON object",
            )));
        };
        for (key, value) in top {
            self.raw.update_path(&key, value)?;
        }
        self.reparse()
    }

    /// Re-derive the typed fields from `raw` after any mutation.
    fn reparse(&mut self) -> Result<(), ConfigError> {
        self.log_dir = self
            .raw
            .get_path("LOG_DIR")
            .ok()
            .and_then(|v| v.as_str().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        self.log_file = self
            .raw
            .get_path("LOG_FILE")
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
        self.pid_file = self
            .raw
            .get_path("PID_FILE")
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_PID_FILE.to_string());
        self.ports = self
            .raw
            .get_path("PORTS")
            .ok()
            .and_then(|v| v.as_str().map(PathBuf::from));

        self.services = IndexMap::new();
        if let Ok(services_value) = self.raw.get_path("SERVICES") {
            if let Some(map) = services_value.as_map() {
                for (name, value) in map {
                    let json: serde_json::Value = value.clone().into();
                    let mut service: ServiceConfig =
                        serde_json::from_value(json).map_err(|source| ConfigError::BadServiceConfig {
                            name: name.clone(),
                            source,
                        })?;
                    if service.command.is_empty() {
                        service.command = name.clone();
                    }
                    self.services.insert(name.clone(), service);
                }
            }
        }

        self.startup_group = self
            .raw
            .get_path("GROUPS.startup")
            .ok()
            .and_then(|v| match v {
                Value::List(items) => Some(
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn defaults_apply_when_fields_absent() {
        let cfg = Config::from_value(doc(json!({"PORTS": "/tmp/ports.json"}))).unwrap();
        assert_eq!(cfg.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(cfg.log_file, DEFAULT_LOG_FILE);
        assert_eq!(cfg.pid_file, DEFAULT_PID_FILE);
        assert!(cfg.services.is_empty());
        assert!(cfg.startup_group.is_empty());
    }

    #[test]
    fn services_parse_and_default_command_to_name() {
        let cfg = Config::from_value(doc(json!({
            "PORTS": "/tmp/ports.json",
            "SERVICES": {"sleep": {}},
        })))
        .unwrap();
        assert_eq!(cfg.services["sleep"].command, "sleep");
    }

    #[test]
    fn startup_group_parses_ordered_list() {
        let cfg = Config::from_value(doc(json!({
            "PORTS": "/tmp/ports.json",
            "GROUPS": {"startup": ["bc", "nohup"]},
        })))
        .unwrap();
        assert_eq!(cfg.startup_group, vec!["bc".to_string(), "nohup".to_string()]);
    }

    #[test]
    fn merge_load_replaces_scalar_top_level_key() {
        let mut cfg = Config::from_value(doc(json!({"PORTS": "/tmp/ports.json", "LOG_DIR": "/a"}))).unwrap();
        cfg.merge_load(doc(json!({"LOG_DIR": "/b"}))).unwrap();
        assert_eq!(cfg.log_dir, PathBuf::from("/b"));
    }

    #[test]
    fn merge_load_shallow_merges_services_leaving_siblings() {
        let mut cfg = Config::from_value(doc(json!({
            "PORTS": "/tmp/ports.json",
            "SERVICES": {"a": {"command": "a"}, "b": {"command": "b"}},
        })))
        .unwrap();
        cfg.merge_load(doc(json!({"SERVICES": {"a": {"command": "a2"}}})))
            .unwrap();
        assert_eq!(cfg.services["a"].command, "a2");
        assert_eq!(cfg.services["b"].command, "b");
    }
}
