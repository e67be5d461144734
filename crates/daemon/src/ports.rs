// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves the supervisor's own RPC socket path out of the ports file
//! named by the config's `PORTS` field: `PORTS[name].rpc`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortsError {
    #[error("failed to read ports file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ports file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no entry for {name:?} in ports file {path}")]
    NoSuchEntry { path: PathBuf, name: String },
}

#[derive(Debug, Deserialize)]
struct PortEntry {
    rpc: String,
}

/// Resolve `PORTS[name].rpc` from the ports JSON file at `path`.
pub fn resolve_rpc_socket(path: &Path, name: &str) -> Result<PathBuf, PortsError> {
    let text = std::fs::read_to_string(path).map_err(|source| PortsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: HashMap<String, PortEntry> =
        serde_json::from_str(&text).map_err(|source| PortsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    entries
        .get(name)
        .map(|entry| PathBuf::from(&entry.rpc))
        .ok_or_else(|| PortsError::NoSuchEntry {
            path: path.to_path_buf(),
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_named_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.json");
        std::fs::write(&path, r#"{"pyraptord": {"rpc": "/tmp/pyraptord.sock"}}"#).unwrap();
        let rpc = resolve_rpc_socket(&path, "pyraptord").unwrap();
        assert_eq!(rpc, PathBuf::from("/tmp/pyraptord.sock"));
    }

    #[test]
    fn missing_entry_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.json");
        std::fs::write(&path, r#"{"other": {"rpc": "/tmp/x.sock"}}"#).unwrap();
        assert!(resolve_rpc_socket(&path, "pyraptord").is_err());
    }
}
