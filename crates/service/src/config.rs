// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service configuration, as loaded from the `SERVICES` map in the
//! supervisor's JSON config document.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One entry under `SERVICES.<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Shell-style command line. Defaults to the service's own name (an
    /// empty string deserializes as absent and is filled in by the config
    /// loader, which is the only place that knows the service's own name).
    #[serde(default)]
    pub command: String,

    /// Working directory for the child, if other than the supervisor's own.
    #[serde(default)]
    pub cwd: Option<String>,

    /// Overrides applied on top of the inherited environment. An explicit
    /// `null` value removes that variable from the child's environment
    /// instead of setting it.
    #[serde(default)]
    pub env: HashMap<String, Option<String>>,

    /// Path the child should open as its stdin (a named pipe or a file).
    /// When absent, the parent owns a pipe to the child's stdin.
    #[serde(default)]
    pub stdin: Option<String>,

    /// Path the child should open as its stdout. When absent, stdout runs
    /// over a PTY the parent reads from.
    #[serde(default)]
    pub stdout: Option<String>,

    /// Log filename template. `None` disables file logging for this
    /// service (its lines still reach the topic bus).
    #[serde(default = "default_log_template")]
    pub log: Option<String>,
}

fn default_log_template() -> Option<String> {
    Some("${name}_${unique}.txt".to_string())
}

impl ServiceConfig {
    pub fn named(name: &str) -> Self {
        Self {
            command: name.to_string(),
            cwd: None,
            env: HashMap::new(),
            stdin: None,
            stdout: None,
            log: default_log_template(),
        }
    }

    /// Build the child's environment: the inherited environment overlaid
    /// with `env`, with explicit `null` overrides removed entirely.
    pub fn build_env(&self, inherited: &HashMap<String, String>) -> HashMap<String, String> {
        let mut out = inherited.clone();
        for (key, value) in &self.env {
            match value {
                Some(v) => {
                    out.insert(key.clone(), v.clone());
                }
                None => {
                    out.remove(key);
                }
            }
        }
        out
    }

    /// Tokenize `command` the way a shell would, respecting quoting.
    pub fn tokenize(&self) -> Result<Vec<String>, TokenizeError> {
        shlex::split(&self.command).ok_or(TokenizeError {
            command: self.command.clone(),
        })
    }
}

/// `command` could not be tokenized (unbalanced quotes, trailing backslash).
#[derive(Debug, thiserror::Error)]
#[error("invalid command line for tokenizing: {command:?}")]
pub struct TokenizeError {
    pub command: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_template_uses_name_and_unique() {
        let cfg = ServiceConfig::named("foo");
        assert_eq!(cfg.log.as_deref(), Some("${name}_${unique}.txt"));
    }

    #[test]
    fn tokenizes_quoted_command() {
        let mut cfg = ServiceConfig::named("foo");
        cfg.command = "echo \"hello world\" --flag".to_string();
        assert_eq!(
            cfg.tokenize().unwrap(),
            vec!["echo", "hello world", "--flag"]
        );
    }

    #[test]
    fn build_env_applies_overrides_and_removes_nulls() {
        let mut cfg = ServiceConfig::named("foo");
        cfg.env.insert("FOO".to_string(), Some("bar".to_string()));
        cfg.env.insert("PATH".to_string(), None);

        let mut inherited = HashMap::new();
        inherited.insert("PATH".to_string(), "/usr/bin".to_string());
        inherited.insert("HOME".to_string(), "/root".to_string());

        let env = cfg.build_env(&inherited);
        assert_eq!(env.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(env.get("HOME"), Some(&"/root".to_string()));
        assert!(!env.contains_key("PATH"));
    }
}
