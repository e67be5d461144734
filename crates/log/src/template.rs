// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `${name}`-style path templating, the way log paths and log file names
//! are configured: a template string plus a set of named substitutions,
//! one of which (`${unique}`) is always supplied by the caller from the
//! current time rather than from config.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use raptor_core::time_fmt::unique_token;

/// Expand `${name}` tokens in `template` using `vars`, plus the implicit
/// `${unique}` token computed from `now`.
///
/// Unknown tokens are left untouched rather than erroring: a stray `${...}`
/// in a literal filename is more likely a typo worth seeing in the
/// resulting path than a reason to fail log setup.
pub fn expand(template: &str, vars: &HashMap<String, String>, now: DateTime<Utc>) -> String {
    let mut out = template.replace("${unique}", &unique_token(now));
    for (key, value) in vars {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

/// Expand the template with `${unique}` replaced by a fixed literal
/// (`"latest"` / `"previous"`) instead of a timestamp, for deriving the
/// symlink paths that always point at the newest/previous log.
pub fn expand_with_unique_literal(
    template: &str,
    vars: &HashMap<String, String>,
    literal: &str,
) -> String {
    let mut out = template.replace("${unique}", literal);
    for (key, value) in vars {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expands_unique_and_named_vars() {
        let now = Utc.with_ymd_and_hms(2026, 1, 30, 8, 14, 9).unwrap();
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "myservice".to_string());
        let expanded = expand("${name}_${unique}.txt", &vars, now);
        assert!(expanded.starts_with("myservice_2026-01-30-081409"));
        assert!(expanded.ends_with(".txt"));
    }

    #[test]
    fn unknown_token_left_untouched() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let expanded = expand("${oops}.log", &HashMap::new(), now);
        assert_eq!(expanded, "${oops}.log");
    }

    #[test]
    fn literal_expansion_for_symlink_paths() {
        let expanded = expand_with_unique_literal("log_${unique}.txt", &HashMap::new(), "latest");
        assert_eq!(expanded, "log_latest.txt");
    }
}
