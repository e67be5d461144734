// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error enum returned across the RPC boundary, and by anything in the
//! workspace that needs to report one of these specific failure kinds
//! rather than its own crate-local error.

use thiserror::Error;

/// Errors surfaced by the supervisor's public operations.
///
/// One `thiserror`-derived enum at the core crate boundary, the way every
/// other crate boundary in this workspace models its errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RaptorError {
    #[error("unknown service: {name}")]
    UnknownService { name: String },

    #[error("service {name} is already active")]
    ServiceAlreadyActive { name: String },

    #[error("service {name} is not active")]
    ServiceNotActive { name: String },

    #[error("config field error: {reason}")]
    ConfigFieldError { reason: String },
}

impl RaptorError {
    pub fn unknown_service(name: impl Into<String>) -> Self {
        RaptorError::UnknownService { name: name.into() }
    }

    pub fn service_already_active(name: impl Into<String>) -> Self {
        RaptorError::ServiceAlreadyActive { name: name.into() }
    }

    pub fn service_not_active(name: impl Into<String>) -> Self {
        RaptorError::ServiceNotActive { name: name.into() }
    }

    pub fn config_field_error(reason: impl Into<String>) -> Self {
        RaptorError::ConfigFieldError { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_the_name() {
        assert_eq!(
            RaptorError::unknown_service("foo").to_string(),
            "unknown service: foo"
        );
        assert_eq!(
            RaptorError::service_already_active("foo").to_string(),
            "service foo is already active"
        );
        assert_eq!(
            RaptorError::service_not_active("foo").to_string(),
            "service foo is not active"
        );
    }
}
