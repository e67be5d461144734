// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service state machine states and the status snapshot exposed over RPC.

use serde::{Deserialize, Serialize};

use crate::signal_name;

/// Lifecycle state of a [`Service`](../../raptor-service/struct.Service.html).
///
/// `Active` = `Starting | Running | Stopping`. `Startable` = `NotStarted` or
/// any terminal state (`Success | Aborted | Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Success,
    Aborted,
    Failed,
}

impl ServiceState {
    /// `NotStarted` or any terminal state.
    pub fn is_startable(self) -> bool {
        matches!(
            self,
            ServiceState::NotStarted
                | ServiceState::Success
                | ServiceState::Aborted
                | ServiceState::Failed
        )
    }

    /// `Starting`, `Running`, or `Stopping`.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ServiceState::Starting | ServiceState::Running | ServiceState::Stopping
        )
    }

    /// `Success`, `Aborted`, or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServiceState::Success | ServiceState::Aborted | ServiceState::Failed
        )
    }
}

/// Child-process exit classification, independent of the service-level
/// [`ServiceState`] it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcStatus {
    Running,
    CleanExit,
    SignalExit,
    ErrorExit,
}

/// Immutable snapshot of a service at a point in time, as returned by
/// `getStatus`/`getStatusAll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub status: ServiceState,
    pub proc_status: Option<ProcStatus>,
    pub pid: Option<u32>,
    pub return_value: Option<i32>,
    pub sig_num: Option<i32>,
    pub sig_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub startup_failed: bool,
}

impl StatusRecord {
    pub fn not_started() -> Self {
        Self {
            status: ServiceState::NotStarted,
            proc_status: None,
            pid: None,
            return_value: None,
            sig_num: None,
            sig_name: None,
            startup_failed: false,
        }
    }

    pub fn starting() -> Self {
        Self {
            status: ServiceState::Starting,
            ..Self::not_started()
        }
    }

    pub fn running(pid: u32) -> Self {
        Self {
            status: ServiceState::Running,
            proc_status: Some(ProcStatus::Running),
            pid: Some(pid),
            ..Self::not_started()
        }
    }

    pub fn stopping(pid: Option<u32>) -> Self {
        Self {
            status: ServiceState::Stopping,
            proc_status: Some(ProcStatus::Running),
            pid,
            ..Self::not_started()
        }
    }

    pub fn startup_failed(return_value: i32) -> Self {
        Self {
            status: ServiceState::Failed,
            proc_status: Some(ProcStatus::ErrorExit),
            return_value: Some(return_value),
            startup_failed: true,
            ..Self::not_started()
        }
    }

    /// Classify a raw exit code the way `waitpid`/`WEXITSTATUS`/`WTERMSIG`
    /// would: non-negative is a normal exit, negative is `-signal`.
    ///
    /// `HUP`/`INT`/`TERM` are "requested" signals and map to `Aborted`;
    /// anything else (e.g. `SEGV`, `KILL`) maps to `Failed`.
    pub fn from_exit_code(raw: i32) -> Self {
        if raw == 0 {
            Self {
                status: ServiceState::Success,
                proc_status: Some(ProcStatus::CleanExit),
                return_value: Some(0),
                ..Self::not_started()
            }
        } else if raw > 0 {
            Self {
                status: ServiceState::Failed,
                proc_status: Some(ProcStatus::ErrorExit),
                return_value: Some(raw),
                ..Self::not_started()
            }
        } else {
            let sig_num = -raw;
            let status = if matches!(sig_num, libc_signal::SIGHUP | libc_signal::SIGINT | libc_signal::SIGTERM) {
                ServiceState::Aborted
            } else {
                ServiceState::Failed
            };
            Self {
                status,
                proc_status: Some(ProcStatus::SignalExit),
                sig_num: Some(sig_num),
                sig_name: signal_name(sig_num).map(str::to_string),
                ..Self::not_started()
            }
        }
    }
}

/// Minimal signal-number constants, so [`StatusRecord::from_exit_code`]
/// doesn't need a libc dependency just to compare against three numbers.
mod libc_signal {
    pub const SIGHUP: i32 = 1;
    pub const SIGINT: i32 = 2;
    pub const SIGTERM: i32 = 15;
}
