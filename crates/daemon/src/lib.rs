// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The process supervisor: config, daemonization, the Unix-socket RPC
//! surface, and the [`Supervisor`] that owns every managed service.

pub mod config;
pub mod daemonize;
pub mod listener;
pub mod pidfile;
pub mod ports;
pub mod protocol;
pub mod supervisor;

pub use config::{Config, ConfigError};
pub use ports::{resolve_rpc_socket, PortsError};
pub use supervisor::Supervisor;
