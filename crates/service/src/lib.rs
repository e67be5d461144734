// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The per-service state machine and the process/stream plumbing behind it.

pub mod config;
pub mod pump;
pub mod service;
pub mod spawn;

pub use config::{ServiceConfig, TokenizeError};
pub use pump::{spawn_pump, PumpHandle};
pub use service::{Service, STOP_GRACE};
pub use spawn::{spawn, SpawnError, SpawnedChild};
