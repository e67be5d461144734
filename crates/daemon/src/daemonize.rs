// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The one genuinely `unsafe` corner of this workspace: the raw
//! double-fork/setsid dance POSIX gives no safe API for. Everything else
//! that looks like it might need `unsafe` — PTY allocation, non-blocking
//! reads, path-redirected child stdio — goes through a safe wrapper crate
//! or an out-of-process `/bin/sh` launcher instead (see `raptor_service`).
//!
//! Must run before the async runtime starts: `fork` only reliably carries
//! the calling thread forward, and by the time a `tokio::main` runtime is
//! up there may already be worker threads alive.

#![allow(unsafe_code)]

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonizeError {
    #[error("fork failed: {0}")]
    Fork(#[source] std::io::Error),
    #[error("setsid failed: {0}")]
    Setsid(#[source] std::io::Error),
    #[error("failed to open {path} for stdio redirection: {source}")]
    OpenStdio {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to redirect standard fd: {0}")]
    Dup2(#[source] std::io::Error),
    #[error("chdir(\"/\") failed: {0}")]
    Chdir(#[source] std::io::Error),
}

enum ForkOutcome {
    Parent,
    Child,
}

fn fork_once() -> Result<ForkOutcome, DaemonizeError> {
    // SAFETY: called before any worker thread exists (see module docs), so
    // the child inherits a single-threaded process and it is safe to keep
    // running ordinary Rust code in it.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        Err(DaemonizeError::Fork(std::io::Error::last_os_error()))
    } else if pid == 0 {
        Ok(ForkOutcome::Child)
    } else {
        Ok(ForkOutcome::Parent)
    }
}

fn dup2_onto(src: i32, dst: i32) -> Result<(), DaemonizeError> {
    // SAFETY: `src`/`dst` are valid fds owned by this process (open files
    // or the standard descriptors).
    let rc = unsafe { libc::dup2(src, dst) };
    if rc < 0 {
        Err(DaemonizeError::Dup2(std::io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

/// stdin is redirected from `/dev/null` (a daemon has no controlling
/// terminal to read from); stdout and stderr both go to `log_path`, so
/// anything a child library prints outside the `tracing` subscriber still
/// lands somewhere durable instead of silently vanishing.
fn redirect_stdio(log_path: &Path) -> Result<(), DaemonizeError> {
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let devnull = OpenOptions::new()
        .read(true)
        .open("/dev/null")
        .map_err(|source| DaemonizeError::OpenStdio {
            path: PathBuf::from("/dev/null"),
            source,
        })?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|source| DaemonizeError::OpenStdio {
            path: log_path.to_path_buf(),
            source,
        })?;

    dup2_onto(devnull.as_raw_fd(), libc::STDIN_FILENO)?;
    dup2_onto(log_file.as_raw_fd(), libc::STDOUT_FILENO)?;
    dup2_onto(log_file.as_raw_fd(), libc::STDERR_FILENO)?;
    Ok(())
}

/// Daemonize the current process: `chdir("/")`, zero `umask`, two forks
/// around an intermediate `setsid` (so the final process can never
/// re-acquire a controlling terminal), and std-fd redirection.
///
/// Returns once inside the final (grand-child) process. The two
/// intermediate processes exit from inside this call and never return.
pub fn daemonize(log_path: &Path) -> Result<(), DaemonizeError> {
    std::env::set_current_dir("/").map_err(DaemonizeError::Chdir)?;
    // SAFETY: umask takes no pointers and cannot fail.
    unsafe {
        libc::umask(0);
    }

    if let ForkOutcome::Parent = fork_once()? {
        std::process::exit(0);
    }

    // SAFETY: plain syscall, no preconditions beyond being single-threaded.
    if unsafe { libc::setsid() } < 0 {
        return Err(DaemonizeError::Setsid(std::io::Error::last_os_error()));
    }

    if let ForkOutcome::Parent = fork_once()? {
        std::process::exit(0);
    }

    redirect_stdio(log_path)
}
