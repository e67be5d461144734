// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds and launches a child process's I/O plumbing: stdin/stdout wired
//! either to a pipe/PTY the parent reads and writes, or opened by the
//! child itself from a configured path.
//!
//! Opening a named pipe can block until a peer connects, so any
//! path-based stream has to be opened *after* `fork` and *before* `exec` —
//! doing it in the parent would stall the whole supervisor. Rather than a
//! hand-rolled `fork`/`exec` shim (which would need `unsafe` to do
//! anything non-async-signal-safe between the two), the child is launched
//! through `/bin/sh -c '<redirections>; exec "$@"'`: the shell performs
//! the `open`+`dup2` for us, and the actual command only ever appears
//! after `exec`.

use std::collections::HashMap;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::process::Stdio;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use thiserror::Error;
use tokio::process::{Child, Command};

use raptor_fd::{FdError, FdTracker, TrackedHandle};

use crate::config::{ServiceConfig, TokenizeError};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("invalid command: {0}")]
    Tokenize(#[from] TokenizeError),
    #[error("empty command line")]
    EmptyCommand,
    #[error("failed to allocate pty: {0}")]
    Pty(#[from] FdError),
    #[error("failed to set pty non-blocking: {0}")]
    SetNonBlocking(#[source] nix::Error),
    #[error("spawn failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A spawned child plus the parent-side ends of whichever streams the
/// parent owns.
pub struct SpawnedChild {
    pub child: Child,
    pub pid: u32,
    /// `Some` unless stdin is configured to be opened by the child itself.
    pub stdin: Option<tokio::process::ChildStdin>,
    /// `Some` unless stdout is configured to be opened by the child itself.
    pub stdout_master: Option<TrackedHandle<tokio::fs::File>>,
    /// Always present: stderr is always a PTY pair the parent reads.
    pub stderr_master: TrackedHandle<tokio::fs::File>,
}

fn set_nonblocking(file: &File) -> Result<(), nix::Error> {
    let flags = fcntl(file, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(file, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// Single-quote a path for embedding in the generated shell script.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn build_redirect_script(stdin_path: Option<&str>, stdout_path: Option<&str>) -> String {
    let mut script = String::new();
    if let Some(p) = stdin_path {
        script.push_str(&format!("exec 0<{}; ", shell_quote(p)));
    }
    if let Some(p) = stdout_path {
        script.push_str(&format!("exec 1>{}; ", shell_quote(p)));
    }
    script.push_str("exec \"$@\"");
    script
}

/// Duplicate a tracked slave fd into a `Stdio` the child process can own,
/// leaving the tracker's original handle (and its eventual close) intact
/// so the parent's copy can be dropped right after spawning.
fn dup_stdio(file: &File) -> Result<Stdio, std::io::Error> {
    let owned: OwnedFd = file.try_clone()?.into();
    Ok(Stdio::from(owned))
}

/// Detach a PTY master from its synchronous tracking entry and re-track
/// the async file it becomes, so the tracker's bookkeeping follows the
/// handle across the sync-to-async handoff instead of going stale.
fn retrack_master_as_async(
    fd_tracker: &FdTracker,
    owner: &str,
    master: TrackedHandle<File>,
) -> TrackedHandle<tokio::fs::File> {
    let std_file = master.into_inner();
    fd_tracker.track(owner, "pty-master-async", tokio::fs::File::from_std(std_file))
}

/// Spawn `cfg`'s command, wiring up stdin/stdout/stderr per §4.6's spawn
/// procedure, and return the parent-side handles to whatever it owns.
pub async fn spawn(
    owner: &str,
    cfg: &ServiceConfig,
    inherited_env: &HashMap<String, String>,
    fd_tracker: &FdTracker,
) -> Result<SpawnedChild, SpawnError> {
    let argv = cfg.tokenize()?;
    let env = cfg.build_env(inherited_env);

    let (stderr_master, stderr_slave) = fd_tracker.openpty(owner)?;
    set_nonblocking(stderr_master.get()).map_err(SpawnError::SetNonBlocking)?;
    let stderr_stdio = dup_stdio(stderr_slave.get())?;
    drop(stderr_slave); // parent's copy; the child keeps its own dup from dup_stdio

    let (stdout_master, stdout_stdio) = if cfg.stdout.is_none() {
        let (master, slave) = fd_tracker.openpty(owner)?;
        set_nonblocking(master.get()).map_err(SpawnError::SetNonBlocking)?;
        let stdio = dup_stdio(slave.get())?;
        drop(slave);
        (Some(master), stdio)
    } else {
        (None, Stdio::null())
    };

    let stdin_stdio = if cfg.stdin.is_none() {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    // Per §4.6: a plain launch (no named-pipe/file stream to open pre-exec)
    // execs the command directly, so a missing executable surfaces as a
    // normal `ErrorKind::NotFound` from `spawn()` rather than as an opaque
    // shell exit code. Only when stdin/stdout need pre-exec redirection do
    // we route through the shell shim that performs it.
    let mut command = if cfg.stdin.is_none() && cfg.stdout.is_none() {
        let (program, rest) = argv.split_first().ok_or(SpawnError::EmptyCommand)?;
        let mut command = Command::new(program);
        command.args(rest);
        command
    } else {
        let script = build_redirect_script(cfg.stdin.as_deref(), cfg.stdout.as_deref());
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(script).arg("--").args(&argv);
        command
    };
    command
        .envs(&env)
        .stdin(stdin_stdio)
        .stdout(stdout_stdio)
        .stderr(stderr_stdio)
        .kill_on_drop(false);
    if let Some(cwd) = &cfg.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn()?;
    let pid = child.id().expect("freshly spawned child always has a pid");
    let stdin = child.stdin.take();

    let stdout_master = stdout_master.map(|m| retrack_master_as_async(fd_tracker, owner, m));
    let stderr_master = retrack_master_as_async(fd_tracker, owner, stderr_master);

    Ok(SpawnedChild {
        child,
        pid,
        stdin,
        stdout_master,
        stderr_master,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_script_with_no_paths_just_execs() {
        assert_eq!(build_redirect_script(None, None), "exec \"$@\"");
    }

    #[test]
    fn redirect_script_handles_stdin_path() {
        assert_eq!(
            build_redirect_script(Some("/tmp/fifo"), None),
            "exec 0</tmp/fifo; exec \"$@\""
        );
    }

    #[test]
    fn redirect_script_handles_both_paths() {
        assert_eq!(
            build_redirect_script(Some("/tmp/in"), Some("/tmp/out")),
            "exec 0</tmp/in; exec 1>/tmp/out; exec \"$@\""
        );
    }

    #[test]
    fn shell_quote_escapes_embedded_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[tokio::test]
    async fn spawn_plain_command_wires_pty_stdout_and_stderr() {
        let tracker = FdTracker::new();
        let cfg = ServiceConfig {
            command: "/bin/echo hello".to_string(),
            ..ServiceConfig::named("echo")
        };
        let mut spawned = spawn("echo", &cfg, &HashMap::new(), &tracker).await.unwrap();
        assert!(spawned.stdout_master.is_some());
        assert!(spawned.stdin.is_some());
        let status = spawned.child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn spawn_with_stdout_path_skips_pty_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");
        let tracker = FdTracker::new();
        let cfg = ServiceConfig {
            command: "/bin/echo redirected".to_string(),
            stdout: Some(out_path.to_str().unwrap().to_string()),
            ..ServiceConfig::named("echo")
        };
        let mut spawned = spawn("echo", &cfg, &HashMap::new(), &tracker).await.unwrap();
        assert!(spawned.stdout_master.is_none());
        let status = spawned.child.wait().await.unwrap();
        assert!(status.success());
        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(contents.trim(), "redirected");
    }

    #[tokio::test]
    async fn missing_executable_surfaces_as_not_found() {
        let tracker = FdTracker::new();
        let cfg = ServiceConfig {
            command: "does-not-exist-anywhere".to_string(),
            ..ServiceConfig::named("ghost")
        };
        let err = spawn("ghost", &cfg, &HashMap::new(), &tracker).await.unwrap_err();
        match err {
            SpawnError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io(NotFound), got {other:?}"),
        }
    }
}
