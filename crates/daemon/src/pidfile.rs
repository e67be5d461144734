// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID file lifecycle: write it on startup, read it for the bootstrap CLI's
//! `stop`/`status` subcommands, and recognize (and clean up) a stale one
//! left behind by a supervisor that didn't exit cleanly.

use std::path::{Path, PathBuf};

use nix::sys::signal::kill;
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("failed to read pid file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("pid file {0} does not contain a valid decimal pid")]
    Malformed(PathBuf),
}

/// Write `pid` as a decimal number followed by a newline, per the on-disk
/// format this system's PID files have always used.
pub fn write(path: &Path, pid: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{pid}\n"))
}

pub fn remove(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn read(path: &Path) -> Result<u32, PidFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| PidFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    text.trim()
        .parse()
        .map_err(|_| PidFileError::Malformed(path.to_path_buf()))
}

/// `true` if `pid` names a process that signal 0 can still reach.
fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Read the PID file at `path` and, if it names a live process, return that
/// PID. A file naming a dead process is treated as stale: it is deleted and
/// `Ok(None)` is returned, the same as an absent file.
pub fn read_live(path: &Path) -> Result<Option<u32>, PidFileError> {
    if !path.exists() {
        return Ok(None);
    }
    let pid = read(path)?;
    if is_alive(pid) {
        Ok(Some(pid))
    } else {
        let _ = remove(path);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_live_round_trips_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pid.txt");
        let own_pid = std::process::id();
        write(&path, own_pid).unwrap();
        assert_eq!(read_live(&path).unwrap(), Some(own_pid));
    }

    #[test]
    fn stale_pid_file_is_deleted_and_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pid.txt");
        // PID 1 is init and will never be owned by us, but an unused high
        // PID is more reliably dead in a sandboxed test environment.
        write(&path, 999_999).unwrap();
        assert_eq!(read_live(&path).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.txt");
        assert_eq!(read_live(&path).unwrap(), None);
    }
}
