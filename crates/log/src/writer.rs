// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opens a fresh log file from a `${unique}` template and keeps `_latest`
//! and `_previous` symlinks pointing at the newest and next-newest file,
//! the way every long-running service's log directory in this system is
//! laid out.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use raptor_core::LogLine;

use crate::template::{expand, expand_with_unique_literal};

#[derive(Debug, Error)]
pub enum LogWriterError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("refusing to replace non-symlink at {0}")]
    NotASymlink(PathBuf),
}

/// Point `link` at `target`, atomically replacing an existing symlink.
///
/// A non-symlink already sitting at `link` is left alone and reported as
/// an error: something else put a real file there, and silently deleting
/// it would destroy whatever that was.
pub fn force_symlink(target: &Path, link: &Path) -> Result<(), LogWriterError> {
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let tmp = link.with_extension("symlink-tmp");
            std::os::unix::fs::symlink(target, &tmp).map_err(|e| LogWriterError::Io {
                path: tmp.clone(),
                source: e,
            })?;
            std::fs::rename(&tmp, link).map_err(|e| LogWriterError::Io {
                path: link.to_path_buf(),
                source: e,
            })
        }
        Ok(_) => Err(LogWriterError::NotASymlink(link.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            std::os::unix::fs::symlink(target, link).map_err(|e| LogWriterError::Io {
                path: link.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(LogWriterError::Io {
            path: link.to_path_buf(),
            source: e,
        }),
    }
}

/// An open log file plus the bookkeeping needed to rotate the `_latest` /
/// `_previous` symlinks that sit alongside it.
pub struct LogWriter {
    file: File,
    path: PathBuf,
}

impl LogWriter {
    /// Expand `template` into a concrete path, open it for append, and
    /// rotate the `_latest`/`_previous` symlinks derived from the same
    /// template to point at it.
    pub fn open_from_template(
        template: &str,
        vars: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<Self, LogWriterError> {
        let path = PathBuf::from(expand(template, vars, now));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LogWriterError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let latest_path = PathBuf::from(expand_with_unique_literal(template, vars, "latest"));
        let previous_path = PathBuf::from(expand_with_unique_literal(template, vars, "previous"));

        // Rotate latest -> previous before the new file takes the latest slot.
        if let Ok(old_target) = std::fs::read_link(&latest_path) {
            force_symlink(&old_target, &previous_path)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogWriterError::Io {
                path: path.clone(),
                source: e,
            })?;

        force_symlink(&path, &latest_path)?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line and flush immediately — nothing in this system
    /// buffers log writes across calls, so a crash never loses output that
    /// was already handed to the writer.
    pub fn write_line(&mut self, line: &LogLine) -> io::Result<()> {
        writeln!(self.file, "{}", line.to_log_format())?;
        self.file.flush()
    }
}

/// A [`LogWriter`] shared across a service's stdout/stderr pumps, its event
/// logger, and its stdin echo — one file per service start, rather than
/// one per stream.
///
/// Cloning shares the same underlying writer (and the same "went bad"
/// state): once a write fails the handle is dropped for every clone, the
/// way a single `Option<LogWriter>` would behave if it were reachable from
/// more than one place at a time.
#[derive(Clone, Default)]
pub struct SharedLogWriter(std::sync::Arc<parking_lot::Mutex<Option<LogWriter>>>);

impl SharedLogWriter {
    pub fn new(writer: Option<LogWriter>) -> Self {
        Self(std::sync::Arc::new(parking_lot::Mutex::new(writer)))
    }

    pub fn none() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.0.lock().as_ref().map(|w| w.path().to_path_buf())
    }

    /// Write `line`, dropping the underlying file handle (for all clones)
    /// if the write fails so later calls don't keep retrying a broken fd.
    pub fn write_line(&self, line: &LogLine) {
        let mut guard = self.0.lock();
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writer.write_line(line) {
                tracing::warn!(error = %e, "failed to write log line, dropping file handler");
                *guard = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raptor_core::{LineClass, StreamTag};
    use tempfile::tempdir;

    fn line(text: &str) -> LogLine {
        LogLine::new("2026-01-30T08:14:09.000000Z", "svc", StreamTag::Out, LineClass::Newline, text)
    }

    #[test]
    fn opens_and_writes_autoflushed_line() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("svc_${unique}.txt");
        let now = Utc::now();
        let mut writer =
            LogWriter::open_from_template(template.to_str().unwrap(), &HashMap::new(), now).unwrap();
        writer.write_line(&line("hello")).unwrap();

        let contents = std::fs::read_to_string(writer.path()).unwrap();
        assert_eq!(contents, "2026-01-30T08:14:09.000000Z svc n hello\n");
    }

    #[test]
    fn latest_symlink_points_at_newest_file() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("svc_${unique}.txt");
        let now = Utc::now();
        let writer =
            LogWriter::open_from_template(template.to_str().unwrap(), &HashMap::new(), now).unwrap();

        let latest = dir.path().join("svc_latest.txt");
        let target = std::fs::read_link(&latest).unwrap();
        assert_eq!(target, writer.path());
    }

    #[test]
    fn second_open_rotates_latest_into_previous() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("svc_${unique}.txt");

        let first = LogWriter::open_from_template(
            template.to_str().unwrap(),
            &HashMap::new(),
            Utc::now(),
        )
        .unwrap();
        let first_path = first.path().to_path_buf();
        drop(first);

        let second = LogWriter::open_from_template(
            template.to_str().unwrap(),
            &HashMap::new(),
            Utc::now() + chrono::Duration::seconds(1),
        )
        .unwrap();

        let latest = dir.path().join("svc_latest.txt");
        let previous = dir.path().join("svc_previous.txt");
        assert_eq!(std::fs::read_link(&latest).unwrap(), second.path());
        assert_eq!(std::fs::read_link(&previous).unwrap(), first_path);
    }

    #[test]
    fn refuses_to_clobber_a_real_file_at_latest() {
        let dir = tempdir().unwrap();
        let latest = dir.path().join("svc_latest.txt");
        std::fs::write(&latest, "not a symlink").unwrap();

        let template = dir.path().join("svc_${unique}.txt");
        let err = LogWriter::open_from_template(template.to_str().unwrap(), &HashMap::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LogWriterError::NotASymlink(_)));
    }
}
