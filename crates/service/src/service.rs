// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-service state machine: spawn, stream wire-up, stop, reap,
//! restart, and stdin injection.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;

use raptor_bus::Bus;
use raptor_core::{LogLine, RaptorError, ServiceState, StatusRecord, StreamTag};
use raptor_fd::FdTracker;
use raptor_log::{LogWriter, SharedLogWriter};

use crate::config::ServiceConfig;
use crate::spawn::{self, SpawnError, SpawnedChild};
use crate::pump::{spawn_pump, PumpHandle};

/// How long to wait after `SIGTERM` before escalating to `SIGKILL`.
pub const STOP_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

struct ActiveChild {
    child: tokio::process::Child,
    pid: u32,
    stdin: Option<ChildStdin>,
    stdout_pump: Option<PumpHandle>,
    stderr_pump: Option<PumpHandle>,
    log_writer: SharedLogWriter,
    stop_requested: bool,
}

struct Inner {
    config: ServiceConfig,
    status: StatusRecord,
    active: Option<ActiveChild>,
    pending_restart: bool,
}

/// A single named service under supervision.
pub struct Service {
    name: String,
    log_dir: PathBuf,
    fd_tracker: FdTracker,
    bus: Bus<LogLine>,
    inner: Mutex<Inner>,
}

impl Service {
    pub fn new(name: impl Into<String>, config: ServiceConfig, log_dir: PathBuf, fd_tracker: FdTracker, bus: Bus<LogLine>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            log_dir,
            fd_tracker,
            bus,
            inner: Mutex::new(Inner {
                config,
                status: StatusRecord::not_started(),
                active: None,
                pending_restart: false,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> StatusRecord {
        self.inner.lock().status.clone()
    }

    pub fn config(&self) -> ServiceConfig {
        self.inner.lock().config.clone()
    }

    pub fn set_config(&self, config: ServiceConfig) {
        self.inner.lock().config = config;
    }

    /// Build the topic a line from this service publishes under:
    /// `service.<name>.<tag>`.
    fn topic(&self, tag: StreamTag) -> String {
        format!("service.{}.{}", self.name, tag.as_str())
    }

    fn publish_event(&self, writer: &SharedLogWriter, text: impl Into<String>) {
        let line = LogLine::new(
            raptor_core::time_fmt::format_iso8601_utc(chrono::Utc::now()),
            self.name.clone(),
            StreamTag::Evt,
            raptor_core::LineClass::Newline,
            text,
        );
        writer.write_line(&line);
        self.bus.publish(&self.topic(StreamTag::Evt), line);
    }

    /// `start`: error unless the service is in a startable state.
    pub async fn start(self: &Arc<Self>, env: &HashMap<String, String>) -> Result<(), RaptorError> {
        {
            let inner = self.inner.lock();
            if !inner.status.status.is_startable() {
                return Err(RaptorError::service_already_active(self.name.clone()));
            }
        }
        self.inner.lock().status = StatusRecord::starting();

        let config = self.config();
        let log_writer = SharedLogWriter::new(config.log.as_ref().and_then(|tmpl| self.open_log(tmpl).ok()));

        match spawn::spawn(&self.name, &config, env, &self.fd_tracker).await {
            Ok(spawned) => {
                self.on_spawned(spawned, log_writer);
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.lock();
                inner.status = StatusRecord::startup_failed(1);
                drop(inner);
                let hint = matches!(&e, SpawnError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
                if hint {
                    tracing::warn!(service = %self.name, "exec failed: executable not found on PATH");
                } else {
                    tracing::warn!(service = %self.name, error = %e, "failed to start service");
                }
                Ok(())
            }
        }
    }

    fn open_log(&self, template_str: &str) -> Result<LogWriter, raptor_log::LogWriterError> {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), self.name.clone());
        let full_template = self.log_dir.join(template_str);
        LogWriter::open_from_template(full_template.to_str().unwrap_or(template_str), &vars, chrono::Utc::now())
    }

    fn on_spawned(self: &Arc<Self>, spawned: SpawnedChild, log_writer: SharedLogWriter) {
        let mut inner = self.inner.lock();

        let stdout_pump = spawned.stdout_master.map(|master| {
            let reader = master.into_inner();
            spawn_pump(self.name.clone(), StreamTag::Out, reader, log_writer.clone(), self.bus.clone())
        });
        let stderr_reader = spawned.stderr_master.into_inner();
        let stderr_pump = Some(spawn_pump(
            self.name.clone(),
            StreamTag::Err,
            stderr_reader,
            log_writer.clone(),
            self.bus.clone(),
        ));

        inner.status = StatusRecord::running(spawned.pid);
        inner.active = Some(ActiveChild {
            child: spawned.child,
            pid: spawned.pid,
            stdin: spawned.stdin,
            stdout_pump,
            stderr_pump,
            log_writer: log_writer.clone(),
            stop_requested: false,
        });
        self.publish_event(&log_writer, format!("started pid={}", spawned.pid));
    }

    /// `stop`: error unless active. Sends `SIGTERM`, then after
    /// [`STOP_GRACE`] escalates to `SIGKILL` if the child is still alive.
    pub async fn stop(self: &Arc<Self>) -> Result<(), RaptorError> {
        {
            let mut inner = self.inner.lock();
            if !inner.status.status.is_active() {
                return Err(RaptorError::service_not_active(self.name.clone()));
            }
            let already_stopping = inner
                .active
                .as_ref()
                .map(|a| a.stop_requested)
                .unwrap_or(false);
            if already_stopping {
                return Ok(());
            }
            let pid = inner.active.as_ref().map(|a| a.pid);
            inner.status = StatusRecord::stopping(pid);
            if let Some(active) = &mut inner.active {
                active.stop_requested = true;
            }
            let writer = inner
                .active
                .as_ref()
                .map(|a| a.log_writer.clone())
                .unwrap_or_else(SharedLogWriter::none);
            self.publish_event(&writer, "stopping");
        }

        let pid = self.inner.lock().active.as_ref().map(|a| a.pid);
        if let Some(pid) = pid {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            let this = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(STOP_GRACE).await;
                if this.inner.lock().active.is_some() {
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
            });
        }
        Ok(())
    }

    /// `restart`: pending-restart + `stop` if active, plain `start` otherwise.
    pub async fn restart(self: &Arc<Self>, env: &HashMap<String, String>) -> Result<(), RaptorError> {
        let is_active = self.inner.lock().status.status.is_active();
        if is_active {
            self.inner.lock().pending_restart = true;
            self.stop().await
        } else {
            self.start(env).await
        }
    }

    /// Write `text` to the child's stdin, if the parent owns that end.
    pub async fn stdin(&self, text: &str) -> Result<(), RaptorError> {
        let has_stdin = {
            let inner = self.inner.lock();
            if !inner.status.status.is_active() {
                return Err(RaptorError::service_not_active(self.name.clone()));
            }
            inner.active.as_ref().map(|a| a.stdin.is_some()).unwrap_or(false)
        };
        if !has_stdin {
            return Ok(());
        }
        // Briefly take the handle out to await the write without holding
        // the sync mutex across an await point.
        let mut stdin = {
            let mut inner = self.inner.lock();
            inner.active.as_mut().and_then(|a| a.stdin.take())
        };
        if let Some(writer) = stdin.as_mut() {
            let _ = writer.write_all(text.as_bytes()).await;
            let _ = writer.flush().await;
        }
        let mut inner = self.inner.lock();
        if let Some(active) = inner.active.as_mut() {
            active.stdin = stdin;
        }
        let log_writer = inner
            .active
            .as_ref()
            .map(|a| a.log_writer.clone())
            .unwrap_or_else(SharedLogWriter::none);
        drop(inner);

        let line = LogLine::new(
            raptor_core::time_fmt::format_iso8601_utc(chrono::Utc::now()),
            self.name.clone(),
            StreamTag::Inp,
            raptor_core::LineClass::Newline,
            text,
        );
        log_writer.write_line(&line);
        self.bus.publish(&self.topic(StreamTag::Inp), line);
        Ok(())
    }

    /// Non-blockingly check whether the child has exited; if so, classify
    /// the exit, run post-exit cleanup, and — if a restart was pending —
    /// re-enter `start`. Returns `true` if a reap happened this call.
    pub async fn try_reap(self: &Arc<Self>, env: &HashMap<String, String>) -> bool {
        let exit_status = {
            let mut inner = self.inner.lock();
            match inner.active.as_mut() {
                Some(active) => match active.child.try_wait() {
                    Ok(Some(status)) => Some(status),
                    _ => None,
                },
                None => None,
            }
        };
        let Some(status) = exit_status else {
            return false;
        };

        let raw = raw_exit_code(&status);
        let active = self.inner.lock().active.take();
        let mut writer = SharedLogWriter::none();
        if let Some(mut active) = active {
            writer = active.log_writer.clone();
            if let Some(pump) = active.stdout_pump.take() {
                pump.stop().await;
            }
            if let Some(pump) = active.stderr_pump.take() {
                pump.stop().await;
            }
            active.stdin = None;
        }

        let mut inner = self.inner.lock();
        inner.status = StatusRecord::from_exit_code(raw);
        self.publish_event(&writer, format!("exited rc={raw}"));

        let pending = inner.pending_restart;
        inner.pending_restart = false;
        drop(inner);

        if pending {
            let _ = self.start(env).await;
        }
        true
    }
}

fn raw_exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => -status.signal().unwrap_or(0),
    }
}
