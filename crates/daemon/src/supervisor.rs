// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owns the service map, the topic bus, and the process's own lifecycle:
//! the reaper loop, the startup group, and orderly quit/shutdown/reboot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use nix::sys::signal::{kill, signal, SigHandler, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use raptor_bus::{Bus, Subscriber};
use raptor_core::{LogLine, RaptorError, StatusRecord, StreamTag, Value};
use raptor_fd::FdTracker;
use raptor_log::{LogWriter, SharedLogWriter};
use raptor_service::{Service, ServiceConfig};

use crate::config::{Config, ConfigError};

/// How often the reaper polls every live child for exit.
pub const REAPER_TICK: std::time::Duration = std::time::Duration::from_millis(100);
/// How long `quit` waits before acting, so its RPC reply can be delivered.
pub const PRE_QUIT_DELAY: std::time::Duration = std::time::Duration::from_millis(50);
/// Per-subscriber queue depth, per the config's default fan-out policy.
pub const SUBSCRIBER_QUEUE_LEN: usize = 2048;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum QuitMode {
    Quit,
    Reboot,
}

struct QuitState {
    mode: QuitMode,
    shutdown_cmd: Option<String>,
    finalized: bool,
}

/// The supervisor: all services, the bus they publish to, and this
/// process's own name, log writer, and shutdown machinery.
pub struct Supervisor {
    name: String,
    bus: Bus<LogLine>,
    fd_tracker: FdTracker,
    services: Mutex<IndexMap<String, Arc<Service>>>,
    config: Mutex<Config>,
    config_path: Mutex<Option<PathBuf>>,
    log_writer: SharedLogWriter,
    inherited_env: HashMap<String, String>,
    quitting: AtomicBool,
    quit_state: Mutex<Option<QuitState>>,
    subscriptions: Mutex<HashMap<u64, oneshot::Sender<()>>>,
    pub pid_file: PathBuf,
}

impl Supervisor {
    pub fn new(
        name: impl Into<String>,
        config: Config,
        config_path: Option<PathBuf>,
        foreground: bool,
    ) -> Arc<Self> {
        let name = name.into();
        let pid_file = config.log_dir.join(&config.pid_file);
        let log_writer = SharedLogWriter::new(open_supervisor_log(&name, &config));
        if foreground {
            if let Some(path) = log_writer.path() {
                tracing::info!(path = %path.display(), "supervisor log also attached to stderr (foreground mode)");
            }
        }

        let sup = Arc::new(Self {
            name,
            bus: Bus::new(),
            fd_tracker: FdTracker::new(),
            services: Mutex::new(IndexMap::new()),
            config: Mutex::new(config),
            config_path: Mutex::new(config_path),
            log_writer,
            inherited_env: std::env::vars().collect(),
            quitting: AtomicBool::new(false),
            quit_state: Mutex::new(None),
            subscriptions: Mutex::new(HashMap::new()),
            pid_file,
        });
        sup.sync_services_from_config();
        sup
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> Bus<LogLine> {
        self.bus.clone()
    }

    pub fn fd_tracker(&self) -> &FdTracker {
        &self.fd_tracker
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }

    fn publish_event(&self, text: impl Into<String>) {
        let line = LogLine::new(
            raptor_core::time_fmt::format_iso8601_utc(chrono::Utc::now()),
            self.name.clone(),
            StreamTag::Evt,
            raptor_core::LineClass::Newline,
            text,
        );
        self.log_writer.write_line(&line);
        self.bus.publish(&format!("{}.evt", self.name), line);
    }

    /// Reconcile the service map against the current config: add any newly
    /// configured service, push updated config into any that already
    /// exist. Services removed from config are left in place (per §9,
    /// removing a service requires a supervisor restart).
    fn sync_services_from_config(self: &Arc<Self>) {
        let config = self.config.lock();
        let log_dir = config.log_dir.clone();
        let mut services = self.services.lock();
        for (name, cfg) in &config.services {
            if let Some(existing) = services.get(name) {
                existing.set_config(cfg.clone());
            } else {
                services.insert(
                    name.clone(),
                    Service::new(name.clone(), cfg.clone(), log_dir.clone(), self.fd_tracker.clone(), self.bus.clone()),
                );
            }
        }
    }

    fn service(&self, name: &str) -> Result<Arc<Service>, RaptorError> {
        self.services
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RaptorError::unknown_service(name))
    }

    /// Start every service named in the `startup` group, in order, per §4.7.
    pub async fn run_startup_group(self: &Arc<Self>) {
        let names = self.config.lock().startup_group.clone();
        for name in names {
            match self.service(&name) {
                Ok(service) => {
                    if let Err(e) = service.start(&self.inherited_env).await {
                        tracing::warn!(service = %name, error = %e, "startup group: failed to start service");
                    }
                }
                Err(e) => tracing::warn!(service = %name, error = %e, "startup group: unknown service"),
            }
        }
    }

    pub async fn start(self: &Arc<Self>, name: &str) -> Result<(), RaptorError> {
        self.service(name)?.start(&self.inherited_env).await
    }

    pub async fn stop(self: &Arc<Self>, name: &str) -> Result<(), RaptorError> {
        self.service(name)?.stop().await
    }

    pub async fn restart(self: &Arc<Self>, name: &str) -> Result<(), RaptorError> {
        self.service(name)?.restart(&self.inherited_env).await
    }

    pub async fn stdin(self: &Arc<Self>, name: &str, text: &str) -> Result<(), RaptorError> {
        self.service(name)?.stdin(text).await
    }

    pub fn get_status(&self, name: &str) -> Result<StatusRecord, RaptorError> {
        Ok(self.service(name)?.status())
    }

    pub fn get_status_all(&self) -> IndexMap<String, StatusRecord> {
        self.services
            .lock()
            .iter()
            .map(|(name, service)| (name.clone(), service.status()))
            .collect()
    }

    pub fn get_service_config(&self, name: &str) -> Result<ServiceConfig, RaptorError> {
        Ok(self.service(name)?.config())
    }

    pub fn set_service_config(&self, name: &str, value: Value) -> Result<(), ConfigError> {
        let mut config = self.config.lock();
        config.set_path(&format!("SERVICES.{name}"), value)?;
        drop(config);
        self.sync_services_from_config_locked();
        Ok(())
    }

    pub fn update_service_config(&self, name: &str, value: Value) -> Result<(), ConfigError> {
        let mut config = self.config.lock();
        config.update_path(&format!("SERVICES.{name}"), value)?;
        drop(config);
        self.sync_services_from_config_locked();
        Ok(())
    }

    /// Non-`Arc` variant of [`sync_services_from_config`] for call sites
    /// that only hold `&self` (the RPC handlers never need to spawn a new
    /// `Arc<Self>` clone just to reconcile the map).
    fn sync_services_from_config_locked(&self) {
        let config = self.config.lock();
        let log_dir = config.log_dir.clone();
        let mut services = self.services.lock();
        for (name, cfg) in &config.services {
            if let Some(existing) = services.get(name) {
                existing.set_config(cfg.clone());
            } else {
                services.insert(
                    name.clone(),
                    Service::new(name.clone(), cfg.clone(), log_dir.clone(), self.fd_tracker.clone(), self.bus.clone()),
                );
            }
        }
    }

    pub fn get_config(&self, path: &str) -> Result<Value, RaptorError> {
        if path.is_empty() {
            return Ok(self.config.lock().raw().clone());
        }
        self.config.lock().get_path(path)
    }

    pub fn set_config(&self, path: &str, value: Value) -> Result<(), ConfigError> {
        self.config.lock().set_path(path, value)?;
        self.sync_services_from_config_locked();
        Ok(())
    }

    pub fn update_config(&self, path: &str, value: Value) -> Result<(), ConfigError> {
        self.config.lock().update_path(path, value)?;
        self.sync_services_from_config_locked();
        Ok(())
    }

    /// `loadConfig`: merge-load a document (from `path`, or the
    /// previously-loaded path if `path` is `None`) into the running config.
    pub fn load_config(&self, path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = match path {
            Some(p) => p,
            None => self
                .config_path
                .lock()
                .clone()
                .ok_or_else(|| ConfigError::Field(RaptorError::config_field_error("no config path to reload")))?,
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let json: serde_json::Value = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;
        self.config.lock().merge_load(Value::from(json))?;
        *self.config_path.lock() = Some(path);
        self.sync_services_from_config_locked();
        Ok(())
    }

    pub fn subscribe(&self, pattern: &str) -> Result<(u64, Subscriber<LogLine>, oneshot::Receiver<()>), glob::PatternError> {
        let subscriber = self.bus.subscribe(pattern, SUBSCRIBER_QUEUE_LEN)?;
        let id = subscriber.id();
        let (tx, rx) = oneshot::channel();
        self.subscriptions.lock().insert(id, tx);
        Ok((id, subscriber, rx))
    }

    /// Signal the streaming connection holding subscription `id` to end.
    /// Returns `true` if a live subscription was found.
    pub fn unsubscribe(&self, id: u64) -> bool {
        match self.subscriptions.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// `quit`: stop every active service, then (once the reaper confirms
    /// they're all gone) send this process `SIGTERM` with its default
    /// disposition restored.
    pub fn quit(self: &Arc<Self>) {
        self.begin_quit(QuitMode::Quit, None);
    }

    /// `shutdown(cmd)`: like `quit`, but execs `cmd` (a system shutdown
    /// command) instead of self-terminating once every service is down.
    pub fn shutdown(self: &Arc<Self>, cmd: Option<String>) {
        self.begin_quit(QuitMode::Quit, cmd);
    }

    /// `reboot`: like `shutdown`, but execs `reboot` if no command is given.
    pub fn reboot(self: &Arc<Self>) {
        self.begin_quit(QuitMode::Reboot, None);
    }

    fn begin_quit(self: &Arc<Self>, mode: QuitMode, shutdown_cmd: Option<String>) {
        if self.quitting.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.quit_state.lock() = Some(QuitState {
            mode,
            shutdown_cmd,
            finalized: false,
        });
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(PRE_QUIT_DELAY).await;
            this.publish_event("quitting");
            let names: Vec<String> = this.services.lock().keys().cloned().collect();
            for name in names {
                if let Ok(service) = this.service(&name) {
                    let _ = service.stop().await;
                }
            }
        });
    }

    /// Run the reaper forever: every [`REAPER_TICK`], poll every service
    /// for a live child that has exited, then check whether a pending quit
    /// has now drained every service.
    pub async fn run_reaper(self: Arc<Self>) {
        loop {
            tokio::time::sleep(REAPER_TICK).await;
            let services: Vec<Arc<Service>> = self.services.lock().values().cloned().collect();
            for service in services {
                service.try_reap(&self.inherited_env).await;
            }
            self.check_quit_complete().await;
        }
    }

    async fn check_quit_complete(self: &Arc<Self>) {
        if !self.quitting.load(Ordering::SeqCst) {
            return;
        }
        let all_inactive = self.services.lock().values().all(|s| !s.status().status.is_active());
        if !all_inactive {
            return;
        }
        let Some(mut state) = self.quit_state.lock().take() else {
            return;
        };
        if state.finalized {
            return;
        }
        state.finalized = true;
        self.publish_event("all services stopped, exiting");

        match (state.mode, state.shutdown_cmd) {
            (QuitMode::Reboot, cmd) => self.exec_or_self_kill(cmd.as_deref().unwrap_or("reboot")),
            (QuitMode::Quit, Some(cmd)) => self.exec_or_self_kill(&cmd),
            (QuitMode::Quit, None) => self.self_kill(),
        }
    }

    fn exec_or_self_kill(&self, cmd: &str) {
        let Some(argv) = shlex::split(cmd) else {
            tracing::warn!(cmd, "shutdown command could not be tokenized, falling back to self-exit");
            self.self_kill();
            return;
        };
        let Some((program, rest)) = argv.split_first() else {
            self.self_kill();
            return;
        };
        let err = std::process::Command::new(program).args(rest).exec_replace();
        tracing::error!(error = %err, cmd, "failed to exec shutdown command, falling back to self-exit");
        self.self_kill();
    }

    /// Restore `SIGTERM`'s default disposition and send it to ourselves —
    /// a hard exit, because a cooperative scheduler's plain process-exit
    /// path may never actually be reached from inside a signal-driven
    /// shutdown sequence.
    fn self_kill(&self) {
        // SAFETY: SigDfl is a valid, well-known handler value.
        #[allow(unsafe_code)]
        let _ = unsafe { signal(Signal::SIGTERM, SigHandler::SigDfl) };
        let _ = kill(Pid::this(), Signal::SIGTERM);
    }
}

/// `std::process::Command::exec`, emulated via `nix::unistd::execvp` so the
/// call site can fall back to a log-and-self-kill instead of aborting the
/// process outright (`std::process::Command` doesn't expose `exec` on this
/// platform the way a Unix-only crate would).
trait ExecReplace {
    fn exec_replace(&mut self) -> std::io::Error;
}

impl ExecReplace for std::process::Command {
    fn exec_replace(&mut self) -> std::io::Error {
        use std::ffi::CString;
        let program = match CString::new(self.get_program().to_string_lossy().as_bytes()) {
            Ok(c) => c,
            Err(e) => return std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        };
        let mut argv: Vec<CString> = vec![program.clone()];
        for arg in self.get_args() {
            match CString::new(arg.to_string_lossy().as_bytes()) {
                Ok(c) => argv.push(c),
                Err(e) => return std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            }
        }
        match nix::unistd::execvp(&program, &argv) {
            Ok(_) => unreachable!("execvp only returns on error"),
            Err(errno) => std::io::Error::from_raw_os_error(errno as i32),
        }
    }
}

fn open_supervisor_log(name: &str, config: &Config) -> Option<LogWriter> {
    let mut vars = HashMap::new();
    vars.insert("name".to_string(), name.to_string());
    let template_path = config.log_dir.join(&config.log_file);
    match LogWriter::open_from_template(
        template_path.to_str().unwrap_or(&config.log_file),
        &vars,
        chrono::Utc::now(),
    ) {
        Ok(writer) => Some(writer),
        Err(e) => {
            tracing::warn!(error = %e, "failed to open supervisor log file, continuing without one");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn config_with_sleep(dir: &Path) -> Config {
        Config::from_value(Value::from(json!({
            "LOG_DIR": dir.to_str().unwrap(),
            "PORTS": "/tmp/ports.json",
            "SERVICES": {"sleep": {"command": "/bin/sleep 10000", "log": null}},
            "GROUPS": {"startup": ["sleep"]},
        })))
        .unwrap()
    }

    #[tokio::test]
    async fn start_stop_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Supervisor::new("test", config_with_sleep(dir.path()), None, true);
        sup.start("sleep").await.unwrap();
        let status = sup.get_status("sleep").unwrap();
        assert_eq!(status.status, raptor_core::ServiceState::Running);

        sup.stop("sleep").await.unwrap();
        let status = sup.get_status("sleep").unwrap();
        assert_eq!(status.status, raptor_core::ServiceState::Stopping);
    }

    #[tokio::test]
    async fn unknown_service_errors() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Supervisor::new("test", config_with_sleep(dir.path()), None, true);
        let err = sup.start("ghost").await.unwrap_err();
        assert!(matches!(err, RaptorError::UnknownService { .. }));
    }

    #[tokio::test]
    async fn set_service_config_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Supervisor::new("test", config_with_sleep(dir.path()), None, true);
        sup.set_service_config(
            "sleep",
            Value::from(json!({"command": "/bin/sleep 5", "log": null})),
        )
        .unwrap();
        assert_eq!(sup.get_service_config("sleep").unwrap().command, "/bin/sleep 5");
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_signals_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Supervisor::new("test", config_with_sleep(dir.path()), None, true);
        let (id, _subscriber, mut cancel_rx) = sup.subscribe("*").unwrap();
        assert!(sup.unsubscribe(id));
        cancel_rx.try_recv().unwrap();
    }

    #[tokio::test]
    async fn quit_stops_all_and_marks_quitting() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Supervisor::new("test", config_with_sleep(dir.path()), None, true);
        sup.start("sleep").await.unwrap();
        sup.quit();
        assert!(sup.is_quitting());
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let status = sup.get_status("sleep").unwrap();
        assert!(status.status.is_active() || status.status == raptor_core::ServiceState::Aborted);
    }
}
