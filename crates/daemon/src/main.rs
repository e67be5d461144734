// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `raptord` bootstrap CLI: parses `--config`/`--foreground`/`--no-fork`/
//! `--name` plus a `start`/`stop`/`restart`/`status` subcommand, and either
//! launches a new supervisor or talks to an already-running one over its
//! RPC socket.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::UnixStream;

use raptor_daemon::protocol::{self, Request, Response};
use raptor_daemon::supervisor::Supervisor;
use raptor_daemon::{daemonize, listener, pidfile, ports, Config};

#[derive(Parser, Debug)]
#[command(name = "raptord", about = "Process supervisor daemon")]
struct Cli {
    /// Path to the JSON configuration document.
    #[arg(long, default_value = "/etc/pyraptord/config.json")]
    config: PathBuf,

    /// Stay attached to the terminal instead of double-forking.
    #[arg(long)]
    foreground: bool,

    /// Alias for `--foreground` (kept for operators used to the original
    /// flag name).
    #[arg(long)]
    no_fork: bool,

    /// This supervisor instance's name: determines its ports-file entry,
    /// its `pyraptord.evt`-style topic prefix, and its PID file.
    #[arg(long, default_value = "pyraptord")]
    name: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Start the supervisor (refuses if a live PID file already exists).
    Start,
    /// Stop a running supervisor (`quit` over RPC, falling back to signals).
    Stop,
    /// Stop then start.
    Restart,
    /// Print every service's status as JSON.
    Status,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RAPTORD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.action {
        Action::Start => run_start(&cli),
        Action::Stop => exit_code(run_client_action(&cli, Request::Quit)),
        Action::Restart => {
            if !run_client_action(&cli, Request::Quit) {
                return std::process::ExitCode::FAILURE;
            }
            run_start(&cli)
        }
        Action::Status => exit_code(run_client_action(&cli, Request::GetStatusAll)),
    }
}

fn exit_code(success: bool) -> std::process::ExitCode {
    if success {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::FAILURE
    }
}

fn run_start(cli: &Cli) -> std::process::ExitCode {
    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return std::process::ExitCode::FAILURE;
        }
    };

    let pid_file = config.log_dir.join(&config.pid_file);
    match pidfile::read_live(&pid_file) {
        Ok(Some(pid)) => {
            tracing::error!(pid, path = %pid_file.display(), "supervisor already running");
            return std::process::ExitCode::FAILURE;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "failed to inspect pid file");
            return std::process::ExitCode::FAILURE;
        }
    }

    let foreground = cli.foreground || cli.no_fork;
    if !foreground {
        let log_path = config.log_dir.join(format!("{}_daemonize.log", cli.name));
        if let Err(e) = daemonize::daemonize(&log_path) {
            tracing::error!(error = %e, "daemonization failed");
            return std::process::ExitCode::FAILURE;
        }
    }

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return std::process::ExitCode::FAILURE;
        }
    };
    rt.block_on(run_supervisor(cli, config, foreground))
}

async fn run_supervisor(cli: &Cli, config: Config, foreground: bool) -> std::process::ExitCode {
    let socket_path = match &config.ports {
        Some(ports_path) => match ports::resolve_rpc_socket(ports_path, &cli.name) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to resolve rpc socket");
                return std::process::ExitCode::FAILURE;
            }
        },
        None => {
            tracing::error!("config has no PORTS entry");
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Err(e) = pidfile::write(&config.log_dir.join(&config.pid_file), std::process::id()) {
        tracing::error!(error = %e, "failed to write pid file");
        return std::process::ExitCode::FAILURE;
    }

    let supervisor = Supervisor::new(cli.name.clone(), config, Some(cli.config.clone()), foreground);
    install_signal_handlers(&supervisor);

    supervisor.run_startup_group().await;
    tokio::spawn(Supervisor::run_reaper(std::sync::Arc::clone(&supervisor)));

    let pid_file = supervisor.pid_file.clone();
    let result = listener::serve(&socket_path, supervisor).await;
    let _ = pidfile::remove(&pid_file);
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "rpc listener exited");
            std::process::ExitCode::FAILURE
        }
    }
}

fn install_signal_handlers(supervisor: &std::sync::Arc<Supervisor>) {
    for (kind, label) in [
        (tokio::signal::unix::SignalKind::terminate(), "SIGTERM"),
        (tokio::signal::unix::SignalKind::interrupt(), "SIGINT"),
        (tokio::signal::unix::SignalKind::hangup(), "SIGHUP"),
    ] {
        let sup = std::sync::Arc::clone(supervisor);
        match tokio::signal::unix::signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    tracing::info!(signal = label, "received signal, quitting");
                    sup.quit();
                });
            }
            Err(e) => tracing::warn!(signal = label, error = %e, "failed to install signal handler"),
        }
    }
}

/// Run a single RPC request against the supervisor named by `cli.name`,
/// print the response, and report whether it succeeded.
fn run_client_action(cli: &Cli, request: Request) -> bool {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(_) => return false,
    };
    rt.block_on(async move {
        let config = match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "failed to load config");
                return false;
            }
        };
        let socket_path = match &config.ports {
            Some(p) => match ports::resolve_rpc_socket(p, &cli.name) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, "failed to resolve rpc socket");
                    return false;
                }
            },
            None => return false,
        };

        let mut stream = match UnixStream::connect(&socket_path).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, path = %socket_path.display(), "failed to connect to supervisor");
                return false;
            }
        };

        let payload = match protocol::encode(&request) {
            Ok(p) => p,
            Err(_) => return false,
        };
        if protocol::write_message(&mut stream, &payload).await.is_err() {
            return false;
        }

        let response: Response = match tokio::time::timeout(Duration::from_secs(10), protocol::read_message(&mut stream))
            .await
        {
            Ok(Ok(bytes)) => match protocol::decode(&bytes) {
                Ok(r) => r,
                Err(_) => return false,
            },
            _ => return false,
        };

        match response {
            Response::Error { kind, message } => {
                eprintln!("{kind}: {message}");
                false
            }
            other => {
                if let Ok(json) = serde_json::to_string_pretty(&other) {
                    println!("{json}");
                }
                true
            }
        }
    })
}

