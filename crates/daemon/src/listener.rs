// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Unix-domain-socket RPC server: accepts connections, dispatches each
//! framed [`Request`] to the [`Supervisor`], and keeps a `subscribe`
//! connection open as a one-way stream of [`Response::Event`] messages
//! until the client disconnects or a matching `unsubscribe` cancels it.

use std::path::Path;
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};

use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT};
use crate::supervisor::Supervisor;

/// Bind `socket_path`, removing a stale socket file left behind by a prior
/// run, and serve connections until the process exits.
pub async fn serve(socket_path: &Path, supervisor: Arc<Supervisor>) -> std::io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "rpc listener bound");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, supervisor).await {
                tracing::debug!(error = %e, "rpc connection ended");
            }
        });
    }
}

async fn handle_connection(mut stream: UnixStream, supervisor: Arc<Supervisor>) -> Result<(), protocol::ProtocolError> {
    loop {
        let request = match protocol::read_request(&mut stream, DEFAULT_TIMEOUT).await {
            Ok(req) => req,
            Err(protocol::ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Request::Subscribe { pattern } = request {
            return stream_subscription(&mut stream, &supervisor, &pattern).await;
        }

        let response = dispatch(&supervisor, request).await;
        protocol::write_response(&mut stream, &response, DEFAULT_TIMEOUT).await?;
    }
}

/// Everything except `subscribe`, which needs to hold the connection open
/// past a single request/reply round trip.
async fn dispatch(supervisor: &Arc<Supervisor>, request: Request) -> Response {
    match request {
        Request::Start { name } => result_ok(supervisor.start(&name).await),
        Request::Stop { name } => result_ok(supervisor.stop(&name).await),
        Request::Restart { name } => result_ok(supervisor.restart(&name).await),
        Request::Stdin { name, text } => result_ok(supervisor.stdin(&name, &text).await),
        Request::GetStatus { name } => match supervisor.get_status(&name) {
            Ok(status) => Response::Status(status),
            Err(e) => e.into(),
        },
        Request::GetStatusAll => Response::StatusAll(supervisor.get_status_all()),
        Request::LoadConfig { path } => match supervisor.load_config(path.map(Into::into)) {
            Ok(()) => Response::Ok,
            Err(e) => config_err(e),
        },
        Request::Quit => {
            supervisor.quit();
            Response::Ok
        }
        Request::Shutdown { cmd } => {
            supervisor.shutdown(cmd);
            Response::Ok
        }
        Request::Reboot => {
            supervisor.reboot();
            Response::Ok
        }
        Request::GetConfig { path } => match supervisor.get_config(&path) {
            Ok(value) => Response::Config(value),
            Err(e) => e.into(),
        },
        Request::SetConfig { path, value } => match supervisor.set_config(&path, value) {
            Ok(()) => Response::Ok,
            Err(e) => config_err(e),
        },
        Request::UpdateConfig { path, value } => match supervisor.update_config(&path, value) {
            Ok(()) => Response::Ok,
            Err(e) => config_err(e),
        },
        Request::GetServiceConfig { name } => match supervisor.get_service_config(&name) {
            Ok(cfg) => Response::ServiceConfig(cfg),
            Err(e) => e.into(),
        },
        Request::SetServiceConfig { name, value } => match supervisor.set_service_config(&name, value) {
            Ok(()) => Response::Ok,
            Err(e) => config_err(e),
        },
        Request::UpdateServiceConfig { name, value } => match supervisor.update_service_config(&name, value) {
            Ok(()) => Response::Ok,
            Err(e) => config_err(e),
        },
        Request::Unsubscribe { id } => {
            supervisor.unsubscribe(id);
            Response::Ok
        }
        Request::Subscribe { .. } => unreachable!("handled by the caller before dispatch"),
    }
}

fn result_ok(result: Result<(), raptor_core::RaptorError>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(e) => e.into(),
    }
}

fn config_err(e: crate::config::ConfigError) -> Response {
    use crate::config::ConfigError;
    match e {
        ConfigError::Field(raptor_err) => raptor_err.into(),
        other => Response::Error {
            kind: "configError".to_string(),
            message: other.to_string(),
        },
    }
}

/// Serve a `subscribe` connection: push a [`Response::SubscribeAck`]
/// immediately, then every published line as a [`Response::Event`], until
/// the peer disconnects or `unsubscribe` fires the cancel channel.
async fn stream_subscription(
    stream: &mut UnixStream,
    supervisor: &Arc<Supervisor>,
    pattern: &str,
) -> Result<(), protocol::ProtocolError> {
    let (id, mut subscriber, mut cancel_rx) = match supervisor.subscribe(pattern) {
        Ok(parts) => parts,
        Err(e) => {
            return protocol::write_response(
                stream,
                &Response::Error {
                    kind: "badPattern".to_string(),
                    message: e.to_string(),
                },
                DEFAULT_TIMEOUT,
            )
            .await;
        }
    };

    protocol::write_response(stream, &Response::SubscribeAck { id }, DEFAULT_TIMEOUT).await?;

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel_rx => {
                let _ = protocol::write_response(stream, &Response::EndOfStream, DEFAULT_TIMEOUT).await;
                return Ok(());
            }
            line = subscriber.recv() => {
                match line {
                    Some(line) => protocol::write_response(stream, &Response::Event(line), DEFAULT_TIMEOUT).await?,
                    None => return Ok(()),
                }
            }
        }
    }
}
