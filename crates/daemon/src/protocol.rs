// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC request/response surface and its wire framing.
//!
//! Wire format: a 4-byte big-endian length prefix followed by a JSON
//! payload, the same framing this codebase uses for its other IPC
//! surfaces. `subscribe` is the one call that doesn't fit a strict
//! request/reply shape: the server keeps writing framed [`Response::Event`]
//! messages to the same connection until the client disconnects or a
//! matching `unsubscribe` arrives on another connection.

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use raptor_core::{LogLine, RaptorError, StatusRecord, Value};
use raptor_service::ServiceConfig;

/// Maximum message size accepted on the wire (200 MB).
pub const MAX_MESSAGE_SIZE: usize = 200 * 1024 * 1024;
/// Default per-request read/write timeout.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out waiting for message")]
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    Stdin { name: String, text: String },
    GetStatus { name: String },
    GetStatusAll,
    LoadConfig { path: Option<String> },
    Quit,
    Shutdown { cmd: Option<String> },
    Reboot,
    GetConfig { path: String },
    SetConfig { path: String, value: Value },
    UpdateConfig { path: String, value: Value },
    GetServiceConfig { name: String },
    SetServiceConfig { name: String, value: Value },
    UpdateServiceConfig { name: String, value: Value },
    Subscribe { pattern: String },
    Unsubscribe { id: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Status(StatusRecord),
    StatusAll(IndexMap<String, StatusRecord>),
    Config(Value),
    ServiceConfig(ServiceConfig),
    /// First message on a `subscribe` stream: the subscription id the
    /// caller will later pass to `unsubscribe`.
    SubscribeAck { id: u64 },
    /// Subsequent messages on a `subscribe` stream.
    Event(LogLine),
    /// The subscription ended (explicit `unsubscribe`, or server shutdown).
    EndOfStream,
    Error { kind: String, message: String },
}

impl From<RaptorError> for Response {
    fn from(e: RaptorError) -> Self {
        let kind = match &e {
            RaptorError::UnknownService { .. } => "unknownService",
            RaptorError::ServiceAlreadyActive { .. } => "serviceAlreadyActive",
            RaptorError::ServiceNotActive { .. } => "serviceNotActive",
            RaptorError::ConfigFieldError { .. } => "configFieldError",
        };
        Response::Error {
            kind: kind.to_string(),
            message: e.to_string(),
        }
    }
}

pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(ProtocolError::ConnectionClosed),
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}
