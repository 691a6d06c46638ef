// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON-over-Unix-socket wire protocol for the control
//! surface (§4.6, §5.5): `reconcile`, `retry`, `delete`, `set_priority`,
//! `reactive_requeue`, `list`, `count_by_state`, `get`, `get_health`,
//! `shutdown`, plus a `Ping`/`Hello` handshake pair. Deliberately minimal —
//! no HTTP, no WebSocket, no auth — this exists only so those operations are
//! reachable from outside the process.

use scriv_core::job::{HealthStatus, Job, JobState, Priority};
use scriv_engine::ReconciliationReport;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request sent by the `scriv` CLI (or any other control-surface client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Liveness check.
    Ping,
    /// Version handshake.
    Hello { version: String },
    /// §4.4 on-demand reconciliation.
    Reconcile,
    /// §4.6 `retry(id)`.
    Retry { id: String },
    /// §4.6 `delete(id)`.
    Delete { id: String },
    /// §4.6 `set_priority(id, p)`.
    SetPriority { id: String, priority: Priority },
    /// §4.6 `reactive_requeue(id)`.
    ReactiveRequeue { id: String },
    /// §4.1 `list`, paginated, optionally filtered by state.
    List {
        state: Option<JobState>,
        offset: usize,
        limit: usize,
    },
    /// §4.1 `count_by_state`.
    CountByState,
    /// §4.1 `get`.
    Get { id: String },
    /// §4.6 `health_status(id)`.
    GetHealth { id: String },
    /// §4.7 graceful shutdown.
    Shutdown,
}

/// A response to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Hello { version: String },
    Ok,
    Error { message: String },
    Reconciled { report: ReconciliationReport },
    Job { job: Option<Job> },
    Jobs { jobs: Vec<Job> },
    CountByState { counts: Vec<(JobState, usize)> },
    Health { status: Option<HealthStatus> },
    ShuttingDown,
}

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,
}

/// Maximum message size (200 MB).
pub const MAX_MESSAGE_SIZE: usize = 200 * 1024 * 1024;

/// Default IPC timeout.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Protocol version, from the crate's own build metadata.
pub const PROTOCOL_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("CARGO_PKG_NAME"));

/// Encode a message to JSON bytes (without the length prefix). Use with
/// [`write_message`], which handles the wire framing.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: json.len(), max: MAX_MESSAGE_SIZE });
    }
    Ok(json)
}

/// Decode a message from wire format.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read a length-prefixed message from an async reader.
pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
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

/// Write a length-prefixed message to an async writer.
pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request with a timeout.
pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes =
        tokio::time::timeout(timeout, read_message(reader)).await.map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Write a response with a timeout.
pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data)).await.map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
