// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::daemon_process::{
    cleanup_stale_socket, daemon_dir, daemon_socket, probe_socket, read_startup_error,
    start_daemon_background, stop_daemon_sync, wrap_with_startup_error,
};

use scriv_core::job::{HealthStatus, Job, JobState, Priority};
use scriv_daemon::protocol::{self, ProtocolError};
use scriv_daemon::{Request, Response, PROTOCOL_VERSION};
use scriv_engine::ReconciliationReport;
use thiserror::Error;
use tokio::net::UnixStream;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// Timeout for IPC requests.
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("SCRIV_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for daemon to start.
pub fn timeout_connect() -> Duration {
    parse_duration_ms("SCRIV_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for the daemon process to exit.
pub fn timeout_exit() -> Duration {
    parse_duration_ms("SCRIV_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

/// Polling interval for connection retries.
pub fn poll_interval() -> Duration {
    parse_duration_ms("SCRIV_CONNECT_POLL_MS").unwrap_or(Duration::from_millis(50))
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running")]
    DaemonNotRunning,

    #[error("failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("connection timeout waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine state directory")]
    NoStateDir,
}

/// Daemon client — a thin Unix-socket wrapper around the control protocol.
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// For action commands: auto-start the daemon, restart at most once
    /// per process on a version mismatch. Used by commands that mutate
    /// queue state (`retry`, `delete`, `set-priority`, `requeue`,
    /// `reconcile`, `shutdown`).
    pub fn for_action() -> Result<Self, ClientError> {
        Self::connect_or_start_once()
    }

    /// For query commands: connect only, never restart. If the running
    /// daemon is the wrong version there is nothing useful to query
    /// anyway, so auto-restarting would only add latency.
    pub fn for_query() -> Result<Self, ClientError> {
        Self::connect()
    }

    fn connect_or_start_once() -> Result<Self, ClientError> {
        static RESTARTED: AtomicBool = AtomicBool::new(false);

        if RESTARTED.load(Ordering::SeqCst) {
            return Self::connect_or_start();
        }

        let daemon_dir = daemon_dir()?;
        let version_path = daemon_dir.join("daemon.version");
        if let Ok(daemon_version) = std::fs::read_to_string(&version_path) {
            if daemon_version.trim() != PROTOCOL_VERSION {
                RESTARTED.store(true, Ordering::SeqCst);
                eprintln!(
                    "warn: daemon version {} does not match cli version {}, restarting daemon",
                    daemon_version.trim(),
                    PROTOCOL_VERSION
                );
                stop_daemon_sync();
            }
        }

        Self::connect_or_start()
    }

    fn connect_or_start() -> Result<Self, ClientError> {
        match Self::connect() {
            Ok(client) => {
                if probe_socket(&client.socket_path) {
                    Ok(client)
                } else {
                    cleanup_stale_socket()?;
                    let child = start_daemon_background()?;
                    Self::connect_with_retry(timeout_connect(), child)
                }
            }
            Err(ClientError::DaemonNotRunning) => {
                let child = start_daemon_background()?;
                Self::connect_with_retry(timeout_connect(), child)
            }
            Err(e) => Err(wrap_with_startup_error(e)),
        }
    }

    /// Connect to an existing daemon (no auto-start).
    pub fn connect() -> Result<Self, ClientError> {
        let socket_path = daemon_socket()?;

        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }

        Ok(Self { socket_path })
    }

    fn connect_with_retry(timeout: Duration, mut child: std::process::Child) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let poll_start = Instant::now();
                    while poll_start.elapsed() < timeout_exit() {
                        if let Some(err) = read_startup_error() {
                            return Err(ClientError::DaemonStartFailed(err));
                        }
                        std::thread::sleep(poll_interval());
                    }
                    return Err(ClientError::DaemonStartFailed(format!("exited with {}", status)));
                }
                Ok(None) => {}
                Err(_) => {}
            }

            match Self::connect() {
                Ok(client) => return Ok(client),
                Err(ClientError::DaemonNotRunning) => std::thread::sleep(poll_interval()),
                Err(e) => return Err(wrap_with_startup_error(e)),
            }
        }

        Err(wrap_with_startup_error(ClientError::DaemonStartTimeout))
    }

    async fn send_with_timeout(
        &self,
        request: &Request,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(request)?;
        tokio::time::timeout(write_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes = tokio::time::timeout(read_timeout, protocol::read_message(&mut reader))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        Ok(protocol::decode(&response_bytes)?)
    }

    async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        self.send_with_timeout(request, timeout_ipc(), timeout_ipc()).await
    }

    fn reject<T>(resp: Response) -> Result<T, ClientError> {
        match resp {
            Response::Error { message } => Err(ClientError::Rejected(message)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Liveness check.
    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.send(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Self::reject(other),
        }
    }

    /// Version handshake.
    pub async fn hello(&self) -> Result<String, ClientError> {
        match self.send(&Request::Hello { version: PROTOCOL_VERSION.to_string() }).await? {
            Response::Hello { version } => Ok(version),
            other => Self::reject(other),
        }
    }

    /// Trigger an on-demand reconciliation pass.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, ClientError> {
        match self.send(&Request::Reconcile).await? {
            Response::Reconciled { report } => Ok(report),
            other => Self::reject(other),
        }
    }

    /// Retry a job: idempotent on waiting/active, re-enqueues a terminal
    /// job with attempts reset.
    pub async fn retry(&self, id: &str) -> Result<(), ClientError> {
        match self.send(&Request::Retry { id: id.to_string() }).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    /// Delete a job's record entirely.
    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        match self.send(&Request::Delete { id: id.to_string() }).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    /// Change a waiting job's dispatch priority.
    pub async fn set_priority(&self, id: &str, priority: Priority) -> Result<(), ClientError> {
        match self.send(&Request::SetPriority { id: id.to_string(), priority }).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    /// Requeue a job reactively (e.g. after an external fix to the source file).
    pub async fn reactive_requeue(&self, id: &str) -> Result<(), ClientError> {
        match self.send(&Request::ReactiveRequeue { id: id.to_string() }).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    /// List jobs, optionally filtered by state, paginated.
    pub async fn list(
        &self,
        state: Option<JobState>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Job>, ClientError> {
        match self.send(&Request::List { state, offset, limit }).await? {
            Response::Jobs { jobs } => Ok(jobs),
            other => Self::reject(other),
        }
    }

    /// Count jobs grouped by state.
    pub async fn count_by_state(&self) -> Result<Vec<(JobState, usize)>, ClientError> {
        match self.send(&Request::CountByState).await? {
            Response::CountByState { counts } => Ok(counts),
            other => Self::reject(other),
        }
    }

    /// Fetch a single job by id.
    pub async fn get(&self, id: &str) -> Result<Option<Job>, ClientError> {
        match self.send(&Request::Get { id: id.to_string() }).await? {
            Response::Job { job } => Ok(job),
            other => Self::reject(other),
        }
    }

    /// Compute a job's health status.
    pub async fn get_health(&self, id: &str) -> Result<Option<HealthStatus>, ClientError> {
        match self.send(&Request::GetHealth { id: id.to_string() }).await? {
            Response::Health { status } => Ok(status),
            other => Self::reject(other),
        }
    }

    /// Request graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(&Request::Shutdown).await? {
            Response::Ok | Response::ShuttingDown => Ok(()),
            other => Self::reject(other),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
