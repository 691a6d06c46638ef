// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling control-surface socket I/O (§4.6, §5.5).
//! Accepts connections and handles them in a spawned task per connection,
//! so a slow or stuck client never blocks the queue or worker pool.

use std::sync::Arc;
use std::time::Instant;

use scriv_core::job::compute_health_status;
use scriv_core::{Clock, Config as JobConfig, SystemClock};
use scriv_storage::JobQueue;
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::lifecycle::Reconciler;
use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};
use scriv_adapters::fsutil;

/// Shared daemon context for all request handlers.
pub(crate) struct ListenCtx {
    pub queue: Arc<JobQueue<SystemClock>>,
    pub job_config: Arc<JobConfig>,
    pub reconciler: Arc<Reconciler>,
    pub shutdown: Arc<Notify>,
    pub start_time: Instant,
}

/// Listener task for accepting socket connections.
pub(crate) struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { socket, ctx }
    }

    /// Run the listener loop until the process exits, spawning a task per
    /// accepted connection.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                ConnectionError::Protocol(protocol::ProtocolError::ConnectionClosed) => {
                                    debug!("client disconnected")
                                }
                                ConnectionError::Protocol(protocol::ProtocolError::Timeout) => {
                                    warn!("connection timeout")
                                }
                                _ => error!(error = %e, "connection error"),
                            }
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept error"),
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;

    if matches!(request, Request::List { .. } | Request::CountByState | Request::Get { .. } | Request::GetHealth { .. }) {
        debug!(request = ?request, "received query");
    } else {
        tracing::info!(request = ?request, "received request");
    }

    let response = handle_request(request, ctx);

    debug!(response = ?response, "sending response");
    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;

    Ok(())
}

fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello { version: PROTOCOL_VERSION.to_string() },

        Request::Reconcile => match ctx.reconciler.run(ctx.queue.as_ref(), ctx.job_config.as_ref()) {
            Ok(report) => Response::Reconciled { report },
            Err(e) => Response::Error { message: e.to_string() },
        },

        Request::Retry { id } => handle_retry(ctx, &id),

        Request::Delete { id } => handle_delete(ctx, &id),

        Request::SetPriority { id, priority } => {
            let job_id = scriv_core::JobId::new(id);
            match ctx.queue.set_priority(&job_id, priority) {
                Ok(()) => Response::Ok,
                Err(e) => Response::Error { message: e.to_string() },
            }
        }

        Request::ReactiveRequeue { id } => {
            let job_id = scriv_core::JobId::new(id);
            match ctx.queue.reactive_requeue(&job_id) {
                Ok(()) => Response::Ok,
                Err(e) => Response::Error { message: e.to_string() },
            }
        }

        Request::List { state, offset, limit } => Response::Jobs { jobs: ctx.queue.list(state, offset, limit) },

        Request::CountByState => Response::CountByState { counts: ctx.queue.count_by_state().into_iter().collect() },

        Request::Get { id } => {
            let job_id = scriv_core::JobId::new(id);
            Response::Job { job: ctx.queue.get(&job_id) }
        }

        Request::GetHealth { id } => {
            let job_id = scriv_core::JobId::new(id);
            let status = ctx.queue.get(&job_id).map(|job| {
                let now_ms = SystemClock.now_ms();
                // No dedicated "stalled interval" config field exists;
                // lease_duration_ms is the time after which an Active job
                // with no renewal is already eligible for `detect_stalled`,
                // so it doubles as the health-status threshold too.
                compute_health_status(&job, now_ms, ctx.job_config.lease_duration_ms)
            });
            Response::Health { status }
        }

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

/// `retry(id)` (§4.6): the Queue's own `retry` only flips job state back to
/// WAITING — relocating the file the worker had already moved to the
/// failed tree is the caller's responsibility (per `JobQueue::retry`'s own
/// doc comment).
fn handle_retry(ctx: &ListenCtx, id: &str) -> Response {
    let job_id = scriv_core::JobId::new(id);
    let Some(job) = ctx.queue.get(&job_id) else {
        return Response::Error { message: "job not found".to_string() };
    };

    let source_path = job.source_path_buf();
    let failed_path = fsutil::relocated_path(&ctx.job_config.watch_directory, &source_path, &ctx.job_config.failed_directory);
    if failed_path.exists() {
        if let Err(e) = fsutil::move_file(&failed_path, &source_path) {
            warn!(job_id = %job_id, error = %e, "failed to relocate file back to inbox for retry");
        }
    }

    match ctx.queue.retry(&job_id) {
        Ok(()) => Response::Ok,
        Err(e) => Response::Error { message: e.to_string() },
    }
}

/// `delete(id)` (§4.6): best-effort removal of whatever artifacts exist,
/// then drop the job record. The Queue deliberately leaves file cleanup to
/// the caller (see `JobQueue::delete`'s doc comment).
fn handle_delete(ctx: &ListenCtx, id: &str) -> Response {
    let job_id = scriv_core::JobId::new(id);
    if let Some(job) = ctx.queue.get(&job_id) {
        let _ = std::fs::remove_file(job.source_path_buf());
        if let Some(transcript_path) = &job.transcript_path {
            let _ = std::fs::remove_file(transcript_path);
        }
    }
    ctx.queue.delete(&job_id);
    Response::Ok
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
