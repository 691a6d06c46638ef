// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue's event stream (§4.1 "Event stream", §9 "Cyclic references &
//! listeners"). Every mutation the queue applies to its `MaterializedState`
//! is first appended to the WAL as one of these variants, then broadcast to
//! subscribers (the worker pool, for metrics, and the control surface).

use crate::id::JobId;
use crate::job::{ErrorCode, Priority};
use serde::{Deserialize, Serialize};

/// A durable state transition. Applying the same event twice must be a
/// no-op (see `scriv_storage::state::MaterializedState::apply_event`) —
/// replaying the WAL after a crash must reproduce exactly the state that
/// existed before the crash, not accumulate duplicate effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    Enqueued {
        job_id: JobId,
        source_path: String,
        display_name: String,
        size_bytes: u64,
        mtime_ms: i64,
        priority: Priority,
        max_attempts: u32,
        enqueued_at_ms: i64,
    },
    Active {
        job_id: JobId,
        worker_id: String,
        lock_expires_at_ms: i64,
        started_at_ms: i64,
        /// New total, not a delta — handlers assign rather than increment
        /// so replaying this event twice is a no-op.
        attempts_made: u32,
    },
    LeaseRenewed {
        job_id: JobId,
        worker_id: String,
        lock_expires_at_ms: i64,
    },
    Completed {
        job_id: JobId,
        transcript_path: String,
        finished_at_ms: i64,
    },
    Failed {
        job_id: JobId,
        error_code: ErrorCode,
        error_reason: String,
        terminal: bool,
        finished_at_ms: i64,
    },
    Stalled {
        job_id: JobId,
        terminal: bool,
        /// New total, not a delta.
        stalled_count: u32,
        finished_at_ms: i64,
    },
    Retried {
        job_id: JobId,
        retried_at_ms: i64,
    },
    Deleted {
        job_id: JobId,
    },
    PriorityChanged {
        job_id: JobId,
        priority: Priority,
    },
}

impl Event {
    pub fn job_id(&self) -> &JobId {
        match self {
            Event::Enqueued { job_id, .. }
            | Event::Active { job_id, .. }
            | Event::LeaseRenewed { job_id, .. }
            | Event::Completed { job_id, .. }
            | Event::Failed { job_id, .. }
            | Event::Stalled { job_id, .. }
            | Event::Retried { job_id, .. }
            | Event::Deleted { job_id, .. }
            | Event::PriorityChanged { job_id, .. } => job_id,
        }
    }

    /// Name used in `[SELF-HEAL]` log lines and the kind sent to the event
    /// channel, matching the spec's `{enqueued, active, completed, failed,
    /// stalled}` vocabulary.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Enqueued { .. } => "enqueued",
            Event::Active { .. } => "active",
            Event::LeaseRenewed { .. } => "lease_renewed",
            Event::Completed { .. } => "completed",
            Event::Failed { .. } => "failed",
            Event::Stalled { .. } => "stalled",
            Event::Retried { .. } => "retried",
            Event::Deleted { .. } => "deleted",
            Event::PriorityChanged { .. } => "priority_changed",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
