// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `JobQueue`: the durable queue's operation surface (§4.1, §4.6). A
//! mutex-guarded `Wal` + `MaterializedState` pair, with every mutation
//! appended to the WAL and applied through the same idempotent
//! `apply_event` path WAL replay uses at boot.

use crate::wal::Wal;
use crate::state::MaterializedState;
use parking_lot::Mutex;
use scriv_core::job::Priority;
use scriv_core::{Clock, ErrorCode, Event, Job, JobId, JobState};
use std::path::Path;
use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("job not found")]
    NotFound,
    #[error("worker no longer owns the lease")]
    LeaseLost,
    #[error("invalid state for this operation")]
    InvalidState,
}

struct Inner {
    wal: Wal,
    state: MaterializedState,
}

/// The durable job queue. Cheap to clone: the WAL handle and materialized
/// state live behind a mutex shared via `Arc` internally through the
/// broadcast sender's clone semantics — callers hold a `JobQueue` the way
/// the teacher's daemon holds its `DaemonState`, behind one shared handle
/// per process.
pub struct JobQueue<C: Clock> {
    inner: Mutex<Inner>,
    clock: C,
    events_tx: broadcast::Sender<Event>,
}

impl<C: Clock> JobQueue<C> {
    /// Open (or create) the WAL at `wal_path`, replaying it onto `state`
    /// (typically loaded from the last snapshot by the caller).
    pub fn open(wal_path: &Path, mut state: MaterializedState, clock: C) -> Result<Self, crate::WalError> {
        let wal = Wal::open(wal_path, 0)?;
        for entry in wal.entries_after(0)? {
            state.apply_event(&entry.event);
        }
        state.rebuild_waiting_index();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Mutex::new(Inner { wal, state }),
            clock,
            events_tx,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    fn append(&self, inner: &mut Inner, event: Event) {
        // Best-effort: a WAL write failure here drops the lease and is
        // logged by the caller (engine); the next stall-scan reclaims the
        // job, per the propagation policy for store errors mid-job.
        if let Err(err) = inner.wal.append(&event) {
            tracing::error!(error = %err, "failed to append event to WAL");
            return;
        }
        inner.state.apply_event(&event);
        let _ = self.events_tx.send(event);
    }

    /// §4.1 `enqueue`. Deterministic ids make a duplicate enqueue of the
    /// same (source_path, size_bytes, mtime_ms) a no-op, per invariant 1 —
    /// this holds even if the existing job has since reached a terminal
    /// state (see DESIGN.md).
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &self,
        job_id: JobId,
        source_path: String,
        display_name: String,
        size_bytes: u64,
        mtime_ms: i64,
        priority: Priority,
        max_attempts: u32,
    ) -> JobId {
        let mut inner = self.inner.lock();
        if inner.state.jobs.contains_key(&job_id) {
            return job_id;
        }
        let enqueued_at_ms = self.clock.now_ms();
        self.append(
            &mut inner,
            Event::Enqueued {
                job_id: job_id.clone(),
                source_path,
                display_name,
                size_bytes,
                mtime_ms,
                priority,
                max_attempts,
                enqueued_at_ms,
            },
        );
        job_id
    }

    /// §4.1 `lease_next`. Returns the highest-priority WAITING job, ties
    /// broken by `enqueued_at` ascending (see `MaterializedState::peek_next_waiting`).
    pub fn lease_next(&self, worker_id: &str, lease_ms: i64) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job_id = inner.state.peek_next_waiting()?;
        let now = self.clock.now_ms();
        let job = inner.state.jobs.get(&job_id)?;
        let attempts_made = job.attempts_made + 1;
        self.append(
            &mut inner,
            Event::Active {
                job_id: job_id.clone(),
                worker_id: worker_id.to_string(),
                lock_expires_at_ms: now + lease_ms,
                started_at_ms: now,
                attempts_made,
            },
        );
        inner.state.jobs.get(&job_id).cloned()
    }

    /// §4.1 `renew`.
    pub fn renew(&self, job_id: &JobId, worker_id: &str, lease_ms: i64) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let job = inner.state.jobs.get(job_id).ok_or(QueueError::NotFound)?;
        if job.lock_owner.as_deref() != Some(worker_id) {
            return Err(QueueError::LeaseLost);
        }
        let now = self.clock.now_ms();
        self.append(
            &mut inner,
            Event::LeaseRenewed {
                job_id: job_id.clone(),
                worker_id: worker_id.to_string(),
                lock_expires_at_ms: now + lease_ms,
            },
        );
        Ok(())
    }

    /// §4.1 `complete`.
    pub fn complete(
        &self,
        job_id: &JobId,
        worker_id: &str,
        transcript_path: String,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let job = inner.state.jobs.get(job_id).ok_or(QueueError::NotFound)?;
        if job.lock_owner.as_deref() != Some(worker_id) {
            return Err(QueueError::LeaseLost);
        }
        let finished_at_ms = self.clock.now_ms();
        self.append(
            &mut inner,
            Event::Completed {
                job_id: job_id.clone(),
                transcript_path,
                finished_at_ms,
            },
        );
        Ok(())
    }

    /// §4.1 `fail`. `attempts_made` was already advanced by the `lease_next`
    /// that produced this attempt, so the retry-vs-terminal decision only
    /// needs to compare it against `max_attempts`.
    pub fn fail(
        &self,
        job_id: &JobId,
        worker_id: &str,
        error_code: ErrorCode,
        error_reason: String,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let job = inner.state.jobs.get(job_id).ok_or(QueueError::NotFound)?;
        if job.lock_owner.as_deref() != Some(worker_id) {
            return Err(QueueError::LeaseLost);
        }
        let terminal = !(job.attempts_made < job.max_attempts && error_code.is_retryable());
        let finished_at_ms = self.clock.now_ms();
        self.append(
            &mut inner,
            Event::Failed {
                job_id: job_id.clone(),
                error_code,
                error_reason,
                terminal,
                finished_at_ms,
            },
        );
        Ok(())
    }

    /// §4.1 `detect_stalled`. Scans ACTIVE jobs whose lease has expired and
    /// applies the stall policy to each: after `max_stalled_count` prior
    /// stall-requeues, the next stall is terminal (§4.5, §8).
    pub fn detect_stalled(&self, max_stalled_count: u32) -> Vec<JobId> {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        let expired: Vec<JobId> = inner
            .state
            .jobs
            .values()
            .filter(|j| j.state == JobState::Active && j.lock_expires_at_ms.is_some_and(|e| e < now))
            .map(|j| j.id.clone())
            .collect();

        for job_id in &expired {
            let Some(job) = inner.state.jobs.get(job_id) else {
                continue;
            };
            let stalled_count = job.stalled_count + 1;
            let terminal = stalled_count > max_stalled_count;
            self.append(
                &mut inner,
                Event::Stalled {
                    job_id: job_id.clone(),
                    terminal,
                    stalled_count,
                    finished_at_ms: now,
                },
            );
        }
        expired
    }

    fn requeue(&self, job_id: &JobId) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let job = inner.state.jobs.get(job_id).ok_or(QueueError::NotFound)?;
        match job.state {
            JobState::Waiting | JobState::Active => Ok(()),
            JobState::Completed => Err(QueueError::InvalidState),
            JobState::FailedTerminal | JobState::Delayed => {
                let retried_at_ms = self.clock.now_ms();
                self.append(
                    &mut inner,
                    Event::Retried {
                        job_id: job_id.clone(),
                        retried_at_ms,
                    },
                );
                Ok(())
            }
        }
    }

    /// §4.6 `retry`. Clears error fields and transitions FAILED-TERMINAL
    /// back to WAITING; idempotent success on {WAITING, ACTIVE}; refuses
    /// COMPLETED. File relocation (moving the source back from the failed
    /// tree) is the caller's responsibility, as it already is for `delete`.
    pub fn retry(&self, job_id: &JobId) -> Result<(), QueueError> {
        self.requeue(job_id)
    }

    /// §4.6 `reactive_requeue`. Per the open-question resolution in
    /// DESIGN.md, this has the same final effect and idempotence rules as
    /// `retry` — both exist because an external actor may set a job's
    /// status to waiting through the API without going through `retry`
    /// directly, but the dispatcher's waiting index always moves in lock
    /// step with job state (there is no passive state change in this
    /// model), so reusing the same routine is correct either way.
    pub fn reactive_requeue(&self, job_id: &JobId) -> Result<(), QueueError> {
        self.requeue(job_id)
    }

    /// §4.1 `delete`. Artifact cleanup is the caller's responsibility.
    pub fn delete(&self, job_id: &JobId) {
        let mut inner = self.inner.lock();
        if inner.state.jobs.contains_key(job_id) {
            self.append(&mut inner, Event::Deleted { job_id: job_id.clone() });
        }
    }

    /// Bounded retention pruning (open question in §9): removes terminal
    /// jobs whose `finished_at_ms` is older than `older_than_ms` relative to
    /// `now_ms`. Only the job record is dropped — by the time a job is
    /// terminal its transcript/source have already been relocated out of
    /// the inbox (invariant 4), so pruning the record can never race ahead
    /// of that relocation. Returns the number of jobs pruned.
    pub fn prune_terminal(&self, older_than_ms: i64, now_ms: i64) -> usize {
        let mut inner = self.inner.lock();
        let stale: Vec<JobId> = inner
            .state
            .jobs
            .values()
            .filter(|job| {
                job.state.is_terminal() && job.finished_at_ms.is_some_and(|t| now_ms - t >= older_than_ms)
            })
            .map(|job| job.id.clone())
            .collect();
        for job_id in &stale {
            self.append(&mut inner, Event::Deleted { job_id: job_id.clone() });
        }
        stale.len()
    }

    /// §4.6 `set_priority`.
    pub fn set_priority(&self, job_id: &JobId, priority: Priority) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let job = inner.state.jobs.get(job_id).ok_or(QueueError::NotFound)?;
        if !matches!(job.state, JobState::Waiting | JobState::Delayed) {
            return Err(QueueError::InvalidState);
        }
        self.append(&mut inner, Event::PriorityChanged { job_id: job_id.clone(), priority });
        Ok(())
    }

    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.inner.lock().state.jobs.get(job_id).cloned()
    }

    pub fn count_by_state(&self) -> std::collections::HashMap<JobState, usize> {
        self.inner.lock().state.count_by_state()
    }

    /// §4.1 `list`. Paginated view; total matches `count_by_state()`.
    pub fn list(&self, state: Option<JobState>, offset: usize, limit: usize) -> Vec<Job> {
        let inner = self.inner.lock();
        inner
            .state
            .list_ids(state)
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| inner.state.jobs.get(&id).cloned())
            .collect()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().state.paused
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.lock().state.paused = paused;
    }

    /// Flush any buffered WAL writes to disk. Called on the group-commit
    /// timer and before checkpointing.
    pub fn flush(&self) -> Result<(), crate::WalError> {
        self.inner.lock().wal.flush()
    }

    pub fn needs_flush(&self) -> bool {
        self.inner.lock().wal.needs_flush()
    }

    /// Snapshot the current state and the WAL sequence it reflects, for
    /// the background checkpointer to serialize.
    pub fn snapshot_state(&self) -> (u64, MaterializedState) {
        let inner = self.inner.lock();
        (inner.wal.write_seq(), inner.state.clone())
    }

    /// Truncate the WAL up to `seq`, once a checkpoint covering it is
    /// durable. Must only be called after the checkpoint's `wait()` returns.
    pub fn truncate_wal_before(&self, seq: u64) -> Result<(), crate::WalError> {
        self.inner.lock().wal.truncate_before(seq)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
