// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, state machine, priority, and error taxonomy.

use crate::id::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Dispatch priority. Ordered `Urgent < High < Normal < Low` so that the
/// derived `Ord` impl sorts a priority-keyed index into dequeue order
/// directly (see `scriv-storage`'s `waiting_priority` index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Urgent => write!(f, "urgent"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Job lifecycle state (§4.1).
///
/// `Stalled` is not a state a job is ever persisted in: `detect_stalled`
/// applies the stall policy and transitions directly to `Waiting` or
/// `FailedTerminal` in the same operation, the way the source spec's state
/// diagram passes through `STALLED` as a transient decision point rather
/// than a resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    FailedTerminal,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::FailedTerminal)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Delayed => write!(f, "delayed"),
            JobState::Active => write!(f, "active"),
            JobState::Completed => write!(f, "completed"),
            JobState::FailedTerminal => write!(f, "failed_terminal"),
        }
    }
}

/// Closed error taxonomy, `ERR_<CATEGORY>_<DETAIL>` (§7). Never string-match
/// on a reason string; match on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ErrFileNotFound,
    ErrFileNotReadable,
    ErrFileInvalid,
    ErrFileUnsupportedFormat,
    ErrFileTooLarge,
    ErrWhisperCrash,
    ErrWhisperTimeout,
    ErrWhisperNotFound,
    ErrWhisperInvalidOutput,
    ErrJobStalled,
    ErrSystemUnknown,
}

impl ErrorCode {
    /// Whether a first occurrence of this error should be retried (returned
    /// to WAITING, attempts permitting) rather than failed terminally on
    /// the spot. `ERR_FILE_NOT_FOUND`, `ERR_FILE_UNSUPPORTED_FORMAT`, and
    /// `ERR_FILE_TOO_LARGE` are terminal on first occurrence per §4.5;
    /// everything else is retryable up to `max_attempts`.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ErrorCode::ErrFileNotFound
                | ErrorCode::ErrFileUnsupportedFormat
                | ErrorCode::ErrFileTooLarge
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ErrFileNotFound => "ERR_FILE_NOT_FOUND",
            ErrorCode::ErrFileNotReadable => "ERR_FILE_NOT_READABLE",
            ErrorCode::ErrFileInvalid => "ERR_FILE_INVALID",
            ErrorCode::ErrFileUnsupportedFormat => "ERR_FILE_UNSUPPORTED_FORMAT",
            ErrorCode::ErrFileTooLarge => "ERR_FILE_TOO_LARGE",
            ErrorCode::ErrWhisperCrash => "ERR_WHISPER_CRASH",
            ErrorCode::ErrWhisperTimeout => "ERR_WHISPER_TIMEOUT",
            ErrorCode::ErrWhisperNotFound => "ERR_WHISPER_NOT_FOUND",
            ErrorCode::ErrWhisperInvalidOutput => "ERR_WHISPER_INVALID_OUTPUT",
            ErrorCode::ErrJobStalled => "ERR_JOB_STALLED",
            ErrorCode::ErrSystemUnknown => "ERR_SYSTEM_UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Computed (never stored) health status, §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Stalled,
    Recovered,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Stalled => write!(f, "stalled"),
            HealthStatus::Recovered => write!(f, "recovered"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Evaluate a job's health status at read time, per §4.8. Pure function of
/// the job record and the current time; never stored on the record.
pub fn compute_health_status(job: &Job, now_ms: i64, stalled_interval_ms: i64) -> HealthStatus {
    match job.state {
        JobState::Active => {
            if let Some(started_at_ms) = job.started_at_ms {
                if now_ms - started_at_ms > stalled_interval_ms {
                    return HealthStatus::Stalled;
                }
            }
            HealthStatus::Healthy
        }
        JobState::Completed => {
            if job.attempts_made > 1 {
                HealthStatus::Recovered
            } else {
                HealthStatus::Healthy
            }
        }
        JobState::Waiting | JobState::Delayed => HealthStatus::Healthy,
        JobState::FailedTerminal => HealthStatus::Unknown,
    }
}

/// One transcription attempt-chain for one source file (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source_path: String,
    pub display_name: String,
    pub size_bytes: u64,
    pub mtime_ms: i64,
    #[serde(default)]
    pub priority: Priority,
    pub state: JobState,
    #[serde(default)]
    pub attempts_made: u32,
    pub max_attempts: u32,
    /// Number of times `detect_stalled` has requeued this job. Distinct
    /// from `attempts_made`, which also counts leases handed out by
    /// `lease_next` for non-stall reasons; `max_stalled_count` is checked
    /// against this counter specifically (§4.5, §8).
    #[serde(default)]
    pub stalled_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub enqueued_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_expires_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
}

impl Job {
    /// Construct a new job in WAITING state, as created by the Watcher or
    /// the Reconciliation Engine.
    #[allow(clippy::too_many_arguments)]
    pub fn new_waiting(
        id: JobId,
        source_path: impl Into<String>,
        display_name: impl Into<String>,
        size_bytes: u64,
        mtime_ms: i64,
        priority: Priority,
        max_attempts: u32,
        enqueued_at_ms: i64,
    ) -> Self {
        Self {
            id,
            source_path: source_path.into(),
            display_name: display_name.into(),
            size_bytes,
            mtime_ms,
            priority,
            state: JobState::Waiting,
            attempts_made: 0,
            stalled_count: 0,
            error_code: None,
            error_reason: None,
            enqueued_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            lock_expires_at_ms: None,
            lock_owner: None,
            transcript_path: None,
        }
    }

    pub fn source_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.source_path)
    }

    /// Whether `worker_id` currently holds an unexpired lease on this job.
    pub fn is_leased_by(&self, worker_id: &str, now_ms: i64) -> bool {
        self.lock_owner.as_deref() == Some(worker_id)
            && self.lock_expires_at_ms.is_some_and(|exp| exp > now_ms)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
