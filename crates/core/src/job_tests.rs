// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn job(state: JobState, attempts_made: u32) -> Job {
    let mut j = Job::new_waiting(
        JobId::new("abc"),
        "/inbox/talk.mp3",
        "talk.mp3",
        1024,
        1_700_000_000_000,
        Priority::Normal,
        3,
        1_700_000_000_000,
    );
    j.state = state;
    j.attempts_made = attempts_made;
    j
}

#[test]
fn priority_orders_urgent_first() {
    let mut ps = vec![Priority::Low, Priority::Normal, Priority::Urgent, Priority::High];
    ps.sort();
    assert_eq!(
        ps,
        vec![Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]
    );
}

#[test]
fn terminal_states() {
    assert!(JobState::Completed.is_terminal());
    assert!(JobState::FailedTerminal.is_terminal());
    assert!(!JobState::Waiting.is_terminal());
    assert!(!JobState::Active.is_terminal());
}

#[test]
fn error_code_retryability_matches_spec_table() {
    assert!(!ErrorCode::ErrFileNotFound.is_retryable());
    assert!(!ErrorCode::ErrFileUnsupportedFormat.is_retryable());
    assert!(!ErrorCode::ErrFileTooLarge.is_retryable());
    assert!(ErrorCode::ErrWhisperCrash.is_retryable());
    assert!(ErrorCode::ErrWhisperTimeout.is_retryable());
    assert!(ErrorCode::ErrJobStalled.is_retryable());
    assert!(ErrorCode::ErrSystemUnknown.is_retryable());
}

#[test]
fn error_code_display_matches_taxonomy() {
    assert_eq!(ErrorCode::ErrFileNotFound.to_string(), "ERR_FILE_NOT_FOUND");
    assert_eq!(
        ErrorCode::ErrWhisperInvalidOutput.to_string(),
        "ERR_WHISPER_INVALID_OUTPUT"
    );
}

#[test]
fn health_active_within_interval_is_healthy() {
    let mut j = job(JobState::Active, 1);
    j.started_at_ms = Some(1_000);
    assert_eq!(compute_health_status(&j, 1_500, 60_000), HealthStatus::Healthy);
}

#[test]
fn health_active_past_interval_is_stalled() {
    let mut j = job(JobState::Active, 1);
    j.started_at_ms = Some(1_000);
    assert_eq!(compute_health_status(&j, 100_000, 60_000), HealthStatus::Stalled);
}

#[test]
fn health_completed_first_attempt_is_healthy() {
    let j = job(JobState::Completed, 1);
    assert_eq!(compute_health_status(&j, 0, 60_000), HealthStatus::Healthy);
}

#[test]
fn health_completed_after_retry_is_recovered() {
    let j = job(JobState::Completed, 2);
    assert_eq!(compute_health_status(&j, 0, 60_000), HealthStatus::Recovered);
}

#[test]
fn health_waiting_is_healthy() {
    let j = job(JobState::Waiting, 0);
    assert_eq!(compute_health_status(&j, 0, 60_000), HealthStatus::Healthy);
}

#[test]
fn health_failed_terminal_is_unknown() {
    let j = job(JobState::FailedTerminal, 3);
    assert_eq!(compute_health_status(&j, 0, 60_000), HealthStatus::Unknown);
}

#[test]
fn is_leased_by_checks_owner_and_expiry() {
    let mut j = job(JobState::Active, 1);
    j.lock_owner = Some("worker-1".to_string());
    j.lock_expires_at_ms = Some(10_000);
    assert!(j.is_leased_by("worker-1", 5_000));
    assert!(!j.is_leased_by("worker-1", 20_000));
    assert!(!j.is_leased_by("worker-2", 5_000));
}
