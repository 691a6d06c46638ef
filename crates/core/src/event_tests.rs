// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn job_id_extracts_from_every_variant() {
    let id = JobId::new("job-1");
    let events = vec![
        Event::Enqueued {
            job_id: id.clone(),
            source_path: "/inbox/a.mp3".into(),
            display_name: "a.mp3".into(),
            size_bytes: 10,
            mtime_ms: 0,
            priority: Priority::Normal,
            max_attempts: 3,
            enqueued_at_ms: 0,
        },
        Event::Deleted { job_id: id.clone() },
    ];
    for e in events {
        assert_eq!(e.job_id(), &id);
    }
}

#[test]
fn kind_matches_spec_vocabulary() {
    assert_eq!(Event::Deleted { job_id: JobId::new("x") }.kind(), "deleted");
    assert_eq!(
        Event::Completed {
            job_id: JobId::new("x"),
            transcript_path: "/out/a.txt".into(),
            finished_at_ms: 0,
        }
        .kind(),
        "completed"
    );
    assert_eq!(
        Event::Active {
            job_id: JobId::new("x"),
            worker_id: "w1".into(),
            lock_expires_at_ms: 1,
            started_at_ms: 1,
            attempts_made: 1,
        }
        .kind(),
        "active"
    );
}

#[test]
fn event_round_trips_through_json() {
    let e = Event::Failed {
        job_id: JobId::new("x"),
        error_code: ErrorCode::ErrWhisperCrash,
        error_reason: "exit code 1".into(),
        terminal: false,
        finished_at_ms: 1,
    };
    let json = serde_json::to_string(&e).expect("serialize");
    let back: Event = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(e, back);
}
