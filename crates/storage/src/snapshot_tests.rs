// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::MaterializedState;
use scriv_core::job::Priority;
use scriv_core::{Job, JobId};
use std::io::Write;
use tempfile::tempdir;

fn test_job(id: &str) -> Job {
    Job::new_waiting(JobId::new(id), "/inbox/a.mp3", "a.mp3", 10, 0, Priority::Normal, 3, 0)
}

fn create_test_state() -> MaterializedState {
    let mut state = MaterializedState::default();
    let job = test_job("job-1");
    state.jobs.insert(job.id.clone(), job.clone());
    state.waiting_fifo.push_back(job.id);
    state
}

#[test]
fn save_and_load_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let snapshot = Snapshot::new(42, create_test_state());
    snapshot.save(&path).unwrap();
    assert!(path.exists());

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 42);
    assert_eq!(loaded.version, CURRENT_SNAPSHOT_VERSION);
    assert_eq!(loaded.state.jobs.len(), 1);
    assert!(loaded.state.jobs.contains_key(&JobId::new("job-1")));
}

#[test]
fn load_nonexistent_is_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.json");
    assert!(Snapshot::load(&path).unwrap().is_none());
}

#[test]
fn save_leaves_no_tmp_file_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let tmp_path = path.with_extension("tmp");

    Snapshot::new(1, create_test_state()).save(&path).unwrap();

    assert!(!tmp_path.exists());
    assert!(path.exists());
}

#[test]
fn omitted_version_defaults_to_one() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let raw = serde_json::json!({
        "seq": 7,
        "state": MaterializedState::default(),
        "created_at": chrono::Utc::now(),
    });
    std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.seq, 7);
}

#[test]
fn corrupt_snapshot_returns_none_and_creates_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut f = File::create(&path).unwrap();
    f.write_all(b"\xe5\x03\x01binary-garbage").unwrap();
    drop(f);

    assert!(Snapshot::load(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn corrupt_snapshot_rotates_bak_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    for i in 1..=4u8 {
        let mut f = File::create(&path).unwrap();
        f.write_all(&[i; 4]).unwrap();
        drop(f);
        assert!(Snapshot::load(&path).unwrap().is_none());
    }

    assert_eq!(fs::read(path.with_extension("bak")).unwrap(), vec![4u8; 4]);
    assert_eq!(fs::read(path.with_extension("bak.2")).unwrap(), vec![3u8; 4]);
    assert_eq!(fs::read(path.with_extension("bak.3")).unwrap(), vec![2u8; 4]);
    assert!(!path.with_extension("bak.4").exists());
}

#[test]
fn waiting_lanes_are_not_persisted_but_rebuild_from_job_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut state = MaterializedState::default();
    let normal = test_job("job-normal");
    let mut urgent = test_job("job-urgent");
    urgent.priority = Priority::Urgent;
    state.jobs.insert(normal.id.clone(), normal.clone());
    state.jobs.insert(urgent.id.clone(), urgent.clone());
    state.waiting_fifo.push_back(normal.id.clone());
    state.waiting_priority.insert(
        crate::PriorityKey { priority: urgent.priority, enqueued_at_ms: urgent.enqueued_at_ms, job_id: urgent.id.clone() },
        urgent.id.clone(),
    );

    Snapshot::new(5, state).save(&path).unwrap();
    let mut loaded = Snapshot::load(&path).unwrap().unwrap();

    // The lanes are a derived index over `jobs`, skipped by serde — a fresh
    // load starts with both empty until the caller rebuilds them.
    assert!(loaded.state.waiting_fifo.is_empty());
    assert!(loaded.state.waiting_priority.is_empty());

    loaded.state.rebuild_waiting_index();
    assert_eq!(loaded.state.peek_next_waiting(), Some(urgent.id));
}
