// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use scriv_core::job::Priority;
use scriv_core::FakeClock;
use scriv_storage::MaterializedState;
use tempfile::tempdir;

fn test_config(root: &std::path::Path) -> Config {
    Config {
        watch_directory: root.join("inbox"),
        output_directory: root.join("output"),
        completed_directory: root.join("completed"),
        failed_directory: root.join("failed"),
        supported_formats: vec!["mp3".to_string()],
        min_file_size: 1,
        max_file_size: 1_000_000,
        max_workers: 2,
        max_attempts: 3,
        lease_duration_ms: 60_000,
        renewal_interval_ms: 50,
        stall_scan_interval_ms: 30_000,
        max_stalled_count: 2,
        shutdown_timeout_ms: 5_000,
        subprocess_command_template: vec![
            "sh".to_string(),
            "-c".to_string(),
            "stem=$(basename \"$1\"); stem=\"${stem%.*}\"; echo done > \"$2/$stem.txt\"".to_string(),
            "sh".to_string(),
            "{input}".to_string(),
            "{output_dir}".to_string(),
        ],
        reconcile_depth: 3,
        watch_debounce_ms: 2_000,
        terminal_retention_ms: 43_200_000,
    }
}

#[tokio::test]
async fn worker_drains_the_queue_and_completes_every_job() {
    let dir = tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let clock = FakeClock::new();
    let queue =
        Arc::new(JobQueue::open(&dir.path().join("wal.jsonl"), MaterializedState::default(), clock).unwrap());

    for i in 0..3 {
        let name = format!("ep{i}.mp3");
        let path = config.watch_directory.join(&name);
        std::fs::create_dir_all(&config.watch_directory).unwrap();
        std::fs::write(&path, b"audio").unwrap();
        let source_path = path.display().to_string();
        let id = scriv_core::derive_job_id(&source_path, 5, 0);
        queue.enqueue(id, source_path, name, 5, 0, Priority::Normal, 3);
    }

    let pool_config = WorkerPoolConfig::from_config(&config);
    let pool = WorkerPool::spawn(pool_config, Arc::clone(&config), Arc::clone(&queue));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while queue.count_by_state().get(&scriv_core::JobState::Completed).copied().unwrap_or(0) < 3 {
        if tokio::time::Instant::now() > deadline {
            panic!("jobs did not complete in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    pool.stop_leasing();
    assert!(pool.join(Duration::from_secs(5)).await);
    assert_eq!(queue.count_by_state().get(&scriv_core::JobState::Completed), Some(&3));
}

#[tokio::test]
async fn stop_leasing_then_join_returns_promptly_when_the_queue_is_empty() {
    let dir = tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let clock = FakeClock::new();
    let queue =
        Arc::new(JobQueue::open(&dir.path().join("wal.jsonl"), MaterializedState::default(), clock).unwrap());

    let pool_config = WorkerPoolConfig::from_config(&config);
    let pool = WorkerPool::spawn(pool_config, Arc::clone(&config), Arc::clone(&queue));

    pool.stop_leasing();
    assert!(pool.join(Duration::from_secs(2)).await);
}
