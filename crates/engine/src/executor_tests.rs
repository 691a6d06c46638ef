// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use scriv_core::job::Priority;
use scriv_core::FakeClock;
use scriv_storage::MaterializedState;
use tempfile::tempdir;

fn test_config(root: &Path) -> Config {
    Config {
        watch_directory: root.join("inbox"),
        output_directory: root.join("output"),
        completed_directory: root.join("completed"),
        failed_directory: root.join("failed"),
        supported_formats: vec!["mp3".to_string()],
        min_file_size: 1,
        max_file_size: 1_000_000,
        max_workers: 1,
        max_attempts: 3,
        lease_duration_ms: 60_000,
        renewal_interval_ms: 50,
        stall_scan_interval_ms: 30_000,
        max_stalled_count: 2,
        shutdown_timeout_ms: 60_000,
        subprocess_command_template: vec![
            "cp".to_string(),
            "{input}".to_string(),
            "{output_dir}/dummy".to_string(),
        ],
        reconcile_depth: 3,
        watch_debounce_ms: 2_000,
        terminal_retention_ms: 43_200_000,
    }
}

fn open_queue(dir: &Path) -> JobQueue<FakeClock> {
    JobQueue::open(&dir.join("wal.jsonl"), MaterializedState::default(), FakeClock::new()).unwrap()
}

fn enqueue_file(queue: &JobQueue<FakeClock>, config: &Config, relative: &str, contents: &[u8]) -> Job {
    let path = config.watch_directory.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    let source_path = path.display().to_string();
    let id = scriv_core::derive_job_id(&source_path, contents.len() as u64, 0);
    queue.enqueue(id.clone(), source_path, relative.to_string(), contents.len() as u64, 0, Priority::Normal, 3);
    queue.lease_next("w1", config.lease_duration_ms).unwrap()
}

#[tokio::test]
async fn successful_execution_writes_a_transcript_and_relocates_the_source() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    let queue = open_queue(dir.path());
    let job = enqueue_file(&queue, &config, "ep1.mp3", b"audio bytes");

    // The default command template produces a file named "dummy", not
    // "<stem>.txt" -- swap in a shell command that writes the transcript
    // our validator expects.
    config.subprocess_command_template =
        vec!["sh".to_string(), "-c".to_string(), "echo hello > \"{output_dir}/ep1.txt\"".to_string()];

    let outcome = execute_job(&job, &config, "w1", &queue).await.unwrap();
    match outcome {
        Outcome::Completed { transcript_path } => {
            assert!(transcript_path.ends_with("ep1.txt"));
            assert_eq!(std::fs::read_to_string(&transcript_path).unwrap().trim(), "hello");
        }
        Outcome::Failed { error } => panic!("expected success, got {error}"),
    }

    assert!(!config.watch_directory.join("ep1.mp3").exists());
    assert!(config.completed_directory.join("ep1.mp3").exists());
}

#[tokio::test]
async fn missing_source_is_classified_as_file_not_found() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let queue = open_queue(dir.path());
    let job = enqueue_file(&queue, &config, "ep1.mp3", b"audio bytes");
    std::fs::remove_file(job.source_path_buf()).unwrap();

    let outcome = execute_job(&job, &config, "w1", &queue).await.unwrap();
    match outcome {
        Outcome::Failed { error } => {
            assert_eq!(error.to_error_code(), scriv_core::ErrorCode::ErrFileNotFound);
        }
        Outcome::Completed { .. } => panic!("expected failure"),
    }
}

#[tokio::test]
async fn empty_source_is_classified_as_file_invalid() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let queue = open_queue(dir.path());
    let job = enqueue_file(&queue, &config, "ep1.mp3", b"");

    let outcome = execute_job(&job, &config, "w1", &queue).await.unwrap();
    match outcome {
        Outcome::Failed { error } => {
            assert_eq!(error.to_error_code(), scriv_core::ErrorCode::ErrFileInvalid);
        }
        Outcome::Completed { .. } => panic!("expected failure"),
    }
}

#[tokio::test]
async fn subprocess_crash_is_classified_and_source_is_relocated_to_failed_tree() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.subprocess_command_template = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
    let queue = open_queue(dir.path());
    let job = enqueue_file(&queue, &config, "ep1.mp3", b"audio bytes");

    let outcome = execute_job(&job, &config, "w1", &queue).await.unwrap();
    match outcome {
        Outcome::Failed { error } => {
            assert_eq!(error.to_error_code(), scriv_core::ErrorCode::ErrWhisperCrash);
        }
        Outcome::Completed { .. } => panic!("expected failure"),
    }
    assert!(config.failed_directory.join("ep1.mp3").exists());
}

#[tokio::test]
async fn missing_transcript_is_classified_as_invalid_output() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.subprocess_command_template = vec!["true".to_string()];
    let queue = open_queue(dir.path());
    let job = enqueue_file(&queue, &config, "ep1.mp3", b"audio bytes");

    let outcome = execute_job(&job, &config, "w1", &queue).await.unwrap();
    match outcome {
        Outcome::Failed { error } => {
            assert_eq!(error.to_error_code(), scriv_core::ErrorCode::ErrWhisperInvalidOutput);
        }
        Outcome::Completed { .. } => panic!("expected failure"),
    }
}

#[tokio::test]
async fn missing_binary_is_classified_as_whisper_not_found() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.subprocess_command_template = vec!["definitely-not-a-real-binary-xyz".to_string()];
    let queue = open_queue(dir.path());
    let job = enqueue_file(&queue, &config, "ep1.mp3", b"audio bytes");

    let outcome = execute_job(&job, &config, "w1", &queue).await.unwrap();
    match outcome {
        Outcome::Failed { error } => {
            assert_eq!(error.to_error_code(), scriv_core::ErrorCode::ErrWhisperNotFound);
        }
        Outcome::Completed { .. } => panic!("expected failure"),
    }
}

#[tokio::test]
async fn renewal_loop_does_not_block_completion_of_a_slower_subprocess() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.renewal_interval_ms = 10;
    config.subprocess_command_template =
        vec!["sh".to_string(), "-c".to_string(), "sleep 0.2 && echo hi > \"{output_dir}/ep1.txt\"".to_string()];
    let queue = open_queue(dir.path());
    let job = enqueue_file(&queue, &config, "ep1.mp3", b"audio bytes");

    let outcome = execute_job(&job, &config, "w1", &queue).await.unwrap();
    assert!(matches!(outcome, Outcome::Completed { .. }));
}
