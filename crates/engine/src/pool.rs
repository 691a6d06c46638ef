// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded concurrent worker pool (§4.5 "Scheduling model") plus the
//! stalled-lease scanner. `N` tokio tasks each loop `lease_next` ->
//! `execute_job` -> `complete`/`fail`; a separate task drives
//! `JobQueue::detect_stalled` on its own timer. Grounded in the teacher's
//! periodic background-task idiom (`spawn_flush_task`/`spawn_checkpoint` in
//! `crates/daemon/src/main.rs`): a `tokio::spawn` loop wrapping a
//! `tokio::time::interval`, logging at `WARN` on class-`[SELF-HEAL]` events
//! (the job queue's own stall recovery) the way the teacher's reconciler
//! logs self-heal actions.

use crate::executor::{self, Outcome};
use scriv_core::{Clock, Config};
use scriv_storage::JobQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Tunables the pool needs, pulled out of `Config` so callers don't have to
/// thread the whole config through just to construct a pool.
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub lease_duration_ms: i64,
    pub stall_scan_interval_ms: i64,
    pub max_stalled_count: u32,
    /// How long an idle worker sleeps between empty `lease_next` polls.
    pub idle_poll_interval: Duration,
}

impl WorkerPoolConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.max_workers,
            lease_duration_ms: config.lease_duration_ms,
            stall_scan_interval_ms: config.stall_scan_interval_ms,
            max_stalled_count: config.max_stalled_count,
            idle_poll_interval: Duration::from_millis(200),
        }
    }
}

/// The running pool. Dropping this without calling `stop_leasing`/`join`
/// leaves the worker tasks running detached; callers follow the shutdown
/// sequence in §4.7 instead.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    scanner: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Start `N` workers and the stall scanner (§4.7 startup step 3).
    pub fn spawn<C: Clock>(pool_config: WorkerPoolConfig, job_config: Arc<Config>, queue: Arc<JobQueue<C>>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(pool_config.worker_count);

        for index in 0..pool_config.worker_count {
            let worker_id = format!("worker-{index}");
            let queue = Arc::clone(&queue);
            let job_config = Arc::clone(&job_config);
            let stop = Arc::clone(&stop);
            let lease_duration_ms = pool_config.lease_duration_ms;
            let idle_poll_interval = pool_config.idle_poll_interval;
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, job_config, queue, stop, lease_duration_ms, idle_poll_interval).await;
            }));
        }

        let scanner = tokio::spawn(stall_scanner(
            Arc::clone(&queue),
            pool_config.max_stalled_count,
            Duration::from_millis(pool_config.stall_scan_interval_ms.max(1) as u64),
        ));

        Self { handles, scanner, stop }
    }

    /// §4.7 shutdown step 2: stop leasing new jobs. In-flight workers keep
    /// renewing and finish their current job.
    pub fn stop_leasing(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// §4.7 shutdown step 3/4: await in-flight workers up to `timeout`.
    /// Returns `true` if every worker exited cleanly within the deadline,
    /// `false` if the caller must forcibly terminate (step 4) and exit 1.
    pub async fn join(self, timeout: Duration) -> bool {
        self.scanner.abort();
        let deadline = tokio::time::Instant::now() + timeout;
        for handle in self.handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(())) => {}
                _ => return false,
            }
        }
        true
    }
}

async fn worker_loop<C: Clock>(
    worker_id: String,
    config: Arc<Config>,
    queue: Arc<JobQueue<C>>,
    stop: Arc<AtomicBool>,
    lease_duration_ms: i64,
    idle_poll_interval: Duration,
) {
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let Some(job) = queue.lease_next(&worker_id, lease_duration_ms) else {
            tokio::time::sleep(idle_poll_interval).await;
            continue;
        };

        match executor::execute_job(&job, &config, &worker_id, &queue).await {
            Ok(Outcome::Completed { transcript_path }) => {
                if let Err(err) = queue.complete(&job.id, &worker_id, transcript_path) {
                    tracing::warn!(job_id = %job.id, error = %err, "complete failed after successful execution");
                }
            }
            Ok(Outcome::Failed { error }) => {
                let error_code = error.to_error_code();
                tracing::warn!(job_id = %job.id, %error_code, error = %error, "job attempt failed");
                if let Err(err) = queue.fail(&job.id, &worker_id, error_code, error.to_string()) {
                    tracing::warn!(job_id = %job.id, error = %err, "fail() rejected after execution failure");
                }
            }
            Err(lease_lost) => {
                tracing::warn!(job_id = %job.id, error = %lease_lost, "lease lost mid-execution, leaving job for the stall scanner");
            }
        }
    }
}

/// §4.1 `detect_stalled` on its own timer (§4.5 "Lease parameters").
async fn stall_scanner<C: Clock>(queue: Arc<JobQueue<C>>, max_stalled_count: u32, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for job_id in queue.detect_stalled(max_stalled_count) {
            tracing::warn!(job_id = %job_id, "[SELF-HEAL] requeued stalled job");
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
