// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scrivener Daemon (`scrivd`).
//!
//! Background process that watches an inbox for audio files, transcribes
//! them with a bounded worker pool, and exposes a small control surface
//! over a Unix socket. Startup order (§4.7): acquire the queue, run
//! reconciliation synchronously, then start the worker pool, the inbox
//! watcher, and the listener.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod env;
mod lifecycle;
mod listener;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use lifecycle::{Config, LifecycleError, StartupResult};
use listener::{ListenCtx, Listener};
use scriv_adapters::watcher::{InboxWatcher, WatcherConfig};
use scriv_engine::{WorkerPool, WorkerPoolConfig};
use scriv_storage::Checkpointer;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("scrivd {}", protocol::PROTOCOL_VERSION);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("scrivd {}", protocol::PROTOCOL_VERSION);
                println!("Scrivener daemon - watches an inbox and transcribes audio files");
                println!();
                println!("USAGE:");
                println!("    scrivd");
                println!();
                println!("The daemon is typically started by the `scriv` CLI and should not");
                println!("be invoked directly. It listens on a Unix socket for commands.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: scrivd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    info!("starting scrivd");

    let StartupResult { daemon, listener: unix_listener } = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path).unwrap_or_default().trim().to_string();
            let version = std::fs::read_to_string(&config.version_path).unwrap_or_default().trim().to_string();

            eprintln!("scrivd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            if !version.is_empty() {
                if version == protocol::PROTOCOL_VERSION {
                    eprintln!("  version: {version}");
                } else {
                    eprintln!("  version: {version} (outdated - current: {})", protocol::PROTOCOL_VERSION);
                }
            }
            std::process::exit(1);
        }
        Err(e) => {
            write_startup_error(&config, &e);
            error!(error = %e, "failed to start daemon");
            drop(log_guard);
            return Err(e.into());
        }
    };

    // §4.7 startup step 2: reconciliation runs synchronously, before the
    // Watcher or the pool start, and aborts boot on failure.
    match daemon.reconciler.run(daemon.queue.as_ref(), daemon.job_config.as_ref()) {
        Ok(report) => info!(
            files_scanned = report.files_scanned,
            jobs_created = report.jobs_created,
            partial_files_deleted = report.partial_files_deleted,
            duration_ms = report.duration_ms,
            "boot reconciliation complete"
        ),
        Err(e) => {
            error!(error = %e, "boot reconciliation failed");
            drop(log_guard);
            std::process::exit(1);
        }
    }

    let shutdown_notify = Arc::new(Notify::new());

    // §4.7 startup step 3: bounded worker pool plus the stall scanner.
    let pool_config = WorkerPoolConfig::from_config(&daemon.job_config);
    let pool = WorkerPool::spawn(pool_config, Arc::clone(&daemon.job_config), Arc::clone(&daemon.queue));

    // §4.7 startup step 4: the inbox watcher, only once reconciliation has
    // settled the backlog (§4.3's closing sentence).
    let (detected_tx, mut detected_rx) = tokio::sync::mpsc::channel(256);
    let watcher_config = WatcherConfig {
        inbox_root: daemon.job_config.watch_directory.clone(),
        max_depth: daemon.job_config.reconcile_depth,
        allowed_extensions: daemon.job_config.supported_formats.clone(),
        min_file_size: daemon.job_config.min_file_size,
        max_file_size: daemon.job_config.max_file_size,
        debounce: Duration::from_millis(daemon.job_config.watch_debounce_ms),
    };
    let watcher = InboxWatcher::spawn(watcher_config, detected_tx);

    let queue_for_watcher = Arc::clone(&daemon.queue);
    let max_attempts = daemon.job_config.max_attempts;
    tokio::spawn(async move {
        while let Some(detected) = detected_rx.recv().await {
            queue_for_watcher.enqueue(
                detected.job_id,
                detected.path.display().to_string(),
                detected.display_name,
                detected.size_bytes,
                detected.mtime_ms,
                scriv_core::job::Priority::default(),
                max_attempts,
            );
        }
    });

    // Control surface.
    let ctx = Arc::new(ListenCtx {
        queue: Arc::clone(&daemon.queue),
        job_config: Arc::clone(&daemon.job_config),
        reconciler: Arc::clone(&daemon.reconciler),
        shutdown: Arc::clone(&shutdown_notify),
        start_time: daemon.start_time,
    });
    tokio::spawn(Listener::new(unix_listener, ctx).run());

    spawn_flush_task(Arc::clone(&daemon.queue));
    spawn_checkpoint(Arc::clone(&daemon.queue), config.snapshot_path.clone());
    spawn_retention_task(Arc::clone(&daemon.queue), daemon.job_config.terminal_retention_ms);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "daemon ready");
    println!("READY");

    tokio::select! {
        _ = shutdown_notify.notified() => info!("shutdown requested via control surface"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    // §4.7 shutdown sequence.
    watcher.stop();
    pool.stop_leasing();
    if pool.join(Duration::from_millis(daemon.job_config.shutdown_timeout_ms.max(0) as u64)).await {
        daemon.shutdown()?;
        info!("daemon stopped");
        Ok(())
    } else {
        error!("worker pool did not drain within the shutdown timeout, exiting forcibly");
        std::process::exit(1);
    }
}

const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Periodically flush buffered WAL writes (~10ms durability window).
fn spawn_flush_task(queue: Arc<scriv_storage::JobQueue<scriv_core::SystemClock>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            if queue.needs_flush() {
                if let Err(e) = queue.flush() {
                    error!(error = %e, "failed to flush WAL");
                }
            }
        }
    });
}

const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically snapshot the queue state and truncate the WAL, following
/// the fsync-then-rename-then-truncate ordering `Checkpointer` implements:
/// the WAL is only truncated once the snapshot is durable on disk.
fn spawn_checkpoint(queue: Arc<scriv_storage::JobQueue<scriv_core::SystemClock>>, snapshot_path: std::path::PathBuf) {
    let checkpointer = Checkpointer::new(snapshot_path);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
        loop {
            interval.tick().await;
            let (seq, state) = queue.snapshot_state();
            if seq == 0 {
                continue;
            }

            let handle = checkpointer.start(seq, &state);
            match tokio::task::spawn_blocking(move || handle.wait()).await {
                Ok(Ok(result)) => {
                    tracing::debug!(seq = result.seq, size_bytes = result.size_bytes, "checkpoint complete");
                    if let Err(e) = queue.truncate_wal_before(seq) {
                        warn!(error = %e, "failed to truncate WAL after checkpoint");
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "checkpoint failed, WAL not truncated"),
                Err(e) => warn!(error = %e, "checkpoint task panicked"),
            }
        }
    });
}

const RETENTION_SCAN_INTERVAL: Duration = Duration::from_secs(3600);

/// Bounded retention pruning (§9 open question): periodically drop terminal
/// job records older than `terminal_retention_ms`. Their files were already
/// relocated out of the inbox before the job went terminal (invariant 4),
/// so this can never race ahead of that relocation.
fn spawn_retention_task(queue: Arc<scriv_storage::JobQueue<scriv_core::SystemClock>>, retention_ms: i64) {
    use scriv_core::Clock;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_SCAN_INTERVAL);
        loop {
            interval.tick().await;
            let now_ms = scriv_core::SystemClock.now_ms();
            let pruned = queue.prune_terminal(retention_ms, now_ms);
            if pruned > 0 {
                info!(pruned, "pruned terminal job records past retention");
            }
        }
    });
}

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log if it exceeds [`MAX_LOG_SIZE`]: `daemon.log` ->
/// `.1` -> `.2` -> `.3`, oldest deleted. Best-effort.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

const STARTUP_MARKER_PREFIX: &str = "--- scrivd: starting (pid: ";

/// Write a startup marker before tracing is initialized, so the CLI can
/// find where the current startup attempt begins even if tracing's
/// non-blocking writer hasn't flushed yet.
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&config.log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;
    let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&config.log_path) else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {error}");
}

fn setup_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config.log_path.file_name().ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}
