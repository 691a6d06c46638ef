// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: paths, startup, shutdown (§4.7).

pub mod reconcile;
pub use reconcile::{ReconcileError, Reconciler};

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use scriv_core::{Config as JobConfig, SystemClock};
use scriv_storage::{load_snapshot, Checkpointer, JobQueue, MaterializedState};
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Fixed filesystem layout under the daemon's state directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. `~/.local/state/scriv`).
    pub state_dir: PathBuf,
    /// Path to the control-surface Unix socket.
    pub socket_path: PathBuf,
    /// Path to the lock/PID file.
    pub lock_path: PathBuf,
    /// Path to the version marker file.
    pub version_path: PathBuf,
    /// Path to the daemon log file.
    pub log_path: PathBuf,
    /// Path to the job queue's WAL.
    pub wal_path: PathBuf,
    /// Path to the job queue's snapshot.
    pub snapshot_path: PathBuf,
    /// Path to the job configuration TOML (§9).
    pub job_config_path: PathBuf,
}

impl Config {
    /// Resolve the fixed paths under the daemon's state directory.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;

        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            version_path: state_dir.join("daemon.version"),
            log_path: state_dir.join("daemon.log"),
            wal_path: state_dir.join("wal").join("events.wal"),
            snapshot_path: state_dir.join("snapshot.json"),
            job_config_path: state_dir.join("config.toml"),
            state_dir,
        })
    }
}

/// The running daemon's state: the durable queue plus the paths/lock it was
/// started with.
pub struct DaemonState {
    pub config: Config,
    pub job_config: Arc<JobConfig>,
    #[allow(dead_code)]
    lock_file: File,
    pub queue: Arc<JobQueue<SystemClock>>,
    pub reconciler: Arc<Reconciler>,
    pub start_time: Instant,
}

/// Result of a successful `startup()`: the daemon state plus the bound
/// listener socket, handed separately so the caller can spawn it as its own
/// task.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: UnixListener,
}

impl DaemonState {
    /// §4.7 shutdown steps 5-7: flush the WAL, write a final synchronous
    /// checkpoint, then remove the socket/PID/version files. The lock file
    /// is released when `self.lock_file` drops at the end of `main`.
    pub fn shutdown(&self) -> Result<(), LifecycleError> {
        info!("flushing WAL");
        if let Err(e) = self.queue.flush() {
            warn!(error = %e, "failed to flush WAL on shutdown");
        }

        let (seq, state) = self.queue.snapshot_state();
        if seq > 0 {
            let checkpointer = Checkpointer::new(self.config.snapshot_path.clone());
            match checkpointer.checkpoint_sync(seq, &state) {
                Ok(result) => {
                    info!(seq = result.seq, size_bytes = result.size_bytes, "saved final shutdown snapshot");
                    if let Err(e) = self.queue.truncate_wal_before(seq) {
                        warn!(error = %e, "failed to truncate WAL after final checkpoint");
                    }
                }
                Err(e) => warn!(error = %e, "failed to save shutdown snapshot"),
            }
        }

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }
        if self.config.version_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.version_path) {
                warn!(error = %e, "failed to remove version file");
            }
        }

        info!("daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("WAL error: {0}")]
    Wal(#[from] scriv_storage::WalError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] scriv_storage::SnapshotError),

    #[error("job config error: {0}")]
    JobConfig(#[from] scriv_core::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon (§4.7 startup step 1): acquire the exclusive lock, load
/// the last snapshot and replay the WAL onto it, bind the control socket.
/// Does NOT run reconciliation or start the worker pool/watcher — the
/// caller runs reconciliation synchronously against the returned queue
/// before doing so, per the startup ordering in §4.7.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock - those files
            // belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create the state directory.
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 2. Acquire the lock file first - prevents races with a second
    // instance. Opened without truncating so we don't wipe a running
    // daemon's PID before we hold the lock.
    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    use std::io::Write;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Create remaining directories.
    if let Some(parent) = config.wal_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&config.version_path, crate::protocol::PROTOCOL_VERSION)?;

    // 4. Load the job config (§9). Required fields (directories) have no
    // sane default, so a missing file is a startup error, not a fallback.
    let job_config = Arc::new(JobConfig::load(&config.job_config_path)?);

    // 5. Load the last snapshot (if any) and replay the WAL onto it.
    let state = match load_snapshot(&config.snapshot_path)? {
        Some(snapshot) => {
            info!(seq = snapshot.seq, jobs = snapshot.state.jobs.len(), "loaded snapshot");
            snapshot.state
        }
        None => {
            info!("no snapshot found, starting with empty state");
            MaterializedState::default()
        }
    };

    let queue = Arc::new(JobQueue::open(&config.wal_path, state, SystemClock)?);
    info!(jobs = queue.count_by_state().values().sum::<usize>(), "recovered queue state");

    // 6. Remove a stale socket and bind - only after all validation passes.
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener =
        UnixListener::bind(&config.socket_path).map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!("daemon started");

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            job_config,
            lock_file,
            queue,
            reconciler: Arc::new(Reconciler::default()),
            start_time: Instant::now(),
        },
        listener,
    })
}

fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.version_path.exists() {
        let _ = std::fs::remove_file(&config.version_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}
