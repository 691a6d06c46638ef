// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbox file watcher (§4.3): recursive, depth-bounded, write-completion
//! debounced. Built on the `notify` crate the way the teacher's agent log
//! watcher (`crates/adapters/src/agent/watcher.rs`) turns raw filesystem
//! events into a `tokio::select!` loop — generalized here from tailing one
//! log file to discovering many candidate audio files across a tree.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// A file the Watcher has decided is ready to enqueue: it passed the
/// extension/size checks, its name is already sanitized, and its id is
/// computed (§4.2 steps 2-3). The daemon's listener task turns this into a
/// `JobQueue::enqueue` call (§4.3 step 4).
#[derive(Debug, Clone)]
pub struct DetectedFile {
    pub job_id: scriv_core::JobId,
    pub path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
    pub mtime_ms: i64,
}

pub struct WatcherConfig {
    pub inbox_root: PathBuf,
    /// Bounded recursion depth relative to `inbox_root` (default 3).
    pub max_depth: usize,
    pub allowed_extensions: Vec<String>,
    pub min_file_size: u64,
    pub max_file_size: u64,
    /// Quiet period a file's size/mtime must hold steady for before
    /// submission (§4.3).
    pub debounce: Duration,
}

struct PendingFile {
    size: u64,
    mtime_ms: i64,
    last_changed: tokio::time::Instant,
}

/// Watches `inbox_root` for settled audio files. Per §4.3's final sentence,
/// callers must not construct this until Reconciliation has completed.
pub struct InboxWatcher {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl InboxWatcher {
    /// Spawn the watcher task. Detected files arrive on `detected_tx`.
    pub fn spawn(config: WatcherConfig, detected_tx: mpsc::Sender<DetectedFile>) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(run(config, detected_tx, shutdown_rx));
        Self { shutdown_tx: Some(shutdown_tx) }
    }

    /// Tell the watcher to stop accepting new submissions (§4.7 shutdown
    /// step 1). A no-op if already stopped.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn depth_under(root: &Path, path: &Path) -> Option<usize> {
    path.strip_prefix(root).ok().map(|rel| rel.components().count())
}

fn create_fs_watcher(root: &Path, tx: mpsc::Sender<PathBuf>) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let Ok(event) = res else { return };
        for path in event.paths {
            let _ = tx.blocking_send(path);
        }
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

async fn run(config: WatcherConfig, detected_tx: mpsc::Sender<DetectedFile>, mut shutdown_rx: oneshot::Receiver<()>) {
    let (fs_tx, mut fs_rx) = mpsc::channel(256);
    let _watcher_guard = match create_fs_watcher(&config.inbox_root, fs_tx) {
        Ok(w) => Some(w),
        Err(err) => {
            tracing::error!(error = %err, root = %config.inbox_root.display(), "failed to start inbox watcher");
            return;
        }
    };

    let mut pending: HashMap<PathBuf, PendingFile> = HashMap::new();
    let tick = config.debounce.max(Duration::from_millis(100)) / 2;
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            Some(path) = fs_rx.recv() => {
                note_event(&config, &mut pending, path);
            }
            _ = interval.tick() => {
                submit_quiet_files(&config, &mut pending, &detected_tx).await;
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("inbox watcher shutdown requested");
                break;
            }
        }
    }
}

fn note_event(config: &WatcherConfig, pending: &mut HashMap<PathBuf, PendingFile>, path: PathBuf) {
    let Some(depth) = depth_under(&config.inbox_root, &path) else { return };
    if depth > config.max_depth {
        return;
    }
    let Ok(metadata) = std::fs::metadata(&path) else {
        pending.remove(&path);
        return;
    };
    if !metadata.is_file() {
        return;
    }
    let mtime_ms = mtime_ms(&metadata);
    let size = metadata.len();
    pending
        .entry(path)
        .and_modify(|p| {
            if p.size != size || p.mtime_ms != mtime_ms {
                p.size = size;
                p.mtime_ms = mtime_ms;
                p.last_changed = tokio::time::Instant::now();
            }
        })
        .or_insert(PendingFile { size, mtime_ms, last_changed: tokio::time::Instant::now() });
}

async fn submit_quiet_files(
    config: &WatcherConfig,
    pending: &mut HashMap<PathBuf, PendingFile>,
    detected_tx: &mpsc::Sender<DetectedFile>,
) {
    let now = tokio::time::Instant::now();
    let quiet: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, p)| now.duration_since(p.last_changed) >= config.debounce)
        .map(|(path, _)| path.clone())
        .collect();

    for path in quiet {
        pending.remove(&path);
        if let Some(detected) = validate_and_prepare(config, &path) {
            if detected_tx.send(detected).await.is_err() {
                return;
            }
        }
    }
}

/// §4.3 "Per detection" steps 1-3.
fn validate_and_prepare(config: &WatcherConfig, path: &Path) -> Option<DetectedFile> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    if !config.allowed_extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension)) {
        return None;
    }
    let size_bytes = metadata.len();
    if size_bytes < config.min_file_size || size_bytes > config.max_file_size {
        return None;
    }

    let sanitized = crate::fsutil::sanitize_in_place(path);
    let mtime_ms = mtime_ms(&std::fs::metadata(&sanitized).ok()?);
    let display_name = sanitized.file_name()?.to_string_lossy().into_owned();
    let source_path = sanitized.to_string_lossy().into_owned();
    let job_id = scriv_core::derive_job_id(&source_path, size_bytes, mtime_ms);

    Some(DetectedFile { job_id, path: sanitized, display_name, size_bytes, mtime_ms })
}

fn mtime_ms(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
