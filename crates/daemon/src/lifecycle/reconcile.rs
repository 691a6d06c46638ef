// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Reconciliation Engine (§4.4): reconcile on-disk inbox contents
//! against the Queue's non-terminal jobs, self-healing anything the Queue
//! lost track of (a crash between a file landing and its `enqueue` call).

use scriv_core::job::JobState;
use scriv_core::{Clock, Config as JobConfig};
use scriv_storage::JobQueue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::warn;

pub use scriv_engine::ReconciliationReport;

/// Extensions a completed-or-partial transcript may have been written
/// under, per §4.4 step 3.
const TRANSCRIPT_EXTENSIONS: &[&str] = &["txt", "vtt", "json"];

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("a reconciliation is already in progress")]
    AlreadyInProgress,
}

/// Single-flight guard around the reconciliation algorithm (§4.4
/// "Concurrency"): the boot-time call and any on-demand Control Surface
/// call share one of these.
#[derive(Default)]
pub struct Reconciler {
    in_progress: AtomicBool,
}

impl Reconciler {
    /// Run one reconciliation pass. Returns `AlreadyInProgress` rather than
    /// queueing behind a concurrent call.
    pub fn run<C: Clock>(&self, queue: &JobQueue<C>, config: &JobConfig) -> Result<ReconciliationReport, ReconcileError> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            return Err(ReconcileError::AlreadyInProgress);
        }
        let result = reconcile_once(queue, config);
        self.in_progress.store(false, Ordering::SeqCst);
        Ok(result)
    }
}

fn reconcile_once<C: Clock>(queue: &JobQueue<C>, config: &JobConfig) -> ReconciliationReport {
    let started = Instant::now();

    // Step 1: enumerate candidate files in the inbox tree.
    let candidates = enumerate_candidates(&config.watch_directory, config.reconcile_depth, &config.supported_formats);

    // Step 2: the set of non-terminal jobs' source_paths.
    let known_sources: HashSet<String> = [JobState::Waiting, JobState::Delayed, JobState::Active]
        .into_iter()
        .flat_map(|state| queue.list(Some(state), 0, usize::MAX))
        .map(|job| job.source_path)
        .collect();

    let mut jobs_created = 0;
    let mut partial_files_deleted = 0;

    // Step 3: self-heal on-disk files the Queue doesn't know about.
    for path in &candidates {
        let source_path = path.to_string_lossy().into_owned();
        if known_sources.contains(&source_path) {
            continue;
        }

        let relative_dir = path
            .parent()
            .and_then(|p| p.strip_prefix(&config.watch_directory).ok())
            .unwrap_or_else(|| Path::new(""));
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            let deleted =
                scriv_adapters::fsutil::delete_partial_artifacts(&config.output_directory, relative_dir, stem, TRANSCRIPT_EXTENSIONS);
            partial_files_deleted += deleted;
        }

        let Ok(metadata) = std::fs::metadata(path) else { continue };
        let size_bytes = metadata.len();
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let display_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let job_id = scriv_core::derive_job_id(&source_path, size_bytes, mtime_ms);

        queue.enqueue(
            job_id.clone(),
            source_path.clone(),
            display_name,
            size_bytes,
            mtime_ms,
            scriv_core::job::Priority::default(),
            config.max_attempts,
        );
        jobs_created += 1;
        warn!(job_id = %job_id, source_path = %source_path, "[SELF-HEAL] reconciled untracked inbox file");
    }

    // Step 4: non-terminal jobs whose source is missing from disk are left
    // untouched — a worker may be mid-transit, or terminal policy will
    // eventually retire them.

    ReconciliationReport {
        files_scanned: candidates.len(),
        jobs_created,
        partial_files_deleted,
        jobs_reconciled: known_sources.len(),
        duration_ms: started.elapsed().as_millis() as i64,
    }
}

/// Recursively enumerate files under `root` up to `max_depth` path
/// components deep, filtering by allowed extension (case-insensitive).
/// Errors reading a directory are logged and skipped rather than aborting
/// the scan.
///
/// `depth` counts the same way `InboxWatcher::depth_under` does (path
/// components relative to `root`, the filename included) so the two
/// components agree on which files are in bounds: a file directly in
/// `root` is depth 1, one in a subdirectory is depth 2, and so on.
fn enumerate_candidates(root: &Path, max_depth: usize, allowed_extensions: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(root, 1, max_depth, allowed_extensions, &mut out);
    out
}

fn walk(dir: &Path, depth: usize, max_depth: usize, allowed_extensions: &[String], out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if depth > 1 {
                warn!(dir = %dir.display(), error = %err, "failed to read directory during reconciliation");
            }
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            if depth < max_depth {
                walk(&path, depth + 1, max_depth, allowed_extensions, out);
            }
            continue;
        }
        if !file_type.is_file() || depth > max_depth {
            continue;
        }
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        if allowed_extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension)) {
            out.push(path);
        }
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
