// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One worker's execution of one job, §4.5 "Job execution (one worker, one
//! job)". This is the part of the worker loop that used to be a single
//! `Effect` match arm in the teacher's executor — here it is its own
//! function because a job's execution genuinely has multiple sequential
//! steps with a concurrent lease-renewal side effect, rather than one
//! fire-and-forget command.

use crate::error::ExecuteError;
use scriv_adapters::fsutil;
use scriv_adapters::subprocess::{run_with_timeout, TRANSCRIBE_TIMEOUT};
use scriv_core::{Clock, Config, Job};
use scriv_storage::JobQueue;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Outcome of one execution attempt, for the pool to report to the queue.
pub enum Outcome {
    Completed { transcript_path: String },
    Failed { error: ExecuteError },
}

/// Run job's transcription attempt end to end (§4.5 steps 1-7). Returns
/// `Outcome::Failed` rather than propagating `Err` for every failure that
/// should be attributed to the job record (§4.5 "Failure handling"); an
/// `Err` return is reserved for the lease having already been lost, which
/// the caller must not attribute to this job as a fresh failure.
pub async fn execute_job<C: Clock>(
    job: &Job,
    config: &Config,
    worker_id: &str,
    queue: &JobQueue<C>,
) -> Result<Outcome, ExecuteError> {
    report_progress(job, 0);

    let source = job.source_path_buf();
    if let Err(error) = validate_source(&source) {
        return Ok(attribute(job, &source, config, error));
    }
    report_progress(job, 10);

    let relative_dir = relative_parent(&config.watch_directory, &source);
    let output_dir = config.output_directory.join(&relative_dir);
    if let Err(source_err) = std::fs::create_dir_all(&output_dir) {
        let error = ExecuteError::OutputDir { path: output_dir.clone(), source: source_err };
        return Ok(attribute(job, &source, config, error));
    }
    report_progress(job, 20);

    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let cmd = build_command(&config.subprocess_command_template, &source, &output_dir);
    match run_with_renewal(cmd, job, worker_id, config, queue).await {
        Ok(()) => {}
        Err(error) => return Ok(attribute(job, &source, config, error)),
    }
    report_progress(job, 90);

    let transcript_path = output_dir.join(format!("{stem}.txt"));
    if let Err(error) = validate_transcript(&transcript_path) {
        return Ok(attribute(job, &source, config, error));
    }
    report_progress(job, 95);

    let completed_dest = fsutil::relocated_path(&config.watch_directory, &source, &config.completed_directory);
    if let Err(err) = fsutil::move_file(&source, &completed_dest) {
        tracing::warn!(job_id = %job.id, error = %err, "best-effort relocation to completed tree failed");
    }
    report_progress(job, 100);

    Ok(Outcome::Completed { transcript_path: transcript_path.display().to_string() })
}

fn report_progress(job: &Job, percent: u8) {
    tracing::info!(job_id = %job.id, percent, "job progress");
}

fn relative_parent(root: &Path, source: &Path) -> PathBuf {
    source
        .strip_prefix(root)
        .ok()
        .and_then(|rel| rel.parent())
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn validate_source(source: &Path) -> Result<(), ExecuteError> {
    let metadata = std::fs::metadata(source)
        .map_err(|_| ExecuteError::SourceNotFound(source.display().to_string()))?;
    if !metadata.is_file() {
        return Err(ExecuteError::InvalidInput(source.display().to_string()));
    }
    if metadata.len() == 0 {
        return Err(ExecuteError::InvalidInput(source.display().to_string()));
    }
    std::fs::File::open(source).map_err(|_| ExecuteError::SourceNotReadable(source.display().to_string()))?;
    Ok(())
}

fn validate_transcript(path: &Path) -> Result<(), ExecuteError> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.len() > 0 => Ok(()),
        _ => Err(ExecuteError::InvalidOutput(path.to_path_buf())),
    }
}

/// Substitute `{input}`/`{output_dir}` placeholders in the configured
/// subprocess command template (§9 `subprocess_command_template`).
fn build_command(template: &[String], input: &Path, output_dir: &Path) -> Command {
    let render = |arg: &str| {
        arg.replace("{input}", &input.display().to_string())
            .replace("{output_dir}", &output_dir.display().to_string())
    };
    let program = template.first().map(|s| render(s)).unwrap_or_default();
    let mut cmd = Command::new(program);
    for arg in template.iter().skip(1) {
        cmd.arg(render(arg));
    }
    cmd
}

/// Run the subprocess to completion, renewing the job's lease on a timer the
/// whole time it is alive (§4.5 step 3). Grounded in the teacher's periodic
/// background-task idiom (`spawn_flush_task`/`spawn_checkpoint` in
/// `crates/daemon/src/main.rs`), adapted from a detached task into an inline
/// `tokio::select!` loop since renewal must stop the instant the subprocess
/// returns.
async fn run_with_renewal<C: Clock>(
    cmd: Command,
    job: &Job,
    worker_id: &str,
    config: &Config,
    queue: &JobQueue<C>,
) -> Result<(), ExecuteError> {
    let renewal_period = Duration::from_millis(config.renewal_interval_ms.max(1) as u64);
    let mut renewal = tokio::time::interval(renewal_period);
    renewal.tick().await; // first tick fires immediately; the lease was just granted

    let subprocess = run_with_timeout(cmd, TRANSCRIBE_TIMEOUT, "transcription");
    tokio::pin!(subprocess);

    let output = loop {
        tokio::select! {
            _ = renewal.tick() => {
                if queue.renew(&job.id, worker_id, config.lease_duration_ms).is_err() {
                    return Err(ExecuteError::LeaseLost);
                }
            }
            result = &mut subprocess => break result,
        }
    };

    match output {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(ExecuteError::SubprocessCrash {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Err(subprocess_err) => Err(subprocess_err.into()),
    }
}

/// §4.5 "Failure handling" a-b: attribute the error to a transient
/// `Outcome::Failed` and best-effort relocate the source into the failed
/// tree. The caller (`WorkerPool`) turns this into the `fail` queue call.
fn attribute(job: &Job, source: &Path, config: &Config, error: ExecuteError) -> Outcome {
    if source.exists() {
        let failed_dest = fsutil::relocated_path(&config.watch_directory, source, &config.failed_directory);
        if let Err(err) = fsutil::move_file(source, &failed_dest) {
            tracing::warn!(job_id = %job.id, error = %err, "best-effort relocation to failed tree failed");
        }
    }
    Outcome::Failed { error }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
