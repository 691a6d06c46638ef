// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::io;
use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Default timeout for the transcription subprocess (§4.5 step 3). Generous
/// relative to `lease_duration_ms` because the worker renews its lease
/// periodically while the subprocess runs; this is a hard ceiling against a
/// genuinely wedged binary.
pub const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(900);

/// Typed outcome of a failed subprocess launch/run, classified here at the
/// adapter boundary (§4.5/§9: error classification belongs at the
/// subprocess-adapter boundary, not string-matched deep in the worker).
/// Callers match on the variant, never on `to_string()`.
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{description} timed out after {timeout_secs}s")]
    Timeout { description: String, timeout_secs: u64 },
    #[error("{description} binary not found")]
    NotFound { description: String },
    #[error("{description} failed: {source}")]
    Io {
        description: String,
        #[source]
        source: io::Error,
    },
}

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, classifying the
/// failure into a [`SubprocessError`] variant rather than a formatted
/// string. The child process is killed automatically if the timeout
/// elapses (via the tokio `Child` drop implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, SubprocessError> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) if io_err.kind() == io::ErrorKind::NotFound => {
            Err(SubprocessError::NotFound { description: description.to_string() })
        }
        Ok(Err(io_err)) => {
            Err(SubprocessError::Io { description: description.to_string(), source: io_err })
        }
        Err(_elapsed) => Err(SubprocessError::Timeout {
            description: description.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
