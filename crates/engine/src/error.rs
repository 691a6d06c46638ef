// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the execution engine.

use thiserror::Error;

/// Errors raised while running one job-execution attempt (§4.5). These are
/// an implementation detail of `execute_job` — every variant is caught by
/// its caller and classified into a `scriv_core::ErrorCode` (§7) before the
/// job record is touched, so this type never crosses into the queue.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("source file not found: {0}")]
    SourceNotFound(String),
    #[error("source file not readable: {0}")]
    SourceNotReadable(String),
    #[error("source file is not a valid audio file: {0}")]
    InvalidInput(String),
    #[error("failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transcription subprocess crashed with exit code {code:?}: {stderr}")]
    SubprocessCrash { code: Option<i32>, stderr: String },
    #[error("transcription subprocess timed out")]
    SubprocessTimeout,
    #[error("transcription binary not found: {0}")]
    SubprocessNotFound(String),
    #[error("transcript file missing or empty: {0}")]
    InvalidOutput(std::path::PathBuf),
    #[error("lease lost during execution")]
    LeaseLost,
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl From<scriv_adapters::subprocess::SubprocessError> for ExecuteError {
    fn from(err: scriv_adapters::subprocess::SubprocessError) -> Self {
        use scriv_adapters::subprocess::SubprocessError;
        match err {
            SubprocessError::Timeout { .. } => ExecuteError::SubprocessTimeout,
            SubprocessError::NotFound { .. } => ExecuteError::SubprocessNotFound(err.to_string()),
            SubprocessError::Io { .. } => ExecuteError::Unknown(err.to_string()),
        }
    }
}

impl ExecuteError {
    /// Map to the closed error taxonomy (§7 table). This is the single
    /// place execution failures become `scriv_core::ErrorCode` values.
    pub fn to_error_code(&self) -> scriv_core::ErrorCode {
        use scriv_core::ErrorCode;
        match self {
            ExecuteError::SourceNotFound(_) => ErrorCode::ErrFileNotFound,
            ExecuteError::SourceNotReadable(_) => ErrorCode::ErrFileNotReadable,
            ExecuteError::InvalidInput(_) => ErrorCode::ErrFileInvalid,
            ExecuteError::OutputDir { .. } => ErrorCode::ErrSystemUnknown,
            ExecuteError::SubprocessCrash { .. } => ErrorCode::ErrWhisperCrash,
            ExecuteError::SubprocessTimeout => ErrorCode::ErrWhisperTimeout,
            ExecuteError::SubprocessNotFound(_) => ErrorCode::ErrWhisperNotFound,
            ExecuteError::InvalidOutput(_) => ErrorCode::ErrWhisperInvalidOutput,
            ExecuteError::LeaseLost => ErrorCode::ErrSystemUnknown,
            ExecuteError::Unknown(_) => ErrorCode::ErrSystemUnknown,
        }
    }
}
