// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration surface (spec §9). Loading is an external collaborator —
//! this module defines the shape and a convenience loader, the way the
//! daemon's own `lifecycle::Config` resolves its fixed paths.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

fn default_supported_formats() -> Vec<String> {
    vec!["mp3".into(), "wav".into(), "m4a".into(), "flac".into(), "ogg".into()]
}

fn default_min_file_size() -> u64 {
    1024
}

fn default_max_file_size() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_max_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_lease_duration_ms() -> i64 {
    60_000
}

fn default_renewal_interval_ms() -> i64 {
    15_000
}

fn default_stall_scan_interval_ms() -> i64 {
    30_000
}

fn default_max_stalled_count() -> u32 {
    2
}

fn default_shutdown_timeout_ms() -> i64 {
    60_000
}

fn default_reconcile_depth() -> usize {
    3
}

fn default_watch_debounce_ms() -> u64 {
    2_000
}

fn default_terminal_retention_ms() -> i64 {
    12 * 60 * 60 * 1000
}

fn default_subprocess_command_template() -> Vec<String> {
    vec![
        "whisper".into(),
        "{input}".into(),
        "--output_dir".into(),
        "{output_dir}".into(),
    ]
}

/// The full configuration surface, §9. Deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub watch_directory: PathBuf,
    pub output_directory: PathBuf,
    pub completed_directory: PathBuf,
    pub failed_directory: PathBuf,

    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,
    #[serde(default = "default_min_file_size")]
    pub min_file_size: u64,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: i64,
    #[serde(default = "default_renewal_interval_ms")]
    pub renewal_interval_ms: i64,
    #[serde(default = "default_stall_scan_interval_ms")]
    pub stall_scan_interval_ms: i64,
    #[serde(default = "default_max_stalled_count")]
    pub max_stalled_count: u32,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: i64,

    #[serde(default = "default_subprocess_command_template")]
    pub subprocess_command_template: Vec<String>,

    #[serde(default = "default_reconcile_depth")]
    pub reconcile_depth: usize,

    /// Quiet period the Watcher waits for a file's size/mtime to stop
    /// changing before submitting it (§4.3).
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// How long a terminal job's record is kept before bounded retention
    /// pruning removes it (§9 open question, default 12 hours).
    #[serde(default = "default_terminal_retention_ms")]
    pub terminal_retention_ms: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Load and parse a TOML config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
