// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers: the job id newtype, and the deterministic-id derivation
//! used by the watcher and the reconciliation engine.

use md5::{Digest, Md5};

crate::define_id! {
    /// Unique identifier for a job. Always derived deterministically
    /// (see [`derive_job_id`]) rather than randomly generated, so that two
    /// enqueue attempts for the same file produce the same id.
    #[derive(Default)]
    pub struct JobId;
}

/// Derive a stable job id from the triple that identifies "this attempt at
/// transcribing this file": its absolute path, its size, and its mtime.
///
/// Two enqueue attempts with the same `(source_path, size_bytes, mtime_ms)`
/// always produce the same id (invariant 1, spec §3). A new mtime (e.g. the
/// operator replacing a corrupt file with a fixed one at the same path)
/// produces a new id, so it is treated as a distinct job rather than an
/// update to the old one.
///
/// MD5 is used per the spec: the input space is small and adversarially
/// uninteresting (local file metadata), so collision resistance beyond
/// "two different files don't usually collide" is not required.
pub fn derive_job_id(source_path: &str, size_bytes: u64, mtime_ms: i64) -> JobId {
    let input = format!("{source_path}:{size_bytes}:{mtime_ms}");
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    JobId::new(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
