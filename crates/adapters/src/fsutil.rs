// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filename sanitization, deterministic job ids, and cross-device-safe
//! atomic moves (§4.2).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("failed to move {src} -> {dst}: {source}")]
    Io {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

/// Sanitize `path`'s filename in place. If sanitization changes the name,
/// rename the file on disk and return the new path. If the rename fails,
/// fall back to the original path (best-effort) and log a warning; the
/// caller derives the job id from whichever path is returned.
pub fn sanitize_in_place(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    let sanitized = sanitize_name(name);
    if sanitized == name {
        return path.to_path_buf();
    }
    let dst = path.with_file_name(&sanitized);
    match fs::rename(path, &dst) {
        Ok(()) => dst,
        Err(err) => {
            tracing::warn!(
                path = %path.display(), sanitized = %sanitized, error = %err,
                "failed to rename to sanitized filename, enqueueing under original name"
            );
            path.to_path_buf()
        }
    }
}

/// EXDEV ("cross-device link"), the errno rename(2) returns when src and
/// dst live on different filesystems.
const EXDEV: i32 = 18;

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(EXDEV)
}

/// Move `src` to `dst`, tolerating a cross-device rename by falling back to
/// copy + atomic rename + unlink (§4.2 "Atomic move").
pub fn move_file(src: &Path, dst: &Path) -> Result<(), MoveError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|source| MoveError::Io {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source,
        })?;
    }

    match fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(err) if !is_cross_device(&err) => {
            return Err(MoveError::Io { src: src.to_path_buf(), dst: dst.to_path_buf(), source: err });
        }
        Err(_) => {}
    }

    let tmp_dst = dst.with_extension("tmp");
    if let Err(source) = fs::copy(src, &tmp_dst).map(|_| ()) {
        let _ = fs::remove_file(&tmp_dst);
        return Err(MoveError::Io { src: src.to_path_buf(), dst: dst.to_path_buf(), source });
    }
    if let Err(source) = fs::rename(&tmp_dst, dst) {
        let _ = fs::remove_file(&tmp_dst);
        return Err(MoveError::Io { src: src.to_path_buf(), dst: dst.to_path_buf(), source });
    }
    if let Err(source) = fs::remove_file(src) {
        return Err(MoveError::Io { src: src.to_path_buf(), dst: dst.to_path_buf(), source });
    }
    Ok(())
}

/// Delete any partial transcript artifacts sharing `stem` in `output_root`,
/// by extension (§4.4 step 3). Missing files are ignored.
pub fn delete_partial_artifacts(output_root: &Path, relative_dir: &Path, stem: &str, extensions: &[&str]) -> usize {
    let dir = output_root.join(relative_dir);
    let mut deleted = 0;
    for ext in extensions {
        let path = dir.join(format!("{stem}.{ext}"));
        if fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }
    deleted
}

/// Compute `dst_root`'s path for a file at `source_path` relative to
/// `inbox_root`, preserving directory structure (§4.2 final paragraph).
pub fn relocated_path(inbox_root: &Path, source_path: &Path, dst_root: &Path) -> PathBuf {
    match source_path.strip_prefix(inbox_root) {
        Ok(rel) => dst_root.join(rel),
        Err(_) => dst_root.join(source_path.file_name().unwrap_or_default()),
    }
}

#[cfg(test)]
#[path = "fsutil_tests.rs"]
mod tests;
