// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Reconciliation Report value (§3, §4.4). The reconciliation
//! *algorithm* lives in `scriv_daemon::lifecycle::reconcile` next to the
//! rest of boot sequencing, the same way the teacher keeps
//! `MaterializedState`'s type in `scriv-storage` but drives checkpointing
//! from `crates/daemon/src/main.rs`; this type is the shared contract
//! between the two.

use serde::{Deserialize, Serialize};

/// Summary of one reconciliation pass, returned to the log line and (via
/// the control surface) to `scriv reconcile`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub files_scanned: usize,
    pub jobs_created: usize,
    pub partial_files_deleted: usize,
    pub jobs_reconciled: usize,
    pub duration_ms: i64,
}
