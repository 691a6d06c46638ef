// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable storage layer for the transcription dispatcher: a JSONL
//! write-ahead log, zstd-compressed checkpoint snapshots with schema
//! migration, the materialized queue state they produce, and the
//! `JobQueue` operations built on top of all three.

mod checkpoint;
mod migration;
mod queue;
mod snapshot;
mod state;
mod wal;

/// Current snapshot schema version, consulted by [`migration::MigrationRegistry`]
/// when loading an older snapshot. There is only one schema today; this
/// constant is the hook a future migration would bump.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

pub use checkpoint::{
    load_snapshot, CheckpointError, CheckpointHandle, CheckpointResult, CheckpointWriter,
    Checkpointer, FsCheckpointWriter,
};
pub use migration::{Migration, MigrationError, MigrationRegistry};
pub use queue::{JobQueue, QueueError};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::{MaterializedState, PriorityKey};
pub use wal::{Wal, WalEntry, WalError};
