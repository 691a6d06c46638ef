// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: filename/path utilities, the inbox file
//! watcher, and subprocess execution helpers (§4.2, §4.3, §4.5).

pub mod fsutil;
pub mod subprocess;
pub mod watcher;

pub use watcher::{DetectedFile, InboxWatcher, WatcherConfig};
