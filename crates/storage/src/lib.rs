// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! stagehand-storage: durable on-disk state for the pipeline executor.
//!
//! Every write goes through the atomic write-tmp-then-rename discipline, so
//! a crash at any point leaves either the complete previous version or the
//! complete new version of each file. The layout module owns every path the
//! engine touches.

mod atomic;
mod audit;
mod checkpoint;
mod layout;
mod run_state;
mod stage_state;

pub use atomic::{read_json, write_json_atomic, write_text_atomic, StoreError};
pub use audit::{verify_audit_log, AuditEntry, AuditError, AuditLog};
pub use checkpoint::{read_checkpoint, write_checkpoint, CheckpointRecord};
pub use layout::Layout;
pub use run_state::{RunMetrics, RunState};
pub use stage_state::StageState;
