// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint records for mid-stage resume.
//!
//! The record is a single `{"lineOffset": N}` document at
//! `state/progress_{name}.json`. During an attempt the processor owns the
//! file; the engine reads it before invocation and rewrites it atomically
//! after a successful attempt. A failed attempt never touches it, which is
//! what keeps the offset monotonic across crashes.

use crate::atomic::{read_json, write_json_atomic, StoreError};
use crate::layout::Layout;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    #[serde(default)]
    pub line_offset: u64,
}

/// Read the checkpoint for `stage`; missing or corrupt records read as 0.
pub fn read_checkpoint(layout: &Layout, stage: &str) -> u64 {
    match read_json::<CheckpointRecord>(&layout.progress_path(stage)) {
        Ok(Some(record)) => record.line_offset,
        Ok(None) => 0,
        Err(e) => {
            warn!(stage, error = %e, "corrupt progress record, resuming from 0");
            0
        }
    }
}

/// Persist the checkpoint for `stage` atomically.
pub fn write_checkpoint(layout: &Layout, stage: &str, line_offset: u64) -> Result<(), StoreError> {
    write_json_atomic(
        &layout.progress_path(stage),
        &CheckpointRecord { line_offset },
    )
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
