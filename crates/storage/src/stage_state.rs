// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-stage durable state, keyed by stage name.
//!
//! Rewritten atomically at attempt boundaries and stage completion. The
//! recorded `idempotencyKey` is one half of the "previously succeeded"
//! judgment; the completion marker is the other. History is append-only:
//! a failed attempt adds a record, it never erases earlier ones.

use crate::atomic::{read_json, write_json_atomic, StoreError};
use crate::layout::Layout;
use serde::{Deserialize, Serialize};
use stagehand_core::{AttemptRecord, StageStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    /// Fingerprint recorded on the last successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<StageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_duration_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub history: Vec<AttemptRecord>,
}

impl StageState {
    /// Load the state for `stage`, defaulting to empty when absent.
    pub fn load(layout: &Layout, stage: &str) -> Result<Self, StoreError> {
        Ok(read_json(&layout.stage_state_path(stage))?.unwrap_or_default())
    }

    /// Persist atomically.
    pub fn save(&self, layout: &Layout, stage: &str) -> Result<(), StoreError> {
        write_json_atomic(&layout.stage_state_path(stage), self)
    }
}

#[cfg(test)]
#[path = "stage_state_tests.rs"]
mod tests;
