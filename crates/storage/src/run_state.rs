// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run state and aggregate metrics.

use crate::atomic::{read_json, write_json_atomic, StoreError};
use crate::layout::Layout;
use serde::{Deserialize, Serialize};
use stagehand_core::{RunStatus, StageResult, StageStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: String,
    pub pipeline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub state: RunStatus,
}

impl RunState {
    pub fn load(layout: &Layout, run_id: &str) -> Result<Option<Self>, StoreError> {
        read_json(&layout.run_state_path(run_id))
    }

    pub fn save(&self, layout: &Layout) -> Result<(), StoreError> {
        write_json_atomic(&layout.run_state_path(&self.run_id), self)
    }
}

/// Aggregate counts plus the per-stage result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub run_id: String,
    pub timestamp: String,
    pub stages: Vec<StageResult>,
    pub total_stages: usize,
    pub ok_stages: usize,
    pub skipped_stages: usize,
    pub failed_stages: usize,
}

impl RunMetrics {
    /// Tally results into the aggregate counts.
    pub fn aggregate(run_id: &str, timestamp: String, stages: Vec<StageResult>) -> Self {
        let count = |status: StageStatus| stages.iter().filter(|r| r.status == status).count();
        Self {
            run_id: run_id.to_string(),
            timestamp,
            total_stages: stages.len(),
            ok_stages: count(StageStatus::Ok),
            skipped_stages: count(StageStatus::Skipped),
            failed_stages: count(StageStatus::Failed),
            stages,
        }
    }

    pub fn load(layout: &Layout, run_id: &str) -> Result<Option<Self>, StoreError> {
        read_json(&layout.metrics_path(run_id))
    }

    pub fn save(&self, layout: &Layout) -> Result<(), StoreError> {
        write_json_atomic(&layout.metrics_path(&self.run_id), self)
    }
}

#[cfg(test)]
#[path = "run_state_tests.rs"]
mod tests;
