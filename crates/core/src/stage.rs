// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared status vocabulary for stages and runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status of a stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Ok => write!(f, "ok"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Overall state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One processor invocation, as recorded in `StageState.history`.
///
/// The record is persisted with `startedAt` before the processor runs and
/// completed in place afterwards; a record with no `status` on disk is the
/// footprint of an attempt that was in flight at a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// 1-based attempt counter.
    pub attempt: u32,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    /// Open a record for an attempt that is about to run.
    pub fn started(attempt: u32, started_at: String) -> Self {
        Self {
            attempt,
            started_at,
            ended_at: None,
            status: None,
            exit_code: None,
            error: None,
        }
    }

    /// Close the record with the attempt's outcome.
    pub fn close(
        &mut self,
        ended_at: String,
        status: StageStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) {
        self.ended_at = Some(ended_at);
        self.status = Some(status);
        self.exit_code = exit_code;
        self.error = error;
    }
}

/// Outcome of one stage, aggregated into `RunMetrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    pub fn ok(stage: impl Into<String>, attempts: u32) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Ok,
            attempts: Some(attempts),
            error: None,
        }
    }

    pub fn skipped(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Skipped,
            attempts: None,
            error: None,
        }
    }

    pub fn failed(stage: impl Into<String>, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Failed,
            attempts: Some(attempts),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
