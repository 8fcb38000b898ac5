// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run driver: walks the stage list strictly in order.
//!
//! A run is `running` from the first persisted write until every stage has
//! finished or the first failure stops the walk. Stage outcomes are
//! persisted by the executor before the next stage begins; the driver owns
//! the run state, the metrics document, and the `run_start`/`run_end`
//! audit events.

use crate::executor::StageExecutor;
use crate::shutdown::Shutdown;
use serde_json::json;
use stagehand_core::{Clock, PipelineSpec, RunStatus, StageResult, StageStatus, SystemClock};
use stagehand_storage::{AuditError, AuditLog, Layout, RunMetrics, RunState, StoreError};
use thiserror::Error;
use tracing::info;

/// Failures of the run scaffolding itself (not of a stage).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a completed run looks like to the caller.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunStatus,
    pub metrics: RunMetrics,
}

impl RunOutcome {
    /// Process exit code: 0 iff the run completed.
    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunStatus::Completed => 0,
            _ => 1,
        }
    }
}

pub struct RunDriver<C: Clock = SystemClock> {
    layout: Layout,
    clock: C,
    shutdown: Shutdown,
}

impl RunDriver<SystemClock> {
    pub fn new(layout: Layout, shutdown: Shutdown) -> Self {
        Self::with_clock(layout, shutdown, SystemClock)
    }
}

impl<C: Clock> RunDriver<C> {
    pub fn with_clock(layout: Layout, shutdown: Shutdown, clock: C) -> Self {
        Self {
            layout,
            clock,
            shutdown,
        }
    }

    /// Execute every stage of `spec` in order under `run_id`.
    pub async fn run(&self, spec: &PipelineSpec, run_id: &str) -> Result<RunOutcome, DriverError> {
        self.layout.ensure()?;

        let mut audit = AuditLog::open(&self.layout, run_id);
        let mut run_state = RunState {
            run_id: run_id.to_string(),
            pipeline: spec.name.clone(),
            version: spec.version.clone(),
            started_at: self.clock.now_iso(),
            ended_at: None,
            state: RunStatus::Running,
        };
        run_state.save(&self.layout)?;
        audit.append(
            self.clock.now_iso(),
            None,
            "run_start",
            &format!("pipeline {} run {}", spec.name, run_id),
            Some(json!({ "stages": spec.stages.len() })),
        )?;
        info!(pipeline = %spec.name, run_id, stages = spec.stages.len(), "run started");

        let executor = StageExecutor::with_clock(self.layout.clone(), run_id, self.clock.clone());
        let mut results: Vec<StageResult> = Vec::with_capacity(spec.stages.len());

        for stage in &spec.stages {
            if self.shutdown.is_cancelled() {
                results.push(StageResult::failed(
                    &stage.name,
                    0,
                    "cancelled before start",
                ));
                break;
            }
            let result = executor.run_stage(stage, &mut audit, &self.shutdown).await;
            let failed = result.status == StageStatus::Failed;
            results.push(result);
            if failed {
                break;
            }
        }

        let failed = results.iter().any(|r| r.status == StageStatus::Failed);
        run_state.state = if failed {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run_state.ended_at = Some(self.clock.now_iso());
        run_state.save(&self.layout)?;

        let metrics = RunMetrics::aggregate(run_id, self.clock.now_iso(), results);
        metrics.save(&self.layout)?;

        audit.append(
            self.clock.now_iso(),
            None,
            "run_end",
            &run_state.state.to_string(),
            Some(json!({
                "okStages": metrics.ok_stages,
                "skippedStages": metrics.skipped_stages,
                "failedStages": metrics.failed_stages,
            })),
        )?;
        info!(state = %run_state.state, "run finished");
        println!("Run {} state: {}", run_id, run_state.state);

        Ok(RunOutcome {
            state: run_state.state,
            metrics,
        })
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
