// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-stage state machine.
//!
//! `Pending → Planning → (Skipped | Attempting → Succeeded | Failed)`.
//!
//! Planning decides skip vs. run: the offline guard runs first, then the
//! fingerprint + completion-marker check, then the checkpoint read, and
//! finally the stage lock. The attempt loop persists every attempt's start
//! and end into stage state before moving on, and on success writes in the
//! crash-safe order: completion marker, checkpoint, stage state. A reader
//! that observes any prefix of those writes after a crash sees a state that
//! simply re-runs the stage.

use crate::invoker::{invoke, InvokeError, Invocation};
use crate::lock::{LockError, StageLock};
use crate::shutdown::Shutdown;
use serde_json::json;
use stagehand_core::{
    compute_key, scan_processor, AttemptRecord, Clock, GuardError, RetryPolicy, StageResult,
    StageSpec, StageStatus, SystemClock,
};
use stagehand_storage::{
    read_checkpoint, write_checkpoint, write_text_atomic, AuditError, AuditLog, Layout,
    StageState, StoreError,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Terminal stage failures that abort the attempt loop outright.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes one stage at a time for one run.
pub struct StageExecutor<C: Clock = SystemClock> {
    layout: Layout,
    run_id: String,
    clock: C,
}

impl StageExecutor<SystemClock> {
    pub fn new(layout: Layout, run_id: impl Into<String>) -> Self {
        Self::with_clock(layout, run_id, SystemClock)
    }
}

impl<C: Clock> StageExecutor<C> {
    pub fn with_clock(layout: Layout, run_id: impl Into<String>, clock: C) -> Self {
        Self {
            layout,
            run_id: run_id.into(),
            clock,
        }
    }

    /// Run one stage to its terminal status.
    ///
    /// Never propagates an error: terminal failures become a `failed`
    /// result, persisted and audited best-effort, so the driver can record
    /// the stage and stop the run cleanly.
    pub async fn run_stage(
        &self,
        stage: &StageSpec,
        audit: &mut AuditLog,
        shutdown: &Shutdown,
    ) -> StageResult {
        let span = tracing::info_span!("stage", stage = %stage.name);
        let _guard = span.enter();

        let started = Instant::now();
        let result = self.execute(stage, audit, shutdown).await;
        let elapsed = started.elapsed();

        match result {
            Ok(result) => {
                info!(
                    status = %result.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "stage finished"
                );
                result
            }
            Err(e) => {
                // A lock timeout means another executor owns this stage's
                // state files; leave them to the holder.
                let persist_state = !matches!(e, StageError::Lock(LockError::Unavailable { .. }));
                let message = e.to_string();
                warn!(error = %message, "stage failed");
                self.record_terminal_failure(stage, audit, &message, persist_state);
                println!("[FAIL] {}: {}", stage.name, message);
                StageResult::failed(&stage.name, 0, message)
            }
        }
    }

    async fn execute(
        &self,
        stage: &StageSpec,
        audit: &mut AuditLog,
        shutdown: &Shutdown,
    ) -> Result<StageResult, StageError> {
        let started = Instant::now();
        std::fs::create_dir_all(&stage.output_dir)?;
        let mut state = StageState::load(&self.layout, &stage.name)?;

        // Guard violations are terminal before anything else happens; a
        // stage that would break the offline promise never spawns.
        if stage.offline_guard {
            scan_processor(&stage.processor)?;
        }

        let idem_key = if stage.idempotency.enabled {
            Some(compute_key(
                &stage.inputs,
                &stage.processor,
                &stage.params,
            )?)
        } else {
            None
        };

        // Skip needs both halves: the recorded key and the marker. Either
        // alone means the previous run did not finish its write sequence.
        if let Some(key) = &idem_key {
            let marker = Layout::marker_path(&stage.output_dir, &stage.name);
            if state.idempotency_key.as_deref() == Some(key.as_str()) && marker.exists() {
                audit.append(
                    self.clock.now_iso(),
                    Some(&stage.name),
                    "skip",
                    "idempotency key matched",
                    None,
                )?;
                println!("[SKIP] {}", stage.name);
                return Ok(StageResult::skipped(&stage.name));
            }
        }

        let line_offset = if stage.checkpoint.enabled {
            read_checkpoint(&self.layout, &stage.name)
        } else {
            0
        };

        let _lock = if stage.use_lock {
            Some(
                StageLock::acquire(
                    &self.layout.lock_path(&stage.name),
                    &stage.name,
                    Duration::from_secs(stage.lock_timeout_seconds),
                )
                .await?,
            )
        } else {
            None
        };

        if !stage.processor.exists() {
            return Err(InvokeError::ProcessorMissing {
                path: stage.processor.clone(),
            }
            .into());
        }

        self.attempt_loop(stage, audit, shutdown, &mut state, idem_key, line_offset, started)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt_loop(
        &self,
        stage: &StageSpec,
        audit: &mut AuditLog,
        shutdown: &Shutdown,
        state: &mut StageState,
        idem_key: Option<String>,
        line_offset: u64,
        started: Instant,
    ) -> Result<StageResult, StageError> {
        let mut policy = RetryPolicy::new(&stage.retry);
        let progress_path = self.layout.progress_path(&stage.name);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            state
                .history
                .push(AttemptRecord::started(attempt, self.clock.now_iso()));
            state.attempts = attempt;
            state.save(&self.layout, &stage.name)?;
            audit.append(
                self.clock.now_iso(),
                Some(&stage.name),
                "start",
                &format!("attempt {attempt} of {}", policy.max_attempts()),
                Some(json!({ "attempt": attempt })),
            )?;

            let invocation = Invocation {
                stage,
                run_id: &self.run_id,
                line_offset,
                progress_path: &progress_path,
                attempt,
            };
            let outcome = match invoke(&invocation, shutdown).await {
                Ok(outcome) => outcome,
                Err(InvokeError::Cancelled) => {
                    let message = "cancelled by operator signal".to_string();
                    self.close_attempt(state, StageStatus::Failed, None, Some(message.clone()));
                    state.last_status = Some(StageStatus::Failed);
                    state.last_error = Some(message.clone());
                    state.save(&self.layout, &stage.name)?;
                    audit.append(
                        self.clock.now_iso(),
                        Some(&stage.name),
                        "fail",
                        &message,
                        Some(json!({ "attempt": attempt, "cancelled": true })),
                    )?;
                    println!("[FAIL] {}: {}", stage.name, message);
                    return Ok(StageResult::failed(&stage.name, attempt, message));
                }
                Err(e) => return Err(e.into()),
            };

            if outcome.success() {
                self.close_attempt(state, StageStatus::Ok, Some(0), None);

                // Crash-safe write order: marker, checkpoint, stage state.
                let marker = Layout::marker_path(&stage.output_dir, &stage.name);
                write_text_atomic(&marker, &self.clock.now_iso())?;

                if stage.checkpoint.enabled {
                    // The processor owned the progress file during the run;
                    // rewrite it under the engine's atomic discipline. The
                    // floor keeps the offset monotonic even against a
                    // processor that reported less than it resumed from.
                    let reported = read_checkpoint(&self.layout, &stage.name);
                    write_checkpoint(&self.layout, &stage.name, reported.max(line_offset))?;
                }

                let duration = started.elapsed().as_secs_f64();
                state.last_status = Some(StageStatus::Ok);
                state.last_duration_sec = Some(duration);
                state.last_error = None;
                if let Some(key) = idem_key.as_ref() {
                    state.idempotency_key = Some(key.clone());
                }
                state.save(&self.layout, &stage.name)?;

                audit.append(
                    self.clock.now_iso(),
                    Some(&stage.name),
                    "done",
                    &format!("ok after {attempt} attempt(s)"),
                    Some(json!({ "attempts": attempt, "durationSec": duration })),
                )?;
                println!("[DONE] {} in {duration:.3}s", stage.name);
                return Ok(StageResult::ok(&stage.name, attempt));
            }

            let message = outcome.error_message();
            self.close_attempt(
                state,
                StageStatus::Failed,
                outcome.exit_code,
                Some(message.clone()),
            );
            state.last_status = Some(StageStatus::Failed);
            state.last_error = Some(message.clone());
            state.save(&self.layout, &stage.name)?;
            audit.append(
                self.clock.now_iso(),
                Some(&stage.name),
                "fail",
                &message,
                Some(json!({ "attempt": attempt, "exitCode": outcome.exit_code })),
            )?;

            if policy.should_retry(attempt, outcome.exit_code) {
                let delay = policy.delay_for(attempt);
                println!(
                    "[RETRY] {} attempt {attempt}/{} failed; retrying in {:.2}s",
                    stage.name,
                    policy.max_attempts(),
                    delay.as_secs_f64()
                );
                warn!(
                    attempt,
                    exit_code = ?outcome.exit_code,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, backing off"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => continue,
                    () = shutdown.cancelled() => {
                        let message = "cancelled by operator signal".to_string();
                        state.last_error = Some(message.clone());
                        state.save(&self.layout, &stage.name)?;
                        println!("[FAIL] {}: {}", stage.name, message);
                        return Ok(StageResult::failed(&stage.name, attempt, message));
                    }
                }
            }

            println!("[FAIL] {}: {}", stage.name, message);
            return Ok(StageResult::failed(&stage.name, attempt, message));
        }
    }

    /// Complete the most recent history record in place.
    fn close_attempt(
        &self,
        state: &mut StageState,
        status: StageStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) {
        if let Some(record) = state.history.last_mut() {
            record.close(self.clock.now_iso(), status, exit_code, error);
        }
    }

    /// Best-effort bookkeeping for failures outside the attempt loop
    /// (guard violation, lock timeout, missing processor, I/O).
    fn record_terminal_failure(
        &self,
        stage: &StageSpec,
        audit: &mut AuditLog,
        message: &str,
        persist_state: bool,
    ) {
        if persist_state {
            let mut state = StageState::load(&self.layout, &stage.name).unwrap_or_default();
            state.last_status = Some(StageStatus::Failed);
            state.last_error = Some(message.to_string());
            if let Err(e) = state.save(&self.layout, &stage.name) {
                warn!(error = %e, "could not persist failed stage state");
            }
        }
        if let Err(e) = audit.append(
            self.clock.now_iso(),
            Some(&stage.name),
            "fail",
            message,
            None,
        ) {
            warn!(error = %e, "could not audit stage failure");
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
