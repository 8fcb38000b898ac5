// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processor invocation.
//!
//! A processor is an external program: inputs arrive as positional
//! arguments, everything else through `PIPELINE_*` environment variables.
//! The invoker captures stdout/stderr as text, records the exit code,
//! enforces the stage's wall-clock timeout, and honors cancellation by
//! killing and awaiting the child. Resource hints are applied best-effort
//! on Unix; a hint the platform cannot honor is ignored silently.

use crate::shutdown::Shutdown;
use stagehand_core::{canonical_json, ResourceHints, StageSpec};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("processor not found: {path}")]
    ProcessorMissing { path: PathBuf },
    #[error("failed to spawn processor {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error waiting on processor: {0}")]
    Io(#[from] std::io::Error),
    #[error("processor cancelled by shutdown signal")]
    Cancelled,
}

/// Everything one attempt needs to know.
pub struct Invocation<'a> {
    pub stage: &'a StageSpec,
    pub run_id: &'a str,
    /// Checkpoint the processor resumes from (0 when fresh).
    pub line_offset: u64,
    /// Absolute-ized before handing to the processor.
    pub progress_path: &'a Path,
    /// 1-based attempt counter.
    pub attempt: u32,
}

/// What one attempt produced.
#[derive(Debug)]
pub struct ProcessorOutcome {
    /// `None` when the processor died without an exit code (signal, timeout).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessorOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Failure message: stderr preferred over stdout, trimmed.
    pub fn error_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("processor exited with code {code}"),
            None => "processor terminated without an exit code".to_string(),
        }
    }
}

/// Run the processor once.
pub async fn invoke(
    inv: &Invocation<'_>,
    shutdown: &Shutdown,
) -> Result<ProcessorOutcome, InvokeError> {
    let processor = &inv.stage.processor;
    if !processor.exists() {
        return Err(InvokeError::ProcessorMissing {
            path: processor.clone(),
        });
    }

    let output_dir = std::path::absolute(&inv.stage.output_dir)?;
    let progress_path = std::path::absolute(inv.progress_path)?;

    let mut cmd = command_for(processor);
    cmd.args(&inv.stage.inputs)
        .env("PIPELINE_STAGE_NAME", &inv.stage.name)
        .env("PIPELINE_RUN_ID", inv.run_id)
        .env("PIPELINE_OUTPUT_DIR", &output_dir)
        .env("PIPELINE_LINE_OFFSET", inv.line_offset.to_string())
        .env(
            "PIPELINE_LINE_INTERVAL",
            inv.stage.checkpoint.line_interval.to_string(),
        )
        .env("PIPELINE_PROGRESS_PATH", &progress_path)
        .env(
            "PIPELINE_PARAMS",
            canonical_json(&serde_json::Value::Object(inv.stage.params.clone())),
        )
        .env("PIPELINE_ATTEMPT", inv.attempt.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let resources = &inv.stage.resources;
    if let Some(cores) = resources.cpu_cores {
        cmd.env("PIPELINE_RESOURCES_CPU_CORES", cores.to_string());
        cmd.env("OMP_NUM_THREADS", cores.to_string());
    }
    if let Some(mb) = resources.memory_mb {
        cmd.env("PIPELINE_RESOURCES_MEMORY_MB", mb.to_string());
    }
    if let Some(io) = resources.io_concurrency {
        cmd.env("PIPELINE_RESOURCES_IO_CONCURRENCY", io.to_string());
    }
    apply_resource_limits(&mut cmd, resources);

    debug!(
        stage = %inv.stage.name,
        processor = %processor.display(),
        attempt = inv.attempt,
        line_offset = inv.line_offset,
        "spawning processor"
    );

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| InvokeError::Spawn {
        path: processor.clone(),
        source,
    })?;

    let stdout_task = child.stdout.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf).await;
            buf
        })
    });
    let stderr_task = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf).await;
            buf
        })
    });

    let timeout = Duration::from_secs(inv.stage.timeout_seconds);
    let exit_code;
    tokio::select! {
        status = child.wait() => {
            exit_code = status?.code();
        }
        () = shutdown.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(InvokeError::Cancelled);
        }
        () = tokio::time::sleep(timeout) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let (stdout, stderr) = collect(stdout_task, stderr_task).await;
            return Ok(ProcessorOutcome {
                exit_code: None,
                stdout,
                stderr: format!(
                    "processor timed out after {}s{}{}",
                    inv.stage.timeout_seconds,
                    if stderr.trim().is_empty() { "" } else { ": " },
                    stderr.trim(),
                ),
                duration: start.elapsed(),
            });
        }
    }

    let (stdout, stderr) = collect(stdout_task, stderr_task).await;
    Ok(ProcessorOutcome {
        exit_code,
        stdout,
        stderr,
        duration: start.elapsed(),
    })
}

async fn collect(
    stdout_task: Option<tokio::task::JoinHandle<String>>,
    stderr_task: Option<tokio::task::JoinHandle<String>>,
) -> (String, String) {
    let stdout = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    (stdout, stderr)
}

/// The processor's path identifies its runtime: `.py` runs under `python3`,
/// anything else resolves as an executable in its own right.
fn command_for(processor: &Path) -> Command {
    if processor.extension().is_some_and(|ext| ext == "py") {
        let mut cmd = Command::new("python3");
        cmd.arg(processor);
        cmd
    } else {
        Command::new(processor)
    }
}

/// Best-effort parent-side governance: address-space cap and CPU affinity.
/// Applied in the child between fork and exec; every failure is silent.
#[cfg(unix)]
fn apply_resource_limits(cmd: &mut Command, resources: &ResourceHints) {
    let memory_mb = resources.memory_mb;
    let cpu_cores = resources.cpu_cores;
    if memory_mb.is_none() && cpu_cores.is_none() {
        return;
    }

    #[allow(unsafe_code)]
    unsafe {
        cmd.pre_exec(move || {
            if let Some(mb) = memory_mb {
                let bytes = mb.saturating_mul(1024 * 1024) as libc::rlim_t;
                let limit = libc::rlimit {
                    rlim_cur: bytes,
                    rlim_max: bytes,
                };
                let _ = unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) };
            }
            #[cfg(target_os = "linux")]
            if let Some(cores) = cpu_cores {
                let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
                unsafe { libc::CPU_ZERO(&mut set) };
                for core in 0..cores.min(1024) {
                    unsafe { libc::CPU_SET(core as usize, &mut set) };
                }
                let _ = unsafe {
                    libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
                };
            }
            #[cfg(not(target_os = "linux"))]
            let _ = cpu_cores;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_resource_limits(_cmd: &mut Command, _resources: &ResourceHints) {}

#[cfg(test)]
#[path = "invoker_tests.rs"]
mod tests;
