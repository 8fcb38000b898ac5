// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline specification: a named, versioned, ordered list of stages.
//!
//! The wire format is JSON with camelCase keys. Every optional field has a
//! documented default; unknown fields are tolerated so operators can annotate
//! specs freely. The spec is read-only after load.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating a pipeline specification.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read pipeline spec {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse pipeline spec {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid pipeline spec: {reason}")]
    Invalid { reason: String },
}

/// Top-level pipeline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub stages: Vec<StageSpec>,
}

/// One stage: an external processor plus its inputs, outputs, and policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSpec {
    pub name: String,
    /// Path to the processor program. `.py` files run under `python3`;
    /// anything else is executed directly.
    pub processor: PathBuf,
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub idempotency: IdempotencyPolicy,
    #[serde(default)]
    pub checkpoint: CheckpointPolicy,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub resources: ResourceHints,
    /// Opaque mapping handed to the processor as canonical JSON.
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "default_true")]
    pub offline_guard: bool,
    #[serde(default = "default_true")]
    pub use_lock: bool,
    /// How long to wait for the stage lock before giving up.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_seconds: u64,
    /// Wall-clock ceiling for a single processor invocation.
    #[serde(default = "default_stage_timeout")]
    pub timeout_seconds: u64,
}

/// Idempotency skipping: when enabled, a stage whose fingerprint matches the
/// recorded key (and whose completion marker exists) is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for IdempotencyPolicy {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Mid-stage resume: when enabled, the processor receives the persisted
/// line offset and is expected to flush progress records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// How often (in lines) the processor should flush progress.
    #[serde(default)]
    pub line_interval: u64,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: f64,
    #[serde(default)]
    pub jitter_seconds: f64,
    /// Empty set means any non-zero exit is retryable.
    #[serde(default)]
    pub retryable_exit_codes: Vec<i32>,
    /// Seed for the jitter PRNG; deterministic when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_seconds: default_base_delay(),
            max_delay_seconds: default_max_delay(),
            jitter_seconds: 0.0,
            retryable_exit_codes: Vec::new(),
            seed: None,
        }
    }
}

/// Advisory resource hints passed to the processor and applied best-effort
/// by the invoker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "memoryMB")]
    pub memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_concurrency: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_lock_timeout() -> u64 {
    10
}

fn default_stage_timeout() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    1
}

fn default_base_delay() -> f64 {
    0.5
}

fn default_max_delay() -> f64 {
    30.0
}

impl PipelineSpec {
    /// Load and validate a pipeline spec from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let text = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.to_owned(),
            source,
        })?;
        let spec: Self = serde_json::from_str(&text).map_err(|source| SpecError::Parse {
            path: path.to_owned(),
            source,
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Structural checks beyond what serde enforces.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.is_empty() {
            return Err(SpecError::Invalid {
                reason: "pipeline name must not be empty".into(),
            });
        }
        if self.stages.is_empty() {
            return Err(SpecError::Invalid {
                reason: "pipeline must declare at least one stage".into(),
            });
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.is_empty() {
                return Err(SpecError::Invalid {
                    reason: "stage name must not be empty".into(),
                });
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(SpecError::Invalid {
                    reason: format!("duplicate stage name '{}'", stage.name),
                });
            }
            if stage.output_dir.as_os_str().is_empty() {
                return Err(SpecError::Invalid {
                    reason: format!("stage '{}' has an empty outputDir", stage.name),
                });
            }
            if stage.retry.max_attempts == 0 {
                return Err(SpecError::Invalid {
                    reason: format!("stage '{}' has retry.maxAttempts = 0", stage.name),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
