// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only, hash-chained audit log.
//!
//! One JSONL file per run: `state/audit_{runId}.jsonl`. Each entry carries
//! `prevHash` and `hash = SHA-256(prevHash ∥ canonical(entry-without-hash))`,
//! so truncation, reordering, or edits break the chain at the first
//! tampered line. The writer caches `prevHash` in process and reconciles it
//! from the file tail on first use, so steady-state appends never rescan.

use crate::layout::Layout;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// `prevHash` of the first entry in a log.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// How much of the file tail to scan when reconciling `prevHash`.
const TAIL_SCAN_BYTES: u64 = 4096;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad audit entry in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("audit chain broken at line {line}: {reason}")]
    ChainMismatch { line: usize, reason: String },
}

/// One audit event as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub event: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    pub prev_hash: String,
    pub hash: String,
}

/// Appender for one run's audit log.
pub struct AuditLog {
    path: PathBuf,
    /// Hash of the last entry written; `None` until reconciled from disk.
    prev_hash: Option<String>,
}

impl AuditLog {
    pub fn open(layout: &Layout, run_id: &str) -> Self {
        Self {
            path: layout.audit_path(run_id),
            prev_hash: None,
        }
    }

    /// Append one event. The entry's hash extends the chain from the
    /// previous entry (or the genesis hash for a fresh log).
    pub fn append(
        &mut self,
        ts: String,
        stage: Option<&str>,
        event: &str,
        message: &str,
        extra: Option<Value>,
    ) -> Result<(), AuditError> {
        let prev = match self.prev_hash.take() {
            Some(prev) => prev,
            None => self.reconcile_prev_hash()?,
        };

        let mut body = Map::new();
        body.insert("ts".into(), Value::String(ts));
        if let Some(stage) = stage {
            body.insert("stage".into(), Value::String(stage.to_string()));
        }
        body.insert("event".into(), Value::String(event.to_string()));
        body.insert("message".into(), Value::String(message.to_string()));
        if let Some(extra) = extra {
            body.insert("extra".into(), extra);
        }
        body.insert("prevHash".into(), Value::String(prev.clone()));

        let hash = entry_hash(&prev, &Value::Object(body.clone()).to_string());
        body.insert("hash".into(), Value::String(hash.clone()));

        let mut line = Value::Object(body).to_string();
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| AuditError::Io {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|source| AuditError::Io {
                path: self.path.clone(),
                source,
            })?;

        self.prev_hash = Some(hash);
        Ok(())
    }

    /// Recover the chain head from the file tail (last ~4 KiB) so a
    /// restarted process extends the existing chain instead of forking it.
    fn reconcile_prev_hash(&self) -> Result<String, AuditError> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(GENESIS_HASH.to_string())
            }
            Err(source) => {
                return Err(AuditError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let len = file
            .metadata()
            .map_err(|source| AuditError::Io {
                path: self.path.clone(),
                source,
            })?
            .len();
        let start = len.saturating_sub(TAIL_SCAN_BYTES);
        file.seek(SeekFrom::Start(start))
            .map_err(|source| AuditError::Io {
                path: self.path.clone(),
                source,
            })?;
        let mut tail = String::new();
        file.read_to_string(&mut tail)
            .map_err(|source| AuditError::Io {
                path: self.path.clone(),
                source,
            })?;

        // When the scan window starts mid-line, the first fragment is not a
        // whole entry; every complete line after it is. A torn final line
        // (crash mid-append) is skipped: the chain resumes from the last
        // entry that made it to disk whole, and verification will flag the
        // torn line.
        let last_hash = tail
            .lines()
            .skip(usize::from(start > 0))
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<AuditEntry>(line).ok())
            .last()
            .map(|entry| entry.hash);

        match last_hash {
            None => Ok(GENESIS_HASH.to_string()),
            Some(hash) => {
                debug!(path = %self.path.display(), "reconciled audit chain head");
                Ok(hash)
            }
        }
    }
}

/// `SHA-256(prevHash ∥ canonical-body)`, lowercase hex.
fn entry_hash(prev_hash: &str, canonical_body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical_body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Verify a log in one linear scan. Returns the number of entries, or the
/// first line whose chain link or hash does not hold.
pub fn verify_audit_log(path: &Path) -> Result<usize, AuditError> {
    let text = std::fs::read_to_string(path).map_err(|source| AuditError::Io {
        path: path.to_owned(),
        source,
    })?;

    let mut expected_prev = GENESIS_HASH.to_string();
    let mut entries = 0usize;

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let mut value: Map<String, Value> =
            serde_json::from_str(line).map_err(|source| AuditError::Json {
                path: path.to_owned(),
                source,
            })?;

        let stored_hash = match value.remove("hash") {
            Some(Value::String(hash)) => hash,
            _ => {
                return Err(AuditError::ChainMismatch {
                    line: line_no,
                    reason: "entry has no hash".into(),
                })
            }
        };
        let prev = value
            .get("prevHash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if prev != expected_prev {
            return Err(AuditError::ChainMismatch {
                line: line_no,
                reason: format!("prevHash {prev} does not extend {expected_prev}"),
            });
        }

        let recomputed = entry_hash(&prev, &Value::Object(value).to_string());
        if recomputed != stored_hash {
            return Err(AuditError::ChainMismatch {
                line: line_no,
                reason: "stored hash does not match entry body".into(),
            });
        }

        expected_prev = stored_hash;
        entries += 1;
    }

    Ok(entries)
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
