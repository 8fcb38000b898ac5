// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed idempotency keys.
//!
//! A key binds a stage to the byte content of its inputs (in order), the
//! processor's identity, and its params. Any single-byte change to any of
//! the three yields a different key; input ordering is significant.

use crate::canon::canonical_json;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Token contributed for an input path that does not exist.
const MISSING_INPUT: &str = "missing";

/// Separator between key contributions. Never a valid hex or JSON boundary
/// character, so contributions cannot collide across positions.
const SEP: &str = "|";

/// SHA-256 of a file's byte content, streamed in 8 KiB chunks.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Deterministic processor identity derived from its modification time.
///
/// `v{unix-seconds}`, or `v0` when the file is absent. This binds the key
/// to the processor without hashing arbitrarily large programs.
pub fn processor_version(processor: &Path) -> String {
    let mtime = std::fs::metadata(processor)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("v{mtime}")
}

/// Compute the idempotency key for a stage.
///
/// Contributions, joined with `|`: the SHA-256 of each input's bytes (or
/// `missing`), the processor version, and — when non-empty — the canonical
/// JSON of `params`. The key is the SHA-256 of the joined UTF-8 bytes.
pub fn compute_key(
    inputs: &[std::path::PathBuf],
    processor: &Path,
    params: &Map<String, Value>,
) -> std::io::Result<String> {
    let mut parts = Vec::with_capacity(inputs.len() + 2);
    for input in inputs {
        if input.exists() {
            parts.push(sha256_file(input)?);
        } else {
            parts.push(MISSING_INPUT.to_string());
        }
    }
    parts.push(processor_version(processor));
    if !params.is_empty() {
        parts.push(canonical_json(&Value::Object(params.clone())));
    }
    let raw = parts.join(SEP);
    Ok(format!("{:x}", Sha256::digest(raw.as_bytes())))
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
