// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline guard: static scan of script processors for network imports.
//!
//! The engine promises to run without network access, and the cheapest
//! enforcement point is before the processor ever starts. The guard parses
//! top-level `import` / `from` statements — not substrings, so a string
//! literal mentioning "requests" is not a violation — and flags any module
//! whose dotted prefix lands in a closed banned set of network transports
//! and I/O-capable async runtimes.
//!
//! Non-script processors (no `.py` extension, no python shebang) are outside
//! the guard's reach and pass unchecked; operators vet binaries by policy.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Modules a processor may not import at top level.
const BANNED_IMPORTS: &[&str] = &[
    "aiohttp",
    "asyncio",
    "ftplib",
    "http",
    "http.client",
    "httpx",
    "imaplib",
    "paramiko",
    "poplib",
    "requests",
    "smtplib",
    "socket",
    "telnetlib",
    "urllib",
    "urllib.error",
    "urllib.parse",
    "urllib.request",
    "urllib3",
    "xmlrpc",
    "xmlrpc.client",
];

/// Offline guard failures.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("offline violation in {path}: forbidden import of {}", banned.join(", "))]
    OfflineViolation { path: PathBuf, banned: Vec<String> },
}

/// Scan a processor file; `Err(OfflineViolation)` if a banned module is
/// imported at top level.
///
/// Unreadable files pass: the guard only judges source it can see, and a
/// missing processor is reported separately by the invoker.
pub fn scan_processor(processor: &Path) -> Result<(), GuardError> {
    let Ok(content) = std::fs::read_to_string(processor) else {
        return Ok(());
    };
    if !is_script(processor, &content) {
        return Ok(());
    }

    let mut hits: Vec<String> = Vec::new();
    for line in content.lines() {
        for module in imported_modules(line) {
            for banned in BANNED_IMPORTS {
                if module_matches(&module, banned) && !hits.iter().any(|h| h == banned) {
                    hits.push((*banned).to_string());
                }
            }
        }
    }

    if hits.is_empty() {
        Ok(())
    } else {
        hits.sort();
        Err(GuardError::OfflineViolation {
            path: processor.to_owned(),
            banned: hits,
        })
    }
}

/// Python source detection: `.py` extension, or a python shebang.
fn is_script(path: &Path, content: &str) -> bool {
    if path.extension().is_some_and(|ext| ext == "py") {
        return true;
    }
    content
        .lines()
        .next()
        .is_some_and(|first| first.starts_with("#!") && first.contains("python"))
}

/// Extract module names from one top-level import statement, or empty for
/// anything that is not one.
///
/// Handles `import a.b as c, d.e` and `from a.b import x`. Indented lines
/// are skipped: the guard cares about module-load-time imports only.
fn imported_modules(line: &str) -> Vec<String> {
    if line.starts_with(' ') || line.starts_with('\t') {
        return Vec::new();
    }
    let line = line.trim_end();

    if let Some(rest) = line.strip_prefix("import ") {
        // `import a.b as c, d.e` — each comma-separated target, name before `as`
        return rest
            .split(',')
            .filter_map(|target| {
                target
                    .split_whitespace()
                    .next()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
            .collect();
    }

    if let Some(rest) = line.strip_prefix("from ") {
        // `from a.b import x` — only the source module matters
        if let Some(module) = rest.split_whitespace().next() {
            // Relative imports (`from . import x`) resolve inside the
            // processor's own package; no banned top-level name applies.
            if !module.starts_with('.') {
                return vec![module.to_string()];
            }
        }
    }

    Vec::new()
}

/// `module` is `banned` itself or any submodule of it.
fn module_matches(module: &str, banned: &str) -> bool {
    module == banned
        || (module.len() > banned.len()
            && module.starts_with(banned)
            && module.as_bytes()[banned.len()] == b'.')
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
