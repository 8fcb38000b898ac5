// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-stage advisory filesystem lock.
//!
//! One lock file per stage name under `locks/`, held exclusively via fs2
//! for the duration of a stage execution. Acquisition polls every 100 ms up
//! to a timeout; the file itself is retained across runs. The held `File`
//! is the guard — dropping it (any exit path, including panic unwind)
//! releases the OS lock.

use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("I/O error on lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not acquire lock for stage '{stage}' within {timeout_secs}s")]
    Unavailable { stage: String, timeout_secs: u64 },
}

/// Exclusive lock on one stage name. Held until dropped.
#[derive(Debug)]
pub struct StageLock {
    // NOTE(lifetime): Held to maintain the exclusive file lock; released on drop
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl StageLock {
    /// Acquire the lock for `stage`, blocking up to `timeout`.
    ///
    /// The lock file is opened without truncation so a holder's PID is not
    /// wiped by a waiting process; the PID is written only once the lock is
    /// held.
    pub async fn acquire(
        lock_path: &Path,
        stage: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: lock_path.to_owned(),
                source,
            })?;
        }

        let deadline = std::time::Instant::now() + timeout;
        loop {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(lock_path)
                .map_err(|source| LockError::Io {
                    path: lock_path.to_owned(),
                    source,
                })?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    let mut file = file;
                    // Best-effort breadcrumb for operators; the OS lock is
                    // the source of truth.
                    let _ = file.set_len(0);
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!(stage, path = %lock_path.display(), "stage lock acquired");
                    return Ok(Self {
                        file,
                        path: lock_path.to_owned(),
                    });
                }
                Err(_) if std::time::Instant::now() < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(_) => {
                    return Err(LockError::Unavailable {
                        stage: stage.to_string(),
                        timeout_secs: timeout.as_secs(),
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StageLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "stage lock unlock failed");
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
