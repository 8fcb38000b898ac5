// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! stagehand-engine: the stage execution engine.
//!
//! Composes the primitives from core and storage into the per-stage state
//! machine — skip vs. run vs. resume, retry with backoff, crash-safe
//! persistence, single-writer locking — and the sequential run driver on
//! top of it.

mod driver;
mod executor;
mod invoker;
mod lock;
mod shutdown;

pub use driver::{DriverError, RunDriver, RunOutcome};
pub use executor::{StageExecutor, StageError};
pub use invoker::{invoke, InvokeError, Invocation, ProcessorOutcome};
pub use lock::{LockError, StageLock};
pub use shutdown::Shutdown;
