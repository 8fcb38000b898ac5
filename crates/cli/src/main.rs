// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pipeline-runner - offline, resumable, idempotent pipeline executor.
//!
//! Exit code 0 when the run completes; non-zero otherwise. Stage lifecycle
//! lines go to stdout; diagnostics go to stderr under `RUST_LOG` control.

use anyhow::{Context, Result};
use clap::Parser;
use stagehand_core::PipelineSpec;
use stagehand_engine::{RunDriver, Shutdown};
use stagehand_storage::Layout;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "pipeline-runner",
    version,
    about = "Run a linear pipeline of external processors with durable, resumable state"
)]
struct Cli {
    /// Change to <dir> before doing anything
    #[arg(short = 'C', value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Path to the pipeline specification (JSON)
    #[arg(long, value_name = "PATH")]
    pipeline: PathBuf,

    /// Run identifier; a fresh UUID when omitted
    #[arg(long = "run-id", value_name = "ID")]
    run_id: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[FATAL] {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("changing directory to {}", dir.display()))?;
    }

    let spec = PipelineSpec::load(&cli.pipeline)?;
    let run_id = cli
        .run_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let shutdown = Shutdown::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let driver = RunDriver::new(Layout::new("."), shutdown);
    let outcome = driver.run(&spec, &run_id).await?;
    Ok(outcome.exit_code())
}

/// Diagnostics to stderr; stdout is reserved for the stage lifecycle lines.
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
