//! flake - run a command until it fails.

mod report;

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use flake_core::{
    CommandLine, Coordinator, Progress, ProgressStyle, RunConfig, default_parallelism,
};

#[derive(Parser)]
#[command(name = "flake")]
#[command(about = "Run a command repeatedly until it fails")]
#[command(
    long_about = "Flake runs the provided command until it fails by exiting with a nonzero status.\n\
                  It only prints the output of the failed run."
)]
#[command(version)]
struct Cli {
    /// Run this many processes in parallel [default: number of CPUs]
    #[arg(short = 'p', long, value_name = "N")]
    parallelism: Option<NonZeroUsize>,

    /// Create a tmpdir here for each run ($FLAKEDIR)
    #[arg(long, value_name = "DIR")]
    tmpdir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<OsString>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for progress
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let command = CommandLine::new(cli.command.iter().cloned())?;
    let parallelism = cli.parallelism.unwrap_or_else(default_parallelism);

    // One directory for the whole run; removed when `run_root` drops
    let run_root = match &cli.tmpdir {
        Some(root) => Some(
            tempfile::Builder::new()
                .prefix("flake-")
                .tempdir_in(root)
                .with_context(|| format!("Cannot create tmpdir in {}", root.display()))?,
        ),
        None => None,
    };

    let mut config = RunConfig::new(command, parallelism);
    if let Some(dir) = &run_root {
        config = config.with_scratch_root(dir.path());
    }
    tracing::debug!(
        parallelism = parallelism.get(),
        scratch_root = ?config.scratch_root,
        "Starting run"
    );

    let style = ProgressStyle::detect();
    let mut coordinator = Coordinator::new(config, Progress::stdout(style))?;
    let report = coordinator.run(shutdown_signal()).await;
    tracing::debug!(
        successes = report.successes,
        elapsed = ?report.elapsed,
        exit_code = report.exit_code(),
        "Run finished"
    );

    report::print(&report, &cli.command).context("Failed to write report")?;

    Ok(ExitCode::from(report.exit_code()))
}

/// Completes on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Received shutdown signal");
}
