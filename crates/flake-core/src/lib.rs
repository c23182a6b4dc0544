//! Core engine for flake.
//!
//! Runs a command over and over across parallel lanes until one invocation
//! fails, then stops everything and reports the failing run's output.
//!
//! This crate provides:
//! - Process runner with combined output capture and group kill
//! - Worker lanes with per-invocation scratch directories
//! - Worker pool with broadcast cancellation
//! - Coordinator loop with progress display

pub mod config;
pub mod coordinator;
pub mod error;
pub mod execute;
pub mod progress;

pub use config::{DEFAULT_TICK, RunConfig, default_parallelism};
pub use coordinator::{Coordinator, RunEnd, RunReport, RunStats};
pub use error::{Error, Result};
pub use execute::{
    CancelSignal, CommandLine, ExitDescription, Outcome, ProcessRunner, RunFailure, SCRATCH_ENV,
    Worker, WorkerPool,
};
pub use progress::{Progress, ProgressStyle};
