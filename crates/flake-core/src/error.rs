//! Error types for flake-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for flake-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or starting an invocation.
///
/// A failing target command is not an error: it is reported through
/// [`Outcome::Failure`](crate::Outcome::Failure).
#[derive(Debug, Error)]
pub enum Error {
    /// No program was given to run.
    #[error("no command given")]
    EmptyCommand,

    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Creating the per-invocation scratch directory failed.
    #[error("scratch directory {}: {source}", path.display())]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Setting up or draining the output pipe failed.
    #[error("output capture error: {0}")]
    Capture(#[source] std::io::Error),

    /// Waiting for the child process failed.
    #[error("wait error: {0}")]
    Wait(#[source] std::io::Error),

    /// Every worker exited without publishing an outcome.
    #[error("all workers exited without reporting")]
    WorkersExited,

    /// Invalid run configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
