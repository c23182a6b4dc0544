//! Execution engine for flake runs.
//!
//! # Architecture
//!
//! ```text
//! Coordinator
//!     │
//!     └── WorkerPool (N lanes, shared id counter, CancelSignal, results channel)
//!             │
//!             └── Worker (own output buffer, per-invocation ScratchDir)
//!                     │
//!                     └── ProcessRunner
//!                             ├── spawn child, stdout+stderr on one pipe
//!                             ├── wait, or KillStrategy::kill on cancel
//!                             └── classify → Outcome
//! ```
//!
//! # Module Structure
//!
//! - `context` - Shared cancellation signal
//! - `kill` - Process-group and direct kill strategies
//! - `outcome` - Outcome classification
//! - `process` - ProcessRunner for a single invocation
//! - `worker` - Worker loop and scratch directories
//! - `pool` - WorkerPool fan-out / fan-in

mod context;
mod kill;
mod outcome;
mod pool;
mod process;
mod worker;

pub use context::CancelSignal;
#[cfg(unix)]
pub use kill::GroupKill;
pub use kill::{DirectKill, KillStrategy, PlatformKill};
pub use outcome::{ExitDescription, Outcome, RunFailure};
pub use pool::WorkerPool;
pub use process::{CommandLine, ProcessRunner};
pub use worker::{SCRATCH_ENV, ScratchDir, Worker};
