//! Main control loop of a run.
//!
//! The coordinator counts successes, refreshes progress on a timer, and waits
//! for the first failure or an external interrupt. It then cancels the pool,
//! waits for every worker to exit, and hands back a [`RunReport`].
//!
//! ```text
//! Running ──(failure | spawn error | interrupt)──► Draining ──(join)──► Reporting
//! ```

use std::future::Future;
use std::io::Write;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::execute::{Outcome, RunFailure, WorkerPool};
use crate::progress::Progress;

/// Counters owned by the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    successes: u64,
    started: Instant,
    parallelism: usize,
}

impl RunStats {
    pub fn new(parallelism: usize) -> Self {
        Self {
            successes: 0,
            started: Instant::now(),
            parallelism,
        }
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wall time per iteration as seen by one lane:
    /// `parallelism * elapsed / successes`.
    pub fn average(&self) -> Option<Duration> {
        average_latency(self.parallelism, self.elapsed(), self.successes)
    }
}

fn average_latency(parallelism: usize, elapsed: Duration, successes: u64) -> Option<Duration> {
    if successes == 0 {
        return None;
    }
    let nanos = elapsed.as_nanos() * parallelism as u128 / u128::from(successes);
    Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}

/// Why the run ended.
#[derive(Debug)]
pub enum RunEnd {
    /// Stopped by an external interrupt before anything failed.
    Interrupted,
    /// The command failed; the flake was reproduced.
    Failed(RunFailure),
    /// The command could not be run at all.
    SpawnError(Error),
}

/// Final result of a run.
#[derive(Debug)]
pub struct RunReport {
    /// Successful iterations observed before the run ended.
    pub successes: u64,
    /// Wall time from start until all workers exited.
    pub elapsed: Duration,
    /// Average latency per iteration, if any succeeded.
    pub average: Option<Duration>,
    pub end: RunEnd,
}

impl RunReport {
    /// Process exit code: 0 only when no failure was observed.
    pub fn exit_code(&self) -> u8 {
        match self.end {
            RunEnd::Interrupted => 0,
            RunEnd::Failed(_) | RunEnd::SpawnError(_) => 1,
        }
    }
}

/// Drives one run from start to report.
pub struct Coordinator<W: Write> {
    config: RunConfig,
    progress: Progress<W>,
}

impl<W: Write> Coordinator<W> {
    pub fn new(config: RunConfig, progress: Progress<W>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, progress })
    }

    /// Start the pool and run until failure or `interrupt` completes.
    pub async fn run(&mut self, interrupt: impl Future<Output = ()>) -> RunReport {
        let pool = WorkerPool::start(&self.config);
        self.drive(pool, interrupt).await
    }

    /// Run the control loop over an already started pool.
    pub async fn drive(
        &mut self,
        mut pool: WorkerPool,
        interrupt: impl Future<Output = ()>,
    ) -> RunReport {
        let mut stats = RunStats::new(self.config.parallelism.get());
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.config.tick, self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(interrupt);

        let end = loop {
            tokio::select! {
                outcome = pool.recv() => match outcome {
                    Some(Outcome::Success) => stats.record_success(),
                    Some(Outcome::Failure(failure)) => {
                        tracing::debug!(%failure, "Invocation failed");
                        break RunEnd::Failed(failure);
                    }
                    Some(Outcome::SpawnError(e)) => {
                        tracing::debug!("Invocation could not start: {}", e);
                        break RunEnd::SpawnError(e);
                    }
                    // Only reachable if every worker died without reporting
                    None => break RunEnd::SpawnError(Error::WorkersExited),
                },
                _ = ticker.tick() => {
                    self.progress.update(stats.successes(), stats.average());
                }
                _ = &mut interrupt => {
                    tracing::debug!("Interrupted");
                    break RunEnd::Interrupted;
                }
            }
        };

        // Draining: anything still queued is abandoned
        pool.cancel();
        let panicked = pool.join().await;
        if panicked > 0 {
            tracing::warn!(panicked, "Some workers panicked");
        }
        self.progress.finish();

        RunReport {
            successes: stats.successes(),
            elapsed: stats.elapsed(),
            average: stats.average(),
            end,
        }
    }

    pub fn into_progress(self) -> Progress<W> {
        self.progress
    }
}
