//! Worker pool for a run.
//!
//! Spawns one task per lane. All lanes share the command, an id counter, the
//! cancellation signal and the sending side of one results channel; the pool
//! keeps the receiving side for the coordinator.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::RunConfig;

use super::context::CancelSignal;
use super::outcome::Outcome;
use super::worker::Worker;

/// Running set of workers.
///
/// Dropping the pool raises cancellation; call [`WorkerPool::join`] to wait
/// for the workers to actually exit.
pub struct WorkerPool {
    results: mpsc::Receiver<Outcome>,
    cancel: CancelSignal,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawn `config.parallelism` workers on the current runtime.
    pub fn start(config: &RunConfig) -> Self {
        let parallelism = config.parallelism.get();
        // Bounded so a long run of successes cannot outpace the coordinator
        let (tx, results) = mpsc::channel(parallelism);
        let cancel = CancelSignal::new();
        let ids = Arc::new(AtomicU64::new(0));
        let command = Arc::new(config.command.clone());
        let scratch_root: Option<Arc<Path>> = config.scratch_root.as_deref().map(Arc::from);

        let mut workers = JoinSet::new();
        for lane in 0..parallelism {
            let worker = Worker::new(lane, command.clone(), scratch_root.clone());
            workers.spawn(worker.run_loop(ids.clone(), tx.clone(), cancel.clone()));
        }
        tracing::debug!(parallelism, "Started worker pool");

        Self {
            results,
            cancel,
            workers,
        }
    }

    /// Receive the next outcome from any worker.
    ///
    /// Returns `None` once every worker has exited and the channel is empty.
    pub async fn recv(&mut self) -> Option<Outcome> {
        self.results.recv().await
    }

    /// Stop all workers. Idempotent.
    pub fn cancel(&self) {
        self.cancel.raise();
    }

    /// Wait for every worker to exit.
    ///
    /// A worker that panicked is logged and does not block the others.
    /// Returns the number of workers that panicked.
    pub async fn join(&mut self) -> usize {
        let mut panicked = 0;
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    panicked += 1;
                    tracing::error!("Worker panicked: {}", e);
                } else {
                    tracing::debug!("Worker task ended abnormally: {}", e);
                }
            }
        }
        panicked
    }
}

#[cfg(test)]
impl WorkerPool {
    /// Pool over hand-built tasks.
    pub(crate) fn from_parts(
        results: mpsc::Receiver<Outcome>,
        cancel: CancelSignal,
        workers: JoinSet<()>,
    ) -> Self {
        Self {
            results,
            cancel,
            workers,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel.raise();
    }
}
