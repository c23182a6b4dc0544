//! A single execution lane.
//!
//! Each worker runs the command over and over, publishing every outcome to
//! the pool's results channel, until the run is cancelled or one of its own
//! invocations fails.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::context::CancelSignal;
use super::kill::{KillStrategy, PlatformKill};
use super::outcome::Outcome;
use super::process::{CommandLine, ProcessRunner};

/// Environment variable pointing the child at its scratch directory.
pub const SCRATCH_ENV: &str = "FLAKEDIR";

/// Per-invocation scratch directory.
///
/// Normally removed with [`ScratchDir::remove`] off the runtime threads. If
/// the guard is dropped instead (an aborted task), removal happens inline.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create `<root>/<id>`. The root must already exist.
    pub async fn create(root: &Path, id: u64) -> Result<Self> {
        let path = root.join(id.to_string());
        tokio::fs::create_dir(&path)
            .await
            .map_err(|source| Error::ScratchDir {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory and everything the child left in it.
    pub async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            tracing::warn!("Failed to remove scratch dir {}: {}", self.path.display(), e);
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!("Failed to remove scratch dir {}: {}", self.path.display(), e);
        }
    }
}

/// One execution lane of a run.
///
/// Owns its runner and output buffer; nothing here is shared with other
/// workers except the command itself.
pub struct Worker<K = PlatformKill> {
    lane: usize,
    command: Arc<CommandLine>,
    scratch_root: Option<Arc<Path>>,
    runner: ProcessRunner<K>,
    output: Vec<u8>,
}

impl Worker {
    /// Create a worker using the platform's kill strategy.
    pub fn new(lane: usize, command: Arc<CommandLine>, scratch_root: Option<Arc<Path>>) -> Self {
        Self::with_runner(lane, command, scratch_root, ProcessRunner::new())
    }
}

impl<K: KillStrategy> Worker<K> {
    pub fn with_runner(
        lane: usize,
        command: Arc<CommandLine>,
        scratch_root: Option<Arc<Path>>,
        runner: ProcessRunner<K>,
    ) -> Self {
        Self {
            lane,
            command,
            scratch_root,
            runner,
            output: Vec::new(),
        }
    }

    /// Run invocations until cancelled or until one does not succeed.
    ///
    /// Publishing never blocks past cancellation, so a worker cannot hang on
    /// a coordinator that has stopped reading.
    pub async fn run_loop(
        mut self,
        ids: Arc<AtomicU64>,
        results: mpsc::Sender<Outcome>,
        cancel: CancelSignal,
    ) {
        let lane = self.lane;
        loop {
            if cancel.is_raised() {
                tracing::debug!(lane, "Worker cancelled");
                return;
            }

            let id = ids.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!(lane, id, "Starting invocation");
            let outcome = self.run_once(id, &cancel).await;
            let done = !outcome.is_success();

            tokio::select! {
                sent = results.send(outcome) => {
                    if sent.is_err() {
                        tracing::debug!(lane, "Results channel closed");
                        return;
                    }
                }
                _ = cancel.raised() => {
                    tracing::debug!(lane, id, "Worker cancelled while publishing");
                    return;
                }
            }

            if done {
                tracing::debug!(lane, id, "Worker stopping after failed invocation");
                return;
            }
        }
    }

    /// Run a single invocation with sequence id `id`.
    pub async fn run_once(&mut self, id: u64, cancel: &CancelSignal) -> Outcome {
        let scratch = match self.scratch_root.as_deref() {
            Some(root) => match ScratchDir::create(root, id).await {
                Ok(dir) => Some(dir),
                Err(e) => return Outcome::SpawnError(e),
            },
            None => None,
        };

        let envs: Vec<(OsString, OsString)> = scratch
            .iter()
            .map(|dir| (SCRATCH_ENV.into(), dir.path().into()))
            .collect();

        let outcome = self
            .runner
            .execute(&self.command, &envs, cancel, &mut self.output)
            .await;

        if let Some(dir) = scratch {
            dir.remove().await;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scratch_dir_remove_deletes_tree() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = ScratchDir::create(temp.path(), 7).await.unwrap();
        assert!(dir.path().is_dir());
        assert_eq!(dir.path(), temp.path().join("7"));

        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        for i in 0..50 {
            std::fs::write(nested.join(format!("f{}", i)), b"x").unwrap();
        }
        let path = dir.path().to_path_buf();

        dir.remove().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_dir_removed_on_drop() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = {
            let dir = ScratchDir::create(temp.path(), 8).await.unwrap();
            std::fs::write(dir.path().join("junk"), b"x").unwrap();
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_dir_requires_root() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let err = ScratchDir::create(&missing, 1).await.unwrap_err();
        assert!(matches!(err, Error::ScratchDir { .. }));
    }

    #[tokio::test]
    async fn test_missing_scratch_root_is_spawn_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let root: Arc<Path> = Arc::from(temp.path().join("missing"));
        let command = Arc::new(CommandLine::new(["true"]).unwrap());
        let mut worker = Worker::new(0, command, Some(root));

        let outcome = worker.run_once(1, &CancelSignal::new()).await;
        assert!(matches!(outcome, Outcome::SpawnError(Error::ScratchDir { .. })));
    }

    #[cfg(unix)]
    mod unix {
        use std::time::Duration;

        use super::*;
        use crate::execute::ExitDescription;

        fn sh(script: &str) -> Arc<CommandLine> {
            Arc::new(CommandLine::new(["/bin/sh", "-c", script]).unwrap())
        }

        #[tokio::test]
        async fn test_scratch_dir_exists_during_run_and_is_removed_after() {
            let temp = tempfile::TempDir::new().unwrap();
            let root: Arc<Path> = Arc::from(temp.path());
            // Fail so the outcome carries what the child saw
            let mut worker = Worker::new(
                0,
                sh(r#"test -d "$FLAKEDIR" && echo "$FLAKEDIR"; exit 1"#),
                Some(root),
            );

            let outcome = worker.run_once(42, &CancelSignal::new()).await;
            let expected = temp.path().join("42");
            match outcome {
                Outcome::Failure(failure) => {
                    assert_eq!(
                        String::from_utf8_lossy(&failure.output).trim(),
                        expected.display().to_string()
                    );
                }
                other => panic!("expected failure, got {:?}", other),
            }
            assert!(!expected.exists());
        }

        #[tokio::test]
        async fn test_flakedir_absent_without_scratch_root() {
            let mut worker = Worker::new(0, sh(r#"echo "[${FLAKEDIR-unset}]"; exit 1"#), None);
            match worker.run_once(1, &CancelSignal::new()).await {
                Outcome::Failure(failure) => assert_eq!(failure.output, b"[unset]\n"),
                other => panic!("expected failure, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_scratch_dir_removed_after_cancellation() {
            let temp = tempfile::TempDir::new().unwrap();
            let root: Arc<Path> = Arc::from(temp.path());
            let mut worker = Worker::new(0, sh("sleep 30"), Some(root));

            let cancel = CancelSignal::new();
            let trigger = cancel.clone();
            let dir = temp.path().join("5");
            let watched = dir.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    if watched.is_dir() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                trigger.raise();
            });

            let outcome = worker.run_once(5, &cancel).await;
            assert!(matches!(
                outcome,
                Outcome::Failure(ref f) if f.description == ExitDescription::Signal(libc::SIGKILL)
            ));
            assert!(!dir.exists());
        }

        #[tokio::test]
        async fn test_loop_stops_after_failure() {
            let (tx, mut rx) = mpsc::channel(8);
            let ids = Arc::new(AtomicU64::new(0));
            let worker = Worker::new(0, sh("exit 3"), None);

            worker.run_loop(ids.clone(), tx, CancelSignal::new()).await;

            match rx.recv().await {
                Some(Outcome::Failure(failure)) => {
                    assert_eq!(failure.description, ExitDescription::Status(3));
                }
                other => panic!("expected failure, got {:?}", other),
            }
            // Sender was dropped when the loop returned
            assert!(rx.recv().await.is_none());
            assert_eq!(ids.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_loop_does_not_block_on_full_sink_after_cancel() {
            // Capacity 1 and nobody reading: the second send would block forever
            let (tx, _rx) = mpsc::channel(1);
            let ids = Arc::new(AtomicU64::new(0));
            let cancel = CancelSignal::new();
            let worker = Worker::new(0, sh("true"), None);

            let handle = tokio::spawn(worker.run_loop(ids, tx, cancel.clone()));
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.raise();

            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("worker should exit after cancellation")
                .unwrap();
        }

        #[tokio::test]
        async fn test_loop_exits_when_sink_closed() {
            let (tx, rx) = mpsc::channel(1);
            drop(rx);
            let worker = Worker::new(0, sh("true"), None);

            tokio::time::timeout(
                Duration::from_secs(5),
                worker.run_loop(Arc::new(AtomicU64::new(0)), tx, CancelSignal::new()),
            )
            .await
            .expect("worker should exit when nobody listens");
        }

        #[tokio::test]
        async fn test_loop_with_direct_kill_strategy() {
            use crate::execute::DirectKill;

            let (tx, mut rx) = mpsc::channel(4);
            let worker = Worker::with_runner(
                0,
                sh("exit 9"),
                None,
                ProcessRunner::with_strategy(DirectKill),
            );
            worker
                .run_loop(Arc::new(AtomicU64::new(0)), tx, CancelSignal::new())
                .await;
            assert!(matches!(rx.recv().await, Some(Outcome::Failure(_))));
        }
    }
}
