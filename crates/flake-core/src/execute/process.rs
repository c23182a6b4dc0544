//! Process runner for a single invocation.
//!
//! Starts the target command with stdout and stderr sharing one pipe, waits
//! for it to exit (or kills it on cancellation), and classifies the result.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

use super::context::CancelSignal;
use super::kill::{KillStrategy, PlatformKill};
use super::outcome::{ExitDescription, Outcome, RunFailure};

/// The target command and its arguments.
///
/// Shared read-only by every invocation of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandLine {
    /// Build from an argv list. The first element is the program.
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or(Error::EmptyCommand)?;
        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Program and arguments as one list.
    pub fn argv(&self) -> Vec<&OsStr> {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .collect()
    }
}

/// Runs one invocation at a time for a worker.
#[derive(Debug, Default)]
pub struct ProcessRunner<K = PlatformKill> {
    kill: K,
}

impl ProcessRunner {
    /// Create a runner using the platform's kill strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: KillStrategy> ProcessRunner<K> {
    /// Create a runner with an explicit kill strategy.
    pub fn with_strategy(kill: K) -> Self {
        Self { kill }
    }

    /// Run `command` once and classify how it ended.
    ///
    /// `output` is cleared and then filled with the combined output of the
    /// child. It is handed back for reuse, so a [`RunFailure`] carries its
    /// own copy of the bytes.
    ///
    /// If `cancel` is raised while the child runs, the child (and on unix its
    /// whole process group) is killed and reaped before this returns.
    pub async fn execute(
        &self,
        command: &CommandLine,
        envs: &[(OsString, OsString)],
        cancel: &CancelSignal,
        output: &mut Vec<u8>,
    ) -> Outcome {
        output.clear();

        let (reader, writer) = match std::io::pipe() {
            Ok(pipe) => pipe,
            Err(e) => return Outcome::SpawnError(Error::Capture(e)),
        };
        let writer_err = match writer.try_clone() {
            Ok(w) => w,
            Err(e) => return Outcome::SpawnError(Error::Capture(e)),
        };

        // The command owns our copies of the write end; it has to be dropped
        // before the reader can see EOF.
        let mut child = {
            let mut cmd = Command::new(command.program());
            cmd.args(command.args())
                .envs(envs.iter().cloned())
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(writer_err)
                .kill_on_drop(true);
            self.kill.prepare(&mut cmd);

            match cmd.spawn() {
                Ok(child) => child,
                Err(source) => {
                    return Outcome::SpawnError(Error::Spawn {
                        program: command.program().to_string_lossy().into_owned(),
                        source,
                    });
                }
            }
        };

        let mut buf = std::mem::take(output);
        let mut drain = tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let read = reader.read_to_end(&mut buf);
            (buf, read)
        });

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.raised() => {
                tracing::trace!(pid = ?child.id(), "Killing child on cancellation");
                self.kill.kill(&mut child);
                child.wait().await
            }
        };

        // A surviving grandchild can hold the pipe open after the child
        // exits; stop reading once the run is cancelled.
        let drained = tokio::select! {
            biased;
            drained = &mut drain => Some(drained),
            _ = cancel.raised() => {
                tracing::debug!("Abandoning output drain after cancellation");
                None
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => return Outcome::SpawnError(Error::Wait(e)),
        };

        match drained {
            Some(Ok((buf, read))) => {
                *output = buf;
                if let Err(e) = read {
                    return Outcome::SpawnError(Error::Capture(e));
                }
            }
            Some(Err(join_err)) => {
                return Outcome::SpawnError(Error::Capture(std::io::Error::other(join_err)));
            }
            None => {}
        }

        match ExitDescription::from_status(status) {
            None => Outcome::Success,
            Some(description) => Outcome::Failure(RunFailure {
                description,
                output: output.clone(),
            }),
        }
    }
}
