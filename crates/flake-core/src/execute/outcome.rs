//! Classified results of a single invocation.

use std::fmt;
use std::process::ExitStatus;

use crate::error::Error;

/// Result of one invocation of the target command.
#[derive(Debug)]
pub enum Outcome {
    /// The command exited with status 0.
    Success,
    /// The command exited nonzero or was killed by a signal.
    Failure(RunFailure),
    /// The command could not be started, or its scratch directory could not
    /// be set up.
    SpawnError(Error),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A failed invocation together with everything it printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    /// Why the process ended.
    pub description: ExitDescription,
    /// Combined stdout and stderr, in the order the OS delivered them.
    pub output: Vec<u8>,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.description.fmt(f)
    }
}

/// How a failed process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDescription {
    /// Nonzero exit code.
    Status(i32),
    /// Terminated by the given signal number.
    Signal(i32),
}

impl ExitDescription {
    /// Classify an exit status. Returns `None` on success.
    pub fn from_status(status: ExitStatus) -> Option<Self> {
        if status.success() {
            return None;
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Some(Self::Signal(signal));
            }
        }

        // Without a code or a signal there is nothing better to report.
        Some(Self::Status(status.code().unwrap_or(-1)))
    }
}

impl fmt::Display for ExitDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Status(code) => write!(f, "status {}", code),
            Self::Signal(signal) => match signal_name(signal) {
                Some(name) => write!(f, "got signal {}", name),
                None => write!(f, "got signal {}", signal),
            },
        }
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> Option<&'static str> {
    let name = match signal {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGILL => "SIGILL",
        libc::SIGTRAP => "SIGTRAP",
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGKILL => "SIGKILL",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGUSR2 => "SIGUSR2",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        libc::SIGXCPU => "SIGXCPU",
        libc::SIGXFSZ => "SIGXFSZ",
        libc::SIGSYS => "SIGSYS",
        _ => return None,
    };
    Some(name)
}

#[cfg(not(unix))]
fn signal_name(_signal: i32) -> Option<&'static str> {
    None
}
