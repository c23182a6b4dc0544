//! Run configuration.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::execute::CommandLine;

/// Default interval between progress updates.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Everything the core needs to know about a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Command to run repeatedly.
    pub command: CommandLine,
    /// Number of lanes running the command at once.
    pub parallelism: NonZeroUsize,
    /// Directory under which each invocation gets its own scratch dir.
    /// `None` disables scratch dirs and leaves `FLAKEDIR` unset.
    pub scratch_root: Option<PathBuf>,
    /// How often the coordinator refreshes progress.
    pub tick: Duration,
}

impl RunConfig {
    pub fn new(command: CommandLine, parallelism: NonZeroUsize) -> Self {
        Self {
            command,
            parallelism,
            scratch_root: None,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_scratch_root(mut self, root: impl AsRef<Path>) -> Self {
        self.scratch_root = Some(root.as_ref().to_path_buf());
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Check the settings the type system cannot.
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(Error::InvalidConfig(
                "progress interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of processing units available to this process, at least 1.
pub fn default_parallelism() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}
