//! Shared cancellation for a run.
//!
//! One signal is created per run and cloned into every worker. Raising it
//! stops workers from starting new invocations and kills whatever child
//! process each of them is currently waiting on.

use tokio_util::sync::CancellationToken;

/// Broadcast, one-shot cancellation flag.
///
/// `CancelSignal` can be cloned and shared across tasks; raising any clone is
/// visible to all other clones. Once raised it stays raised.
///
/// # Example
///
/// ```
/// use flake_core::execute::CancelSignal;
///
/// let signal = CancelSignal::new();
/// let clone = signal.clone();
///
/// assert!(!signal.is_raised());
///
/// clone.raise();
/// clone.raise(); // no-op
///
/// assert!(signal.is_raised());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    /// Create a new, unraised signal.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation. Idempotent.
    pub fn raise(&self) {
        self.token.cancel();
    }

    /// Wait until the signal is raised.
    ///
    /// Completes immediately if it already has been.
    pub async fn raised(&self) {
        self.token.cancelled().await
    }
}
