//! Live progress signals observed on the nesting page.
//!
//! The page's counters are shared mutable state owned by the remote
//! computation; the runner only ever holds a read-only view. Updates
//! fan out through a [`tokio::sync::watch`] channel fed by the session's
//! reader task, and a [`SignalWatcher`] is the subscription handle a
//! consumer must release once it stops observing.

use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// One snapshot of the page's progress counters.
///
/// Valid only while the surface session is alive. Fields default to 0
/// so a partial payload never aborts observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ProgressSignal {
    /// Completed iterations, as rendered by the page.
    #[serde(default)]
    pub iterations: f64,
    /// Placed part count. Logged, never a stop condition.
    #[serde(default)]
    pub placed: f64,
    /// Achieved efficiency, in percent.
    #[serde(default)]
    pub efficiency: f64,
}

/// Subscription handle over the progress feed.
///
/// Holds a child cancellation token of the owning session; releasing
/// the watcher (explicitly or on drop) cancels it so no observation
/// outlives the wait that armed it.
#[derive(Debug)]
pub struct SignalWatcher {
    rx: watch::Receiver<ProgressSignal>,
    cancel: CancellationToken,
}

impl SignalWatcher {
    pub fn new(rx: watch::Receiver<ProgressSignal>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Current snapshot, marking it as seen.
    pub fn latest(&mut self) -> ProgressSignal {
        *self.rx.borrow_and_update()
    }

    /// Wait for the next unseen update. Errors when the signal source
    /// is gone (session closed) and no unseen update remains.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    /// Stop observing. Idempotent; also runs on drop.
    pub fn release(&self) {
        self.cancel.cancel();
    }

    /// Whether the subscription has been released.
    pub fn is_released(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
