//! Convergence wait protocol.
//!
//! Races two progress triggers against an optional timeout over a live,
//! continuously-mutating remote computation:
//!
//! - the iteration trigger fires the first instant the observed
//!   iteration count equals the target (exact equality — the page's own
//!   counter stops at the target and never renders past it);
//! - the efficiency trigger fires the first instant observed efficiency
//!   is at or above the target (it can overshoot in a single update);
//! - the timeout trigger fires after the given duration if neither did.
//!
//! Observation is event-driven, never interval-polled: the loop
//! suspends on the watch channel, so every true update is inspected
//! exactly once and no boundary-crossing update can slip between
//! samples. Exactly one outcome is produced; the watcher is released
//! the moment it is.

use std::time::Duration;

use crate::signal::SignalWatcher;

/// Terminal result of one convergence wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergenceOutcome {
    /// The iteration counter reached the target exactly.
    IterationLimitReached,
    /// Observed efficiency met or exceeded the target.
    EfficiencyThresholdReached,
    /// Neither trigger fired within the timeout.
    TimedOut { waited: Duration },
}

/// Errors raised while waiting for convergence.
#[derive(Debug, thiserror::Error)]
pub enum ConvergenceError {
    /// The signal source went away (session closed) before any trigger
    /// fired.
    #[error("progress signal source closed before convergence")]
    Closed,
}

/// Wait until the remote computation converges, times out, or its
/// signal source disappears.
///
/// The current snapshot is checked first, so a target already
/// satisfied at call time resolves without waiting for a mutation.
/// Resolution is first-trigger-wins and happens exactly once; when one
/// update satisfies both triggers, the iteration trigger is reported.
pub async fn await_convergence(
    mut watcher: SignalWatcher,
    target_iterations: f64,
    efficiency_target: f64,
    timeout: Option<Duration>,
) -> Result<ConvergenceOutcome, ConvergenceError> {
    let outcome = match timeout {
        Some(limit) => {
            match tokio::time::timeout(
                limit,
                observe(&mut watcher, target_iterations, efficiency_target),
            )
            .await
            {
                Ok(resolved) => resolved,
                Err(_) => Ok(ConvergenceOutcome::TimedOut { waited: limit }),
            }
        }
        None => observe(&mut watcher, target_iterations, efficiency_target).await,
    };

    // All observation stops here; later updates are no-ops.
    watcher.release();

    if let Ok(resolved) = &outcome {
        tracing::info!(
            ?resolved,
            target_iterations,
            efficiency_target,
            "Convergence wait resolved",
        );
    }
    outcome
}

async fn observe(
    watcher: &mut SignalWatcher,
    target_iterations: f64,
    efficiency_target: f64,
) -> Result<ConvergenceOutcome, ConvergenceError> {
    loop {
        let signal = watcher.latest();
        if signal.iterations == target_iterations {
            return Ok(ConvergenceOutcome::IterationLimitReached);
        }
        if signal.efficiency >= efficiency_target {
            return Ok(ConvergenceOutcome::EfficiencyThresholdReached);
        }
        watcher.changed().await.map_err(|_| ConvergenceError::Closed)?;
    }
}
