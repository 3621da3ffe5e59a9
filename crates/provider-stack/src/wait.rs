//! # Readiness Wait
//!
//! Lets one component block until another [`RunProvider`] reports itself as
//! running, bounded by a timeout. Neither side needs to know anything about
//! the other's implementation.
//!
//! Typical use is at the top of a dependent component's `run`:
//!
//! ```rust,ignore
//! async fn run(&self) -> Result<(), ProviderError> {
//!     wait_for_running(self.probes.as_ref(), Duration::from_secs(2)).await?;
//!     self.running.set_running(true);
//!     self.serve().await
//! }
//! ```

use crate::error::ProviderError;
use crate::provider::RunProvider;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Interval between two `is_running` checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Waits until `target` is running or `timeout` elapses.
///
/// Returns immediately, without sleeping, when the target already runs.
/// Otherwise polls every [`POLL_INTERVAL`]. On timeout the error names the
/// target; the caller decides whether that is fatal for itself.
pub async fn wait_for_running(
    target: &dyn RunProvider,
    timeout: Duration,
) -> Result<(), ProviderError> {
    if target.is_running() {
        return Ok(());
    }

    let name = target.name();
    debug!(component = name, ?timeout, "Waiting for provider to run");

    let deadline = Instant::now() + timeout;
    loop {
        if target.is_running() {
            debug!(component = name, "Provider is running");
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ProviderError::WaitTimeout {
                name: name.to_string(),
                timeout,
            });
        }
        // Clamp to the remaining time so the deadline is never overshot by a full interval.
        tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}
