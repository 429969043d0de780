//! Self-imposed spacing between generation calls.
//!
//! The hosted service enforces a per-minute request ceiling. Rather than react to 429s alone,
//! every logical call waits its turn so that call starts are at least `cooldown` apart, no
//! matter how many map calls are in flight.
//!
//! Only starts are spaced against the per-window request ceiling. A call that runs longer
//! than `cooldown` lets the next one start at once.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::GenerationError;

/// Serializes call starts so consecutive calls are at least `cooldown` apart.
#[derive(Debug)]
pub struct Pacer {
    cooldown: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Pacer {
    /// Create a pacer enforcing `cooldown` between call starts.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_start: Mutex::new(None),
        }
    }

    /// A pacer that never waits.
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Configured spacing between call starts.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Wait until the next call may start, then claim the slot.
    pub async fn wait_turn(&self, cancel: &CancellationToken) -> Result<(), GenerationError> {
        if self.cooldown.is_zero() {
            return Ok(());
        }

        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let ready_at = previous + self.cooldown;
            if ready_at > Instant::now() {
                tracing::trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Waiting for call cooldown"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                    _ = sleep_until(ready_at) => {}
                }
            }
        }
        *last_start = Some(Instant::now());
        Ok(())
    }
}
