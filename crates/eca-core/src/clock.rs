//! Injected clock abstraction
//!
//! All timing in the engine (event timestamps, pattern windows, sustain
//! timers, waits, schedule ticks) goes through a single `Clock` so tests
//! can drive it deterministically.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Monotonic clock with a sleep primitive
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created
    fn now(&self) -> Duration;

    /// Suspend for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the tokio runtime
///
/// Uses `tokio::time`, so under `#[tokio::test(start_paused = true)]` both
/// `now` and `sleep` follow the paused, auto-advancing test clock.
pub struct SystemClock {
    start: tokio::time::Instant,
}

impl SystemClock {
    /// Create a clock anchored at the current instant
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_paused_clock_advances_with_sleep() {
        let clock = SystemClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.sleep(Duration::from_millis(500)).await;
        assert_eq!(clock.now(), Duration::from_millis(500));
    }
}
