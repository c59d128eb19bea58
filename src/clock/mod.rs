//! Time source used by the pacer and the sender reports.
//!
//! [`SystemClock`] follows the tokio timer, so it also honours a paused
//! runtime; [`VirtualClock`] jumps straight to every deadline and records
//! the suspensions it was asked for.


pub mod virtual_clock;

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

pub use virtual_clock::VirtualClock;

/// Clock provides the wall-clock reading and the "suspend until deadline"
/// primitive. Instants are expressed as the time elapsed since the UNIX epoch.
#[async_trait]
pub trait Clock: fmt::Debug + Send + Sync {
    /// now returns the current time since the UNIX epoch.
    fn now(&self) -> Duration;

    /// sleep_until suspends the calling task until `deadline` has passed.
    /// Returns immediately when the deadline is already behind.
    async fn sleep_until(&self, deadline: Duration);

    /// sleep suspends the calling task for `duration`.
    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await;
    }
}

/// SystemClock reads the operating system clock once and then advances
/// with the tokio monotonic timer.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch_anchor: Duration,
    instant_anchor: tokio::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            epoch_anchor: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO),
            instant_anchor: tokio::time::Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch_anchor + self.instant_anchor.elapsed()
    }

    async fn sleep_until(&self, deadline: Duration) {
        let Some(offset) = deadline.checked_sub(self.epoch_anchor) else {
            return;
        };
        tokio::time::sleep_until(self.instant_anchor + offset).await;
    }
}
