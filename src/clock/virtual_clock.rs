use std::time::Duration;

use async_trait::async_trait;
use portable_atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::Clock;

/// VirtualClock is a simulated clock. Sleeping moves the clock forward to
/// the deadline without waiting, so scheduling decisions can be asserted
/// deterministically.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_nanos: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    /// new creates a clock reading `start`.
    pub fn new(start: Duration) -> Self {
        VirtualClock {
            now_nanos: AtomicU64::new(start.as_nanos() as u64),
            sleeps: Mutex::new(vec![]),
        }
    }

    /// advance moves the clock forward, simulating work that takes `d`.
    pub fn advance(&self, d: Duration) {
        self.now_nanos
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    /// sleeps returns every suspension performed so far, in order.
    pub async fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().await.clone()
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos.load(Ordering::SeqCst))
    }

    async fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline <= now {
            return;
        }

        self.sleeps.lock().await.push(deadline - now);
        self.now_nanos
            .fetch_max(deadline.as_nanos() as u64, Ordering::SeqCst);

        // keep the suspension a real yield point
        tokio::task::yield_now().await;
    }
}
