use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Mutex,
    time::{Instant, sleep_until},
};
use tracing::trace;

/// Per-host politeness gate shared by every crawl worker.
///
/// Each host has its own slot holding the instant of the last granted
/// acquisition. Waiters queue on the slot's mutex, which is fair, so they
/// are served in arrival order. Hosts never block each other.
#[derive(Debug)]
pub struct RateLimiter {
    default_delay: Duration,
    slots: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl RateLimiter {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            slots: DashMap::new(),
        }
    }

    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Wait until `default_delay` has passed since the last grant for `host`.
    pub async fn acquire(&self, host: &str) {
        self.acquire_with_delay(host, self.default_delay).await;
    }

    pub async fn acquire_with_delay(&self, host: &str, delay: Duration) {
        let slot = self.slots.entry(host.to_string()).or_default().clone();

        let mut last_grant = slot.lock().await;
        if let Some(previous) = *last_grant {
            let ready_at = previous + delay;
            if ready_at > Instant::now() {
                trace!(host, wait_ms = (ready_at - Instant::now()).as_millis() as u64, "rate limited");
                sleep_until(ready_at).await;
            }
        }
        *last_grant = Some(Instant::now());
    }

    /// Number of hosts with a recorded grant.
    pub fn tracked_hosts(&self) -> usize {
        self.slots.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
