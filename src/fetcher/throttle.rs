use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::{Instant, sleep_until};

/// Per-host politeness gate: successive fetches to one host are spaced at
/// least `delay` apart. Different hosts never wait on each other.
#[derive(Clone)]
pub struct HostThrottle {
    next_slot: Arc<DashMap<String, Instant>>,
    delay: Duration,
}

impl HostThrottle {
    pub fn new(delay: Duration) -> Self {
        Self {
            next_slot: Arc::new(DashMap::new()),
            delay,
        }
    }

    /// Reserve the next slot for `host` and sleep until it opens.
    pub async fn wait(&self, host: &str) {
        if self.delay.is_zero() {
            return;
        }

        let now = Instant::now();
        let start = {
            let mut slot = self.next_slot.entry(host.to_ascii_lowercase()).or_insert(now);
            let start = (*slot).max(now);
            *slot = start + self.delay;
            start
        };

        if start > now {
            sleep_until(start).await;
        }
    }
}
