/*!
 * Request pacing.
 *
 * Calls are spaced at least `60s / rpm` apart across all workers. Each caller
 * reserves the next free slot under a short lock and sleeps outside it.
 */

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `None` or zero disables pacing
    pub fn per_minute(rpm: Option<u32>) -> Self {
        let interval = rpm.filter(|r| *r > 0).map(|r| Duration::from_secs(60) / r);
        Self { interval, next_slot: Mutex::new(None) }
    }

    pub fn unlimited() -> Self {
        Self::per_minute(None)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait until this caller may issue a request
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}
