//! Fixed-interval gate shared by every caller of one upstream service.
//!
//! `acquire()` reserves the next free slot under the lock and sleeps outside
//! it, so concurrent callers are granted one at a time, `interval` apart.
//! The interval is a floor: a caller arriving after the slot has passed is
//! granted immediately.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// A gate that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Wait until this caller may issue its request.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate gate wait");
        }
        tokio::time::sleep_until(slot).await;
    }
}
