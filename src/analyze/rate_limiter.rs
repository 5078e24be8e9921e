// src/analyze/rate_limiter.rs
//! Pacing for outbound AI calls: a bounded number in flight plus a minimum
//! spacing between call starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    /// Earliest start time of the next call.
    next_slot: Mutex<Instant>,
    min_interval: Duration,
    concurrency: usize,
    total: AtomicU64,
    waited: AtomicU64,
}

/// Held for the duration of one call; dropping it frees a concurrency slot.
#[derive(Debug)]
pub struct RatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(concurrency: usize, min_interval: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            next_slot: Mutex::new(Instant::now()),
            min_interval,
            concurrency: concurrency.max(1),
            total: AtomicU64::new(0),
            waited: AtomicU64::new(0),
        }
    }

    /// Wait for a concurrency slot, then for this caller's reserved start time.
    ///
    /// The start slot is reserved under the lock and slept on outside it, so
    /// concurrent callers get distinct, evenly spaced slots.
    pub async fn acquire(&self) -> RatePermit {
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok();
        self.total.fetch_add(1, Ordering::Relaxed);

        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = if *next > now { *next } else { now };
            *next = slot + self.min_interval;
            slot
        };

        if slot > Instant::now() {
            self.waited.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(wait_ms = slot.saturating_duration_since(Instant::now()).as_millis() as u64, "rate limiter queued");
            tokio::time::sleep_until(slot).await;
        }

        RatePermit { _permit: permit }
    }

    /// Calls allowed in flight at once.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// (calls admitted, calls that had to wait)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.waited.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_call_is_immediate() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));
        let start = Instant::now();
        let _p = limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn consecutive_calls_are_spaced() {
        let limiter = RateLimiter::new(4, Duration::from_millis(60));
        let start = Instant::now();
        for _ in 0..3 {
            let _p = limiter.acquire().await;
        }
        // Three starts need two full gaps.
        assert!(start.elapsed() >= Duration::from_millis(110));
        assert_eq!(limiter.stats(), (3, 2));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::ZERO));
        let held = limiter.acquire().await;

        let l2 = Arc::clone(&limiter);
        let waiter = tokio::spawn(async move {
            let _p = l2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("released")
            .unwrap();
    }
}
