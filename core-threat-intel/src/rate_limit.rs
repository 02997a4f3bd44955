// =====================================================================================
// File: core-threat-intel/src/rate_limit.rs
// Description: Token-bucket rate limiting for feed drivers
// =====================================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Token bucket limiting callers to `max_requests` per `window`.
///
/// `acquire` suspends until a permit is available; permits older than the
/// window are reaped on every acquire. Built on the tokio clock so
/// paused-clock tests observe exact wait points.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    permits: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        assert!(max_requests > 0, "rate limiter needs at least one permit");
        Self {
            max_requests,
            window: Duration::from_secs(window_seconds),
            permits: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a permit. Returns once the request may proceed.
    pub async fn acquire(&self) {
        loop {
            let wait_until = {
                let mut permits = self.permits.lock().await;
                let now = Instant::now();

                // Reap permits that left the window.
                while let Some(front) = permits.front() {
                    if now.duration_since(*front) >= self.window {
                        permits.pop_front();
                    } else {
                        break;
                    }
                }

                if permits.len() < self.max_requests {
                    permits.push_back(now);
                    return;
                }

                // Wake when the oldest permit expires.
                let oldest = *permits.front().expect("non-empty at capacity");
                oldest + self.window
            };

            debug!("Rate limit reached, waiting for a permit");
            sleep_until(wait_until).await;
        }
    }

    /// Permits currently inside the window.
    pub async fn in_flight(&self) -> usize {
        let mut permits = self.permits.lock().await;
        let now = Instant::now();
        while let Some(front) = permits.front() {
            if now.duration_since(*front) >= self.window {
                permits.pop_front();
            } else {
                break;
            }
        }
        permits.len()
    }
}

/// Per-feed limiter registry used by the collection service.
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<Uuid, Arc<RateLimiter>>>,
    max_requests: usize,
    window_seconds: u64,
}

impl RateLimiterRegistry {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            limiters: Mutex::new(HashMap::new()),
            max_requests,
            window_seconds,
        }
    }

    pub async fn limiter_for(&self, feed_id: Uuid) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(feed_id)
            .or_insert_with(|| {
                Arc::new(RateLimiter::new(self.max_requests, self.window_seconds))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_permits_within_window() {
        let limiter = RateLimiter::new(5, 6);
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.in_flight().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_permit_waits_full_window() {
        let limiter = RateLimiter::new(5, 6);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }

        // The sixth permit issued at t=0 must not resolve before t=6s.
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(6),
            "sixth permit resolved after {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_limit_never_exceeded() {
        let limiter = Arc::new(RateLimiter::new(3, 2));
        for _ in 0..9 {
            limiter.acquire().await;
            assert!(limiter.in_flight().await <= 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permits_reaped_after_window() {
        let limiter = RateLimiter::new(2, 1);
        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(limiter.in_flight().await, 0);
        // And a fresh permit resolves immediately.
        limiter.acquire().await;
    }

    #[tokio::test]
    async fn test_registry_returns_same_limiter_per_feed() {
        let registry = RateLimiterRegistry::new(5, 6);
        let feed = Uuid::new_v4();
        let a = registry.limiter_for(feed).await;
        let b = registry.limiter_for(feed).await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}
