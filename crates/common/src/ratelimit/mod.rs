//! Per-client token bucket rate limiting
//!
//! Each key gets a bucket holding up to `capacity` tokens that refill
//! continuously at `rate` tokens per second. Every allowed call consumes one
//! token. All buckets live in one table behind a single lock, so calls for
//! the same key are strictly serialized.
//!
//! Buckets are created on first sight of a key and are kept forever unless
//! [`RateLimiter::retain_recent`] is called, which the optional background
//! sweeper does.

mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Rate-limit state for one client
#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant, rate: f64, capacity: u32) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(f64::from(capacity));
        self.last_refill = now;
    }
}

/// Keyed token bucket limiter
pub struct RateLimiter {
    rate: f64,
    capacity: u32,
    buckets: Mutex<HashMap<String, Bucket>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter refilling `rate` tokens/second with a burst of `capacity`
    pub fn new(rate: f64, capacity: u32) -> Self {
        Self::with_clock(rate, capacity, Arc::new(MonotonicClock))
    }

    /// Create a limiter reading time from `clock`
    pub fn with_clock(rate: f64, capacity: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            rate,
            capacity,
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Take one token for `key` if one is available
    pub fn allow(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock();

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(self.capacity, now));

        bucket.refill(now, self.rate, self.capacity);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently held for `key`, refilled to the present instant.
    /// Does not create a bucket.
    pub fn available(&self, key: &str) -> Option<f64> {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock();

        buckets.get_mut(key).map(|bucket| {
            bucket.refill(now, self.rate, self.capacity);
            bucket.tokens
        })
    }

    /// Number of keys with a bucket
    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Drop buckets idle for longer than `max_idle`.
    ///
    /// The idle window is raised to at least the full-refill time, so an
    /// evicted bucket would have been full anyway and eviction never changes
    /// a later decision.
    pub fn retain_recent(&self, max_idle: Duration) -> usize {
        let full_refill = Duration::try_from_secs_f64(f64::from(self.capacity) / self.rate)
            .unwrap_or(Duration::MAX);
        let max_idle = max_idle.max(full_refill);
        let now = self.clock.now();

        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= max_idle);

        before - buckets.len()
    }
}

/// Periodically evict idle buckets
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = limiter.retain_recent(max_idle);
            let tracked = limiter.tracked_keys();
            crate::metrics::record_limiter_keys(tracked);
            debug!(evicted, tracked, "Rate limiter sweep");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rate: f64, capacity: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RateLimiter::with_clock(rate, capacity, clock.clone()), clock)
    }

    #[test]
    fn test_burst_then_reject() {
        let (limiter, _clock) = limiter(2.0, 5);

        for _ in 0..5 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _clock) = limiter(1.0, 1);

        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[test]
    fn test_refill_after_elapsed() {
        let (limiter, clock) = limiter(2.0, 3);

        for _ in 0..3 {
            assert!(limiter.allow("k"));
        }
        assert!(!limiter.allow("k"));

        // Half a token is not enough
        clock.advance(Duration::from_millis(250));
        assert!(!limiter.allow("k"));

        // 0.5 + 0.5 = 1 token
        clock.advance(Duration::from_millis(250));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }

    #[test]
    fn test_refill_formula() {
        let (limiter, clock) = limiter(4.0, 10);

        for _ in 0..10 {
            assert!(limiter.allow("k"));
        }
        assert_eq!(limiter.available("k"), Some(0.0));

        for (elapsed_ms, expected) in [(100u64, 0.4), (500, 2.4), (1_000, 6.4), (5_000, 10.0)] {
            clock.advance(Duration::from_millis(elapsed_ms));
            let tokens = limiter.available("k").unwrap();
            assert!((tokens - expected).abs() < 1e-9, "expected {expected}, got {tokens}");
        }
    }

    #[test]
    fn test_tokens_never_exceed_capacity() {
        let (limiter, clock) = limiter(100.0, 2);

        assert!(limiter.allow("k"));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(limiter.available("k"), Some(2.0));
    }

    #[test]
    fn test_rejection_does_not_go_negative() {
        let (limiter, _clock) = limiter(1.0, 1);

        assert!(limiter.allow("k"));
        for _ in 0..10 {
            assert!(!limiter.allow("k"));
        }
        assert!(limiter.available("k").unwrap() >= 0.0);
    }

    #[test]
    fn test_buckets_grow_without_sweep() {
        let (limiter, clock) = limiter(10.0, 1);

        for i in 0..1_000 {
            limiter.allow(&format!("client-{i}"));
        }
        clock.advance(Duration::from_secs(86_400));

        assert_eq!(limiter.tracked_keys(), 1_000);
    }

    #[test]
    fn test_retain_recent_evicts_idle() {
        let (limiter, clock) = limiter(1.0, 2);

        limiter.allow("old");
        clock.advance(Duration::from_secs(30));
        limiter.allow("fresh");

        let evicted = limiter.retain_recent(Duration::from_secs(10));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.available("old").is_none());
        assert!(limiter.available("fresh").is_some());
    }

    #[test]
    fn test_retain_recent_respects_refill_window() {
        // Full refill takes 10s, so a 1s idle window is widened
        let (limiter, clock) = limiter(1.0, 10);

        limiter.allow("k");
        clock.advance(Duration::from_secs(5));

        assert_eq!(limiter.retain_recent(Duration::from_secs(1)), 0);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_retain_recent_with_tiny_rate() {
        let (limiter, clock) = limiter(1e-300, 5);
        assert!(limiter.allow("k"));

        clock.advance(Duration::from_secs(3600));
        assert_eq!(limiter.retain_recent(Duration::from_secs(60)), 0);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_concurrent_allow_is_exact() {
        let (limiter, _clock) = limiter(1.0, 100);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..50).filter(|_| limiter.allow("shared")).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 100);
    }
}
