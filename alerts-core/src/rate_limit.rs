//! Fixed-window rate limiter keyed by an arbitrary string.
//!
//! Each key owns at most one window record. The read-modify-write of a
//! record happens under its `DashMap` shard lock, so concurrent callers
//! never double-count an admission.

use std::time::Duration;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct RateWindowRecord {
    count: u32,
    window_reset_at: Instant,
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Set when denied: the instant the current window closes.
    pub retry_after: Option<Instant>,
}

/// Read-only view of a key's window, for operational visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining_requests: u32,
    pub reset_time: Option<Instant>,
    pub can_proceed: bool,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, RateWindowRecord>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window, windows: DashMap::new() }
    }

    /// Admits or denies one request for `key`, counting it when admitted.
    pub fn can_proceed(&self, key: &str) -> Admission {
        let now = Instant::now();
        let fresh = RateWindowRecord { count: 1, window_reset_at: now + self.window };

        match self.windows.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if now >= record.window_reset_at {
                    *record = fresh;
                } else if record.count < self.max_requests {
                    record.count += 1;
                } else {
                    return Admission { allowed: false, retry_after: Some(record.window_reset_at) };
                }
            }
        }

        Admission { allowed: true, retry_after: None }
    }

    /// Requests still available in the current window.
    pub fn remaining(&self, key: &str) -> u32 {
        match self.live_record(key) {
            Some(record) => self.max_requests.saturating_sub(record.count),
            None => self.max_requests,
        }
    }

    /// When the current window for `key` closes, if one is open.
    pub fn reset_time(&self, key: &str) -> Option<Instant> {
        self.live_record(key).map(|record| record.window_reset_at)
    }

    pub fn status(&self, key: &str) -> RateLimitStatus {
        let remaining_requests = self.remaining(key);
        RateLimitStatus {
            remaining_requests,
            reset_time: self.reset_time(key),
            can_proceed: remaining_requests > 0,
        }
    }

    /// Drops records whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, record| now < record.window_reset_at);
        before.saturating_sub(self.windows.len())
    }

    fn live_record(&self, key: &str) -> Option<RateWindowRecord> {
        let now = Instant::now();
        self.windows.get(key).map(|r| *r).filter(|r| now < r.window_reset_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const KEY: &str = "weather-api";

    #[tokio::test(start_paused = true)]
    async fn denies_after_max_requests_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_millis(1000));
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.can_proceed(KEY).allowed);
        }

        let denied = limiter.can_proceed(KEY);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(start + Duration::from_millis(1000)));
        assert_eq!(limiter.reset_time(KEY), denied.retry_after);
        assert_eq!(limiter.remaining(KEY), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn new_window_resets_counter() {
        let limiter = RateLimiter::new(3, Duration::from_millis(1000));
        for _ in 0..4 {
            limiter.can_proceed(KEY);
        }

        advance(Duration::from_millis(1000)).await;

        assert!(limiter.can_proceed(KEY).allowed);
        assert_eq!(limiter.remaining(KEY), 2, "counter restarts at 1");
    }

    #[tokio::test(start_paused = true)]
    async fn accessors_do_not_consume() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        assert_eq!(limiter.remaining(KEY), 2);
        assert_eq!(limiter.reset_time(KEY), None);

        limiter.can_proceed(KEY);
        for _ in 0..5 {
            assert_eq!(limiter.remaining(KEY), 1);
        }

        let status = limiter.status(KEY);
        assert!(status.can_proceed);
        assert_eq!(status.remaining_requests, 1);
        assert!(status.reset_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.can_proceed("a").allowed);
        assert!(!limiter.can_proceed("a").allowed);
        assert!(limiter.can_proceed("b").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_elapsed_windows() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));
        limiter.can_proceed("a");
        advance(Duration::from_millis(50)).await;
        limiter.can_proceed("b");

        advance(Duration::from_millis(60)).await;
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.reset_time("a"), None);
        assert!(limiter.reset_time("b").is_some());
    }
}
