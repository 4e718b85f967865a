//! Sliding-window rate limiter.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Per-key sliding window of admitted request timestamps.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    buckets: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, bucket: &str, actor: &str, key: &str) -> Result<(), u64> {
        self.check_at(bucket, actor, key, Utc::now())
    }

    /// Admit and record one request, or return the seconds to wait.
    pub fn check_at(&self, bucket: &str, actor: &str, key: &str, now: DateTime<Utc>) -> Result<(), u64> {
        let bucket_key = format!("{}:{}:{}", bucket, actor, key);
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());

        let mut buckets = self.buckets.lock();
        let timestamps = buckets.entry(bucket_key).or_default();
        while timestamps.front().map_or(false, |&t| now - t >= window) {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.limit {
            let oldest = timestamps.front().copied().unwrap_or(now);
            let remaining = (window - (now - oldest)).num_seconds();
            return Err(remaining.max(1) as u64);
        }

        timestamps.push_back(now);
        Ok(())
    }

    pub fn clear(&self) {
        self.buckets.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_and_retry_after() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let t0 = Utc::now();

        for i in 0..10 {
            let now = t0 + chrono::Duration::seconds(i);
            assert!(limiter.check_at("operations", "alice", "server:restart", now).is_ok());
        }

        let now = t0 + chrono::Duration::seconds(20);
        let retry = limiter
            .check_at("operations", "alice", "server:restart", now)
            .unwrap_err();
        assert_eq!(retry, 40);

        // Other actors and other keys have their own buckets.
        assert!(limiter.check_at("operations", "bob", "server:restart", now).is_ok());
        assert!(limiter.check_at("operations", "alice", "server:start", now).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Utc::now();

        limiter.check_at("b", "a", "k", t0).unwrap();
        limiter.check_at("b", "a", "k", t0 + chrono::Duration::seconds(30)).unwrap();
        assert!(limiter.check_at("b", "a", "k", t0 + chrono::Duration::seconds(59)).is_err());
        assert!(limiter.check_at("b", "a", "k", t0 + chrono::Duration::seconds(60)).is_ok());
    }
}
