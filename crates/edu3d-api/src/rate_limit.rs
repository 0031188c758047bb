//! Per-user sliding window limiter for video submissions.
//!
//! Each user keeps the timestamps of calls made in the last window. A call
//! is rejected when the window already holds `limit` calls; the caller is
//! told how long until the oldest one expires.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ApiError;

pub const WINDOW: Duration = Duration::from_secs(60);

/// Above this many tracked users, idle ones are dropped.
pub const MAX_TRACKED_USERS: usize = 10_000;

pub struct UserRateLimiter {
    limit: usize,
    window: Duration,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl UserRateLimiter {
    pub fn new(limit: usize) -> Self {
        Self::with_window(limit, WINDOW)
    }

    pub fn with_window(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Record a call for `user_id`, or return how long to wait.
    pub fn check(&self, user_id: &str) -> Result<(), Duration> {
        self.check_at(user_id, Instant::now())
    }

    pub fn check_at(&self, user_id: &str, now: Instant) -> Result<(), Duration> {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());

        if calls.len() > MAX_TRACKED_USERS && !calls.contains_key(user_id) {
            self.prune(&mut calls, now);
        }

        let window = self.window;
        let timestamps = calls.entry(user_id.to_string()).or_default();
        while timestamps
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.limit {
            let oldest = timestamps.front().copied().unwrap_or(now);
            let wait = window.saturating_sub(now.saturating_duration_since(oldest));
            debug!(user_id, calls = timestamps.len(), "User rate limit reached");
            return Err(wait);
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Drop users with no calls inside the window.
    fn prune(&self, calls: &mut HashMap<String, VecDeque<Instant>>, now: Instant) {
        let before = calls.len();
        calls.retain(|_, ts| {
            ts.back()
                .is_some_and(|t| now.saturating_duration_since(*t) < self.window)
        });
        let removed = before - calls.len();
        if removed > 0 {
            debug!(removed, "Pruned idle rate limit entries");
        }
        if calls.len() > MAX_TRACKED_USERS {
            warn!(
                tracked = calls.len(),
                "Rate limiter still tracking more active users than expected"
            );
        }
    }

    pub fn tracked_users(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// [`check`](Self::check) mapped to an HTTP 429.
    pub fn enforce(&self, user_id: &str) -> Result<(), ApiError> {
        self.check(user_id)
            .map_err(|wait| ApiError::RateLimited(retry_after_secs(wait)))
    }
}

/// Whole seconds for a `Retry-After` header, never zero.
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_eleventh_call_within_window() {
        let limiter = UserRateLimiter::new(10);
        let start = Instant::now();

        for i in 0..10 {
            assert!(limiter.check_at("alice", start + Duration::from_secs(i)).is_ok());
        }
        let wait = limiter
            .check_at("alice", start + Duration::from_secs(30))
            .unwrap_err();
        // Oldest call (t=0) leaves the window at t=60.
        assert_eq!(wait, Duration::from_secs(30));
    }

    #[test]
    fn test_accepts_again_after_window() {
        let limiter = UserRateLimiter::new(10);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.check_at("alice", start).unwrap();
        }
        assert!(limiter.check_at("alice", start + Duration::from_secs(59)).is_err());
        assert!(limiter.check_at("alice", start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_rejected_calls_are_not_recorded() {
        let limiter = UserRateLimiter::new(2);
        let start = Instant::now();
        limiter.check_at("bob", start).unwrap();
        limiter.check_at("bob", start + Duration::from_secs(10)).unwrap();
        for s in 11..50 {
            assert!(limiter.check_at("bob", start + Duration::from_secs(s)).is_err());
        }
        // Only the t=0 call has expired at t=60.
        assert!(limiter.check_at("bob", start + Duration::from_secs(60)).is_ok());
        assert!(limiter.check_at("bob", start + Duration::from_secs(61)).is_err());
    }

    #[test]
    fn test_users_are_independent() {
        let limiter = UserRateLimiter::new(1);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_ok());
        assert!(limiter.check_at("a", now).is_err());
        assert!(limiter.check_at("b", now).is_ok());
    }

    #[test]
    fn test_idle_users_are_pruned() {
        let limiter = UserRateLimiter::new(5);
        let start = Instant::now();
        for i in 0..=MAX_TRACKED_USERS {
            limiter.check_at(&format!("user-{i}"), start).unwrap();
        }
        assert_eq!(limiter.tracked_users(), MAX_TRACKED_USERS + 1);

        limiter
            .check_at("newcomer", start + Duration::from_secs(120))
            .unwrap();
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_retry_after_rounding() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(30)), 30);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }
}
