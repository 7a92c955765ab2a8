//! Sliding-window rate limiting per producer.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Rate limit settings. `max_requests == 0` disables limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl RateLimitConfig {
    /// No limit.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_requests: 0,
            window: Duration::from_secs(60),
        }
    }

    /// `max_requests` per `window`.
    #[must_use]
    pub const fn per(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Tracks recent request instants per producer key.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `key`; returns `false` if it exceeds the limit.
    pub fn check(&self, key: &str) -> bool {
        if self.config.max_requests == 0 {
            return true;
        }
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|e| {
            tracing::warn!("RateLimiter lock poisoned, recovering");
            e.into_inner()
        });
        // Drop producers whose every hit has aged out of the window.
        hits.retain(|_, window| {
            window
                .back()
                .is_some_and(|t| now.saturating_duration_since(*t) < self.config.window)
        });
        let window = hits.entry(key.to_string()).or_default();
        while window
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.config.window)
        {
            window.pop_front();
        }
        let limit = usize::try_from(self.config.max_requests).unwrap_or(usize::MAX);
        if window.len() >= limit {
            return false;
        }
        window.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::new(RateLimitConfig::disabled());
        for _ in 0..1_000 {
            assert!(limiter.check("agent"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(RateLimitConfig::per(2, Duration::from_secs(10)));
        assert!(limiter.check("agent"));
        assert!(limiter.check("agent"));
        assert!(!limiter.check("agent"));
        assert!(limiter.check("toolpack:x"), "keys are independent");

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check("agent"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_keys_are_forgotten() {
        let limiter = RateLimiter::new(RateLimitConfig::per(5, Duration::from_secs(10)));
        for n in 0..100 {
            assert!(limiter.check(&format!("agent:{n}")));
        }
        assert_eq!(limiter.hits.lock().unwrap().len(), 100);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check("agent:fresh"));
        let hits = limiter.hits.lock().unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key("agent:fresh"));
    }
}
