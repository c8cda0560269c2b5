//! Request rate limiting.
//!
//! The API asks a [`RateLimiter`] whether a key (a tenant) may make one more
//! request in the current window. Backends are interchangeable: an in-process
//! fixed window for single-node runs and tests, and Redis (feature `redis`)
//! when several API nodes must share counters.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryRateLimiter;
#[cfg(feature = "redis")]
pub use self::redis::RedisRateLimiter;

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests still allowed in the current window after this one.
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_after: Duration,
}

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(120, Duration::from_secs(60))
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limiter backend unavailable: {0}")]
    Backend(String),

    #[error("rate limiter state unavailable (lock poisoned)")]
    Poisoned,
}

/// Counts one request against `key` and reports whether it is allowed.
///
/// A denied request still counts as checked but does not push the window.
pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError>;
}

impl<R> RateLimiter for Arc<R>
where
    R: RateLimiter + ?Sized,
{
    fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        (**self).check(key)
    }
}
