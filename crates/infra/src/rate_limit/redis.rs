//! Redis-backed fixed-window rate limiter (optional).
//!
//! One counter key per window: `INCR` then `EXPIRE` on first use. Counters are
//! shared by every API node pointed at the same Redis.

use std::time::Duration;

use redis::Commands;

use super::{RateLimitDecision, RateLimitError, RateLimitPolicy, RateLimiter};

#[derive(Debug, Clone)]
pub struct RedisRateLimiter {
    client: redis::Client,
    policy: RateLimitPolicy,
    prefix: String,
}

impl RedisRateLimiter {
    pub fn new(redis_url: impl AsRef<str>, policy: RateLimitPolicy) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            policy,
            prefix: "atelie:ratelimit".to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl RateLimiter for RedisRateLimiter {
    fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let counter_key = format!("{}:{key}", self.prefix);
        let window_secs = self.policy.window.as_secs().max(1);

        let count: u64 = conn
            .incr(&counter_key, 1u64)
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        if count == 1 {
            let _: bool = conn
                .expire(&counter_key, window_secs as i64)
                .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        }

        let ttl: i64 = conn
            .ttl(&counter_key)
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        // -1: counter lost its expiry (e.g. crash between INCR and EXPIRE).
        if ttl == -1 {
            let _: bool = conn
                .expire(&counter_key, window_secs as i64)
                .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        }
        let reset_after = Duration::from_secs(if ttl > 0 { ttl as u64 } else { window_secs });

        let max = u64::from(self.policy.max_requests);
        Ok(RateLimitDecision {
            allowed: count <= max,
            remaining: max.saturating_sub(count) as u32,
            reset_after,
        })
    }
}
