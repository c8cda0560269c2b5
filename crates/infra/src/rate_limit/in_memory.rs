use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{RateLimitDecision, RateLimitError, RateLimitPolicy, RateLimiter};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Tracked keys past which `check` starts sweeping expired windows.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct Windows {
    by_key: HashMap<String, Window>,
    swept_at: Option<Instant>,
}

impl Windows {
    fn sweep(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.by_key.len();
        self.by_key
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
        self.swept_at = Some(now);
        before - self.by_key.len()
    }

    /// At most one sweep per window, and only once the map is large.
    fn sweep_due(&self, now: Instant, window: Duration, threshold: usize) -> bool {
        self.by_key.len() >= threshold
            && self
                .swept_at
                .is_none_or(|at| now.saturating_duration_since(at) >= window)
    }
}

/// Fixed-window rate limiter kept in process memory.
///
/// Counters are per process; run one API node or use the Redis backend.
/// Keys are client-chosen, so expired windows are swept from `check` once
/// more than `sweep_threshold` keys are tracked.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    policy: RateLimitPolicy,
    sweep_threshold: usize,
    windows: Mutex<Windows>,
}

impl InMemoryRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            windows: Mutex::new(Windows {
                by_key: HashMap::new(),
                swept_at: None,
            }),
        }
    }

    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Number of keys currently holding a window.
    pub fn tracked_keys(&self) -> Result<usize, RateLimitError> {
        let windows = self.windows.lock().map_err(|_| RateLimitError::Poisoned)?;
        Ok(windows.by_key.len())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<RateLimitDecision, RateLimitError> {
        let mut windows = self.windows.lock().map_err(|_| RateLimitError::Poisoned)?;

        if windows.sweep_due(now, self.policy.window, self.sweep_threshold) {
            let dropped = windows.sweep(now, self.policy.window);
            debug!(dropped, remaining = windows.by_key.len(), "swept expired rate limit windows");
        }

        let window = windows.by_key.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.policy.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        let reset_after = self
            .policy
            .window
            .saturating_sub(now.saturating_duration_since(window.started));

        if window.count >= self.policy.max_requests {
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_after,
            });
        }

        window.count += 1;
        Ok(RateLimitDecision {
            allowed: true,
            remaining: self.policy.max_requests - window.count,
            reset_after,
        })
    }

    /// Drop windows that have already expired.
    pub fn prune(&self) -> Result<usize, RateLimitError> {
        self.prune_at(Instant::now())
    }

    fn prune_at(&self, now: Instant) -> Result<usize, RateLimitError> {
        let mut windows = self.windows.lock().map_err(|_| RateLimitError::Poisoned)?;
        Ok(windows.sweep(now, self.policy.window))
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        self.check_at(key, Instant::now())
    }
}
