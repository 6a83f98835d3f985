//! [`TokenBucket`]: continuously refilled permit counter for one client.

use std::time::{Duration, SystemTime};

/// Capacity and timing shared by every bucket in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Bucket capacity; also the largest permitted burst.
    pub max_tokens: u32,
    /// Time for an empty bucket to refill completely. `refill_rate = max_tokens / window`.
    pub window: Duration,
    /// Idle time after which the sweep reclaims a bucket.
    pub retention: Duration,
}

impl RateLimitPolicy {
    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.max_tokens) / self.window.as_secs_f64()
    }
}

impl Default for RateLimitPolicy {
    /// 250 requests per minute, reclaimed after 10 idle minutes.
    fn default() -> Self {
        Self {
            max_tokens: 250,
            window: Duration::from_secs(60),
            retention: Duration::from_secs(600),
        }
    }
}

/// Rate state for a single identifier.
///
/// Invariant: `0 <= tokens <= policy.max_tokens`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: SystemTime,
}

impl TokenBucket {
    /// A full bucket, as handed to an identifier on its first request.
    pub fn full(policy: &RateLimitPolicy, now: SystemTime) -> Self {
        Self {
            tokens: f64::from(policy.max_tokens),
            last_refill: now,
        }
    }

    /// Add `floor(elapsed * refill_rate)` tokens, clamped to capacity, and
    /// move `last_refill` to `now`.
    ///
    /// A clock that moved backwards counts as zero elapsed time.
    pub fn refill(&mut self, policy: &RateLimitPolicy, now: SystemTime) {
        let elapsed = now.duration_since(self.last_refill).unwrap_or_default();
        let earned = (elapsed.as_secs_f64() * policy.refill_rate()).floor();
        self.tokens = (self.tokens + earned).min(f64::from(policy.max_tokens));
        self.last_refill = now;
    }

    /// Consume one token if any is left.
    pub fn try_take(&mut self) -> bool {
        if self.tokens > 0.0 {
            self.tokens -= 1.0;
            true
        } else {
            self.tokens = 0.0;
            false
        }
    }

    /// Whole tokens currently available.
    pub fn remaining(&self) -> u32 {
        self.tokens.max(0.0).floor() as u32
    }

    pub fn last_refill(&self) -> SystemTime {
        self.last_refill
    }

    /// `true` when the bucket has been idle for longer than `retention`.
    pub fn is_stale(&self, now: SystemTime, retention: Duration) -> bool {
        now.duration_since(self.last_refill)
            .map(|idle| idle > retention)
            .unwrap_or(false)
    }
}
