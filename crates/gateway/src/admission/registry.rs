//! [`AdmissionController`]: per-identifier token buckets and the allow/deny decision.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use super::bucket::{RateLimitPolicy, TokenBucket};
use super::clock::{Clock, SystemClock};

/// Identifier used when the boundary cannot derive one from the request.
///
/// Every such caller shares this single bucket.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Outcome of [`AdmissionController::check`].
///
/// A denial is an ordinary value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Whole tokens left after this decision.
    pub remaining: u32,
    /// `last_refill + window`: the point by which the bucket is full again.
    pub reset_time: SystemTime,
    /// Bucket capacity, echoed for `X-RateLimit-Limit`.
    pub limit: u32,
}

impl Admission {
    /// `reset_time` as milliseconds since the Unix epoch.
    pub fn reset_unix_ms(&self) -> u64 {
        self.reset_time
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// `reset_time` as whole seconds since the Unix epoch, rounded up.
    pub fn reset_unix_secs(&self) -> u64 {
        self.reset_unix_ms().div_ceil(1000)
    }

    /// Whole seconds from `now` until `reset_time`, at least 1.
    pub fn retry_after_secs(&self, now: SystemTime) -> u64 {
        let wait = self.reset_time.duration_since(now).unwrap_or_default();
        (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1)
    }
}

/// Owns every [`TokenBucket`], keyed by caller identifier.
///
/// Cheaply cloneable; clones share the same registry. Each identifier's
/// refill-and-decrement runs under that entry's shard lock, so callers with
/// different identifiers never observe each other's state.
#[derive(Clone)]
pub struct AdmissionController {
    buckets: Arc<DashMap<String, TokenBucket>>,
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    /// Create an empty registry using the system clock.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Create an empty registry reading time from `clock`.
    pub fn with_clock(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            policy,
            clock,
        }
    }

    /// Decide whether `identifier` may proceed, consuming one token if so.
    ///
    /// Total: never fails and never waits. The empty identifier is pooled
    /// under [`UNKNOWN_IDENTIFIER`]; any other string is its own bucket.
    pub fn check(&self, identifier: &str) -> Admission {
        let key = match identifier {
            "" => UNKNOWN_IDENTIFIER,
            other => other,
        };
        let now = self.clock.now();

        let mut bucket = match self.buckets.get_mut(key) {
            Some(existing) => existing,
            None => self
                .buckets
                .entry(key.to_owned())
                .or_insert_with(|| TokenBucket::full(&self.policy, now)),
        };

        bucket.refill(&self.policy, now);
        let allowed = bucket.try_take();

        Admission {
            allowed,
            remaining: bucket.remaining(),
            reset_time: bucket.last_refill() + self.policy.window,
            limit: self.policy.max_tokens,
        }
    }

    /// Remove every bucket idle for longer than the retention window.
    ///
    /// Shards are locked one at a time. Returns the number of buckets removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| !bucket.is_stale(now, self.policy.retention));
        before.saturating_sub(self.buckets.len())
    }

    /// Number of identifiers currently holding a bucket.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// `true` if `identifier` currently holds a bucket.
    #[cfg(test)]
    pub fn contains(&self, identifier: &str) -> bool {
        self.buckets.contains_key(identifier)
    }

    pub(crate) fn now(&self) -> SystemTime {
        self.clock.now()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}
