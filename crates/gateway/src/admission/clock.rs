//! Wall-clock source for the admission controller.
//!
//! Bucket timestamps double as the `reset_time` reported to callers, so the
//! controller reads wall-clock time rather than a monotonic instant.

use std::time::SystemTime;

/// Source of "now" for bucket refill and sweep decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;
