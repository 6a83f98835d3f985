//! Per-client admission control: a token-bucket rate limiter.
//!
//! # Lifecycle
//!
//! 1. The HTTP boundary calls [`AdmissionController::check`] with the caller's
//!    identifier before doing any work.
//! 2. A bucket is created full on an identifier's first request and refills
//!    continuously at `max_tokens / window` tokens per second.
//! 3. A background Tokio task started by [`sweep_task`] reclaims buckets that
//!    have been idle for longer than the retention window.
//!
//! # Invariants
//!
//! - `check` is total: a denial is a value, never an error, and it never waits.
//! - Tokens stay within `[0, max_tokens]`.

pub mod bucket;
pub mod clock;
pub mod registry;

pub use bucket::RateLimitPolicy;
pub use registry::{Admission, AdmissionController, UNKNOWN_IDENTIFIER};

use std::time::Duration;

use tokio::time;
use tracing::debug;

/// Spawn a background task that sweeps stale buckets every `interval`.
///
/// The first sweep fires after one full interval; a freshly started process
/// has nothing to reclaim.
pub fn sweep_task(
    controller: AdmissionController,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = controller.sweep();
            debug!(removed, tracked = controller.len(), "rate-limit sweep completed");
        }
    })
}
