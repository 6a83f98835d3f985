//! [`RequestMonitor`]: lock-free request counters backing `GET /health`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Server-error percentage above which the service reports itself degraded.
pub const DEGRADED_ERROR_RATE: f64 = 1.0;

#[derive(Debug)]
struct Counters {
    started: Instant,
    requests: AtomicU64,
    server_errors: AtomicU64,
    active: AtomicU64,
    latency_micros: AtomicU64,
}

/// Process-wide request counters. Clones share the same counters.
#[derive(Clone, Debug)]
pub struct RequestMonitor {
    counters: Arc<Counters>,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub uptime: Duration,
    pub requests_total: u64,
    pub server_errors: u64,
    pub active_requests: u64,
    /// Percentage of completed requests that ended in a 5xx.
    pub error_rate: f64,
    pub average_latency_ms: f64,
}

impl MonitorSnapshot {
    pub fn is_degraded(&self) -> bool {
        self.error_rate > DEGRADED_ERROR_RATE
    }
}

/// Marks one in-flight request. Dropping it without [`finish`](Self::finish)
/// still releases the active slot but records nothing else.
#[must_use]
pub struct ActiveRequest {
    counters: Arc<Counters>,
    started: Instant,
}

impl RequestMonitor {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters {
                started: Instant::now(),
                requests: AtomicU64::new(0),
                server_errors: AtomicU64::new(0),
                active: AtomicU64::new(0),
                latency_micros: AtomicU64::new(0),
            }),
        }
    }

    /// Count a request as in flight until the returned guard is dropped.
    pub fn begin(&self) -> ActiveRequest {
        self.counters.active.fetch_add(1, Ordering::Relaxed);
        ActiveRequest {
            counters: Arc::clone(&self.counters),
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let c = &self.counters;
        let requests_total = c.requests.load(Ordering::Relaxed);
        let server_errors = c.server_errors.load(Ordering::Relaxed);
        let latency_micros = c.latency_micros.load(Ordering::Relaxed);
        let (error_rate, average_latency_ms) = if requests_total == 0 {
            (0.0, 0.0)
        } else {
            (
                server_errors as f64 * 100.0 / requests_total as f64,
                latency_micros as f64 / 1000.0 / requests_total as f64,
            )
        };
        MonitorSnapshot {
            uptime: c.started.elapsed(),
            requests_total,
            server_errors,
            active_requests: c.active.load(Ordering::Relaxed),
            error_rate,
            average_latency_ms,
        }
    }
}

impl Default for RequestMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveRequest {
    /// Record completion with the response's HTTP status code.
    pub fn finish(self, status: u16) {
        let elapsed = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        self.counters
            .latency_micros
            .fetch_add(elapsed, Ordering::Relaxed);
        if status >= 500 {
            self.counters.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
    }
}
