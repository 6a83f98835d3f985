//! Structured logging, optional OTLP span export, and in-process request counters.
//!
//! # Telemetry invariants
//!
//! - **No plaintext, key material, or raw client address** may appear in any
//!   span attribute or log field. Client identifiers are logged only as a
//!   SHA-256 fingerprint.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence when set.

pub mod init;
pub mod monitor;

pub use init::{init_telemetry, shutdown_telemetry};
pub use monitor::RequestMonitor;
