//! Request and response types exchanged with gateway callers.
//!
//! All bodies are JSON. Encrypted columns travel as base64 envelope strings and
//! are never decrypted unless the caller presents the per-record key.

use serde::{Deserialize, Serialize};

/// Placeholder returned in list views in place of an encrypted column.
pub const ENCRYPTED_PLACEHOLDER: &str = "[encrypted]";

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Request body for `POST /transactions`.
///
/// Required fields are optional at the serde level so that a missing field
/// produces a `400` with a precise message instead of a generic JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// Sensitive: encrypted before it is stored.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub is_anomaly: Option<bool>,
    #[serde(default)]
    pub model_score: Option<f64>,
    /// Sensitive: encrypted before it is stored when present.
    #[serde(default)]
    pub gpt_insight: Option<String>,
}

impl CreateTransactionRequest {
    /// Names of required fields that are absent or blank, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.user_id) {
            missing.push("user_id");
        }
        if blank(&self.date) {
            missing.push("date");
        }
        if blank(&self.description) {
            missing.push("description");
        }
        if self.amount.is_none() {
            missing.push("amount");
        }
        missing
    }
}

/// Successful response body for `POST /transactions`.
///
/// `key` is the per-record encryption key. The gateway does not retain it; the
/// caller must present it in `X-Record-Key` to read the record back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionResponse {
    pub id: String,
    pub key: String,
    pub message: String,
}

/// A single transaction as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub is_anomaly: Option<bool>,
    pub model_score: Option<f64>,
    pub gpt_insight: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// Response body for `GET /transactions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionView>,
    pub count: usize,
    pub has_more: bool,
}

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Body of a `429 Too Many Requests` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub code: String,
    pub message: String,
    /// Tokens left in the caller's bucket (always `0` on denial).
    pub remaining: u32,
    /// Milliseconds since the Unix epoch by which the bucket is full again.
    pub reset_time: u64,
}

impl RateLimitResponse {
    pub fn new(remaining: u32, reset_time: u64) -> Self {
        Self {
            code: "rate_limited".into(),
            message: "rate limit exceeded".into(),
            remaining,
            reset_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Transaction store reachability: `"healthy"` or `"error"`.
    pub database: String,
    /// Rows held by the transaction store; absent when it is unreachable.
    pub stored_transactions: Option<usize>,
    /// Crypto backend lifecycle: `"uninitialized"`, `"loading"`, `"fast"` or `"fallback"`.
    pub crypto_backend: String,
    /// Number of client identifiers currently holding a rate-limit bucket.
    pub tracked_clients: usize,
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub active_requests: u64,
    /// Percentage of requests that ended in a 5xx.
    pub error_rate: f64,
    pub average_latency_ms: f64,
}
