//! Axum middleware layers applied to the router.
//!
//! Includes per-client admission, request accounting, and the shared request
//! timeout. Tracing and compression come from `tower-http`.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::RateLimitResponse;
use tracing::warn;

use super::state::AppState;
use crate::admission::{Admission, UNKNOWN_IDENTIFIER};

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Derive the rate-limit identifier for a request.
///
/// First entry of `X-Forwarded-For`, else `X-Real-IP`, else
/// [`UNKNOWN_IDENTIFIER`].
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_IDENTIFIER)
        .to_owned()
}

/// Admit or reject the request before it reaches a handler.
///
/// Every response carries the `X-RateLimit-*` headers; a denial is a `429`
/// with `Retry-After` and never reaches the handler.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let identifier = client_identifier(request.headers());
    let admission = state.admission.check(&identifier);

    if !admission.allowed {
        // Raw client addresses never reach the logs.
        let client = state
            .crypto
            .hash(&identifier)
            .await
            .map(|digest| digest[..16].to_owned())
            .unwrap_or_else(|_| "unavailable".into());
        warn!(
            client = %client,
            method = %request.method(),
            path = request.uri().path(),
            "rate limit exceeded"
        );

        let retry_after = admission.retry_after_secs(state.admission.now());
        let body = RateLimitResponse::new(admission.remaining, admission.reset_unix_ms());
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        apply_rate_limit_headers(response.headers_mut(), &admission);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &admission);
    response
}

/// Count every request in the [`RequestMonitor`](crate::telemetry::RequestMonitor).
pub async fn track_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let active = state.monitor.begin();
    let response = next.run(request).await;
    active.finish(response.status().as_u16());
    response
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, admission: &Admission) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(admission.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(admission.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(admission.reset_unix_secs()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_identifier(&h), "203.0.113.7");
    }

    #[test]
    fn real_ip_is_used_without_forwarded_for() {
        let h = headers(&[("x-real-ip", " 198.51.100.2 ")]);
        assert_eq!(client_identifier(&h), "198.51.100.2");
    }

    #[test]
    fn blank_forwarded_for_falls_through() {
        let h = headers(&[("x-forwarded-for", " , 10.0.0.1"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_identifier(&h), "198.51.100.2");
    }

    #[test]
    fn no_headers_yields_unknown() {
        assert_eq!(client_identifier(&HeaderMap::new()), UNKNOWN_IDENTIFIER);
    }
}
