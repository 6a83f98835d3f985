//! Axum router construction.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// Only the `/transactions*` routes are rate limited; `/health` and the
/// fallback are not.
pub fn build(state: AppState) -> Router {
    let transactions = Router::new()
        .route(
            "/transactions",
            post(handlers::create_transaction).get(handlers::list_transactions),
        )
        .route("/transactions/:id", get(handlers::get_transaction))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit));

    Router::new()
        .merge(transactions)
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state.clone(), middleware::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{HeaderName, HeaderValue, Request, StatusCode},
    };
    use axum_test::TestServer;
    use common::protocol::{
        CreateTransactionResponse, HealthResponse, TransactionListResponse, TransactionView,
        ENCRYPTED_PLACEHOLDER,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::admission::{AdmissionController, RateLimitPolicy};
    use crate::crypto::{BackendPreference, BackendSelector, FieldEncryption};
    use crate::store::MemoryStore;
    use crate::telemetry::RequestMonitor;

    fn state_with_capacity(max_tokens: u32) -> AppState {
        AppState::new(
            AdmissionController::new(RateLimitPolicy {
                max_tokens,
                window: Duration::from_secs(60),
                retention: Duration::from_secs(600),
            }),
            FieldEncryption::new(Arc::new(BackendSelector::new(BackendPreference::Auto))),
            Arc::new(MemoryStore::new()),
            RequestMonitor::new(),
        )
    }

    fn server(state: AppState) -> TestServer {
        TestServer::new(build(state)).unwrap()
    }

    fn forwarded_for(ip: &'static str) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static(ip),
        )
    }

    fn record_key(key: &str) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-record-key"),
            HeaderValue::from_str(key).unwrap(),
        )
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn health_route_is_not_rate_limited() {
        let app = build(state_with_capacity(1));
        for _ in 0..3 {
            let req = Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert!(resp.headers().get("x-ratelimit-limit").is_none());
        }
    }

    #[tokio::test]
    async fn create_then_read_back_with_key() {
        let server = server(AppState::default());
        let (name, value) = forwarded_for("203.0.113.7");

        let created = server
            .post("/transactions")
            .add_header(name.clone(), value.clone())
            .json(&json!({
                "user_id": "u1",
                "date": "2024-03-01",
                "description": "Coffee at Joe's",
                "amount": 4.5,
                "is_anomaly": false,
                "model_score": 0.12,
                "gpt_insight": "routine purchase"
            }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let created: CreateTransactionResponse = created.json();

        let (key_name, key_value) = record_key(&created.key);
        let fetched = server
            .get(&format!("/transactions/{}", created.id))
            .add_header(name, value)
            .add_header(key_name, key_value)
            .await;
        fetched.assert_status_ok();
        let view: TransactionView = fetched.json();
        assert_eq!(view.description, "Coffee at Joe's");
        assert_eq!(view.gpt_insight.as_deref(), Some("routine purchase"));
        assert_eq!(view.amount, 4.5);
    }

    #[tokio::test]
    async fn list_masks_encrypted_columns() {
        let server = server(AppState::default());
        for description in ["rent", "groceries"] {
            server
                .post("/transactions")
                .json(&json!({
                    "user_id": "u2",
                    "date": "2024-03-02",
                    "description": description,
                    "amount": 10.0
                }))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let resp = server
            .get("/transactions")
            .add_query_param("user_id", "u2")
            .add_query_param("limit", 1)
            .await;
        resp.assert_status_ok();
        let list: TransactionListResponse = resp.json();
        assert_eq!(list.count, 1);
        assert!(list.has_more);
        assert_eq!(list.transactions[0].description, ENCRYPTED_PLACEHOLDER);
        assert!(list.transactions[0].gpt_insight.is_none());
    }

    #[tokio::test]
    async fn missing_required_fields_are_rejected() {
        let server = server(AppState::default());
        let resp = server
            .post("/transactions")
            .json(&json!({"user_id": "u1", "amount": 3.0}))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json();
        assert_eq!(body["code"], "bad_request");
        assert!(body["message"].as_str().unwrap().contains("description"));
    }

    #[tokio::test]
    async fn list_without_user_id_is_rejected() {
        let server = server(AppState::default());
        server
            .get("/transactions")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn read_back_errors() {
        let server = server(AppState::default());
        let created: CreateTransactionResponse = server
            .post("/transactions")
            .json(&json!({
                "user_id": "u3",
                "date": "2024-03-03",
                "description": "salary",
                "amount": 3000.0
            }))
            .await
            .json();

        // No key.
        server
            .get(&format!("/transactions/{}", created.id))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        // Unknown id.
        let (key_name, key_value) = record_key(&created.key);
        server
            .get("/transactions/does-not-exist")
            .add_header(key_name, key_value)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        // Wrong key.
        let other = FieldEncryption::default().generate_key().await.unwrap();
        let (key_name, key_value) = record_key(other.expose());
        server
            .get(&format!("/transactions/{}", created.id))
            .add_header(key_name, key_value)
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn rate_limit_denies_after_capacity_with_headers() {
        let server = server(state_with_capacity(3));
        let (name, value) = forwarded_for("198.51.100.4");

        for expected_remaining in ["2", "1", "0"] {
            let resp = server
                .get("/transactions")
                .add_header(name.clone(), value.clone())
                .await;
            // Admitted; the handler itself rejects the missing user_id.
            resp.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(resp.header("x-ratelimit-limit"), "3");
            assert_eq!(resp.header("x-ratelimit-remaining"), expected_remaining);
        }

        let denied = server
            .get("/transactions")
            .add_header(name, value)
            .await;
        denied.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.header("x-ratelimit-remaining"), "0");
        assert!(denied.headers().contains_key("retry-after"));
        let body: serde_json::Value = denied.json();
        assert_eq!(body["code"], "rate_limited");
        assert_eq!(body["remaining"], 0);

        // A different client is unaffected.
        let (name, value) = forwarded_for("198.51.100.5");
        server
            .get("/transactions")
            .add_header(name, value)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_backend_and_clients() {
        let state = AppState::default();
        state.crypto.activate().await;
        let server = server(state);
        server
            .get("/transactions")
            .add_header(
                HeaderName::from_static("x-real-ip"),
                HeaderValue::from_static("192.0.2.1"),
            )
            .await;

        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let health: HealthResponse = resp.json();
        assert_eq!(health.status, "ok");
        assert_eq!(health.database, "healthy");
        assert_eq!(health.stored_transactions, Some(0));
        assert_eq!(health.crypto_backend, "fast");
        assert_eq!(health.tracked_clients, 1);
        assert_eq!(health.requests_total, 1);
    }
}
