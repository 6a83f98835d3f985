//! Axum request handlers for all service endpoints.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{
    CreateTransactionRequest, CreateTransactionResponse, ErrorResponse, HealthResponse,
    TransactionListResponse, TransactionView, ENCRYPTED_PLACEHOLDER,
};
use common::ServiceError;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::state::AppState;
use crate::crypto::{EncryptionError, EncryptionKey};
use crate::store::{StoreError, StoredTransaction};

/// Header carrying the per-record key on `GET /transactions/{id}`.
pub const RECORD_KEY_HEADER: &str = "x-record-key";

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// A [`ServiceError`] rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        warn!(error = %err, "transaction store call failed");
        match err {
            StoreError::Duplicate(_) => ServiceError::Internal("failed to store transaction".into()),
            StoreError::Unavailable(_) => {
                ServiceError::Unavailable("transaction store unavailable".into())
            }
        }
        .into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::new(self.0.code(), self.0.message()))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn bad_request(message: impl Into<String>) -> ApiError {
    ServiceError::BadRequest(message.into()).into()
}

fn encryption_failure(err: EncryptionError) -> ApiError {
    warn!(error = %err, "field encryption failed");
    ServiceError::EncryptionFailure("failed to encrypt transaction".into()).into()
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// `POST /transactions` — seal the sensitive columns and store the record.
///
/// A fresh key is generated per record and returned to the caller exactly
/// once; the gateway keeps no copy.
pub async fn create_transaction(
    State(state): State<AppState>,
    body: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;

    let missing = req.missing_fields();
    if !missing.is_empty() {
        return Err(bad_request(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }
    let (Some(user_id), Some(date), Some(description), Some(amount)) =
        (req.user_id, req.date, req.description, req.amount)
    else {
        return Err(bad_request("missing required fields"));
    };

    let key = state
        .crypto
        .generate_key()
        .await
        .map_err(encryption_failure)?;
    let description = state
        .crypto
        .encrypt(&description, &key)
        .await
        .map_err(encryption_failure)?;
    let gpt_insight = match req.gpt_insight {
        Some(insight) => Some(
            state
                .crypto
                .encrypt(&insight, &key)
                .await
                .map_err(encryption_failure)?,
        ),
        None => None,
    };

    let id = Uuid::new_v4().to_string();
    state.store.insert(StoredTransaction {
        id: id.clone(),
        user_id,
        date,
        description,
        amount,
        is_anomaly: req.is_anomaly,
        model_score: req.model_score,
        gpt_insight,
        created_at: now_unix_ms(),
    })?;
    info!(transaction_id = %id, "transaction stored");

    let body = CreateTransactionResponse {
        id,
        key: key.expose().to_owned(),
        message: "transaction stored; keep the key to read it back".into(),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /transactions` — a user's records, newest first, sensitive columns masked.
pub async fn list_transactions(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<TransactionListResponse>> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let user_id = params
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("user_id query parameter is required"))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);

    // One extra row tells us whether another page exists.
    let mut rows = state.store.select(&user_id, limit + 1, offset)?;
    let has_more = rows.len() > limit;
    rows.truncate(limit);

    let transactions: Vec<TransactionView> = rows.into_iter().map(masked_view).collect();
    Ok(Json(TransactionListResponse {
        count: transactions.len(),
        transactions,
        has_more,
    }))
}

/// `GET /transactions/{id}` — one record with its sensitive columns opened
/// under the key presented in `X-Record-Key`.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<TransactionView>> {
    let key = headers
        .get(RECORD_KEY_HEADER)
        .ok_or_else(|| bad_request("missing X-Record-Key header"))?
        .to_str()
        .map_err(|_| bad_request("X-Record-Key header contains non-ASCII characters"))?;
    let key = EncryptionKey::parse(key).map_err(|_| bad_request("X-Record-Key header is empty"))?;

    let row = state
        .store
        .get(&id)?
        .ok_or_else(|| ApiError(ServiceError::NotFound(format!("transaction {id} not found"))))?;

    let undecryptable = |e: EncryptionError| match e {
        EncryptionError::Unavailable => {
            warn!(error = %e, "field decryption failed");
            ApiError(ServiceError::EncryptionFailure(
                "failed to decrypt transaction".into(),
            ))
        }
        _ => ApiError(ServiceError::Undecryptable(
            "record cannot be decrypted with the supplied key".into(),
        )),
    };
    let description = state
        .crypto
        .decrypt(&row.description, &key)
        .await
        .map_err(undecryptable)?;
    let gpt_insight = match &row.gpt_insight {
        Some(sealed) => Some(
            state
                .crypto
                .decrypt(sealed, &key)
                .await
                .map_err(undecryptable)?,
        ),
        None => None,
    };

    Ok(Json(TransactionView {
        description,
        gpt_insight,
        ..masked_view(row)
    }))
}

/// `GET /health` — liveness plus request statistics.
///
/// Returns `503 Service Unavailable` with status `degraded` when the
/// transaction store cannot be reached or more than 1 % of requests ended in
/// a server error.
pub async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.monitor.snapshot();
    let stored = match state.store.count() {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %e, "health check could not reach transaction store");
            None
        }
    };
    let (status_code, status_str) = if stored.is_none() || snapshot.is_degraded() {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };

    let body = HealthResponse {
        status: status_str.into(),
        database: if stored.is_some() { "healthy" } else { "error" }.into(),
        stored_transactions: stored,
        crypto_backend: state.crypto.status().as_str().into(),
        tracked_clients: state.admission.len(),
        uptime_secs: snapshot.uptime.as_secs(),
        requests_total: snapshot.requests_total,
        active_requests: snapshot.active_requests,
        error_rate: snapshot.error_rate,
        average_latency_ms: snapshot.average_latency_ms,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    ApiError(ServiceError::NotFound(
        "the requested resource does not exist".into(),
    ))
}

fn masked_view(row: StoredTransaction) -> TransactionView {
    TransactionView {
        id: row.id,
        user_id: row.user_id,
        date: row.date,
        description: ENCRYPTED_PLACEHOLDER.into(),
        amount: row.amount,
        is_anomaly: row.is_anomaly,
        model_score: row.model_score,
        gpt_insight: row.gpt_insight.map(|_| ENCRYPTED_PLACEHOLDER.into()),
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    use super::*;
    use crate::admission::AdmissionController;
    use crate::crypto::FieldEncryption;
    use crate::store::MockTransactionStore;
    use crate::telemetry::RequestMonitor;

    fn state_with_store(store: MockTransactionStore) -> AppState {
        AppState::new(
            AdmissionController::default(),
            FieldEncryption::default(),
            Arc::new(store),
            RequestMonitor::new(),
        )
    }

    #[tokio::test]
    async fn health_is_ok_on_fresh_state() {
        let app = Router::new()
            .route("/health", get(health))
            .with_state(AppState::default());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_degrades_on_server_errors() {
        let state = AppState::default();
        state.monitor.begin().finish(500);
        let app = Router::new()
            .route("/health", get(health))
            .with_state(state);
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_degrades_when_store_is_unreachable() {
        let mut store = MockTransactionStore::new();
        store
            .expect_count()
            .times(1)
            .returning(|| Err(StoreError::Unavailable("down".into())));
        let app = Router::new()
            .route("/health", get(health))
            .with_state(state_with_store(store));
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "degraded");
        assert_eq!(health.database, "error");
        assert_eq!(health.stored_transactions, None);
    }

    #[tokio::test]
    async fn health_reports_stored_transaction_count() {
        let mut store = MockTransactionStore::new();
        store.expect_count().returning(|| Ok(3));
        let app = Router::new()
            .route("/health", get(health))
            .with_state(state_with_store(store));
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.database, "healthy");
        assert_eq!(health.stored_transactions, Some(3));
    }

    #[tokio::test]
    async fn store_outage_maps_to_503() {
        let mut store = MockTransactionStore::new();
        store
            .expect_select()
            .returning(|_, _, _| Err(StoreError::Unavailable("down".into())));
        let app = Router::new()
            .route("/transactions", get(list_transactions))
            .with_state(state_with_store(store));
        let req = Request::builder()
            .uri("/transactions?user_id=u1")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn list_requests_one_extra_row_for_paging() {
        let mut store = MockTransactionStore::new();
        store
            .expect_select()
            .withf(|user, limit, offset| user.to_string() == "u1" && *limit == 501 && *offset == 0)
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        let app = Router::new()
            .route("/transactions", get(list_transactions))
            .with_state(state_with_store(store));
        let req = Request::builder()
            .uri("/transactions?user_id=u1&limit=9999")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn masked_view_hides_sealed_columns() {
        let view = masked_view(StoredTransaction {
            id: "t1".into(),
            user_id: "u1".into(),
            date: "2024-03-01".into(),
            description: "c2VhbGVk".into(),
            amount: 9.99,
            is_anomaly: Some(true),
            model_score: Some(0.93),
            gpt_insight: Some("c2VhbGVk".into()),
            created_at: 1,
        });
        assert_eq!(view.description, ENCRYPTED_PLACEHOLDER);
        assert_eq!(view.gpt_insight.as_deref(), Some(ENCRYPTED_PLACEHOLDER));
        assert_eq!(view.amount, 9.99);
    }

    #[test]
    fn api_error_uses_service_status() {
        let resp = ApiError(ServiceError::Undecryptable("nope".into())).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
