//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::crypto::FieldEncryption;
use crate::store::{MemoryStore, TransactionStore};
use crate::telemetry::RequestMonitor;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-wrapped or already `Arc`-backed) so
/// that Axum can clone the state for each request without copying expensive data.
#[derive(Clone)]
pub struct AppState {
    /// Per-client token buckets.
    pub admission: AdmissionController,
    /// Field encryption routed through the active crypto backend.
    pub crypto: FieldEncryption,
    /// Persistence for sealed transaction rows.
    pub store: Arc<dyn TransactionStore>,
    /// Request counters reported by `/health`.
    pub monitor: RequestMonitor,
}

impl AppState {
    pub fn new(
        admission: AdmissionController,
        crypto: FieldEncryption,
        store: Arc<dyn TransactionStore>,
        monitor: RequestMonitor,
    ) -> Self {
        Self {
            admission,
            crypto,
            store,
            monitor,
        }
    }
}

impl Default for AppState {
    /// Default policy, auto backend selection and an empty in-memory store.
    fn default() -> Self {
        Self::new(
            AdmissionController::default(),
            FieldEncryption::default(),
            Arc::new(MemoryStore::new()),
            RequestMonitor::new(),
        )
    }
}
