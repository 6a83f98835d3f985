//! `gateway` — transaction ingestion service entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP spans).
//! 3. Build the [`AdmissionController`] and spawn the stale-bucket sweep.
//! 4. Activate the crypto backend so the first request does not pay for it.
//! 5. Build the Axum router and start the HTTP server.

mod admission;
mod config;
mod crypto;
mod server;
mod store;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use admission::AdmissionController;
use config::Config;
use crypto::{BackendSelector, FieldEncryption};
use server::state::AppState;
use store::MemoryStore;
use telemetry::RequestMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.listen_port,
        "gateway starting"
    );

    // -----------------------------------------------------------------------
    // 3. Admission control
    // -----------------------------------------------------------------------
    let admission = AdmissionController::new(cfg.rate_limit_policy());
    let _sweep = admission::sweep_task(admission.clone(), cfg.sweep_interval());

    // -----------------------------------------------------------------------
    // 4. Crypto backend
    // -----------------------------------------------------------------------
    let crypto = FieldEncryption::new(Arc::new(BackendSelector::new(cfg.crypto_backend)));
    let backend = crypto.activate().await;
    info!(backend = backend.as_str(), "crypto backend ready");

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(
        admission,
        crypto,
        Arc::new(MemoryStore::new()),
        RequestMonitor::new(),
    );
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated")?;

    info!("gateway stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
