//! [`BackendSelector`]: one-time, single-flight choice between the two backends.
//!
//! Lifecycle: `Uninitialized → Loading → Ready(fast) | Ready(fallback)`. The
//! terminal state never changes for the life of the selector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use super::backend::{BackendKind, BackendPreference, CryptoBackend};
use super::fallback::RingBackend;
use super::fast::RustCryptoBackend;

/// Why the fast backend could not be activated. Logged, never returned to callers.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The operator disabled the fast backend.
    #[error("fast backend disabled by configuration")]
    Disabled,

    /// The backend was constructed but failed its self-test.
    #[error("fast backend self-test failed: {0}")]
    SelfTest(String),

    /// The loader itself could not run to completion.
    #[error("fast backend loader failed: {0}")]
    Loader(String),
}

/// Produces the fast backend, or explains why it cannot.
pub type FastLoader =
    Arc<dyn Fn() -> Result<Arc<dyn CryptoBackend>, BackendError> + Send + Sync>;

/// The backend chosen by [`BackendSelector::activate`].
pub enum ActiveBackend {
    Fast(Arc<dyn CryptoBackend>),
    Fallback,
}

impl ActiveBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            ActiveBackend::Fast(_) => BackendKind::Fast,
            ActiveBackend::Fallback => BackendKind::Fallback,
        }
    }
}

/// Observable selector state, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Uninitialized,
    Loading,
    Ready(BackendKind),
}

impl BackendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendStatus::Uninitialized => "uninitialized",
            BackendStatus::Loading => "loading",
            BackendStatus::Ready(kind) => kind.as_str(),
        }
    }
}

/// Lazily resolves which backend serves crypto operations.
///
/// The first caller of [`activate`](Self::activate) starts one load on a
/// detached task; every caller, including one that arrives after an earlier
/// caller was cancelled, waits on that same load.
pub struct BackendSelector {
    active: Arc<OnceLock<ActiveBackend>>,
    started: AtomicBool,
    loading: Arc<AtomicBool>,
    resolved: Arc<watch::Sender<bool>>,
    loader: FastLoader,
    fallback: Arc<dyn CryptoBackend>,
}

impl BackendSelector {
    /// Build a selector honouring the operator's preference.
    pub fn new(preference: BackendPreference) -> Self {
        let loader: FastLoader = match preference {
            BackendPreference::Auto => Arc::new(|| {
                RustCryptoBackend::load().map(|b| Arc::new(b) as Arc<dyn CryptoBackend>)
            }),
            BackendPreference::Fallback => {
                Arc::new(|| -> Result<Arc<dyn CryptoBackend>, BackendError> {
                    Err(BackendError::Disabled)
                })
            }
        };
        Self::with_loader(loader)
    }

    /// Build a selector with a custom fast-backend loader.
    pub fn with_loader(loader: FastLoader) -> Self {
        let (resolved, _) = watch::channel(false);
        Self {
            active: Arc::new(OnceLock::new()),
            started: AtomicBool::new(false),
            loading: Arc::new(AtomicBool::new(false)),
            resolved: Arc::new(resolved),
            loader,
            fallback: Arc::new(RingBackend::new()),
        }
    }

    /// Resolve the active backend, loading the fast one on first use.
    ///
    /// Never fails: any load failure resolves to [`ActiveBackend::Fallback`].
    /// Dropping the returned future does not abandon the load.
    pub async fn activate(&self) -> &ActiveBackend {
        if let Some(active) = self.active.get() {
            return active;
        }
        let mut resolved = self.resolved.subscribe();
        if !self.started.swap(true, Ordering::AcqRel) {
            self.spawn_load();
        }
        // Errs only if the sender is gone, which cannot outlive `self`.
        let _ = resolved.wait_for(|done| *done).await;
        self.active.get_or_init(|| ActiveBackend::Fallback)
    }

    fn spawn_load(&self) {
        self.loading.store(true, Ordering::Release);
        let loader = Arc::clone(&self.loader);
        let active = Arc::clone(&self.active);
        let loading = Arc::clone(&self.loading);
        let resolved = Arc::clone(&self.resolved);
        let fallback_name = self.fallback.name();

        tokio::spawn(async move {
            // The self-test runs PBKDF2; keep it off the async workers.
            let outcome = match tokio::task::spawn_blocking(move || loader()).await {
                Ok(result) => result,
                Err(e) => Err(BackendError::Loader(e.to_string())),
            };
            let chosen = match outcome {
                Ok(backend) => {
                    info!(backend = backend.name(), "fast crypto backend loaded");
                    ActiveBackend::Fast(backend)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        backend = fallback_name,
                        "fast crypto backend unavailable; using fallback"
                    );
                    ActiveBackend::Fallback
                }
            };
            let _ = active.set(chosen);
            loading.store(false, Ordering::Release);
            resolved.send_replace(true);
        });
    }

    /// Current lifecycle state without triggering a load.
    pub fn status(&self) -> BackendStatus {
        match self.active.get() {
            Some(active) => BackendStatus::Ready(active.kind()),
            None if self.loading.load(Ordering::Acquire) => BackendStatus::Loading,
            None => BackendStatus::Uninitialized,
        }
    }

    /// The always-available fallback backend.
    pub fn fallback(&self) -> Arc<dyn CryptoBackend> {
        Arc::clone(&self.fallback)
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new(BackendPreference::Auto)
    }
}
