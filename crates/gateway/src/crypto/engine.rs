//! [`FieldEncryption`]: the backend-agnostic API used by the persistence path.

use std::sync::Arc;

use tracing::{debug, warn};

use super::backend::CryptoBackend;
use super::envelope::{to_hex, CipherEnvelope, EncryptionError, EncryptionKey};
use super::selector::{ActiveBackend, BackendSelector, BackendStatus};

/// Encrypts and decrypts sensitive text fields.
///
/// Cheaply cloneable; clones share one [`BackendSelector`]. Operations hold no
/// other shared state and may run fully in parallel.
#[derive(Clone)]
pub struct FieldEncryption {
    selector: Arc<BackendSelector>,
}

impl FieldEncryption {
    pub fn new(selector: Arc<BackendSelector>) -> Self {
        Self { selector }
    }

    /// Resolve the backend ahead of the first request. Idempotent.
    pub async fn activate(&self) -> BackendStatus {
        self.selector.activate().await;
        self.selector.status()
    }

    pub fn status(&self) -> BackendStatus {
        self.selector.status()
    }

    /// A fresh 32-byte key in base64 text form.
    pub async fn generate_key(&self) -> Result<EncryptionKey, EncryptionError> {
        self.dispatch("generate_key", |b| b.generate_key()).await
    }

    /// Seal `plaintext` under `key`, returning the base64 envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError`] if randomness, key derivation, or sealing
    /// fails on both backends.
    pub async fn encrypt(
        &self,
        plaintext: &str,
        key: &EncryptionKey,
    ) -> Result<String, EncryptionError> {
        let plaintext = plaintext.to_owned();
        let key = key.clone();
        let envelope = self
            .dispatch("encrypt", move |b| b.encrypt(plaintext.as_bytes(), &key))
            .await?;
        Ok(envelope.encode())
    }

    /// Open a base64 envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails closed: a malformed envelope is rejected before any cryptographic
    /// work, and a wrong key, any tampering, or non-UTF-8 plaintext yields
    /// [`EncryptionError::Decrypt`].
    pub async fn decrypt(
        &self,
        envelope: &str,
        key: &EncryptionKey,
    ) -> Result<String, EncryptionError> {
        let envelope = CipherEnvelope::decode(envelope)?;
        let key = key.clone();
        let plaintext = self
            .dispatch("decrypt", move |b| b.decrypt(&envelope, &key))
            .await?;
        String::from_utf8(plaintext).map_err(|_| EncryptionError::Decrypt)
    }

    /// Lowercase hex SHA-256 of `data`. Deterministic; not for passwords.
    pub async fn hash(&self, data: &str) -> Result<String, EncryptionError> {
        let data = data.to_owned();
        let digest = self
            .dispatch("hash", move |b| b.digest(data.as_bytes()))
            .await?;
        Ok(to_hex(&digest))
    }

    /// Run `op` on the blocking pool against the active backend.
    ///
    /// A fast-backend failure is re-issued once on the fallback; the selector
    /// stays on fast. Wrong keys and tampering surface as `Decrypt` on both
    /// backends, so those retries are logged at debug only.
    async fn dispatch<T, F>(&self, operation: &'static str, op: F) -> Result<T, EncryptionError>
    where
        T: Send + 'static,
        F: Fn(&dyn CryptoBackend) -> Result<T, EncryptionError> + Send + 'static,
    {
        let fast = match self.selector.activate().await {
            ActiveBackend::Fast(fast) => Some(Arc::clone(fast)),
            ActiveBackend::Fallback => None,
        };
        let fallback = self.selector.fallback();

        // PBKDF2 runs 100k rounds per call; keep it off the async workers.
        tokio::task::spawn_blocking(move || match fast {
            Some(fast) => op(fast.as_ref()).or_else(|e| {
                if e == EncryptionError::Decrypt {
                    debug!(
                        operation,
                        "fast crypto backend could not open envelope; retrying on fallback"
                    );
                } else {
                    warn!(
                        operation,
                        error = %e,
                        "fast crypto backend call failed; retrying on fallback"
                    );
                }
                op(fallback.as_ref())
            }),
            None => op(fallback.as_ref()),
        })
        .await
        .map_err(|e| {
            warn!(operation, error = %e, "crypto task did not complete");
            EncryptionError::Unavailable
        })?
    }
}

impl Default for FieldEncryption {
    fn default() -> Self {
        Self::new(Arc::new(BackendSelector::default()))
    }
}
