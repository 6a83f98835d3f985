//! The capability interface shared by both crypto backends.

use serde::Deserialize;

use super::envelope::{CipherEnvelope, EncryptionError, EncryptionKey};

/// The four primitives every backend provides.
///
/// Implementations must produce byte-compatible envelopes: an envelope sealed
/// by one backend opens under the other.
#[cfg_attr(test, mockall::automock)]
pub trait CryptoBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// 32 bytes from the OS CSPRNG, base64-encoded.
    fn generate_key(&self) -> Result<EncryptionKey, EncryptionError>;

    /// Derive a key from `key` and a fresh salt, then seal `plaintext` under a
    /// fresh nonce.
    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &EncryptionKey,
    ) -> Result<CipherEnvelope, EncryptionError>;

    /// Re-derive the key from the envelope's salt and open it.
    fn decrypt(
        &self,
        envelope: &CipherEnvelope,
        key: &EncryptionKey,
    ) -> Result<Vec<u8>, EncryptionError>;

    /// SHA-256 of `data`.
    fn digest(&self, data: &[u8]) -> Result<[u8; 32], EncryptionError>;
}

/// Which backend is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// RustCrypto AES-GCM + PBKDF2.
    Fast,
    /// `ring`, the platform provider.
    Fallback,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Fast => "fast",
            BackendKind::Fallback => "fallback",
        }
    }
}

/// Operator preference read from `CRYPTO_BACKEND`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Try the fast backend, fall back if it fails to load.
    #[default]
    Auto,
    /// Never load the fast backend.
    Fallback,
}
