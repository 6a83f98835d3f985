//! Envelope wire format, key type, and the crypto error surfaced to callers.
//!
//! Layout before base64 (standard alphabet, padded):
//!
//! ```text
//! nonce (12 bytes) || salt (16 bytes) || ciphertext || tag (16 bytes)
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the per-call PBKDF2 salt.
pub const SALT_LEN: usize = 16;

/// Byte length of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Smallest decodable envelope: an empty plaintext still carries a tag.
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + SALT_LEN + TAG_LEN;

/// Errors produced by the field encryption layer.
///
/// Every failure is terminal for the operation; no partial output exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    /// The envelope or key was malformed; no cryptographic work was attempted.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Key derivation or sealing failed.
    #[error("failed to encrypt data")]
    Encrypt,

    /// Authentication failed (wrong key or tampered envelope) or the plaintext
    /// was not valid UTF-8.
    #[error("failed to decrypt data")]
    Decrypt,

    /// The secure random source could not produce bytes.
    #[error("secure random source unavailable")]
    Random,

    /// The crypto task was cancelled or panicked before producing a result.
    #[error("crypto backend unavailable")]
    Unavailable,
}

/// A per-record encryption key in its base64 text form.
///
/// The text bytes are the PBKDF2 password. Cleared on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    /// Encode raw key bytes into their text form.
    pub fn from_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    /// Accept a key supplied by a caller.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::InvalidInput`] if `text` is empty or blank.
    pub fn parse(text: &str) -> Result<Self, EncryptionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EncryptionError::InvalidInput("encryption key is empty"));
        }
        Ok(Self(text.to_owned()))
    }

    /// The text form, for handing back to the record owner.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Password bytes fed to PBKDF2.
    pub(crate) fn password(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    pub nonce: [u8; NONCE_LEN],
    pub salt: [u8; SALT_LEN],
    /// Ciphertext with the 16-byte tag appended.
    pub ciphertext: Vec<u8>,
}

impl CipherEnvelope {
    /// Encode to the persisted base64 text form.
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(NONCE_LEN + SALT_LEN + self.ciphertext.len());
        raw.extend_from_slice(&self.nonce);
        raw.extend_from_slice(&self.salt);
        raw.extend_from_slice(&self.ciphertext);
        STANDARD.encode(raw)
    }

    /// Parse the persisted text form.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::InvalidInput`] if the text is not base64 or
    /// decodes to fewer than [`MIN_ENVELOPE_LEN`] bytes.
    pub fn decode(text: &str) -> Result<Self, EncryptionError> {
        let raw = STANDARD
            .decode(text.trim())
            .map_err(|_| EncryptionError::InvalidInput("envelope is not valid base64"))?;
        if raw.len() < MIN_ENVELOPE_LEN {
            return Err(EncryptionError::InvalidInput("envelope is too short"));
        }

        let (nonce_bytes, rest) = raw.split_at(NONCE_LEN);
        let (salt_bytes, ciphertext) = rest.split_at(SALT_LEN);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(salt_bytes);

        Ok(Self {
            nonce,
            salt,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Lowercase hex rendering of a digest.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CipherEnvelope {
        CipherEnvelope {
            nonce: [1u8; NONCE_LEN],
            salt: [2u8; SALT_LEN],
            ciphertext: vec![3u8; TAG_LEN + 5],
        }
    }

    #[test]
    fn encode_lays_out_nonce_salt_ciphertext() {
        let raw = STANDARD.decode(sample().encode()).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + SALT_LEN + TAG_LEN + 5);
        assert!(raw[..NONCE_LEN].iter().all(|&b| b == 1));
        assert!(raw[NONCE_LEN..NONCE_LEN + SALT_LEN].iter().all(|&b| b == 2));
        assert!(raw[NONCE_LEN + SALT_LEN..].iter().all(|&b| b == 3));
    }

    #[test]
    fn decode_recovers_parts() {
        let env = sample();
        assert_eq!(CipherEnvelope::decode(&env.encode()).unwrap(), env);
    }

    #[test]
    fn decode_rejects_bad_base64() {
        assert_eq!(
            CipherEnvelope::decode("!!!not-base64!!!"),
            Err(EncryptionError::InvalidInput("envelope is not valid base64"))
        );
    }

    #[test]
    fn decode_rejects_truncated_envelope() {
        let short = STANDARD.encode([0u8; MIN_ENVELOPE_LEN - 1]);
        assert_eq!(
            CipherEnvelope::decode(&short),
            Err(EncryptionError::InvalidInput("envelope is too short"))
        );
        assert!(CipherEnvelope::decode("").is_err());
    }

    #[test]
    fn minimum_length_envelope_decodes() {
        let exact = STANDARD.encode([0u8; MIN_ENVELOPE_LEN]);
        let env = CipherEnvelope::decode(&exact).unwrap();
        assert_eq!(env.ciphertext.len(), TAG_LEN);
    }

    #[test]
    fn key_rejects_blank_text() {
        assert!(EncryptionKey::parse("").is_err());
        assert!(EncryptionKey::parse("   ").is_err());
        assert_eq!(EncryptionKey::parse(" abc ").unwrap().expose(), "abc");
    }

    #[test]
    fn key_text_is_base64_of_32_bytes() {
        let key = EncryptionKey::from_bytes(&[0xABu8; KEY_LEN]);
        assert_eq!(STANDARD.decode(key.expose()).unwrap(), vec![0xABu8; KEY_LEN]);
    }

    #[test]
    fn key_redacted_in_debug() {
        let key = EncryptionKey::from_bytes(&[7u8; KEY_LEN]);
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains(key.expose()));
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xab]), "000fab");
    }
}
