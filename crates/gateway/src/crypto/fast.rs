//! Fast backend: RustCrypto AES-256-GCM with PBKDF2-HMAC-SHA256 key derivation.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use hmac::Hmac;
use sha2::{Digest, Sha256};

use super::backend::CryptoBackend;
use super::envelope::{
    to_hex, CipherEnvelope, EncryptionError, EncryptionKey, KEY_LEN, NONCE_LEN,
    PBKDF2_ITERATIONS, SALT_LEN,
};
use super::selector::BackendError;

/// SHA-256("abc"), FIPS 180-2 appendix B.1.
const SHA256_ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

/// Pure-Rust backend built on the RustCrypto AEAD, KDF, and hash crates.
#[derive(Debug, Default)]
pub struct RustCryptoBackend;

impl RustCryptoBackend {
    /// Construct the backend and run its self-test.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::SelfTest`] if the SHA-256 known answer does not
    /// match or a seal/open round trip does not recover its input.
    pub fn load() -> Result<Self, BackendError> {
        let backend = Self;

        let digest = backend
            .digest(b"abc")
            .map_err(|e| BackendError::SelfTest(e.to_string()))?;
        if to_hex(&digest) != SHA256_ABC {
            return Err(BackendError::SelfTest("sha-256 known answer mismatch".into()));
        }

        let key = backend
            .generate_key()
            .map_err(|e| BackendError::SelfTest(e.to_string()))?;
        let sample = b"backend self-test";
        let sealed = backend
            .encrypt(sample, &key)
            .map_err(|e| BackendError::SelfTest(e.to_string()))?;
        let opened = backend
            .decrypt(&sealed, &key)
            .map_err(|e| BackendError::SelfTest(e.to_string()))?;
        if opened != sample {
            return Err(BackendError::SelfTest("round trip mismatch".into()));
        }

        Ok(backend)
    }
}

impl CryptoBackend for RustCryptoBackend {
    fn name(&self) -> &'static str {
        "rustcrypto"
    }

    fn generate_key(&self) -> Result<EncryptionKey, EncryptionError> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| EncryptionError::Random)?;
        let key = EncryptionKey::from_bytes(&bytes);
        bytes.iter_mut().for_each(|b| *b = 0);
        Ok(key)
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &EncryptionKey,
    ) -> Result<CipherEnvelope, EncryptionError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|_| EncryptionError::Random)?;
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| EncryptionError::Random)?;

        let cipher = build_cipher(key, &salt).map_err(|_| EncryptionError::Encrypt)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| EncryptionError::Encrypt)?;

        Ok(CipherEnvelope {
            nonce,
            salt,
            ciphertext,
        })
    }

    fn decrypt(
        &self,
        envelope: &CipherEnvelope,
        key: &EncryptionKey,
    ) -> Result<Vec<u8>, EncryptionError> {
        let cipher = build_cipher(key, &envelope.salt).map_err(|_| EncryptionError::Decrypt)?;
        cipher
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_ref())
            .map_err(|_| EncryptionError::Decrypt)
    }

    fn digest(&self, data: &[u8]) -> Result<[u8; 32], EncryptionError> {
        Ok(Sha256::digest(data).into())
    }
}

/// Derive the per-call AES key from `key` and `salt` and build the cipher.
fn build_cipher(key: &EncryptionKey, salt: &[u8]) -> Result<Aes256Gcm, EncryptionError> {
    let mut derived = [0u8; KEY_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(key.password(), salt, PBKDF2_ITERATIONS, &mut derived)
        .map_err(|_| EncryptionError::Encrypt)?;
    let cipher = Aes256Gcm::new_from_slice(&derived).map_err(|_| EncryptionError::Encrypt);
    derived.iter_mut().for_each(|b| *b = 0);
    cipher
}
