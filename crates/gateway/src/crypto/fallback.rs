//! Fallback backend: the `ring` platform provider.

use std::num::NonZeroU32;

use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM},
    digest, pbkdf2,
    rand::{SecureRandom, SystemRandom},
};

use super::backend::CryptoBackend;
use super::envelope::{
    CipherEnvelope, EncryptionError, EncryptionKey, KEY_LEN, NONCE_LEN, PBKDF2_ITERATIONS,
    SALT_LEN,
};

/// Backend built on `ring`. Always available; holds only the system RNG handle.
#[derive(Debug)]
pub struct RingBackend {
    rng: SystemRandom,
}

impl RingBackend {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    fn fill(&self, buf: &mut [u8]) -> Result<(), EncryptionError> {
        self.rng.fill(buf).map_err(|_| EncryptionError::Random)
    }
}

impl Default for RingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoBackend for RingBackend {
    fn name(&self) -> &'static str {
        "ring"
    }

    fn generate_key(&self) -> Result<EncryptionKey, EncryptionError> {
        let mut bytes = [0u8; KEY_LEN];
        self.fill(&mut bytes)?;
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
        self.fill(&mut salt)?;
        self.fill(&mut nonce)?;

        let sealing_key = derive_key(key, &salt).map_err(|_| EncryptionError::Encrypt)?;
        let mut in_out = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| EncryptionError::Encrypt)?;

        Ok(CipherEnvelope {
            nonce,
            salt,
            ciphertext: in_out,
        })
    }

    fn decrypt(
        &self,
        envelope: &CipherEnvelope,
        key: &EncryptionKey,
    ) -> Result<Vec<u8>, EncryptionError> {
        let opening_key = derive_key(key, &envelope.salt).map_err(|_| EncryptionError::Decrypt)?;
        let mut in_out = envelope.ciphertext.clone();
        let plaintext_len = opening_key
            .open_in_place(
                Nonce::assume_unique_for_key(envelope.nonce),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| EncryptionError::Decrypt)?
            .len();
        in_out.truncate(plaintext_len);
        Ok(in_out)
    }

    fn digest(&self, data: &[u8]) -> Result<[u8; 32], EncryptionError> {
        let digest = digest::digest(&digest::SHA256, data);
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_ref());
        Ok(out)
    }
}

/// PBKDF2-HMAC-SHA256 over the key text and `salt`, wrapped as an AES-256-GCM key.
fn derive_key(key: &EncryptionKey, salt: &[u8]) -> Result<LessSafeKey, EncryptionError> {
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or(EncryptionError::Encrypt)?;
    let mut derived = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        key.password(),
        &mut derived,
    );
    let unbound = UnboundKey::new(&AES_256_GCM, &derived).map_err(|_| EncryptionError::Encrypt);
    derived.iter_mut().for_each(|b| *b = 0);
    Ok(LessSafeKey::new(unbound?))
}
