//! Field encryption at rest: AES-256-GCM with PBKDF2-HMAC-SHA256 derived keys.
//!
//! This module is intentionally free of HTTP and storage dependencies.
//!
//! # Envelope format
//!
//! ```text
//! base64( nonce[12] || salt[16] || ciphertext || tag[16] )
//! ```
//!
//! Every call to `encrypt` draws a fresh nonce and salt, and the AES key is
//! re-derived from the caller's key text with 100 000 PBKDF2 rounds.
//!
//! # Backends
//!
//! [`BackendSelector`] activates the RustCrypto backend once per process and
//! falls back to `ring` if it fails to load. [`FieldEncryption`] routes each
//! call to the active backend and re-issues a failed fast-backend call on the
//! fallback.

pub mod backend;
pub mod engine;
pub mod envelope;
pub mod fallback;
pub mod fast;
pub mod selector;

pub use backend::BackendPreference;
pub use engine::FieldEncryption;
pub use envelope::{EncryptionError, EncryptionKey};
pub use selector::BackendSelector;
