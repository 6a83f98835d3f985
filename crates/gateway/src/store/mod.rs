//! Transaction persistence behind the [`TransactionStore`] seam.
//!
//! Records reach the store with their sensitive columns already sealed; the
//! store never sees plaintext descriptions or insights, nor the keys that
//! would open them.

pub mod memory;

pub use memory::MemoryStore;

use thiserror::Error;

/// Errors produced by a [`TransactionStore`].
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// A record with the same id already exists.
    #[error("transaction {0} already exists")]
    Duplicate(String),

    /// The backing store cannot serve requests right now.
    #[error("transaction store unavailable: {0}")]
    Unavailable(String),
}

/// A transaction row as persisted: `description` and `gpt_insight` hold
/// base64 envelopes, never plaintext.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransaction {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub is_anomaly: Option<bool>,
    pub model_score: Option<f64>,
    pub gpt_insight: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// Storage for encrypted transaction rows.
#[cfg_attr(test, mockall::automock)]
pub trait TransactionStore: Send + Sync {
    /// Persist a new row.
    fn insert(&self, record: StoredTransaction) -> Result<(), StoreError>;

    /// Rows owned by `user_id`, newest first, after skipping `offset`.
    fn select(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredTransaction>, StoreError>;

    fn get(&self, id: &str) -> Result<Option<StoredTransaction>, StoreError>;

    /// Total rows held. Doubles as the reachability check behind `/health`.
    fn count(&self) -> Result<usize, StoreError>;
}
