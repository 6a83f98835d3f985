//! [`MemoryStore`]: process-local [`TransactionStore`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{StoreError, StoredTransaction, TransactionStore};

#[derive(Debug, Default)]
struct Inner {
    /// Rows in insertion order.
    rows: Vec<StoredTransaction>,
    /// Row id to position in `rows`.
    index: HashMap<String, usize>,
}

/// In-memory store shared by cloning.
///
/// Reads take a shared lock; inserts take the write lock only long enough to
/// append one row.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

impl TransactionStore for MemoryStore {
    fn insert(&self, record: StoredTransaction) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if inner.index.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        let position = inner.rows.len();
        inner.index.insert(record.id.clone(), position);
        inner.rows.push(record);
        Ok(())
    }

    fn select(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut rows: Vec<&StoredTransaction> = inner
            .rows
            .iter()
            .rev()
            .filter(|row| row.user_id == user_id)
            .collect();
        // Stable: rows sharing a timestamp keep newest-inserted first.
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn get(&self, id: &str) -> Result<Option<StoredTransaction>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.index.get(id).map(|&i| inner.rows[i].clone()))
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().map_err(poisoned)?.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, user_id: &str, created_at: u64) -> StoredTransaction {
        StoredTransaction {
            id: id.into(),
            user_id: user_id.into(),
            date: "2024-03-01".into(),
            description: "c2VhbGVk".into(),
            amount: 12.5,
            is_anomaly: None,
            model_score: None,
            gpt_insight: None,
            created_at,
        }
    }

    #[test]
    fn insert_then_get() {
        let store = MemoryStore::new();
        store.insert(row("t1", "u1", 1)).unwrap();
        assert_eq!(store.get("t1").unwrap(), Some(row("t1", "u1", 1)));
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        store.insert(row("t1", "u1", 1)).unwrap();
        assert_eq!(
            store.insert(row("t1", "u2", 2)),
            Err(StoreError::Duplicate("t1".into()))
        );
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn select_is_newest_first_and_scoped_to_user() {
        let store = MemoryStore::new();
        store.insert(row("a", "u1", 100)).unwrap();
        store.insert(row("b", "u2", 150)).unwrap();
        store.insert(row("c", "u1", 300)).unwrap();
        store.insert(row("d", "u1", 200)).unwrap();

        let ids: Vec<_> = store
            .select("u1", 10, 0)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["c", "d", "a"]);
    }

    #[test]
    fn select_pages_with_limit_and_offset() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.insert(row(&format!("t{i}"), "u1", i)).unwrap();
        }
        let page: Vec<_> = store
            .select("u1", 2, 1)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(page, vec!["t3", "t2"]);
        assert!(store.select("u1", 10, 5).unwrap().is_empty());
    }

    #[test]
    fn equal_timestamps_keep_newest_insert_first() {
        let store = MemoryStore::new();
        store.insert(row("first", "u1", 7)).unwrap();
        store.insert(row("second", "u1", 7)).unwrap();
        let ids: Vec<_> = store
            .select("u1", 10, 0)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn clones_share_rows() {
        let store = MemoryStore::new();
        let other = store.clone();
        other.insert(row("t1", "u1", 1)).unwrap();
        assert!(store.get("t1").unwrap().is_some());
    }
}
