//! In-memory store fake for tests
//!
//! Implements the same [`Store`](super::Store) contract as the sled backend
//! over a mutex-guarded map, with a write-failure switch for exercising
//! `StoreUnavailable` paths.

use super::Store;
use crate::error::{ParlanceError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Mutex-guarded map implementing the [`Store`] contract
#[derive(Debug, Default)]
pub struct MemoryStore {
    cells: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `StoreUnavailable`
    ///
    /// Reads keep working so callers can verify what was (not) persisted.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ParlanceError::StoreUnavailable("injected write failure".into()).into());
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned lock means a test already panicked; propagate the map anyway.
        self.cells.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn atomic_increment(&self, key: &str) -> Result<i64> {
        self.check_writable()?;
        let mut cells = self.lock();
        let current = cells
            .get(key)
            .map(|bytes| decode_counter(bytes))
            .unwrap_or(0);
        let next = current + 1;
        cells.insert(key.to_string(), next.to_be_bytes().to_vec());
        Ok(next)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.lock().remove(key);
        Ok(())
    }
}

pub(super) fn decode_counter(bytes: &[u8]) -> i64 {
    match <[u8; 8]>::try_from(bytes) {
        Ok(raw) => i64::from_be_bytes(raw),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put("a/b", b"value").await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap().unwrap(), b"value");

        store.delete("a/b").await.unwrap();
        assert!(store.get("a/b").await.unwrap().is_none());
        // Deleting an absent key is fine
        store.delete("a/b").await.unwrap();
    }

    #[tokio::test]
    async fn test_atomic_increment_starts_at_one() {
        let store = MemoryStore::new();
        assert_eq!(store.atomic_increment("c").await.unwrap(), 1);
        assert_eq!(store.atomic_increment("c").await.unwrap(), 2);
        assert_eq!(store.atomic_increment("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_respects_prefix() {
        let store = MemoryStore::new();
        store.put("m/1", b"1").await.unwrap();
        store.put("m/2", b"2").await.unwrap();
        store.put("n/1", b"3").await.unwrap();

        let keys = store.list("m/").await.unwrap();
        assert_eq!(keys, vec!["m/1".to_string(), "m/2".to_string()]);
    }

    #[tokio::test]
    async fn test_fail_writes_blocks_mutation_only() {
        let store = MemoryStore::new();
        store.put("k", b"v").await.unwrap();
        store.fail_writes(true);

        assert!(store.put("k2", b"v").await.is_err());
        assert!(store.atomic_increment("c").await.is_err());
        assert!(store.delete("k").await.is_err());
        // Reads still work
        assert_eq!(store.get("k").await.unwrap().unwrap(), b"v");

        store.fail_writes(false);
        store.put("k2", b"v").await.unwrap();
    }
}
