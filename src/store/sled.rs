//! Sled-backed store
//!
//! Production implementation of the [`Store`](super::Store) contract over an
//! embedded `sled` database. Counter cells are 8-byte big-endian integers
//! updated through sled's compare-and-swap loop, which gives the atomic,
//! totally ordered increment the id allocator depends on.

use super::memory::decode_counter;
use super::Store;
use crate::error::{ParlanceError, Result};
use async_trait::async_trait;
use sled::Db;
use std::path::Path;

/// Embedded key-value store for conversation state
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a store at the given directory
    ///
    /// # Errors
    ///
    /// Returns `ParlanceError::StoreUnavailable` if the database cannot be
    /// opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use parlance::store::SledStore;
    ///
    /// # fn main() -> parlance::error::Result<()> {
    /// let store = SledStore::open("data/parlance.db")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ParlanceError::StoreUnavailable(format!("open failed: {}", e)))?;
        Ok(Self { db })
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ParlanceError::StoreUnavailable(format!("flush failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl Store for SledStore {
    async fn atomic_increment(&self, key: &str) -> Result<i64> {
        let updated = self
            .db
            .update_and_fetch(key.as_bytes(), |old| {
                let next = old.map(decode_counter).unwrap_or(0) + 1;
                Some(next.to_be_bytes().to_vec())
            })
            .map_err(|e| ParlanceError::StoreUnavailable(format!("increment failed: {}", e)))?;

        self.flush()?;
        match updated {
            Some(bytes) => Ok(decode_counter(&bytes)),
            // update_and_fetch always stores Some; treat the impossible as unavailable
            None => Err(ParlanceError::StoreUnavailable("counter cell vanished".into()).into()),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| ParlanceError::StoreUnavailable(format!("insert failed: {}", e)))?;
        self.flush()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| ParlanceError::StoreUnavailable(format!("get failed: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry
                .map_err(|e| ParlanceError::StoreUnavailable(format!("scan failed: {}", e)))?;
            match String::from_utf8(key.to_vec()) {
                Ok(key) => found.push(key),
                Err(_) => {
                    tracing::warn!("skipping non-utf8 key under prefix {}", prefix);
                }
            }
        }
        Ok(found)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| ParlanceError::StoreUnavailable(format!("remove failed: {}", e)))?;
        self.flush()
    }
}
