//! In-memory implementation of the Storage trait.
//!
//! Used by tests and by nodes configured without a database file. It has
//! the same semantics as SQLite but keeps everything in memory with no
//! persistence.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::traits::{prefix_upper_bound, Entry, Storage};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Key range covering every key that starts with `prefix`.
fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let upper = match prefix_upper_bound(prefix) {
        Some(bound) => Bound::Excluded(bound),
        None => Bound::Unbounded,
    };
    (Bound::Included(prefix.to_vec()), upper)
}

#[async_trait]
impl Storage for MemoryStore {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.read()?.contains_key(key))
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.write()?.remove(key);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Entry>> {
        Ok(self
            .read()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn get_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
        Ok(self
            .read()?
            .range(prefix_range(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete_all(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    async fn delete_all_with_prefix(&self, prefix: &[u8]) -> Result<()> {
        let mut inner = self.write()?;
        let doomed: Vec<Vec<u8>> = inner
            .range(prefix_range(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            inner.remove(&key);
        }
        Ok(())
    }
}
