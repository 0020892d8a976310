//! Storage trait: the abstract interface for the local projection.
//!
//! This trait allows the services to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A key/value pair returned by scans.
pub type Entry = (Vec<u8>, Vec<u8>);

/// The Storage trait: async interface over an ordered byte-keyed store.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or overwrite a value.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Get a value by key.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Check if a key exists.
    async fn has(&self, key: &[u8]) -> Result<bool>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &[u8]) -> Result<()>;

    /// All entries, ordered by key.
    async fn get_all(&self) -> Result<Vec<Entry>>;

    /// All entries whose key starts with `prefix`, ordered by key.
    async fn get_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>>;

    /// Remove every entry.
    async fn delete_all(&self) -> Result<()>;

    /// Remove every entry whose key starts with `prefix`.
    async fn delete_all_with_prefix(&self, prefix: &[u8]) -> Result<()>;
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for Arc<S> {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).put(key, value).await
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn has(&self, key: &[u8]) -> Result<bool> {
        (**self).has(key).await
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        (**self).delete(key).await
    }

    async fn get_all(&self) -> Result<Vec<Entry>> {
        (**self).get_all().await
    }

    async fn get_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
        (**self).get_all_with_prefix(prefix).await
    }

    async fn delete_all(&self) -> Result<()> {
        (**self).delete_all().await
    }

    async fn delete_all_with_prefix(&self, prefix: &[u8]) -> Result<()> {
        (**self).delete_all_with_prefix(prefix).await
    }
}

/// The smallest key greater than every key starting with `prefix`.
///
/// `None` when no such bound exists (empty prefix or all `0xff`).
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}
