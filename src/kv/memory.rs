//! In-memory KV store implementation using `DashMap`.
//!
//! Data is lost on process restart; use [`FileKvStore`](super::FileKvStore)
//! when the offline buffer must survive reloads.

use super::KvStore;
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory key-value store with an optional byte quota.
///
/// Browser storage rejects writes once its quota is spent; setting a quota
/// here reproduces that failure mode so degradation paths can be exercised.
///
/// # Example
///
/// ```rust
/// use abtrack::kv::{KvStore, MemoryKvStore};
///
/// # async fn example() -> abtrack::Result<()> {
/// let store = MemoryKvStore::with_quota(16);
/// store.set("small", b"ok".to_vec()).await?;
/// assert!(store.set("large", vec![0u8; 64]).await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryKvStore {
    entries: DashMap<String, Vec<u8>>,
    quota_bytes: Option<usize>,
    used_bytes: AtomicUsize,
}

impl MemoryKvStore {
    /// Create an unbounded in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            quota_bytes: None,
            used_bytes: AtomicUsize::new(0),
        }
    }

    /// Create a store that rejects writes once keys + values exceed `quota_bytes`.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently accounted against the quota.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Relaxed)
    }

    /// Snapshot of the stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Drop every entry, like clearing site data.
    pub fn clear(&self) {
        self.entries.clear();
        self.used_bytes.store(0, Ordering::Relaxed);
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let incoming = key.len() + value.len();
        let outgoing = self.entries.get(key).map_or(0, |v| key.len() + v.len());

        if let Some(quota) = self.quota_bytes {
            let projected = self.used_bytes() - outgoing + incoming;
            if projected > quota {
                return Err(Error::StorageError(format!(
                    "quota exceeded writing '{key}': {projected} of {quota} bytes"
                )));
            }
        }

        self.entries.insert(key.to_string(), value);
        self.used_bytes.fetch_add(incoming, Ordering::Relaxed);
        self.used_bytes.fetch_sub(outgoing, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some((k, v)) = self.entries.remove(key) {
            self.used_bytes.fetch_sub(k.len() + v.len(), Ordering::Relaxed);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }
}
