//! Key-value persistence for assignments and the offline event buffer.
//!
//! Everything the pipeline keeps across restarts goes through [`KvStore`]:
//! - `assignments:{user_id}` - durable identity → experiment → variant map
//! - `session-assignments:{session_id}` - anonymous visitor map
//! - `offline-events` - capped list of undelivered events
//!
//! Backends:
//! - [`MemoryKvStore`]: process-local, optional byte quota (mirrors browser storage limits)
//! - [`FileKvStore`]: one JSON file per key, survives restarts
//!
//! # Example
//!
//! ```rust
//! use abtrack::kv::{KvStore, MemoryKvStore};
//!
//! # async fn example() -> abtrack::Result<()> {
//! let store = MemoryKvStore::new();
//!
//! store.set_json("assignments:u1", &serde_json::json!({"exp_1": "control"})).await?;
//! let map: Option<serde_json::Value> = store.get_json("assignments:u1").await?;
//! assert!(map.is_some());
//!
//! store.delete("assignments:u1").await?;
//! assert!(!store.exists("assignments:u1").await?);
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;

pub use file::FileKvStore;
pub use memory::MemoryKvStore;

use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Storage capability used by the assignment store and the offline buffer.
///
/// Values are opaque bytes; the JSON helpers layer the persisted formats on top.
pub trait KvStore: Send + Sync {
    /// Get a value by key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Set a value for a key.
    ///
    /// Overwrites any existing value.
    fn set(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Delete a key.
    ///
    /// No-op if the key doesn't exist.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }

    /// Read and decode a JSON value.
    ///
    /// A present-but-undecodable value is an [`Error::Serialization`](crate::Error::Serialization);
    /// callers decide whether that means "empty".
    fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<T>>> + Send {
        async move {
            match self.get(key).await? {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            }
        }
    }

    /// Encode a value as JSON and store it.
    fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> impl Future<Output = Result<()>> + Send {
        let encoded = serde_json::to_vec(value);
        async move { self.set(key, encoded?).await }
    }
}

impl<S: KvStore> KvStore for Arc<S> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        (**self).exists(key)
    }
}
