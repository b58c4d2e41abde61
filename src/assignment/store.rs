//! Two-tier persistence of visitor → experiment → variant.
//!
//! ```text
//! assignments:{user_id}             durable, survives sessions
//! session-assignments:{session_id}  anonymous visitors
//! ```
//!
//! Reads merge both tiers with the durable one winning. Corrupt entries are
//! logged and read as empty; the next write replaces them.

use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::Identity;
use crate::kv::KvStore;
use crate::{Error, Result};

/// Persisted map shape: `{experimentId: variantId}`.
pub type AssignmentMap = FxHashMap<String, String>;

/// Durable tier key for a known user.
#[must_use]
pub fn durable_key(user_id: &str) -> String {
    format!("assignments:{user_id}")
}

/// Session tier key for an anonymous visitor.
#[must_use]
pub fn session_key(session_id: &str) -> String {
    format!("session-assignments:{session_id}")
}

/// Assignment cache over a [`KvStore`].
#[derive(Debug)]
pub struct AssignmentStore<S> {
    kv: S,
    // read-modify-write of one map must not interleave with another
    write_lock: Mutex<()>,
}

impl<S: KvStore> AssignmentStore<S> {
    /// Wrap a key-value backend.
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Underlying backend.
    pub const fn kv(&self) -> &S {
        &self.kv
    }

    /// Stored variant for `(identity, experiment_id)`.
    ///
    /// Backend and decode failures are logged and reported as a miss.
    pub async fn get(&self, identity: &Identity, experiment_id: &str) -> Option<String> {
        if let Some(user_id) = identity.user_id() {
            if let Some(variant) = self.load(&durable_key(user_id)).await.remove(experiment_id) {
                return Some(variant);
            }
        }
        self.load(&session_key(identity.session_id()))
            .await
            .remove(experiment_id)
    }

    /// Record a variant. Goes to the durable tier when the user is known.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the write (e.g. quota exceeded).
    pub async fn put(&self, identity: &Identity, experiment_id: &str, variant_id: &str) -> Result<()> {
        let key = identity
            .user_id()
            .map_or_else(|| session_key(identity.session_id()), durable_key);

        let _guard = self.write_lock.lock().await;
        let mut map = self.load(&key).await;
        map.insert(experiment_id.to_string(), variant_id.to_string());
        self.kv.set_json(&key, &map).await?;
        debug!(key = %key, experiment_id, variant_id, "assignment persisted");
        Ok(())
    }

    /// Merged view of both tiers, durable entries overriding session ones.
    pub async fn all(&self, identity: &Identity) -> AssignmentMap {
        let mut merged = self.load(&session_key(identity.session_id())).await;
        if let Some(user_id) = identity.user_id() {
            merged.extend(self.load(&durable_key(user_id)).await);
        }
        merged
    }

    /// Forget every assignment for this identity (both tiers).
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails to delete.
    pub async fn clear(&self, identity: &Identity) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.delete(&session_key(identity.session_id())).await?;
        if let Some(user_id) = identity.user_id() {
            self.kv.delete(&durable_key(user_id)).await?;
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> AssignmentMap {
        match self.kv.get_json::<AssignmentMap>(key).await {
            Ok(map) => map.unwrap_or_default(),
            Err(Error::Serialization(error)) => {
                warn!(key, %error, "corrupt assignment map, treating as empty");
                AssignmentMap::default()
            }
            Err(error) => {
                warn!(key, %error, "assignment store unavailable, treating as empty");
                AssignmentMap::default()
            }
        }
    }
}
