//! Durable buffer for events that could not be delivered.
//!
//! Stored as one JSON array under a single key. Appends past the capacity
//! drop from the oldest end.

use rustc_hash::FxHashSet;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::Event;
use crate::kv::KvStore;
use crate::{Error, Result};

/// Storage key of the offline buffer.
pub const OFFLINE_EVENTS_KEY: &str = "offline-events";

/// Default number of retained events.
pub const DEFAULT_OFFLINE_CAPACITY: usize = 1000;

/// Capped, persisted list of undelivered events.
#[derive(Debug)]
pub struct OfflineBuffer<S> {
    kv: S,
    capacity: usize,
    lock: Mutex<()>,
}

/// Drop the oldest entries so at most `capacity` remain. Returns how many went.
pub fn retain_newest<T>(events: &mut Vec<T>, capacity: usize) -> usize {
    let excess = events.len().saturating_sub(capacity);
    events.drain(..excess);
    excess
}

impl<S: KvStore> OfflineBuffer<S> {
    /// Buffer over `kv` holding at most `capacity` events.
    pub fn new(kv: S, capacity: usize) -> Self {
        Self {
            kv,
            capacity,
            lock: Mutex::new(()),
        }
    }

    /// Maximum retained events.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current contents, oldest first. Corrupt or unreadable data reads as empty.
    pub async fn load(&self) -> Vec<Event> {
        match self.kv.get_json::<Vec<Event>>(OFFLINE_EVENTS_KEY).await {
            Ok(events) => events.unwrap_or_default(),
            Err(Error::Serialization(error)) => {
                warn!(%error, "corrupt offline event buffer, discarding");
                Vec::new()
            }
            Err(error) => {
                warn!(%error, "offline event buffer unreadable");
                Vec::new()
            }
        }
    }

    /// Number of buffered events.
    pub async fn len(&self) -> usize {
        self.load().await.len()
    }

    /// Append events, trimming the oldest past capacity.
    ///
    /// Events whose id is already stored are skipped, so mirroring the same
    /// batch twice keeps one copy. Returns how many events were dropped to
    /// make room.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the write.
    pub async fn append(&self, batch: &[Event]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().await;
        let mut events = self.load().await;
        let mut seen: FxHashSet<_> = events.iter().map(Event::id).collect();
        events.extend(batch.iter().filter(|e| seen.insert(e.id())).cloned());
        let dropped = retain_newest(&mut events, self.capacity);
        if dropped > 0 {
            warn!(dropped, capacity = self.capacity, "offline buffer full, dropped oldest events");
        }
        self.kv.set_json(OFFLINE_EVENTS_KEY, &events).await?;
        Ok(dropped)
    }

    /// Remove delivered events by id. Returns how many remain stored.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the write.
    pub async fn forget(&self, delivered: &[Event]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut events = self.load().await;
        let before = events.len();
        let ids: FxHashSet<_> = delivered.iter().map(Event::id).collect();
        events.retain(|e| !ids.contains(&e.id()));

        if events.is_empty() {
            if before > 0 {
                self.kv.delete(OFFLINE_EVENTS_KEY).await?;
            }
        } else if events.len() < before {
            self.kv.set_json(OFFLINE_EVENTS_KEY, &events).await?;
        }
        Ok(events.len())
    }

    /// Take everything out of durable storage.
    ///
    /// # Errors
    ///
    /// Returns error if the stored copy cannot be deleted; the events are not
    /// returned in that case so they are not replayed twice.
    pub async fn drain(&self) -> Result<Vec<Event>> {
        let _guard = self.lock.lock().await;
        let events = self.load().await;
        self.kv.delete(OFFLINE_EVENTS_KEY).await?;
        if !events.is_empty() {
            info!(count = events.len(), "restored offline events");
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn batch(prefix: &str, n: usize) -> Vec<Event> {
        (0..n).map(|i| Event::new(format!("{prefix}{i}"))).collect()
    }

    #[test]
    fn test_retain_newest() {
        let mut values: Vec<u32> = (0..1005).collect();
        assert_eq!(retain_newest(&mut values, 1000), 5);
        assert_eq!(values.len(), 1000);
        assert_eq!(values[0], 5);

        let mut short = vec![1, 2];
        assert_eq!(retain_newest(&mut short, 1000), 0);
        assert_eq!(short, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_append_and_drain() {
        let buffer = OfflineBuffer::new(MemoryKvStore::new(), 10);
        buffer.append(&batch("e", 3)).await.unwrap();
        assert_eq!(buffer.len().await, 3);

        let drained = buffer.drain().await.unwrap();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].name(), "e0");
        assert_eq!(buffer.len().await, 0);
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest_across_appends() {
        let buffer = OfflineBuffer::new(MemoryKvStore::new(), 4);
        buffer.append(&batch("a", 3)).await.unwrap();
        let dropped = buffer.append(&batch("b", 3)).await.unwrap();

        assert_eq!(dropped, 2);
        let names: Vec<String> = buffer
            .load()
            .await
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["a2", "b0", "b1", "b2"]);
    }

    #[tokio::test]
    async fn test_corrupt_buffer_reads_empty_and_recovers() {
        let kv = MemoryKvStore::new();
        kv.set(OFFLINE_EVENTS_KEY, b"{\"oops\":".to_vec()).await.unwrap();
        let buffer = OfflineBuffer::new(kv, 10);

        assert!(buffer.load().await.is_empty());
        buffer.append(&batch("e", 1)).await.unwrap();
        assert_eq!(buffer.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_same_batch_keeps_one_copy() {
        let buffer = OfflineBuffer::new(MemoryKvStore::new(), 10);
        let events = batch("e", 2);

        buffer.append(&events).await.unwrap();
        buffer.append(&events).await.unwrap();

        assert_eq!(buffer.len().await, 2);
    }

    #[tokio::test]
    async fn test_forget_removes_delivered_by_id() {
        let buffer = OfflineBuffer::new(MemoryKvStore::new(), 10);
        let events = batch("e", 3);
        buffer.append(&events).await.unwrap();

        assert_eq!(buffer.forget(&events[..2]).await.unwrap(), 1);
        assert_eq!(buffer.load().await[0].name(), "e2");

        assert_eq!(buffer.forget(&events).await.unwrap(), 0);
        assert!(!buffer.kv.exists(OFFLINE_EVENTS_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_append_is_noop() {
        let buffer = OfflineBuffer::new(MemoryKvStore::new(), 10);
        assert_eq!(buffer.append(&[]).await.unwrap(), 0);
        assert!(!buffer.kv.exists(OFFLINE_EVENTS_KEY).await.unwrap());
    }
}
