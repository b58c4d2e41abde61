//! Batched delivery of queued events.
//!
//! Flush triggers:
//! - queue length reaches `batch_size`
//! - the interval timer fires with something pending
//! - a high-priority event is enqueued
//! - page teardown, which goes through [`Transport::beacon`]
//!
//! Every flush snapshots and clears the queue under a short lock, so two
//! concurrent flushes never send the same event. Delivery is at-least-once:
//! a failed batch is put back at the front of the queue and also mirrored to
//! the [`OfflineBuffer`], so it can arrive twice after a reload.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Event, EventQueue, OfflineBuffer, Priority};
use crate::config::DispatcherConfig;
use crate::kv::KvStore;
use crate::transport::Transport;
use crate::{Error, Result};

/// How a flush talks to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Awaited `POST`; failures are requeued
    Async,
    /// Fire-and-forget beacon for teardown
    Beacon,
}

/// Why a flush was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Queue reached the batch size
    BatchFull,
    /// High-priority event enqueued
    HighPriority,
    /// Interval timer
    Interval,
    /// Page hidden or unloading
    Teardown,
    /// Connectivity came back
    Reconnect,
    /// Caller asked
    Manual,
}

/// Page visibility transitions the dispatcher reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLifecycle {
    /// Tab went to the background
    Hidden,
    /// Tab came back
    Visible,
    /// Page is going away
    Unload,
}

/// Result of one flush.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was pending
    Empty,
    /// Batch accepted by the collector
    Delivered(usize),
    /// Batch handed to the beacon primitive
    Beaconed(usize),
    /// Known offline; batch went to the offline buffer
    Offline(usize),
    /// Delivery failed; batch requeued and mirrored offline
    Requeued {
        /// Events in the failed batch
        count: usize,
        /// Why delivery failed
        error: Error,
    },
}

impl FlushOutcome {
    /// Events that left the queue for the collector.
    #[must_use]
    pub const fn sent(&self) -> usize {
        match self {
            Self::Delivered(n) | Self::Beaconed(n) => *n,
            _ => 0,
        }
    }

    /// Check if the batch is still waiting for delivery.
    #[must_use]
    pub const fn is_retained(&self) -> bool {
        matches!(self, Self::Offline(_) | Self::Requeued { .. })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchBody<'a> {
    events: &'a [Event],
    session_id: &'a str,
}

/// Owns the event queue and the offline buffer.
///
/// Background work (eager flushes, the interval timer) is spawned on the
/// current tokio runtime, so methods taking `self: &Arc<Self>` must be called
/// from inside one.
pub struct BatchDispatcher<T, S> {
    config: DispatcherConfig,
    session_id: String,
    transport: T,
    offline: OfflineBuffer<S>,
    queue: Mutex<EventQueue>,
    online: AtomicBool,
    flush_pending: AtomicBool,
    /// Failed batches may still have copies in the offline buffer.
    mirrored: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    enqueued: AtomicU64,
    flushes: AtomicU64,
}

impl<T, S> std::fmt::Debug for BatchDispatcher<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDispatcher")
            .field("session_id", &self.session_id)
            .field("pending", &self.queue.lock().len())
            .field("online", &self.online.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T, S> BatchDispatcher<T, S>
where
    T: Transport + 'static,
    S: KvStore + 'static,
{
    /// Create a dispatcher. Nothing runs until [`Self::init`] and [`Self::start`].
    pub fn new(config: DispatcherConfig, session_id: impl Into<String>, transport: T, kv: S) -> Self {
        let queue = EventQueue::new(config.priority_table());
        let offline = OfflineBuffer::new(kv, config.offline_capacity);
        Self {
            config,
            session_id: session_id.into(),
            transport,
            offline,
            queue: Mutex::new(queue),
            online: AtomicBool::new(true),
            flush_pending: AtomicBool::new(false),
            mirrored: AtomicBool::new(false),
            timer: Mutex::new(None),
            enqueued: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    /// Merge persisted offline events back into the front of the queue.
    ///
    /// Returns how many were restored. The stored copy is removed, so each
    /// event is restored exactly once; events still queued in memory are not
    /// queued a second time.
    ///
    /// # Errors
    ///
    /// Returns error if the offline buffer cannot be cleared.
    pub async fn init(&self) -> Result<usize> {
        let restored = self.offline.drain().await?;
        self.mirrored.store(false, Ordering::Release);
        if restored.is_empty() {
            return Ok(0);
        }
        Ok(self.queue.lock().requeue_front(restored))
    }

    /// Queue an event, flushing eagerly when a trigger fires.
    ///
    /// Returns the handle of a spawned flush, if one was started. Without a
    /// runtime the event stays queued for the next flush.
    pub fn enqueue(self: &Arc<Self>, event: Event) -> Option<JoinHandle<FlushOutcome>> {
        let (priority, len) = {
            let mut queue = self.queue.lock();
            let priority = queue.push(event);
            (priority, queue.len())
        };
        self.enqueued.fetch_add(1, Ordering::Relaxed);

        if priority == Priority::High {
            return self.spawn_flush(FlushReason::HighPriority);
        }
        if len >= self.config.batch_size && !self.flush_pending.swap(true, Ordering::AcqRel) {
            return self.spawn_flush(FlushReason::BatchFull);
        }
        None
    }

    fn spawn_flush(self: &Arc<Self>, reason: FlushReason) -> Option<JoinHandle<FlushOutcome>> {
        let Ok(runtime) = Handle::try_current() else {
            self.flush_pending.store(false, Ordering::Release);
            debug!(?reason, "no runtime, flush deferred");
            return None;
        };
        let this = Arc::clone(self);
        Some(runtime.spawn(async move {
            debug!(?reason, "flush triggered");
            this.flush(FlushMode::Async).await
        }))
    }

    /// Deliver everything pending.
    pub async fn flush(&self, mode: FlushMode) -> FlushOutcome {
        let batch = {
            let mut queue = self.queue.lock();
            self.flush_pending.store(false, Ordering::Release);
            queue.take_all()
        };
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        self.flushes.fetch_add(1, Ordering::Relaxed);
        let count = batch.len();

        if !self.is_online() {
            return match self.offline.append(&batch).await {
                Ok(_) => {
                    info!(count, "offline, batch stored for later");
                    FlushOutcome::Offline(count)
                }
                Err(error) => {
                    warn!(count, %error, "offline buffer unavailable, keeping batch in memory");
                    self.queue.lock().requeue_front(batch);
                    FlushOutcome::Requeued { count, error }
                }
            };
        }

        let body = match serde_json::to_value(BatchBody {
            events: &batch,
            session_id: &self.session_id,
        }) {
            Ok(body) => body,
            Err(error) => return self.retain(batch, error.into()).await,
        };

        match mode {
            FlushMode::Async => match self.transport.post_json(&self.config.events_path, body).await {
                Ok(()) => {
                    debug!(count, "batch delivered");
                    self.release_mirror(&batch).await;
                    FlushOutcome::Delivered(count)
                }
                Err(error) => self.retain(batch, error).await,
            },
            FlushMode::Beacon => {
                if self.transport.beacon(&self.config.events_path, body) {
                    debug!(count, "batch beaconed");
                    self.release_mirror(&batch).await;
                    FlushOutcome::Beaconed(count)
                } else {
                    let error = Error::Transport("beacon refused the payload".into());
                    self.retain(batch, error).await
                }
            }
        }
    }

    async fn retain(&self, batch: Vec<Event>, error: Error) -> FlushOutcome {
        let count = batch.len();
        warn!(count, %error, "delivery failed, requeueing batch");
        match self.offline.append(&batch).await {
            Ok(_) => self.mirrored.store(true, Ordering::Release),
            Err(store_error) => warn!(%store_error, "could not mirror failed batch offline"),
        }
        self.queue.lock().requeue_front(batch);
        FlushOutcome::Requeued { count, error }
    }

    /// Drop offline copies of a delivered batch left there by [`Self::retain`].
    async fn release_mirror(&self, delivered: &[Event]) {
        if !self.mirrored.load(Ordering::Acquire) {
            return;
        }
        match self.offline.forget(delivered).await {
            Ok(0) => self.mirrored.store(false, Ordering::Release),
            Ok(_) => {}
            Err(error) => warn!(%error, "could not clear delivered events from offline buffer"),
        }
    }

    /// Start the interval timer. Calling it again restarts the timer.
    ///
    /// The task only holds a weak reference; dropping the last `Arc` ends it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] outside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::NoRuntime(format!("interval flush timer: {e}")))?;
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.flush_interval();

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(this) = weak.upgrade() else { break };
                if this.pending() > 0 {
                    debug!(reason = ?FlushReason::Interval, "flush triggered");
                    this.flush(FlushMode::Async).await;
                }
            }
        });

        if let Some(previous) = self.timer.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Cancel the timer and beacon whatever is left.
    pub async fn stop(&self) -> FlushOutcome {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        self.flush(FlushMode::Beacon).await
    }

    /// React to a visibility change. Hidden and unload force a beacon flush.
    pub async fn on_lifecycle(&self, state: PageLifecycle) -> FlushOutcome {
        match state {
            PageLifecycle::Hidden | PageLifecycle::Unload => {
                debug!(?state, reason = ?FlushReason::Teardown, "flush triggered");
                self.flush(FlushMode::Beacon).await
            }
            PageLifecycle::Visible => FlushOutcome::Empty,
        }
    }

    /// Record a connectivity change.
    ///
    /// Going from offline to online restores the offline buffer and flushes;
    /// the returned handle resolves with that flush.
    pub fn set_online(self: &Arc<Self>, online: bool) -> Option<JoinHandle<FlushOutcome>> {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        if !online || was_online {
            if !online && was_online {
                info!("connectivity lost, batches will be stored offline");
            }
            return None;
        }

        info!("connectivity restored");
        let Ok(runtime) = Handle::try_current() else {
            return None;
        };
        let this = Arc::clone(self);
        Some(runtime.spawn(async move { this.reconnect().await }))
    }

    async fn reconnect(&self) -> FlushOutcome {
        match self.init().await {
            Ok(restored) if restored > 0 => debug!(restored, "offline events requeued"),
            Ok(_) => {}
            Err(error) => warn!(%error, "could not restore offline events"),
        }
        debug!(reason = ?FlushReason::Reconnect, "flush triggered");
        self.flush(FlushMode::Async).await
    }

    /// Events waiting in memory.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Names of pending events, oldest first.
    pub fn pending_names(&self) -> Vec<String> {
        self.queue.lock().iter().map(|e| e.name().to_string()).collect()
    }

    /// Events accepted by [`Self::enqueue`] since creation.
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Non-empty flushes attempted since creation.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Last known connectivity.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Durable buffer backing this dispatcher.
    pub const fn offline(&self) -> &OfflineBuffer<S> {
        &self.offline
    }

    /// Active settings.
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Session id sent with every batch.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl<T, S> Drop for BatchDispatcher<T, S> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}
