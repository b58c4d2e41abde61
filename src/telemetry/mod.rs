//! Behavioural event delivery.
//!
//! ```text
//! enqueue(event) → EventQueue ──trigger──→ flush
//!                                            ├─ online:  Transport (post or beacon)
//!                                            │     └─ failure → requeue front + OfflineBuffer
//!                                            └─ offline: OfflineBuffer
//! init() / reconnect: OfflineBuffer → front of EventQueue
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use abtrack::config::DispatcherConfig;
//! use abtrack::kv::MemoryKvStore;
//! use abtrack::telemetry::{BatchDispatcher, Event, FlushMode};
//! use abtrack::transport::RecordingTransport;
//!
//! # async fn example() -> abtrack::Result<()> {
//! let transport = Arc::new(RecordingTransport::new());
//! let dispatcher = Arc::new(BatchDispatcher::new(
//!     DispatcherConfig::default(),
//!     "session-abc",
//!     Arc::clone(&transport),
//!     MemoryKvStore::new(),
//! ));
//! dispatcher.init().await?;
//!
//! dispatcher.enqueue(Event::new("page_view").section("hero"));
//! let outcome = dispatcher.flush(FlushMode::Async).await;
//!
//! assert_eq!(outcome.sent(), 1);
//! assert_eq!(transport.event_names("/events"), vec!["page_view"]);
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod event;
mod offline;
mod queue;

pub use dispatcher::{BatchDispatcher, FlushMode, FlushOutcome, FlushReason, PageLifecycle};
pub use event::{Event, Priority, PriorityTable, DEFAULT_HIGH_PRIORITY};
pub use offline::{retain_newest, OfflineBuffer, DEFAULT_OFFLINE_CAPACITY, OFFLINE_EVENTS_KEY};
pub use queue::EventQueue;
