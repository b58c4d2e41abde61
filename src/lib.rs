//! # abtrack: Experiment Assignment and Telemetry Delivery
//!
//! **Version**: 0.4.2
//!
//! abtrack buckets visitors into weighted experiment variants deterministically
//! and delivers behavioural events to a collector in batches, surviving flaky
//! connectivity and page teardown.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: Experiments are validated on construction, so
//!   assignment cannot index past the variant list
//! - **Jidoka**: Failed deliveries stop at the queue front and the offline
//!   buffer instead of disappearing
//! - **Heijunka**: Events are levelled into batches by size, time, and priority
//! - **Genchi Genbutsu**: Significance is computed from the observed counts
//!
//! ## Example Usage
//!
//! ```rust
//! use abtrack::config::TrackerConfig;
//! use abtrack::experiment::{ConversionGoal, Experiment, Variant};
//! use abtrack::kv::MemoryKvStore;
//! use abtrack::transport::RecordingTransport;
//! use abtrack::ExperimentTracker;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> abtrack::Result<()> {
//! let config = TrackerConfig::new("session-abc")
//!     .with_audience("alumni")
//!     .with_experiment_fetch(false);
//! let tracker = ExperimentTracker::new(config, RecordingTransport::new(), MemoryKvStore::new())?;
//! tracker.init().await?;
//!
//! tracker.register_experiment(
//!     Experiment::builder("hero-cta")
//!         .variant(Variant::new("control", 1.0))
//!         .variant(Variant::new("green", 1.0))
//!         .goal(ConversionGoal::new("signup", "Alumni signup"))
//!         .build()?,
//! );
//!
//! if let Some(assignment) = tracker.variant("hero-cta").await {
//!     println!("serving {}", assignment.variant_id);
//! }
//! tracker.track("page_view");
//! tracker.track_conversion("hero-cta", "signup", None).await;
//!
//! tracker.destroy().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod assignment;
pub mod config;
pub mod error;
pub mod experiment;
pub mod kv;
pub mod stats;
pub mod telemetry;
pub mod tracker;
pub mod transport;

pub use assignment::{Assignment, AssignmentSource, Identity, VariantAssignor};
pub use error::{Error, Result};
pub use stats::{SignificanceEngine, SignificanceResult};
pub use telemetry::{BatchDispatcher, Event, FlushMode, FlushOutcome};
pub use tracker::{ConversionOutcome, ExperimentTracker, IgnoredReason};
