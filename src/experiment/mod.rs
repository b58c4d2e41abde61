//! Experiment model
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Variant (N)        [first = control, relative weights]
//!      │
//!      └──< ConversionGoal (N)
//!
//! ExperimentResults (1) ──< VariantStats (N)  [reporting only]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use abtrack::experiment::{ConversionGoal, Experiment, Variant};
//!
//! let experiment = Experiment::builder("hero-cta")
//!     .traffic_allocation(50.0)
//!     .variant(Variant::new("control", 1.0))
//!     .variant(Variant::new("green-button", 1.0))
//!     .goal(ConversionGoal::new("signup", "Alumni signup"))
//!     .build()?;
//!
//! assert_eq!(experiment.control().id(), "control");
//! # Ok::<(), abtrack::Error>(())
//! ```

mod catalog;
mod definition;
mod results;

pub use catalog::ExperimentCatalog;
pub use definition::{ConversionGoal, Experiment, ExperimentBuilder, ExperimentStatus, Variant};
pub use results::{ExperimentResults, VariantComparison, VariantStats};
