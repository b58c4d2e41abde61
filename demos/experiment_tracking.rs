//! Experiment Tracking: assignment, events, and conversions end to end
//!
//! Simulates a small population of visitors against an in-process collector:
//! each visitor is bucketed into the hero CTA experiment, views the page, and
//! some of them convert.
//!
//! Run with: cargo run --example experiment_tracking
//! Verbose:  RUST_LOG=abtrack=debug cargo run --example experiment_tracking

use abtrack::config::{DispatcherConfig, TrackerConfig};
use abtrack::experiment::{ConversionGoal, Experiment, Variant};
use abtrack::kv::MemoryKvStore;
use abtrack::telemetry::Event;
use abtrack::transport::RecordingTransport;
use abtrack::ExperimentTracker;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

const VISITORS: usize = 200;

fn hero_experiment() -> abtrack::Result<Experiment> {
    Experiment::builder("hero-cta")
        .audience("alumni")
        .traffic_allocation(80.0)
        .variant(Variant::new("control", 1.0))
        .variant(
            Variant::new("green-button", 1.0)
                .with_override(serde_json::json!({"selector": "#cta", "style": {"background": "green"}})),
        )
        .goal(ConversionGoal::new("signup", "Alumni signup").with_value(10.0))
        .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    println!("=== abtrack: Experiment Tracking Demo ===\n");

    let experiment = hero_experiment()?;
    println!("Experiment: {} ({}% of traffic)", experiment.id(), experiment.traffic_allocation());
    for variant in experiment.variants() {
        println!("  - {} (weight {})", variant.id(), variant.weight());
    }
    println!();

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut served = [0usize; 2];
    let mut excluded = 0usize;
    let mut converted = 0usize;
    let mut total_events = 0usize;

    for visitor in 0..VISITORS {
        let config = TrackerConfig::new(format!("session-{visitor}"))
            .with_user_id(format!("alumni-{visitor}"))
            .with_audience("alumni")
            .with_experiment_fetch(false)
            .with_dispatcher(DispatcherConfig::default().with_batch_size(5));
        let tracker = ExperimentTracker::new(config, RecordingTransport::new(), MemoryKvStore::new())?;
        tracker.init().await?;
        tracker.register_experiment(experiment.clone());

        let Some(assignment) = tracker.variant("hero-cta").await else {
            continue;
        };
        if assignment.is_excluded() {
            excluded += 1;
        }
        let arm = usize::from(assignment.variant_id != "control");
        served[arm] += 1;

        tracker.track_event(Event::new("page_view").section("hero"));
        tracker.track_event(Event::new("scroll_depth").payload(serde_json::json!({"percent": 75})));

        // green converts a little more often
        let rate = if arm == 1 { 0.18 } else { 0.12 };
        if rng.gen_bool(rate) {
            tracker.track_conversion("hero-cta", "signup", None).await;
            converted += 1;
        }

        tracker.page_unload().await;
        tokio::task::yield_now().await;
        total_events += tracker.transport().event_names("/events").len();
    }

    println!("Assignments:");
    println!("  control:      {}", served[0]);
    println!("  green-button: {}", served[1]);
    println!("  excluded (served control): {excluded}");
    println!("\nConversions recorded: {converted}");
    println!("Events delivered:     {total_events}");
    println!("\n✅ Same visitor ids always land in the same variant; rerun to confirm.");

    Ok(())
}
