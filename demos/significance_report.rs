//! Significance Report: compare variants against the control
//!
//! Feeds canned results through the tracker's reporting path and prints a
//! per-variant table with lift and two-proportion z-test outcome.
//!
//! Run with: cargo run --example significance_report

use abtrack::config::TrackerConfig;
use abtrack::kv::MemoryKvStore;
use abtrack::stats::SignificanceEngine;
use abtrack::transport::RecordingTransport;
use abtrack::ExperimentTracker;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    println!("=== abtrack: Significance Report ===\n");

    let transport = RecordingTransport::new();
    transport.respond_with(
        "/experiments/hero-cta/results",
        serde_json::json!({
            "experimentId": "hero-cta",
            "variants": [
                {"variantId": "control", "samples": 1000, "conversions": 100},
                {"variantId": "green-button", "samples": 1000, "conversions": 130},
                {"variantId": "bold-copy", "samples": 1000, "conversions": 102},
                {"variantId": "not-launched", "samples": 0, "conversions": 0}
            ]
        }),
    );

    let config = TrackerConfig::new("report-session").with_experiment_fetch(false);
    let tracker = ExperimentTracker::new(config, transport, MemoryKvStore::new())?;

    let results = tracker.results("hero-cta").await?;
    if let Some(control) = results.control() {
        println!(
            "Control '{}': {} / {} ({:.1}%)\n",
            control.variant_id(),
            control.conversions(),
            control.samples(),
            control.conversion_rate().unwrap_or(0.0) * 100.0
        );
    }

    println!("{:<14} {:>8} {:>8} {:>8} {:>10}  verdict", "variant", "rate", "lift", "z", "p-value");
    for row in tracker.analyze("hero-cta").await? {
        let rate = row.conversion_rate.map_or("-".to_string(), |r| format!("{:.1}%", r * 100.0));
        let lift = row.lift.map_or("-".to_string(), |l| format!("{:+.1}%", l * 100.0));
        match row.significance {
            Some(sig) => println!(
                "{:<14} {:>8} {:>8} {:>8.3} {:>10.4}  {}",
                row.variant_id,
                rate,
                lift,
                sig.z_score,
                sig.p_value,
                if sig.significant { "significant" } else { "inconclusive" }
            ),
            None => println!("{:<14} {:>8} {:>8} {:>8} {:>10}  no samples", row.variant_id, rate, lift, "-", "-"),
        }
    }

    println!("\nStricter threshold (alpha = 0.01):");
    let strict = SignificanceEngine::with_alpha(0.01)?;
    let sig = strict.z_test(100, 1000, 130, 1000);
    println!(
        "  green-button: p = {:.4} → {}",
        sig.p_value,
        if sig.significant { "significant" } else { "inconclusive" }
    );

    Ok(())
}
