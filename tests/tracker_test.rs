//! End-to-end tests for the tracker facade over an in-process collector.

use std::sync::Arc;

use abtrack::config::TrackerConfig;
use abtrack::experiment::{ConversionGoal, Experiment, ExperimentStatus, Variant};
use abtrack::kv::MemoryKvStore;
use abtrack::transport::{RecordingTransport, RequestKind};
use abtrack::{ConversionOutcome, ExperimentTracker, FlushOutcome, IgnoredReason};

type Tracker = ExperimentTracker<RecordingTransport, Arc<MemoryKvStore>>;

fn config() -> TrackerConfig {
    TrackerConfig::new("s-1")
        .with_user_id("user_42")
        .with_audience("alumni")
}

fn active_payload() -> serde_json::Value {
    serde_json::json!([{
        "id": "exp_1",
        "audience": "alumni",
        "status": "running",
        "trafficAllocation": 100,
        "variants": [{"id": "control", "weight": 1}, {"id": "treatment", "weight": 1}],
        "goals": [{"id": "signup", "name": "Signup", "value": 5}]
    }])
}

fn tracker_with(kv: &Arc<MemoryKvStore>, config: TrackerConfig) -> Tracker {
    let transport = RecordingTransport::new();
    transport.respond_with("/experiments/active", active_payload());
    ExperimentTracker::new(config, transport, Arc::clone(kv)).unwrap()
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_init_loads_active_experiments() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config());

    assert_eq!(tracker.init().await.unwrap(), 0);

    assert!(tracker.experiment("exp_1").is_some());
    let gets: Vec<_> = tracker
        .transport()
        .requests()
        .into_iter()
        .filter(|r| r.kind == RequestKind::Get)
        .collect();
    assert_eq!(gets.len(), 1);
    assert_eq!(gets[0].path, "/experiments/active");
}

#[tokio::test]
async fn test_init_survives_fetch_failure() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker =
        ExperimentTracker::new(config(), RecordingTransport::new(), Arc::clone(&kv)).unwrap();

    assert!(tracker.init().await.is_ok());
    assert!(tracker.experiment("exp_1").is_none());
}

#[tokio::test]
async fn test_first_assignment_is_reported_once() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config());
    tracker.init().await.unwrap();

    let first = tracker.variant("exp_1").await.unwrap();
    let second = tracker.variant("exp_1").await.unwrap();
    settle().await;

    assert_eq!(first.variant_id, "control");
    assert_eq!(second.variant_id, first.variant_id);
    assert!(first.is_new());
    assert!(!second.is_new());

    let records = tracker.transport().bodies_for("/experiments/assignments");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["experimentId"], "exp_1");
    assert_eq!(records[0]["variantId"], "control");
    assert_eq!(records[0]["identity"], "user_42");
    assert_eq!(records[0]["sessionId"], "s-1");
    assert_eq!(records[0]["audience"], "alumni");

    assert_eq!(
        tracker.dispatcher().pending_names(),
        vec!["experiment_assignment"]
    );
}

#[tokio::test]
async fn test_inactive_experiment_has_no_variant() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config().with_experiment_fetch(false));
    tracker.register_experiment(
        Experiment::builder("paused")
            .status(ExperimentStatus::Paused)
            .variant(Variant::new("control", 1.0))
            .build()
            .unwrap(),
    );

    assert!(tracker.variant("paused").await.is_none());
    assert!(tracker.assignments().await.is_empty());
}

#[tokio::test]
async fn test_conversion_flushes_immediately_with_goal_value() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config());
    tracker.init().await.unwrap();
    tracker.variant("exp_1").await.unwrap();

    let outcome = tracker.track_conversion("exp_1", "signup", None).await;
    settle().await;

    assert_eq!(
        outcome,
        ConversionOutcome::Recorded {
            variant_id: "control".to_string()
        }
    );
    let conversions = tracker.transport().bodies_for("/experiments/conversions");
    assert_eq!(conversions.len(), 1);
    assert_eq!(conversions[0]["goalId"], "signup");
    assert_eq!(conversions[0]["value"], 5.0);

    assert_eq!(
        tracker.transport().event_names("/events"),
        vec!["experiment_assignment", "experiment_conversion"]
    );
    assert_eq!(tracker.dispatcher().pending(), 0);
}

#[tokio::test]
async fn test_conversion_credits_variant_that_could_not_be_persisted() {
    let kv = Arc::new(MemoryKvStore::with_quota(0));
    let tracker = tracker_with(&kv, config());
    tracker.init().await.unwrap();

    let assignment = tracker.variant("exp_1").await.unwrap();
    assert!(tracker.assignments().await.is_empty());

    let outcome = tracker.track_conversion("exp_1", "signup", None).await;

    assert_eq!(
        outcome,
        ConversionOutcome::Recorded {
            variant_id: assignment.variant_id
        }
    );
}

#[tokio::test]
async fn test_conversion_without_assignment_is_ignored() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config());
    tracker.init().await.unwrap();

    let outcome = tracker.track_conversion("exp_1", "signup", Some(1.0)).await;
    settle().await;

    assert_eq!(outcome, ConversionOutcome::Ignored(IgnoredReason::NotAssigned));
    assert!(!outcome.is_recorded());
    assert!(tracker
        .transport()
        .bodies_for("/experiments/conversions")
        .is_empty());
}

#[tokio::test]
async fn test_offline_events_survive_tracker_restart() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config().with_experiment_fetch(false));
    tracker.init().await.unwrap();
    tracker.set_online(false);

    for name in ["page_view", "scroll_depth", "page_view"] {
        tracker.track(name);
    }
    let outcome = tracker.page_unload().await;
    assert!(matches!(outcome, FlushOutcome::Offline(3)));

    let reloaded = tracker_with(&kv, config().with_experiment_fetch(false));
    assert_eq!(reloaded.init().await.unwrap(), 3);
    assert_eq!(reloaded.dispatcher().pending(), 3);

    let outcome = reloaded.destroy().await;
    assert!(matches!(outcome, FlushOutcome::Beaconed(3)));
}

#[tokio::test]
async fn test_page_hidden_beacons() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config().with_experiment_fetch(false));
    tracker.init().await.unwrap();
    tracker.track("page_view");

    assert!(matches!(tracker.page_hidden().await, FlushOutcome::Beaconed(1)));
    let events = tracker.transport().bodies_for("/events");
    assert_eq!(events[0]["events"][0]["audience"], "alumni");
}

#[tokio::test]
async fn test_results_and_analysis() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config().with_experiment_fetch(false));
    tracker.transport().respond_with(
        "/experiments/exp_1/results",
        serde_json::json!({
            "experimentId": "exp_1",
            "variants": [
                {"variantId": "control", "samples": 1000, "conversions": 100},
                {"variantId": "treatment", "samples": 1000, "conversions": 130}
            ]
        }),
    );
    tracker.transport().respond_with(
        "/experiments/exp_1/statistics",
        serde_json::json!({"winner": "treatment"}),
    );

    let results = tracker.results("exp_1").await.unwrap();
    assert_eq!(results.variants().len(), 2);

    let rows = tracker.analyze("exp_1").await.unwrap();
    assert_eq!(rows[0].variant_id, "treatment");
    assert!(rows[0].significance.unwrap().significant);

    let stats = tracker.statistics("exp_1").await.unwrap();
    assert_eq!(stats["winner"], "treatment");

    assert!(tracker.results("missing").await.is_err());
}

#[tokio::test]
async fn test_registered_experiment_with_goal() {
    let kv = Arc::new(MemoryKvStore::new());
    let tracker = tracker_with(&kv, config().with_experiment_fetch(false));
    tracker.register_experiment(
        Experiment::builder("local")
            .variant(Variant::new("control", 1.0))
            .goal(ConversionGoal::new("click", "Clicked"))
            .build()
            .unwrap(),
    );

    tracker.variant("local").await.unwrap();
    let outcome = tracker.track_conversion("local", "click", Some(2.5)).await;
    settle().await;

    assert!(outcome.is_recorded());
    let conversions = tracker.transport().bodies_for("/experiments/conversions");
    assert_eq!(conversions[0]["value"], 2.5);
    assert_eq!(tracker.assignments().await.get("local").map(String::as_str), Some("control"));
}
