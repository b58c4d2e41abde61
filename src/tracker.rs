//! Experiment tracker: one facade over assignment, telemetry, and reporting.
//!
//! Each tracker is an explicit instance with its own identity, catalog, and
//! dispatcher. Nothing is global; create it, call [`ExperimentTracker::init`],
//! and call [`ExperimentTracker::destroy`] on teardown.
//!
//! Tracking calls never fail. Problems are logged and, where the caller
//! might care, reported through [`ConversionOutcome`] or
//! [`FlushOutcome`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assignment::{Assignment, AssignmentMap, Identity, VariantAssignor};
use crate::config::TrackerConfig;
use crate::experiment::{Experiment, ExperimentCatalog, ExperimentResults, VariantComparison};
use crate::kv::KvStore;
use crate::stats::SignificanceEngine;
use crate::telemetry::{BatchDispatcher, Event, FlushOutcome, PageLifecycle};
use crate::transport::{paths, Transport};
use crate::Result;

/// Event emitted the first time a visitor is assigned.
pub const ASSIGNMENT_EVENT: &str = "experiment_assignment";

/// Event emitted for every recorded conversion (high priority).
pub const CONVERSION_EVENT: &str = "experiment_conversion";

/// Why a conversion was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    /// Experiment is not in the catalog
    UnknownExperiment,
    /// Goal is not defined on the experiment
    UnknownGoal,
    /// Visitor was never assigned to the experiment
    NotAssigned,
    /// Stored variant no longer exists in the experiment
    UnknownVariant,
}

/// Result of [`ExperimentTracker::track_conversion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Conversion sent and queued
    Recorded {
        /// Variant credited with the conversion
        variant_id: String,
    },
    /// Silently dropped
    Ignored(IgnoredReason),
}

impl ConversionOutcome {
    /// Check if the conversion was recorded.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentRecord<'a> {
    experiment_id: &'a str,
    variant_id: &'a str,
    identity: &'a str,
    session_id: &'a str,
    audience: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversionRecord<'a> {
    experiment_id: &'a str,
    variant_id: &'a str,
    goal_id: &'a str,
    value: Option<f64>,
    identity: &'a str,
    session_id: &'a str,
    timestamp: DateTime<Utc>,
}

type Dispatcher<T, S> = BatchDispatcher<Arc<T>, Arc<S>>;

/// Per-visitor experiment and telemetry client.
pub struct ExperimentTracker<T, S> {
    config: TrackerConfig,
    identity: Identity,
    transport: Arc<T>,
    assignor: VariantAssignor<Arc<S>>,
    dispatcher: Arc<Dispatcher<T, S>>,
    catalog: RwLock<ExperimentCatalog>,
    /// Variants handed out by this tracker, kept even if persisting failed.
    served: RwLock<AssignmentMap>,
    engine: SignificanceEngine,
}

impl<T, S> std::fmt::Debug for ExperimentTracker<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentTracker")
            .field("identity", &self.identity)
            .field("audience", &self.config.audience)
            .field("experiments", &self.catalog.read().len())
            .finish_non_exhaustive()
    }
}

impl<T, S> ExperimentTracker<T, S>
where
    T: Transport + 'static,
    S: KvStore + 'static,
{
    /// Create a tracker. Call [`Self::init`] before tracking.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(config: TrackerConfig, transport: T, kv: S) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(transport);
        let kv = Arc::new(kv);
        let identity = config.identity();
        let dispatcher = Arc::new(BatchDispatcher::new(
            config.dispatcher.clone(),
            config.session_id.clone(),
            Arc::clone(&transport),
            Arc::clone(&kv),
        ));

        Ok(Self {
            identity,
            transport,
            assignor: VariantAssignor::new(kv),
            dispatcher,
            catalog: RwLock::new(ExperimentCatalog::new()),
            served: RwLock::new(AssignmentMap::default()),
            engine: SignificanceEngine::new(),
            config,
        })
    }

    /// Restore offline events, start the flush timer, and load active experiments.
    ///
    /// A failed experiment fetch is logged and leaves the catalog as it was.
    /// Returns how many offline events were restored.
    ///
    /// # Errors
    ///
    /// Returns error if the offline buffer cannot be drained or there is no runtime.
    pub async fn init(&self) -> Result<usize> {
        let restored = self.dispatcher.init().await?;
        self.dispatcher.start()?;

        if self.config.load_experiments_on_init {
            if let Err(error) = self.refresh_experiments().await {
                warn!(%error, "could not load active experiments");
            }
        }

        info!(
            identity = self.identity.key(),
            restored,
            experiments = self.catalog.read().len(),
            "tracker initialised"
        );
        Ok(restored)
    }

    /// Replace the catalog with the collector's active experiments.
    ///
    /// Returns the number of valid experiments loaded.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn refresh_experiments(&self) -> Result<usize> {
        let audience = [(paths::AUDIENCE_HEADER, self.config.audience.as_str())];
        let headers: &[(&str, &str)] = if self.config.audience.is_empty() {
            &[]
        } else {
            &audience
        };
        let payload = self.transport.get_json(paths::ACTIVE_EXPERIMENTS, headers).await?;
        let catalog = ExperimentCatalog::from_json(&payload);
        let loaded = catalog.len();
        self.catalog.write().replace(catalog);
        debug!(loaded, "experiments refreshed");
        Ok(loaded)
    }

    /// Add or replace one experiment locally.
    pub fn register_experiment(&self, experiment: Experiment) {
        self.catalog.write().insert(experiment);
    }

    /// Look up a known experiment.
    pub fn experiment(&self, experiment_id: &str) -> Option<Experiment> {
        self.catalog.read().get(experiment_id).cloned()
    }

    /// Variant for this visitor, or `None` if the experiment is unknown or inactive.
    ///
    /// A first-time assignment is reported to the collector and queued as an
    /// [`ASSIGNMENT_EVENT`].
    pub async fn variant(&self, experiment_id: &str) -> Option<Assignment> {
        let experiment = self.experiment(experiment_id)?;
        if !experiment.is_active_at(Utc::now()) {
            debug!(experiment_id, status = ?experiment.status(), "experiment not active");
            return None;
        }

        let assignment = self.assignor.assign(&self.identity, &experiment).await;
        self.served
            .write()
            .insert(assignment.experiment_id.clone(), assignment.variant_id.clone());
        if assignment.is_new() {
            let record = AssignmentRecord {
                experiment_id: &assignment.experiment_id,
                variant_id: &assignment.variant_id,
                identity: &assignment.identity,
                session_id: &self.config.session_id,
                audience: &self.config.audience,
                timestamp: Utc::now(),
            };
            self.post_detached(paths::ASSIGNMENTS, &record);
            self.track_event(Event::new(ASSIGNMENT_EVENT).payload(serde_json::json!({
                "experimentId": assignment.experiment_id,
                "variantId": assignment.variant_id,
                "bucket": assignment.bucket,
                "excluded": assignment.is_excluded(),
            })));
        }
        Some(assignment)
    }

    /// Queue a named event.
    pub fn track(&self, name: &str) -> Option<JoinHandle<FlushOutcome>> {
        self.track_event(Event::new(name))
    }

    /// Queue an event, filling in the tracker's audience if unset.
    pub fn track_event(&self, mut event: Event) -> Option<JoinHandle<FlushOutcome>> {
        event.fill_audience(&self.config.audience);
        self.dispatcher.enqueue(event)
    }

    /// Credit a goal to the visitor's assigned variant.
    ///
    /// `value` falls back to the goal's configured value.
    pub async fn track_conversion(
        &self,
        experiment_id: &str,
        goal_id: &str,
        value: Option<f64>,
    ) -> ConversionOutcome {
        let Some(experiment) = self.experiment(experiment_id) else {
            debug!(experiment_id, "conversion for unknown experiment ignored");
            return ConversionOutcome::Ignored(IgnoredReason::UnknownExperiment);
        };
        let Some(goal) = experiment.goal(goal_id) else {
            debug!(experiment_id, goal_id, "conversion for unknown goal ignored");
            return ConversionOutcome::Ignored(IgnoredReason::UnknownGoal);
        };
        let stored = self.assignor.store().get(&self.identity, experiment_id).await;
        let served = || self.served.read().get(experiment_id).cloned();
        let Some(variant_id) = stored.or_else(served) else {
            debug!(experiment_id, "conversion without assignment ignored");
            return ConversionOutcome::Ignored(IgnoredReason::NotAssigned);
        };
        if experiment.variant(&variant_id).is_none() {
            warn!(experiment_id, variant_id = %variant_id, "stored variant no longer exists");
            return ConversionOutcome::Ignored(IgnoredReason::UnknownVariant);
        }

        let value = value.or_else(|| goal.value());
        let record = ConversionRecord {
            experiment_id,
            variant_id: &variant_id,
            goal_id,
            value,
            identity: self.identity.key(),
            session_id: &self.config.session_id,
            timestamp: Utc::now(),
        };
        self.post_detached(paths::CONVERSIONS, &record);
        self.track_event(Event::new(CONVERSION_EVENT).payload(serde_json::json!({
            "experimentId": experiment_id,
            "variantId": variant_id,
            "goalId": goal_id,
            "value": value,
        })));

        ConversionOutcome::Recorded { variant_id }
    }

    fn post_detached(&self, path: &'static str, record: &impl Serialize) {
        let body = match serde_json::to_value(record) {
            Ok(body) => body,
            Err(error) => {
                warn!(path, %error, "could not encode record");
                return;
            }
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(path, "record dropped: no tokio runtime");
            return;
        };
        let transport = Arc::clone(&self.transport);
        runtime.spawn(async move {
            if let Err(error) = transport.post_json(path, body).await {
                warn!(path, %error, "record delivery failed");
            }
        });
    }

    /// Record a connectivity change; coming back online flushes.
    pub fn set_online(&self, online: bool) -> Option<JoinHandle<FlushOutcome>> {
        self.dispatcher.set_online(online)
    }

    /// Page went to the background: beacon everything pending.
    pub async fn page_hidden(&self) -> FlushOutcome {
        self.dispatcher.on_lifecycle(PageLifecycle::Hidden).await
    }

    /// Page is unloading: beacon everything pending.
    pub async fn page_unload(&self) -> FlushOutcome {
        self.dispatcher.on_lifecycle(PageLifecycle::Unload).await
    }

    /// Fetch per-variant counts.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the payload is malformed.
    pub async fn results(&self, experiment_id: &str) -> Result<ExperimentResults> {
        let payload = self
            .transport
            .get_json(&paths::results(experiment_id), &[])
            .await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Fetch results and compare every variant against the control.
    ///
    /// # Errors
    ///
    /// Returns error if the results cannot be fetched.
    pub async fn analyze(&self, experiment_id: &str) -> Result<Vec<VariantComparison>> {
        let results = self.results(experiment_id).await?;
        Ok(results.compare_to_control(&self.engine))
    }

    /// Fetch the collector's own statistics document, unparsed.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn statistics(&self, experiment_id: &str) -> Result<serde_json::Value> {
        self.transport
            .get_json(&paths::statistics(experiment_id), &[])
            .await
    }

    /// Every assignment this visitor holds.
    pub async fn assignments(&self) -> AssignmentMap {
        self.assignor.store().all(&self.identity).await
    }

    /// Stop the timer and beacon whatever is still queued.
    pub async fn destroy(&self) -> FlushOutcome {
        let outcome = self.dispatcher.stop().await;
        info!(identity = self.identity.key(), ?outcome, "tracker destroyed");
        outcome
    }

    /// Visitor identity.
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Active configuration.
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Underlying dispatcher, for counters and manual flushes.
    pub const fn dispatcher(&self) -> &Arc<Dispatcher<T, S>> {
        &self.dispatcher
    }

    /// Transport shared with the dispatcher.
    pub const fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}
