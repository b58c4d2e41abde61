//! Experiment Catalog - the set of experiments known to a tracker
//!
//! Populated from `GET /experiments/active` or registered locally. Loading is
//! lenient: one malformed definition is dropped with a warning instead of
//! discarding the whole list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::Experiment;

/// In-memory lookup of experiments by id.
#[derive(Debug, Default, Clone)]
pub struct ExperimentCatalog {
    experiments: HashMap<String, Experiment>,
}

impl ExperimentCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a JSON array of experiment definitions.
    ///
    /// Entries that fail validation are skipped and logged. A payload that is
    /// not an array yields an empty catalog.
    #[must_use]
    pub fn from_json(payload: &serde_json::Value) -> Self {
        let mut catalog = Self::new();
        let Some(entries) = payload.as_array() else {
            warn!(payload_kind = json_kind(payload), "expected an array of experiments");
            return catalog;
        };

        for entry in entries {
            match serde_json::from_value::<Experiment>(entry.clone()) {
                Ok(experiment) => catalog.insert(experiment),
                Err(error) => {
                    let id = entry.get("id").and_then(|v| v.as_str()).unwrap_or("<unknown>");
                    warn!(experiment_id = id, %error, "skipping invalid experiment definition");
                }
            }
        }
        catalog
    }

    /// Number of experiments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Add or replace an experiment.
    pub fn insert(&mut self, experiment: Experiment) {
        self.experiments
            .insert(experiment.id().to_string(), experiment);
    }

    /// Get an experiment by ID.
    #[must_use]
    pub fn get(&self, experiment_id: &str) -> Option<&Experiment> {
        self.experiments.get(experiment_id)
    }

    /// Experiments that are running at `now`, sorted by id.
    #[must_use]
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<&Experiment> {
        let mut active: Vec<&Experiment> = self
            .experiments
            .values()
            .filter(|e| e.is_active_at(now))
            .collect();
        active.sort_by(|a, b| a.id().cmp(b.id()));
        active
    }

    /// Experiments scoped to `audience` (or to no audience), sorted by id.
    #[must_use]
    pub fn for_audience(&self, audience: &str) -> Vec<&Experiment> {
        let mut scoped: Vec<&Experiment> = self
            .experiments
            .values()
            .filter(|e| e.audience().is_empty() || e.audience() == audience)
            .collect();
        scoped.sort_by(|a, b| a.id().cmp(b.id()));
        scoped
    }

    /// Replace the contents with another catalog.
    pub fn replace(&mut self, other: Self) {
        self.experiments = other.experiments;
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{ExperimentStatus, Variant};

    #[test]
    fn test_catalog_default() {
        let catalog = ExperimentCatalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
    }

    #[test]
    fn test_from_json_skips_invalid_entries() {
        let payload = serde_json::json!([
            {"id": "ok", "status": "running", "trafficAllocation": 100,
             "variants": [{"id": "a", "weight": 1}]},
            {"id": "broken", "trafficAllocation": 100, "variants": []},
            {"status": "running"}
        ]);

        let catalog = ExperimentCatalog::from_json(&payload);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("ok").is_some());
        assert!(catalog.get("broken").is_none());
    }

    #[test]
    fn test_from_json_non_array() {
        let catalog = ExperimentCatalog::from_json(&serde_json::json!({"error": "nope"}));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_active_and_audience_filters() {
        let mut catalog = ExperimentCatalog::new();
        catalog.insert(
            Experiment::builder("b-live")
                .audience("alumni")
                .variant(Variant::new("a", 1.0))
                .build()
                .unwrap(),
        );
        catalog.insert(
            Experiment::builder("a-draft")
                .status(ExperimentStatus::Draft)
                .audience("admin")
                .variant(Variant::new("a", 1.0))
                .build()
                .unwrap(),
        );

        let active: Vec<&str> = catalog.active_at(Utc::now()).into_iter().map(Experiment::id).collect();
        assert_eq!(active, vec!["b-live"]);

        let admin: Vec<&str> = catalog.for_audience("admin").into_iter().map(Experiment::id).collect();
        assert_eq!(admin, vec!["a-draft"]);
    }
}
