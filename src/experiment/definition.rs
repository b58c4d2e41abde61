//! Experiment definitions - variants, goals, and their invariants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Finest weight granularity accepted, in decimal places.
pub const MAX_WEIGHT_DECIMALS: i32 = 6;

/// Smallest power of ten that turns every weight into a whole number `>= 1`.
fn whole_weight_scale(variants: &[Variant]) -> Option<f64> {
    (0..=MAX_WEIGHT_DECIMALS)
        .map(|places| 10f64.powi(places))
        .find(|scale| {
            variants.iter().all(|variant| {
                let scaled = variant.weight * scale;
                scaled.round() >= 1.0 && (scaled - scaled.round()).abs() <= 1e-9 * scaled
            })
        })
}

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    /// Being edited; never assigns.
    #[default]
    Draft,
    /// Live; visitors are bucketed.
    Running,
    /// Temporarily halted.
    Paused,
    /// Finished; results are final.
    Completed,
}

/// A single arm of an experiment.
///
/// Weights are relative: `[1, 1]` and `[50, 50]` split traffic the same way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    id: String,
    weight: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    overrides: Vec<serde_json::Value>,
}

impl Variant {
    /// Create a variant with no component overrides.
    #[must_use]
    pub fn new(id: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
            overrides: Vec::new(),
        }
    }

    /// Attach an opaque component override payload.
    #[must_use]
    pub fn with_override(mut self, payload: serde_json::Value) -> Self {
        self.overrides.push(payload);
        self
    }

    /// Get the variant ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the relative weight.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Component overrides, passed through uninterpreted.
    #[must_use]
    pub fn overrides(&self) -> &[serde_json::Value] {
        &self.overrides
    }
}

/// A conversion goal tracked for an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionGoal {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl ConversionGoal {
    /// Create a goal without a default value.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value: None,
        }
    }

    /// Set the value reported when a conversion carries none.
    #[must_use]
    pub const fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Get the goal ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the goal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default conversion value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Wire shape of an experiment before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UncheckedExperiment {
    id: String,
    #[serde(default)]
    audience: String,
    #[serde(default)]
    status: ExperimentStatus,
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
    traffic_allocation: f64,
    variants: Vec<Variant>,
    #[serde(default)]
    goals: Vec<ConversionGoal>,
}

/// An A/B experiment.
///
/// Invariants (checked on construction and on deserialization):
/// - at least one variant; the first is the control
/// - every weight is finite and positive, with at most six decimal places
/// - variant ids are unique
/// - `traffic_allocation` is within `[0, 100]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", try_from = "UncheckedExperiment")]
pub struct Experiment {
    id: String,
    audience: String,
    status: ExperimentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<DateTime<Utc>>,
    traffic_allocation: f64,
    variants: Vec<Variant>,
    goals: Vec<ConversionGoal>,
}

impl TryFrom<UncheckedExperiment> for Experiment {
    type Error = Error;

    fn try_from(raw: UncheckedExperiment) -> Result<Self> {
        let experiment = Self {
            id: raw.id,
            audience: raw.audience,
            status: raw.status,
            start_date: raw.start_date,
            end_date: raw.end_date,
            traffic_allocation: raw.traffic_allocation,
            variants: raw.variants,
            goals: raw.goals,
        };
        experiment.validate()?;
        Ok(experiment)
    }
}

impl Experiment {
    /// Start building an experiment. Defaults: running, 100% traffic, no variants.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(id)
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_experiment(&self.id, "id must not be empty"));
        }
        if !(0.0..=100.0).contains(&self.traffic_allocation) {
            return Err(Error::invalid_experiment(
                &self.id,
                format!(
                    "traffic allocation {} outside [0, 100]",
                    self.traffic_allocation
                ),
            ));
        }
        if self.variants.is_empty() {
            return Err(Error::invalid_experiment(
                &self.id,
                "at least one variant (the control) is required",
            ));
        }
        for (index, variant) in self.variants.iter().enumerate() {
            if !variant.weight.is_finite() || variant.weight <= 0.0 {
                return Err(Error::invalid_experiment(
                    &self.id,
                    format!(
                        "variant '{}' has non-positive weight {}",
                        variant.id, variant.weight
                    ),
                ));
            }
            if self.variants[..index].iter().any(|v| v.id == variant.id) {
                return Err(Error::invalid_experiment(
                    &self.id,
                    format!("duplicate variant id '{}'", variant.id),
                ));
            }
        }
        if whole_weight_scale(&self.variants).is_none() {
            return Err(Error::invalid_experiment(
                &self.id,
                format!("variant weights need at most {MAX_WEIGHT_DECIMALS} decimal places"),
            ));
        }
        Ok(())
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Audience scope (e.g. "alumni", "admin").
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Get the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Start of the run window, if bounded.
    #[must_use]
    pub const fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    /// End of the run window, if bounded.
    #[must_use]
    pub const fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    /// Percentage of visitors that participate at all.
    #[must_use]
    pub const fn traffic_allocation(&self) -> f64 {
        self.traffic_allocation
    }

    /// Variants in declaration order.
    #[must_use]
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// The baseline variant (first declared).
    #[must_use]
    pub fn control(&self) -> &Variant {
        &self.variants[0]
    }

    /// Look up a variant by id.
    #[must_use]
    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Conversion goals.
    #[must_use]
    pub fn goals(&self) -> &[ConversionGoal] {
        &self.goals
    }

    /// Look up a goal by id.
    #[must_use]
    pub fn goal(&self, goal_id: &str) -> Option<&ConversionGoal> {
        self.goals.iter().find(|g| g.id == goal_id)
    }

    /// Sum of all variant weights (always > 0).
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.variants.iter().map(Variant::weight).sum()
    }

    /// Power of ten that scales every weight to a whole number.
    ///
    /// `1.0` for integer weights; `10.0` for `[0.3, 0.7]`.
    #[must_use]
    pub fn weight_scale(&self) -> f64 {
        whole_weight_scale(&self.variants).unwrap_or(1.0)
    }

    /// Running and inside its (optional) start/end window at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ExperimentStatus::Running
            && self.start_date.map_or(true, |start| start <= now)
            && self.end_date.map_or(true, |end| now < end)
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    experiment: Experiment,
}

impl ExperimentBuilder {
    /// Create a new builder with the required id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            experiment: Experiment {
                id: id.into(),
                audience: String::new(),
                status: ExperimentStatus::Running,
                start_date: None,
                end_date: None,
                traffic_allocation: 100.0,
                variants: Vec::new(),
                goals: Vec::new(),
            },
        }
    }

    /// Set the audience scope.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.experiment.audience = audience.into();
        self
    }

    /// Set the lifecycle status.
    #[must_use]
    pub const fn status(mut self, status: ExperimentStatus) -> Self {
        self.experiment.status = status;
        self
    }

    /// Set the participating percentage.
    #[must_use]
    pub const fn traffic_allocation(mut self, percent: f64) -> Self {
        self.experiment.traffic_allocation = percent;
        self
    }

    /// Bound the run window.
    #[must_use]
    pub const fn window(mut self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        self.experiment.start_date = Some(start);
        self.experiment.end_date = end;
        self
    }

    /// Append a variant; the first one appended is the control.
    #[must_use]
    pub fn variant(mut self, variant: Variant) -> Self {
        self.experiment.variants.push(variant);
        self
    }

    /// Append a conversion goal.
    #[must_use]
    pub fn goal(mut self, goal: ConversionGoal) -> Self {
        self.experiment.goals.push(goal);
        self
    }

    /// Validate and build the `Experiment`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExperiment`] when an invariant is violated.
    pub fn build(self) -> Result<Experiment> {
        self.experiment.validate()?;
        Ok(self.experiment)
    }
}
