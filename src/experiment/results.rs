//! Experiment Results - per-variant counts and control comparisons
//!
//! Counts come from `GET /experiments/{id}/results`; the comparison is computed
//! locally so dashboards can flag winners without a second round trip.

use serde::{Deserialize, Serialize};

use crate::stats::{SignificanceEngine, SignificanceResult};

/// Exposure and conversion counts for one variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VariantStats {
    variant_id: String,
    samples: u64,
    conversions: u64,
}

impl VariantStats {
    /// Create a stats row.
    #[must_use]
    pub fn new(variant_id: impl Into<String>, samples: u64, conversions: u64) -> Self {
        Self {
            variant_id: variant_id.into(),
            samples,
            conversions,
        }
    }

    /// Get the variant ID.
    #[must_use]
    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    /// Visitors exposed to the variant.
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Visitors who converted.
    #[must_use]
    pub const fn conversions(&self) -> u64 {
        self.conversions
    }

    /// `conversions / samples`, or `None` with no samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn conversion_rate(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.conversions as f64 / self.samples as f64)
    }
}

/// One row of a control comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantComparison {
    /// Variant being compared against the control
    pub variant_id: String,
    /// Observed conversion rate (`None` without samples)
    pub conversion_rate: Option<f64>,
    /// Relative lift over control: `(variant - control) / control`
    pub lift: Option<f64>,
    /// z-test against the control (`None` when either side has no samples)
    pub significance: Option<SignificanceResult>,
}

/// Results payload for one experiment. The first row is the control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResults {
    experiment_id: String,
    variants: Vec<VariantStats>,
}

impl ExperimentResults {
    /// Create a results payload.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, variants: Vec<VariantStats>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            variants,
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Rows in declaration order.
    #[must_use]
    pub fn variants(&self) -> &[VariantStats] {
        &self.variants
    }

    /// Control row, if any.
    #[must_use]
    pub fn control(&self) -> Option<&VariantStats> {
        self.variants.first()
    }

    /// Compare every non-control variant against the control.
    ///
    /// Zero-sample rows are reported without a significance result rather
    /// than fed into the z-test.
    #[must_use]
    pub fn compare_to_control(&self, engine: &SignificanceEngine) -> Vec<VariantComparison> {
        let Some(control) = self.control() else {
            return Vec::new();
        };
        let control_rate = control.conversion_rate();

        self.variants
            .iter()
            .skip(1)
            .map(|variant| {
                let rate = variant.conversion_rate();
                let lift = match (rate, control_rate) {
                    (Some(v), Some(c)) if c > 0.0 => Some((v - c) / c),
                    _ => None,
                };
                let significance = (control.samples > 0 && variant.samples > 0).then(|| {
                    engine.z_test(
                        control.conversions,
                        control.samples,
                        variant.conversions,
                        variant.samples,
                    )
                });
                VariantComparison {
                    variant_id: variant.variant_id.clone(),
                    conversion_rate: rate,
                    lift,
                    significance,
                }
            })
            .collect()
    }
}
