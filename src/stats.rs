//! Significance testing for experiment results
//!
//! **Method**: two-proportion z-test with a pooled standard error.
//!
//! The normal CDF uses the Abramowitz & Stegun 7.1.26 rational approximation of
//! `erf` (max absolute error ~1.5e-7). This is a screening statistic for
//! dashboards, not a substitute for a sequential-testing framework.
//!
//! References:
//! - Abramowitz & Stegun (1964), *Handbook of Mathematical Functions*, eq. 7.1.26

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default significance threshold.
pub const DEFAULT_ALPHA: f64 = 0.05;

// Abramowitz & Stegun 7.1.26 coefficients
const A1: f64 = 0.254_829_592;
const A2: f64 = -0.284_496_736;
const A3: f64 = 1.421_413_741;
const A4: f64 = -1.453_152_027;
const A5: f64 = 1.061_405_429;
const P: f64 = 0.327_591_1;

/// Outcome of a control-vs-variant comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificanceResult {
    /// `p_value < alpha`
    pub significant: bool,
    /// Two-sided p-value
    pub p_value: f64,
    /// `(1 - p_value) * 100`
    pub confidence_level: f64,
    /// Absolute z statistic
    pub z_score: f64,
}

/// Two-proportion z-test runner.
#[derive(Debug, Clone, Copy)]
pub struct SignificanceEngine {
    alpha: f64,
}

impl Default for SignificanceEngine {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl SignificanceEngine {
    /// Engine with the default 0.05 threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a custom threshold.
    ///
    /// # Errors
    ///
    /// Returns error unless `0 < alpha < 1`.
    pub fn with_alpha(alpha: f64) -> Result<Self> {
        if alpha > 0.0 && alpha < 1.0 {
            Ok(Self { alpha })
        } else {
            Err(Error::InvalidInput(format!("alpha must be in (0, 1), got {alpha}")))
        }
    }

    /// Significance threshold in use.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Compare control and variant conversion rates.
    ///
    /// Precondition: `control_samples > 0 && variant_samples > 0`. The engine
    /// does not guard the division; zero samples propagate NaN, which reports
    /// as not significant. Use [`Self::z_test_checked`] to get an error instead.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn z_test(
        &self,
        control_conversions: u64,
        control_samples: u64,
        variant_conversions: u64,
        variant_samples: u64,
    ) -> SignificanceResult {
        let (cc, cn) = (control_conversions as f64, control_samples as f64);
        let (vc, vn) = (variant_conversions as f64, variant_samples as f64);

        let p_control = cc / cn;
        let p_variant = vc / vn;
        let pooled = (cc + vc) / (cn + vn);
        let se = (pooled * (1.0 - pooled) * (1.0 / cn + 1.0 / vn)).sqrt();
        let z = (p_control - p_variant).abs() / se;

        let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));

        SignificanceResult {
            significant: p_value < self.alpha,
            p_value,
            confidence_level: (1.0 - p_value) * 100.0,
            z_score: z,
        }
    }

    /// [`Self::z_test`] with input validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for zero sample sizes or conversions
    /// exceeding samples.
    pub fn z_test_checked(
        &self,
        control_conversions: u64,
        control_samples: u64,
        variant_conversions: u64,
        variant_samples: u64,
    ) -> Result<SignificanceResult> {
        if control_samples == 0 || variant_samples == 0 {
            return Err(Error::InvalidInput(format!(
                "sample sizes must be positive (control={control_samples}, variant={variant_samples})"
            )));
        }
        if control_conversions > control_samples || variant_conversions > variant_samples {
            return Err(Error::InvalidInput(
                "conversions cannot exceed samples".to_string(),
            ));
        }
        Ok(self.z_test(
            control_conversions,
            control_samples,
            variant_conversions,
            variant_samples,
        ))
    }
}

/// Error function, Abramowitz & Stegun 7.1.26.
#[must_use]
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal cumulative distribution function.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erf_reference_points() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
        assert!((erf(3.0) - 0.999_977_91).abs() < 1e-6);
    }

    #[test]
    fn test_normal_cdf_symmetry() {
        for x in [0.3, 1.0, 1.96, 2.5] {
            assert!((normal_cdf(x) + normal_cdf(-x) - 1.0).abs() < 1e-7);
        }
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
    }

    #[test]
    fn test_identical_rates_not_significant() {
        let result = SignificanceEngine::new().z_test(50, 500, 50, 500);
        assert!(!result.significant);
        assert!((result.p_value - 1.0).abs() < 1e-6);
        assert!(result.confidence_level.abs() < 1e-4);
    }

    #[test]
    fn test_zero_samples_propagates_nan() {
        let result = SignificanceEngine::new().z_test(0, 0, 10, 100);
        assert!(result.p_value.is_nan());
        assert!(!result.significant);
    }

    #[test]
    fn test_checked_rejects_degenerate_input() {
        let engine = SignificanceEngine::new();
        assert!(engine.z_test_checked(0, 0, 1, 10).is_err());
        assert!(engine.z_test_checked(11, 10, 1, 10).is_err());
        assert!(engine.z_test_checked(1, 10, 1, 10).is_ok());
    }

    #[test]
    fn test_custom_alpha() {
        assert!(SignificanceEngine::with_alpha(0.0).is_err());
        assert!(SignificanceEngine::with_alpha(1.0).is_err());

        // p ~= 0.0355: significant at 0.05, not at 0.01
        let strict = SignificanceEngine::with_alpha(0.01).unwrap();
        assert!(!strict.z_test(100, 1000, 130, 1000).significant);
        assert!(SignificanceEngine::new().z_test(100, 1000, 130, 1000).significant);
    }
}
