//! Configuration types for invoice normalisation and scoring.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct holds every threshold, weight and
//! limit so two runs can be compared by diffing their configs.

use crate::error::InvoiceError;
use crate::progress::BatchProgressCallback;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Weight of each field group in the aggregate confidence score.
///
/// Weights must be non-negative and sum to 1.0. Totals and vendor identity
/// carry most of the weight; line-item granularity carries the least.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    pub vendor: f64,
    pub dates: f64,
    pub totals: f64,
    pub line_items: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            vendor: 0.30,
            dates: 0.20,
            totals: 0.40,
            line_items: 0.10,
        }
    }
}

impl FieldWeights {
    pub fn sum(&self) -> f64 {
        self.vendor + self.dates + self.totals + self.line_items
    }

    fn as_array(&self) -> [f64; 4] {
        [self.vendor, self.dates, self.totals, self.line_items]
    }
}

/// Configuration for the canonicalize → validate → score pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_invoice::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .review_threshold(0.8)
///     .reject_threshold(0.4)
///     .default_currency("EUR")
///     .build()
///     .unwrap();
/// assert_eq!(config.default_currency, "EUR");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Currency code used when the payload has no recoverable currency. Default: "USD".
    pub default_currency: String,

    /// Reconciliation tolerance in currency units. Default: 0.01.
    pub tolerance: Decimal,

    /// Group weights for the aggregate score.
    pub weights: FieldWeights,

    /// Scores at or above this are auto-approved. Default: 0.7.
    pub review_threshold: f64,

    /// Scores below this are rejected. Default: 0.3.
    pub reject_threshold: f64,

    /// Multiplier applied to the aggregate of an invalid record. Default: 0.6.
    ///
    /// A perfect but inconsistent invoice scores 0.6 with the default
    /// thresholds, which routes it to review rather than auto-approval.
    pub invalid_penalty: f64,

    /// Confidence of a field that is present but only partially resolvable. Default: 0.5.
    pub partial_confidence: f64,

    /// Dates before this year are treated as implausible. Default: 2000.
    pub earliest_plausible_year: i32,

    /// Upload size limit in bytes. Default: 10 MiB.
    pub max_file_size: u64,

    /// Minimum Laplacian variance for an image upload. Default: 450.0.
    pub blur_threshold: f64,

    /// Minimum intensity standard deviation for an image upload. Default: 35.0.
    pub contrast_threshold: f64,

    /// Number of payloads processed concurrently in a batch. Default: 8.
    pub concurrency: usize,

    /// Optional per-item progress callback for batch runs.
    pub progress_callback: Option<Arc<dyn BatchProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            tolerance: Decimal::new(1, 2),
            weights: FieldWeights::default(),
            review_threshold: 0.7,
            reject_threshold: 0.3,
            invalid_penalty: 0.6,
            partial_confidence: 0.5,
            earliest_plausible_year: 2000,
            max_file_size: 10 * 1024 * 1024,
            blur_threshold: 450.0,
            contrast_threshold: 35.0,
            concurrency: 8,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("default_currency", &self.default_currency)
            .field("tolerance", &self.tolerance)
            .field("weights", &self.weights)
            .field("review_threshold", &self.review_threshold)
            .field("reject_threshold", &self.reject_threshold)
            .field("invalid_penalty", &self.invalid_penalty)
            .field("partial_confidence", &self.partial_confidence)
            .field("earliest_plausible_year", &self.earliest_plausible_year)
            .field("max_file_size", &self.max_file_size)
            .field("blur_threshold", &self.blur_threshold)
            .field("contrast_threshold", &self.contrast_threshold)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn default_currency(mut self, code: impl Into<String>) -> Self {
        self.config.default_currency = code.into().trim().to_ascii_uppercase();
        self
    }

    pub fn tolerance(mut self, tolerance: Decimal) -> Self {
        self.config.tolerance = tolerance.abs();
        self
    }

    pub fn weights(mut self, weights: FieldWeights) -> Self {
        self.config.weights = weights;
        self
    }

    pub fn review_threshold(mut self, t: f64) -> Self {
        self.config.review_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn reject_threshold(mut self, t: f64) -> Self {
        self.config.reject_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn invalid_penalty(mut self, factor: f64) -> Self {
        self.config.invalid_penalty = factor;
        self
    }

    pub fn partial_confidence(mut self, value: f64) -> Self {
        self.config.partial_confidence = value;
        self
    }

    pub fn earliest_plausible_year(mut self, year: i32) -> Self {
        self.config.earliest_plausible_year = year;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes.max(1);
        self
    }

    pub fn blur_threshold(mut self, t: f64) -> Self {
        self.config.blur_threshold = t.max(0.0);
        self
    }

    pub fn contrast_threshold(mut self, t: f64) -> Self {
        self.config.contrast_threshold = t.max(0.0);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, InvoiceError> {
        let c = &self.config;
        for (name, value) in [
            ("review threshold", c.review_threshold),
            ("reject threshold", c.reject_threshold),
            ("invalid penalty", c.invalid_penalty),
            ("partial confidence", c.partial_confidence),
        ] {
            if !value.is_finite() {
                return Err(InvoiceError::InvalidConfig(format!(
                    "{name} must be a finite number, got {value}"
                )));
            }
        }
        if c.reject_threshold >= c.review_threshold {
            return Err(InvoiceError::InvalidConfig(format!(
                "reject threshold ({}) must be below review threshold ({})",
                c.reject_threshold, c.review_threshold
            )));
        }
        if c.weights.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(InvoiceError::InvalidConfig(format!(
                "field weights must be non-negative, got {:?}",
                c.weights
            )));
        }
        if (c.weights.sum() - 1.0).abs() > 1e-9 {
            return Err(InvoiceError::InvalidConfig(format!(
                "field weights must sum to 1.0, got {}",
                c.weights.sum()
            )));
        }
        if !(c.invalid_penalty > 0.0 && c.invalid_penalty < 1.0) {
            return Err(InvoiceError::InvalidConfig(format!(
                "invalid penalty must be in (0, 1), got {}",
                c.invalid_penalty
            )));
        }
        if !(c.partial_confidence > 0.0 && c.partial_confidence < 1.0) {
            return Err(InvoiceError::InvalidConfig(format!(
                "partial confidence must be in (0, 1), got {}",
                c.partial_confidence
            )));
        }
        if c.default_currency.len() != 3
            || !c.default_currency.chars().all(|ch| ch.is_ascii_uppercase())
        {
            return Err(InvoiceError::InvalidConfig(format!(
                "default currency must be a 3-letter code, got '{}'",
                c.default_currency
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.review_threshold, 0.7);
        assert_eq!(config.reject_threshold, 0.3);
        assert_eq!(config.tolerance, Decimal::new(1, 2));
        assert!((config.weights.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let err = PipelineConfig::builder()
            .review_threshold(0.3)
            .reject_threshold(0.3)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must be below"), "got: {err}");
    }

    #[test]
    fn non_finite_values_rejected() {
        let err = PipelineConfig::builder()
            .review_threshold(f64::NAN)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("review threshold"), "got: {err}");

        assert!(PipelineConfig::builder().reject_threshold(f64::NAN).build().is_err());
        assert!(PipelineConfig::builder().invalid_penalty(f64::NAN).build().is_err());
        assert!(PipelineConfig::builder().partial_confidence(f64::INFINITY).build().is_err());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = PipelineConfig::builder()
            .weights(FieldWeights {
                vendor: 0.5,
                dates: 0.5,
                totals: 0.5,
                line_items: 0.0,
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"), "got: {err}");
    }

    #[test]
    fn negative_weight_rejected() {
        let err = PipelineConfig::builder()
            .weights(FieldWeights {
                vendor: 1.2,
                dates: -0.2,
                totals: 0.0,
                line_items: 0.0,
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("non-negative"), "got: {err}");
    }

    #[test]
    fn penalty_must_be_below_one() {
        assert!(PipelineConfig::builder().invalid_penalty(1.0).build().is_err());
        assert!(PipelineConfig::builder().invalid_penalty(0.0).build().is_err());
        assert!(PipelineConfig::builder().invalid_penalty(0.9).build().is_ok());
    }

    #[test]
    fn currency_is_normalised_and_checked() {
        let config = PipelineConfig::builder()
            .default_currency(" eur ")
            .build()
            .unwrap();
        assert_eq!(config.default_currency, "EUR");
        assert!(PipelineConfig::builder().default_currency("EURO").build().is_err());
    }

    #[test]
    fn setters_clamp() {
        let config = PipelineConfig::builder()
            .concurrency(0)
            .review_threshold(1.5)
            .tolerance(Decimal::new(-5, 2))
            .build()
            .unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.review_threshold, 1.0);
        assert_eq!(config.tolerance, Decimal::new(5, 2));
    }

    #[test]
    fn debug_hides_callback() {
        let s = format!("{:?}", PipelineConfig::default());
        assert!(s.contains("progress_callback: None"));
    }
}
