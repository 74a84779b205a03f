//! Data model shared by every pipeline stage.
//!
//! ```text
//! RawExtraction ──canonicalize──▶ CanonicalInvoice ──validate──▶ ValidationVerdict
//!                                        │                              │
//!                                        └──────────score───────────────┴──▶ ConfidenceVerdict
//! ```
//!
//! Absent values are always `None`. An unknown total is never `0`, an
//! unknown date is never an empty string, so the reconciliation arithmetic
//! cannot silently treat "unknown" as "zero".

use crate::error::ItemError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Untrusted extraction payload: field name → arbitrary JSON value.
pub type RawExtraction = serde_json::Map<String, Value>;

/// A single invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    /// Always set; `quantity_defaulted` tells whether it came from the payload.
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "is_false")]
    pub quantity_defaulted: bool,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
}

impl LineItem {
    /// The stated line total, or `quantity × unit_price` rounded to cents.
    ///
    /// `None` when neither is available or the product does not fit in a
    /// [`Decimal`].
    pub fn effective_total(&self) -> Option<Decimal> {
        self.line_total.or_else(|| self.computed_total())
    }

    /// `quantity × unit_price` rounded to cents, `None` on overflow.
    pub fn computed_total(&self) -> Option<Decimal> {
        self.unit_price
            .and_then(|p| p.checked_mul(self.quantity))
            .map(round_money)
    }

    /// Number of resolved sub-fields among description, unit price and line total.
    pub fn resolved_parts(&self) -> usize {
        [
            !self.description.is_empty(),
            self.unit_price.is_some(),
            self.line_total.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count()
    }
}

impl Default for LineItem {
    fn default() -> Self {
        Self {
            description: String::new(),
            quantity: Decimal::ONE,
            quantity_defaulted: true,
            unit_price: None,
            line_total: None,
        }
    }
}

/// Fixed-shape invoice record produced by the canonicalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalInvoice {
    /// Possibly empty, never absent.
    pub vendor_name: String,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    /// ISO 4217 code; the configured fallback when nothing was recoverable.
    pub currency: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub currency_defaulted: bool,
    pub payment_terms: Option<String>,
    pub line_items: Vec<LineItem>,
}

impl CanonicalInvoice {
    /// An empty record in the given currency (flagged as defaulted).
    pub fn empty(currency: impl Into<String>) -> Self {
        Self {
            vendor_name: String::new(),
            invoice_number: None,
            invoice_date: None,
            due_date: None,
            subtotal: None,
            tax_amount: None,
            total_amount: None,
            currency: currency.into(),
            currency_defaulted: true,
            payment_terms: None,
            line_items: Vec::new(),
        }
    }

    pub fn has_vendor(&self) -> bool {
        !self.vendor_name.trim().is_empty()
    }

    /// Every numeric field of the record, labelled, including line-item fields.
    pub fn numeric_fields(&self) -> Vec<(String, Decimal)> {
        let mut out = Vec::new();
        for (name, value) in [
            ("subtotal", self.subtotal),
            ("tax_amount", self.tax_amount),
            ("total_amount", self.total_amount),
        ] {
            if let Some(v) = value {
                out.push((name.to_string(), v));
            }
        }
        for (i, item) in self.line_items.iter().enumerate() {
            out.push((format!("line_items[{i}].quantity"), item.quantity));
            if let Some(v) = item.unit_price {
                out.push((format!("line_items[{i}].unit_price"), v));
            }
            if let Some(v) = item.line_total {
                out.push((format!("line_items[{i}].line_total"), v));
            }
        }
        out
    }

    /// How many of the scalar canonical fields were resolved (out of the total).
    pub fn coverage(&self) -> (usize, usize) {
        let filled = [
            self.has_vendor(),
            self.invoice_number.is_some(),
            self.invoice_date.is_some(),
            self.due_date.is_some(),
            self.subtotal.is_some(),
            self.tax_amount.is_some(),
            self.total_amount.is_some(),
            !self.currency_defaulted,
            self.payment_terms.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, 9)
    }
}

/// A violated business rule. `Display` is the reason string reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum ValidationFailure {
    #[error("missing vendor and total")]
    MissingVendorAndTotal,
    #[error("total reconciliation mismatch")]
    TotalReconciliation,
    #[error("line-item sum mismatch")]
    LineItemSum,
    #[error("line-item arithmetic mismatch")]
    LineItemArithmetic { index: usize },
    #[error("date ordering violation")]
    DateOrdering,
    #[error("negative amount")]
    NegativeAmount { field: String },
}

/// Pass/fail outcome of the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    /// Reason for the first failed rule; `None` iff valid.
    pub reason: Option<String>,
    /// Every failed rule in evaluation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ValidationFailure>,
}

impl ValidationVerdict {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
            failures: Vec::new(),
        }
    }

    pub fn from_failures(failures: Vec<ValidationFailure>) -> Self {
        match failures.first() {
            None => Self::valid(),
            Some(first) => Self {
                is_valid: false,
                reason: Some(first.to_string()),
                failures,
            },
        }
    }
}

/// Three-way workflow bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStatus {
    AutoApproved,
    NeedsReview,
    Rejected,
}

impl RoutingStatus {
    /// Map a score to a bucket. Each bucket's lower bound is inclusive.
    pub fn from_score(score: f64, review_threshold: f64, reject_threshold: f64) -> Self {
        if score >= review_threshold {
            RoutingStatus::AutoApproved
        } else if score >= reject_threshold {
            RoutingStatus::NeedsReview
        } else {
            RoutingStatus::Rejected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStatus::AutoApproved => "auto_approved",
            RoutingStatus::NeedsReview => "needs_review",
            RoutingStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RoutingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored, routed outcome for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceVerdict {
    /// Aggregate in `[0.0, 1.0]`, after any validation penalty.
    pub score: f64,
    /// Per-field confidence in `[0.0, 1.0]`, keyed by canonical field name.
    pub field_scores: BTreeMap<String, f64>,
    pub status: RoutingStatus,
    pub penalty_applied: bool,
}

/// Everything the pipeline hands back for one extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceOutput {
    pub canonical: CanonicalInvoice,
    pub validation: ValidationVerdict,
    pub confidence: ConfidenceVerdict,
    /// The `_usage` side channel stripped from the payload, untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

impl InvoiceOutput {
    pub fn status(&self) -> RoutingStatus {
        self.confidence.status
    }
}

/// Result for one payload of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    /// 0-based position in the input list.
    pub index: usize,
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<InvoiceOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
    pub duration_ms: u64,
}

/// Summary counters for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub auto_approved: usize,
    pub needs_review: usize,
    pub rejected: usize,
    pub invalid: usize,
    pub total_duration_ms: u64,
}

/// Items (sorted by index) plus summary counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub items: Vec<BatchItem>,
    pub stats: BatchStats,
}

/// Round a money value to cents, midpoint away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

fn is_false(b: &bool) -> bool {
    !*b
}
