//! Per-field confidence, weighted aggregate, routing.
//!
//! ## Field confidence
//!
//! Each canonical field gets `1.0` (present and plausible), `0.0` (absent) or
//! the configured partial value (present but weak):
//!
//! | Field | Partial when |
//! |-------|--------------|
//! | `vendor_name` | shorter than 2 characters, or no letter |
//! | `invoice_date`, `due_date` | year before `earliest_plausible_year` |
//! | `subtotal`, `total_amount` | zero |
//! | `tax_amount` | larger than the total |
//! | `line_items` | mean of per-item scores |
//!
//! `currency`, `invoice_number` and `payment_terms` are reported but carry no
//! weight.
//!
//! ## Aggregate
//!
//! Four groups (vendor, dates, totals, line items), each the mean of its
//! fields, combined with [`FieldWeights`]. An invalid record is multiplied by
//! `invalid_penalty` before routing.

use crate::config::{FieldWeights, PipelineConfig};
use crate::model::{
    CanonicalInvoice, ConfidenceVerdict, LineItem, RoutingStatus, ValidationVerdict,
};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Stateless scorer holding the weights, thresholds and penalty.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    weights: FieldWeights,
    review_threshold: f64,
    reject_threshold: f64,
    invalid_penalty: f64,
    partial: f64,
    earliest_plausible_year: i32,
}

impl ConfidenceScorer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            weights: config.weights,
            review_threshold: config.review_threshold,
            reject_threshold: config.reject_threshold,
            invalid_penalty: config.invalid_penalty,
            partial: config.partial_confidence,
            earliest_plausible_year: config.earliest_plausible_year,
        }
    }

    pub fn score(&self, record: &CanonicalInvoice, verdict: &ValidationVerdict) -> ConfidenceVerdict {
        let fields = self.field_scores(record);
        let get = |name: &str| fields.get(name).copied().unwrap_or(0.0);

        let vendor = get("vendor_name");
        let dates = mean(&[get("invoice_date"), get("due_date")]);
        let totals = mean(&[get("subtotal"), get("tax_amount"), get("total_amount")]);
        let line_items = get("line_items");

        let w = &self.weights;
        let aggregate = (w.vendor * vendor
            + w.dates * dates
            + w.totals * totals
            + w.line_items * line_items)
            .clamp(0.0, 1.0);

        let penalty_applied = !verdict.is_valid;
        let score = if penalty_applied {
            aggregate * self.invalid_penalty
        } else {
            aggregate
        };

        ConfidenceVerdict {
            score,
            field_scores: fields,
            status: RoutingStatus::from_score(score, self.review_threshold, self.reject_threshold),
            penalty_applied,
        }
    }

    /// Per-field confidences keyed by canonical field name.
    pub fn field_scores(&self, record: &CanonicalInvoice) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        let mut put = |name: &str, v: f64| {
            out.insert(name.to_string(), v);
        };

        put("vendor_name", self.vendor_score(&record.vendor_name));
        put("invoice_date", self.date_score(record.invoice_date));
        put("due_date", self.date_score(record.due_date));
        put("subtotal", self.nonzero_score(record.subtotal));
        put("total_amount", self.nonzero_score(record.total_amount));
        put(
            "tax_amount",
            match (record.tax_amount, record.total_amount) {
                (None, _) => 0.0,
                (Some(tax), Some(total)) if tax > total => self.partial,
                (Some(_), _) => 1.0,
            },
        );
        put("line_items", self.line_items_score(&record.line_items));
        put(
            "currency",
            if record.currency_defaulted { self.partial } else { 1.0 },
        );
        put("invoice_number", presence(record.invoice_number.is_some()));
        put("payment_terms", presence(record.payment_terms.is_some()));
        out
    }

    fn vendor_score(&self, vendor: &str) -> f64 {
        let vendor = vendor.trim();
        if vendor.is_empty() {
            0.0
        } else if vendor.chars().count() < 2 || !vendor.chars().any(char::is_alphabetic) {
            self.partial
        } else {
            1.0
        }
    }

    fn date_score(&self, date: Option<NaiveDate>) -> f64 {
        match date {
            None => 0.0,
            Some(d) if d.year() < self.earliest_plausible_year => self.partial,
            Some(_) => 1.0,
        }
    }

    fn nonzero_score(&self, amount: Option<Decimal>) -> f64 {
        match amount {
            None => 0.0,
            Some(a) if a.is_zero() => self.partial,
            Some(_) => 1.0,
        }
    }

    fn line_items_score(&self, items: &[LineItem]) -> f64 {
        let per_item: Vec<f64> = items
            .iter()
            .map(|item| match item.resolved_parts() {
                3 => 1.0,
                0 => 0.0,
                _ => self.partial,
            })
            .collect();
        mean(&per_item)
    }
}

/// Free-function form of [`ConfidenceScorer::score`].
pub fn score(
    record: &CanonicalInvoice,
    verdict: &ValidationVerdict,
    config: &PipelineConfig,
) -> ConfidenceVerdict {
    ConfidenceScorer::new(config).score(record, verdict)
}

fn presence(present: bool) -> f64 {
    if present {
        1.0
    } else {
        0.0
    }
}

/// Arithmetic mean; `0.0` for an empty slice.
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_record() -> impl Strategy<Value = CanonicalInvoice> {
        (
            "[A-Za-z0-9 ]{0,12}",
            prop::option::of(0u32..100_000),
            prop::option::of(0u32..100_000),
            prop::option::of(0u32..100_000),
            prop::option::of(1990i32..2030),
            0usize..4,
        )
            .prop_map(|(vendor, sub, tax, total, year, n_items)| {
                let mut r = CanonicalInvoice::empty("USD");
                r.vendor_name = vendor;
                r.subtotal = sub.map(|c| Decimal::new(c as i64, 2));
                r.tax_amount = tax.map(|c| Decimal::new(c as i64, 2));
                r.total_amount = total.map(|c| Decimal::new(c as i64, 2));
                r.invoice_date = year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1));
                r.line_items = (0..n_items)
                    .map(|i| LineItem {
                        description: format!("item {i}"),
                        unit_price: (i % 2 == 0).then_some(Decimal::ONE),
                        ..LineItem::default()
                    })
                    .collect();
                r
            })
    }

    proptest! {
        /// Scores and field scores stay in [0, 1].
        #[test]
        fn scores_are_bounded(record in arb_record(), valid in any::<bool>()) {
            let verdict = if valid {
                ValidationVerdict::valid()
            } else {
                ValidationVerdict::from_failures(vec![crate::model::ValidationFailure::DateOrdering])
            };
            let v = ConfidenceScorer::new(&PipelineConfig::default()).score(&record, &verdict);
            prop_assert!((0.0..=1.0).contains(&v.score));
            for (name, s) in &v.field_scores {
                prop_assert!((0.0..=1.0).contains(s), "{} = {}", name, s);
            }
        }

        /// An invalid verdict never scores higher than a valid one.
        #[test]
        fn penalty_never_raises(record in arb_record()) {
            let scorer = ConfidenceScorer::new(&PipelineConfig::default());
            let ok = scorer.score(&record, &ValidationVerdict::valid());
            let bad = scorer.score(
                &record,
                &ValidationVerdict::from_failures(vec![crate::model::ValidationFailure::DateOrdering]),
            );
            prop_assert!(bad.score <= ok.score);
            if ok.score > 0.0 {
                prop_assert!(bad.score < ok.score);
            }
        }
    }
}
