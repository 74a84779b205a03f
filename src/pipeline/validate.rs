//! Business-rule checks on a canonical record.
//!
//! Rules run in a fixed order and every failure is collected; the first one
//! becomes the verdict's `reason`. The processing date is passed in, so the
//! same record and date always give the same verdict.

use crate::config::PipelineConfig;
use crate::model::{CanonicalInvoice, ValidationFailure, ValidationVerdict};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Stateless rule checker.
#[derive(Debug, Clone)]
pub struct Validator {
    tolerance: Decimal,
}

impl Validator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            tolerance: config.tolerance,
        }
    }

    /// Verdict for `record` as of `now`.
    pub fn validate(&self, record: &CanonicalInvoice, now: DateTime<Utc>) -> ValidationVerdict {
        ValidationVerdict::from_failures(self.check_all(record, now.date_naive()))
    }

    /// Every failed rule, in evaluation order.
    pub fn check_all(&self, record: &CanonicalInvoice, today: NaiveDate) -> Vec<ValidationFailure> {
        let mut failures = Vec::new();

        if !record.has_vendor() && record.total_amount.is_none() {
            failures.push(ValidationFailure::MissingVendorAndTotal);
        }

        if let (Some(subtotal), Some(tax), Some(total)) =
            (record.subtotal, record.tax_amount, record.total_amount)
        {
            if !self.reconciles(subtotal.checked_add(tax), total) {
                failures.push(ValidationFailure::TotalReconciliation);
            }
        }

        if let Some(subtotal) = record.subtotal {
            let items = &record.line_items;
            let complete = !items.is_empty() && items.iter().all(|i| i.unit_price.is_some());
            if complete {
                let sum = items
                    .iter()
                    .try_fold(Decimal::ZERO, |acc, i| acc.checked_add(i.effective_total()?));
                if !self.reconciles(sum, subtotal) {
                    failures.push(ValidationFailure::LineItemSum);
                }
            }
        }

        for (index, item) in record.line_items.iter().enumerate() {
            if let (Some(price), Some(total)) = (item.unit_price, item.line_total) {
                if !self.reconciles(item.quantity.checked_mul(price), total) {
                    failures.push(ValidationFailure::LineItemArithmetic { index });
                }
            }
        }

        let issued_in_future = record.invoice_date.is_some_and(|d| d > today);
        let due_before_issue = matches!(
            (record.invoice_date, record.due_date),
            (Some(issued), Some(due)) if due < issued
        );
        if issued_in_future || due_before_issue {
            failures.push(ValidationFailure::DateOrdering);
        }

        if let Some((field, _)) = record
            .numeric_fields()
            .into_iter()
            .find(|(_, v)| *v < Decimal::ZERO)
        {
            failures.push(ValidationFailure::NegativeAmount { field });
        }

        failures
    }

    /// `computed` is `None` when it overflowed, which never reconciles.
    fn reconciles(&self, computed: Option<Decimal>, stated: Decimal) -> bool {
        computed
            .and_then(|c| c.checked_sub(stated))
            .is_some_and(|diff| diff.abs() <= self.tolerance)
    }
}

/// Free-function form of [`Validator::validate`].
pub fn validate(
    record: &CanonicalInvoice,
    now: DateTime<Utc>,
    config: &PipelineConfig,
) -> ValidationVerdict {
    Validator::new(config).validate(record, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn validator() -> Validator {
        Validator::new(&PipelineConfig::default())
    }

    fn record() -> CanonicalInvoice {
        let mut r = CanonicalInvoice::empty("USD");
        r.vendor_name = "Acme".into();
        r
    }

    fn item(qty: &str, price: &str, total: Option<&str>) -> LineItem {
        LineItem {
            description: "x".into(),
            quantity: d(qty),
            quantity_defaulted: false,
            unit_price: Some(d(price)),
            line_total: total.map(d),
        }
    }

    #[test]
    fn reconciliation_example() {
        let mut r = record();
        r.subtotal = Some(d("100"));
        r.tax_amount = Some(d("8"));
        r.total_amount = Some(d("108"));
        assert!(validator().validate(&r, now()).is_valid);

        r.total_amount = Some(d("110"));
        let v = validator().validate(&r, now());
        assert!(!v.is_valid);
        assert_eq!(v.reason.as_deref(), Some("total reconciliation mismatch"));
    }

    #[test]
    fn reconciliation_within_tolerance() {
        let mut r = record();
        r.subtotal = Some(d("100.00"));
        r.tax_amount = Some(d("8.00"));
        r.total_amount = Some(d("108.01"));
        assert!(validator().validate(&r, now()).is_valid);
        r.total_amount = Some(d("108.02"));
        assert!(!validator().validate(&r, now()).is_valid);
    }

    #[test]
    fn partial_totals_are_not_reconciled() {
        let mut r = record();
        r.subtotal = Some(d("100"));
        r.total_amount = Some(d("500"));
        assert!(validator().validate(&r, now()).is_valid);
    }

    #[test]
    fn missing_vendor_and_total() {
        let v = validator().validate(&CanonicalInvoice::empty("USD"), now());
        assert_eq!(v.reason.as_deref(), Some("missing vendor and total"));

        let mut total_only = CanonicalInvoice::empty("USD");
        total_only.total_amount = Some(d("1"));
        assert!(validator().validate(&total_only, now()).is_valid);
    }

    #[test]
    fn line_item_sum_uses_computed_totals() {
        let mut r = record();
        r.subtotal = Some(d("25.00"));
        r.line_items = vec![item("2", "5.00", None), item("3", "5.00", Some("15.00"))];
        assert!(validator().validate(&r, now()).is_valid);

        r.subtotal = Some(d("30.00"));
        let v = validator().validate(&r, now());
        assert_eq!(v.reason.as_deref(), Some("line-item sum mismatch"));
    }

    #[test]
    fn line_item_sum_skipped_when_incomplete() {
        let mut r = record();
        r.subtotal = Some(d("999"));
        let mut no_price = item("1", "1", None);
        no_price.unit_price = None;
        r.line_items = vec![item("2", "5.00", None), no_price];
        assert!(validator().validate(&r, now()).is_valid);

        r.line_items = vec![LineItem::default()];
        assert!(validator().validate(&r, now()).is_valid);
    }

    #[test]
    fn defaulted_quantity_still_reconciles() {
        let priced = |description: &str| LineItem {
            description: description.into(),
            unit_price: Some(d("50")),
            ..LineItem::default()
        };
        let mut r = record();
        r.subtotal = Some(d("500.00"));
        r.line_items = vec![priced("a"), priced("b")];
        let v = validator().validate(&r, now());
        assert_eq!(v.reason.as_deref(), Some("line-item sum mismatch"));

        r.subtotal = Some(d("100.00"));
        assert!(validator().validate(&r, now()).is_valid);

        r.line_items = vec![LineItem {
            line_total: Some(d("60")),
            ..priced("a")
        }];
        r.subtotal = Some(d("60"));
        assert_eq!(
            validator().validate(&r, now()).failures,
            vec![ValidationFailure::LineItemArithmetic { index: 0 }]
        );
    }

    #[test]
    fn overflowing_sums_fail_instead_of_panicking() {
        let mut r = record();
        r.subtotal = Some(Decimal::MAX);
        r.tax_amount = Some(d("10"));
        r.total_amount = Some(d("5"));
        assert_eq!(
            validator().validate(&r, now()).failures,
            vec![ValidationFailure::TotalReconciliation]
        );

        let huge = "100000000000000000";
        let mut r = record();
        r.subtotal = Some(d("1"));
        r.line_items = vec![item(huge, huge, Some("1"))];
        assert_eq!(
            validator().validate(&r, now()).failures,
            vec![ValidationFailure::LineItemArithmetic { index: 0 }]
        );

        r.line_items = vec![item(huge, huge, None)];
        assert_eq!(
            validator().validate(&r, now()).failures,
            vec![ValidationFailure::LineItemSum]
        );
    }

    #[test]
    fn overflowing_line_sum_is_a_mismatch() {
        let mut r = record();
        r.subtotal = Some(Decimal::MAX);
        let max = Decimal::MAX.to_string();
        r.line_items = vec![item("1", "1", Some(max.as_str())), item("1", "1", Some("1"))];
        let v = validator().validate(&r, now());
        assert!(v.failures.contains(&ValidationFailure::LineItemSum));
    }

    #[test]
    fn line_item_arithmetic() {
        let mut r = record();
        r.line_items = vec![item("2", "5.00", Some("10.00")), item("3", "5.00", Some("16.00"))];
        let v = validator().validate(&r, now());
        assert_eq!(v.reason.as_deref(), Some("line-item arithmetic mismatch"));
        assert_eq!(v.failures, vec![ValidationFailure::LineItemArithmetic { index: 1 }]);
    }

    #[test]
    fn date_ordering() {
        let mut r = record();
        r.invoice_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        assert!(validator().validate(&r, now()).is_valid, "same day is allowed");

        r.invoice_date = NaiveDate::from_ymd_opt(2024, 6, 2);
        let v = validator().validate(&r, now());
        assert_eq!(v.reason.as_deref(), Some("date ordering violation"));

        r.invoice_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        r.due_date = NaiveDate::from_ymd_opt(2024, 4, 30);
        assert!(!validator().validate(&r, now()).is_valid);

        r.due_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert!(validator().validate(&r, now()).is_valid);
    }

    #[test]
    fn negative_amount_names_the_field() {
        let mut r = record();
        r.total_amount = Some(d("-1"));
        let v = validator().validate(&r, now());
        assert_eq!(v.reason.as_deref(), Some("negative amount"));
        assert_eq!(
            v.failures,
            vec![ValidationFailure::NegativeAmount {
                field: "total_amount".into()
            }]
        );
    }

    #[test]
    fn all_failures_collected_in_order() {
        let mut r = CanonicalInvoice::empty("USD");
        r.subtotal = Some(d("10"));
        r.tax_amount = Some(d("1"));
        r.invoice_date = NaiveDate::from_ymd_opt(2030, 1, 1);
        let failures = validator().check_all(&r, now().date_naive());
        assert_eq!(
            failures,
            vec![
                ValidationFailure::MissingVendorAndTotal,
                ValidationFailure::DateOrdering
            ]
        );
    }

    #[test]
    fn custom_tolerance() {
        let config = PipelineConfig::builder()
            .tolerance(d("0.05"))
            .build()
            .unwrap();
        let mut r = record();
        r.subtotal = Some(d("100"));
        r.tax_amount = Some(d("8"));
        r.total_amount = Some(d("108.04"));
        assert!(validate(&r, now(), &config).is_valid);
    }
}
