//! Integration tests for edgequake-invoice.
//!
//! Everything runs offline: payloads are inline JSON or files in a
//! `tempfile::TempDir`, and the processing date is fixed.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use edgequake_invoice::{
    canonicalize, BatchProgressCallback, InvoiceError, InvoicePipeline, ItemError, PipelineConfig,
    RawExtraction, RoutingStatus, ValidationFailure,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn raw(value: Value) -> RawExtraction {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("edgequake_invoice=debug"))
        .with_test_writer()
        .try_init();
}

fn write_payload(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let p = dir.path().join(name);
    std::fs::write(&p, body).unwrap();
    p
}

// ── Core behaviour ───────────────────────────────────────────────────────────

#[test]
fn end_to_end_example() {
    let out = InvoicePipeline::default()
        .process_value(
            json!({
                "total_amount": "$1,200.00",
                "vendor_name": "Acme Co",
                "invoice_date": "2024-01-15"
            }),
            now(),
        )
        .unwrap();

    assert_eq!(out.canonical.total_amount, Some(d("1200.00")));
    assert_eq!(out.canonical.vendor_name, "Acme Co");
    assert_eq!(
        out.canonical.invoice_date,
        NaiveDate::from_ymd_opt(2024, 1, 15)
    );
    assert!(out.validation.is_valid);
    assert!((out.confidence.score - 0.5333).abs() < 1e-3);
    assert_eq!(out.status(), RoutingStatus::NeedsReview);
}

#[test]
fn alias_invariance_through_pipeline() {
    let pipeline = InvoicePipeline::default();
    let a = pipeline.process(
        &raw(json!({"vendor_name": "Acme", "total_amount": "108.00", "subtotal": "100", "tax": "8"})),
        now(),
    );
    let b = pipeline.process(
        &raw(json!({"Supplier": "Acme", "Grand Total": 108, "Sub-Total": "100.00", "VAT": "8.00"})),
        now(),
    );
    assert_eq!(a.canonical.total_amount, b.canonical.total_amount);
    assert_eq!(a.canonical.subtotal, b.canonical.subtotal);
    assert_eq!(a.canonical.tax_amount, b.canonical.tax_amount);
    assert_eq!(a.confidence.score, b.confidence.score);
    assert_eq!(a.status(), b.status());
}

#[test]
fn reconciliation_mismatch_is_penalised() {
    let pipeline = InvoicePipeline::default();
    let good = pipeline.process(
        &raw(json!({"vendor": "Acme", "subtotal": 100, "tax": 8, "total": 108})),
        now(),
    );
    let bad = pipeline.process(
        &raw(json!({"vendor": "Acme", "subtotal": 100, "tax": 8, "total": 110})),
        now(),
    );
    assert!(good.validation.is_valid);
    assert!(!bad.validation.is_valid);
    assert_eq!(
        bad.validation.reason.as_deref(),
        Some("total reconciliation mismatch")
    );
    assert!(bad.confidence.penalty_applied);
    assert!(bad.confidence.score < good.confidence.score);
}

#[test]
fn processing_is_idempotent() {
    let pipeline = InvoicePipeline::default();
    let payload = raw(json!({
        "vendor": "Globex",
        "date": "03/04/2024",
        "due": "2024-04-30",
        "items": [{"desc": "Bolts", "qty": 10, "price": "0.25"}],
        "subtotal": "2.50",
        "total": "2.50",
        "currency": "eur"
    }));
    let first = pipeline.process(&payload, now());
    let second = pipeline.process(&payload, now());
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn canonical_record_is_a_fixed_point_of_its_own_serialisation() {
    let config = PipelineConfig::default();
    let first = canonicalize(
        &raw(json!({
            "vendor": "Initech",
            "invoice_date": "15 Jan 2024",
            "total": "1.234,50 €",
            "line_items": [{"description": "Staplers", "quantity": "2", "line_total": "1234.50"}]
        })),
        &config,
    );
    let reparsed = match serde_json::to_value(&first).unwrap() {
        Value::Object(map) => canonicalize(&map, &config),
        _ => unreachable!(),
    };
    assert_eq!(reparsed.vendor_name, first.vendor_name);
    assert_eq!(reparsed.invoice_date, first.invoice_date);
    assert_eq!(reparsed.total_amount, first.total_amount);
    assert_eq!(reparsed.currency, first.currency);
    assert_eq!(reparsed.line_items, first.line_items);
}

#[test]
fn future_invoice_date_fails_validation() {
    let out = InvoicePipeline::default().process(
        &raw(json!({"vendor": "Acme", "total": 10, "invoice_date": "2024-06-02"})),
        now(),
    );
    assert_eq!(out.validation.failures, vec![ValidationFailure::DateOrdering]);
}

#[test]
fn threshold_configuration_changes_routing() {
    let payload = raw(json!({"vendor": "Acme", "total": 10}));
    let lenient = InvoicePipeline::new(
        PipelineConfig::builder()
            .review_threshold(0.4)
            .reject_threshold(0.1)
            .build()
            .unwrap(),
    );
    let strict = InvoicePipeline::default();
    assert_eq!(lenient.process(&payload, now()).status(), RoutingStatus::AutoApproved);
    assert_eq!(strict.process(&payload, now()).status(), RoutingStatus::NeedsReview);
}

#[test]
fn garbage_payload_still_scores() {
    let out = InvoicePipeline::default().process(
        &raw(json!({
            "total": {"nested": [1, 2, 3]},
            "vendor": ["not", "a", "string"],
            "invoice_date": "someday",
            "line_items": 17
        })),
        now(),
    );
    assert!(out.canonical.total_amount.is_none());
    assert!(out.canonical.vendor_name.is_empty());
    assert_eq!(out.confidence.score, 0.0);
    assert_eq!(out.status(), RoutingStatus::Rejected);
}

#[test]
fn amounts_near_decimal_max_do_not_panic() {
    let pipeline = InvoicePipeline::default();
    let out = pipeline
        .process_value(
            json!({
                "vendor": "Acme",
                "subtotal": "79228162514264337593543950335",
                "tax": "10",
                "total": "5"
            }),
            now(),
        )
        .unwrap();
    assert_eq!(
        out.validation.reason.as_deref(),
        Some("total reconciliation mismatch")
    );

    let out = pipeline
        .process_value(
            json!({
                "vendor": "Acme",
                "subtotal": "1",
                "line_items": [{"qty": "100000000000000000", "price": "100000000000000000"}]
            }),
            now(),
        )
        .unwrap();
    assert_eq!(out.validation.reason.as_deref(), Some("line-item sum mismatch"));
}

#[test]
fn priced_items_without_quantity_reconcile_with_subtotal() {
    let out = InvoicePipeline::default().process(
        &raw(json!({
            "vendor": "Acme",
            "subtotal": "500.00",
            "line_items": [
                {"description": "a", "unit_price": "50"},
                {"description": "b", "unit_price": "50"}
            ]
        })),
        now(),
    );
    assert!(!out.validation.is_valid);
    assert_eq!(out.validation.reason.as_deref(), Some("line-item sum mismatch"));
}

// ── Payload handling ─────────────────────────────────────────────────────────

#[test]
fn fenced_reply_with_usage() {
    let text = "```json\n{\"vendor\": \"Acme\", \"total\": \"9.99\", \"_usage\": {\"output_tokens\": 41}}\n```";
    let out = InvoicePipeline::default().process_str(text, now()).unwrap();
    assert_eq!(out.canonical.total_amount, Some(d("9.99")));
    assert_eq!(out.usage, Some(json!({"output_tokens": 41})));
}

#[test]
fn upstream_error_reply_is_fatal() {
    let err = InvoicePipeline::default()
        .process_value(json!({"error": "document unreadable"}), now())
        .unwrap_err();
    assert!(matches!(err, InvoiceError::ExtractionFailed { .. }));
}

// ── Files and batches ────────────────────────────────────────────────────────

#[tokio::test]
async fn process_file_roundtrip_through_write_output() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let input = write_payload(
        &dir,
        "inv.json",
        r#"{"vendor_name": "Acme Co", "total_amount": "$1,200.00", "invoice_date": "2024-01-15"}"#,
    );
    let pipeline = InvoicePipeline::default();
    let out = pipeline.process_file(&input, now()).await.unwrap();

    let target = dir.path().join("out/result.json");
    edgequake_invoice::write_output(&out, &target).await.unwrap();

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(written["canonical"]["total_amount"], "1200.00");
    assert_eq!(written["confidence"]["status"], "needs_review");
    assert!(!dir.path().join("out/result.json.tmp").exists());
}

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    completed: Mutex<Vec<(usize, RoutingStatus)>>,
    errors: AtomicUsize,
    finished: Mutex<Option<(usize, usize)>>,
}

impl BatchProgressCallback for Recorder {
    fn on_item_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_item_complete(&self, index: usize, _total: usize, status: RoutingStatus) {
        self.completed.lock().unwrap().push((index, status));
    }

    fn on_item_error(&self, _index: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        *self.finished.lock().unwrap() = Some((total, success_count));
    }
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_failures() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let paths = vec![
        write_payload(&dir, "a.json", r#"{"vendor": "Acme", "total": "5.00"}"#),
        write_payload(&dir, "b.json", "not json at all"),
        dir.path().join("missing.json"),
        write_payload(
            &dir,
            "c.json",
            r#"{"vendor": "Acme", "subtotal": 100, "tax": 8, "total": 108,
                "invoice_date": "2024-05-01", "due_date": "2024-05-31",
                "items": [{"description": "Service", "qty": 1, "price": 100, "total": 100}]}"#,
        ),
    ];

    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .concurrency(2)
        .progress_callback(recorder.clone() as Arc<dyn BatchProgressCallback>)
        .build()
        .unwrap();
    let batch = InvoicePipeline::new(config).process_batch(&paths, now()).await;

    let indices: Vec<usize> = batch.items.iter().map(|i| i.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    assert!(matches!(
        batch.items[1].error,
        Some(ItemError::PayloadRejected { index: 1, .. })
    ));
    assert!(matches!(
        batch.items[2].error,
        Some(ItemError::ReadFailed { index: 2, .. })
    ));
    assert_eq!(
        batch.items[3].output.as_ref().map(|o| o.status()),
        Some(RoutingStatus::AutoApproved)
    );

    assert_eq!(batch.stats.total, 4);
    assert_eq!(batch.stats.processed, 2);
    assert_eq!(batch.stats.failed, 2);
    assert_eq!(batch.stats.auto_approved, 1);
    assert_eq!(batch.stats.needs_review, 1);

    assert_eq!(recorder.started.load(Ordering::SeqCst), 4);
    assert_eq!(recorder.errors.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.completed.lock().unwrap().len(), 2);
    assert_eq!(*recorder.finished.lock().unwrap(), Some((4, 2)));
}

#[tokio::test]
async fn empty_batch() {
    let batch = InvoicePipeline::default().process_batch(&[], now()).await;
    assert!(batch.items.is_empty());
    assert_eq!(batch.stats.total, 0);
}
