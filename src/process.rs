//! Entry points: one payload, one file, or a batch of files.
//!
//! [`InvoicePipeline`] owns the three stages (canonicalizer, validator,
//! scorer) built from a single [`PipelineConfig`]. Scoring a payload is
//! synchronous; the async methods only add file I/O and fan-out.

use crate::config::PipelineConfig;
use crate::error::{InvoiceError, ItemError};
use crate::model::{BatchItem, BatchOutput, BatchStats, InvoiceOutput, RawExtraction, RoutingStatus};
use crate::pipeline::canonicalize::Canonicalizer;
use crate::pipeline::input::{self, UploadCheck};
use crate::pipeline::payload::{self, PreparedPayload};
use crate::pipeline::score::ConfidenceScorer;
use crate::pipeline::validate::Validator;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Canonicalize → validate → score, configured once.
#[derive(Debug, Clone)]
pub struct InvoicePipeline {
    config: PipelineConfig,
    canonicalizer: Canonicalizer,
    validator: Validator,
    scorer: ConfidenceScorer,
}

impl Default for InvoicePipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl InvoicePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            canonicalizer: Canonicalizer::new(&config),
            validator: Validator::new(&config),
            scorer: ConfidenceScorer::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Score an already-decoded extraction as of `now`.
    ///
    /// Never fails: unusable fields are absent in the canonical record and
    /// lower the confidence instead.
    pub fn process(&self, raw: &RawExtraction, now: DateTime<Utc>) -> InvoiceOutput {
        let canonical = self.canonicalizer.canonicalize(raw);
        let validation = self.validator.validate(&canonical, now);
        let confidence = self.scorer.score(&canonical, &validation);

        info!(
            vendor = %canonical.vendor_name,
            valid = validation.is_valid,
            reason = validation.reason.as_deref().unwrap_or("-"),
            score = confidence.score,
            status = %confidence.status,
            "invoice scored"
        );

        InvoiceOutput {
            canonical,
            validation,
            confidence,
            usage: None,
        }
    }

    /// Prepare a decoded reply (`error` / `_usage` handling), then score it.
    ///
    /// # Errors
    /// [`InvoiceError::MalformedPayload`] when the value is not an object,
    /// [`InvoiceError::ExtractionFailed`] when it carries an `error` key.
    pub fn process_value(&self, value: Value, now: DateTime<Utc>) -> Result<InvoiceOutput, InvoiceError> {
        let prepared = payload::prepare_payload(value)?;
        Ok(self.process_prepared(prepared, now))
    }

    /// Parse reply text (fenced or plain JSON), then score it.
    pub fn process_str(&self, text: &str, now: DateTime<Utc>) -> Result<InvoiceOutput, InvoiceError> {
        let prepared = payload::parse_extraction_text(text)?;
        Ok(self.process_prepared(prepared, now))
    }

    fn process_prepared(&self, prepared: PreparedPayload, now: DateTime<Utc>) -> InvoiceOutput {
        let PreparedPayload { raw, usage } = prepared;
        InvoiceOutput {
            usage,
            ..self.process(&raw, now)
        }
    }

    /// Read a payload JSON file and score it.
    pub async fn process_file(
        &self,
        path: impl AsRef<Path>,
        now: DateTime<Utc>,
    ) -> Result<InvoiceOutput, InvoiceError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| input::io_error(path, e))?;
        debug!(path = %path.display(), bytes = text.len(), "payload read");
        self.process_str(&text, now)
    }

    /// Run the upload gate on a document before it is sent for extraction.
    pub async fn check_upload(&self, path: impl AsRef<Path>) -> Result<UploadCheck, InvoiceError> {
        input::resolve_upload(path, &self.config).await
    }

    /// Score many payload files concurrently.
    ///
    /// A file that cannot be read or parsed becomes a [`BatchItem`] with an
    /// [`ItemError`]; the rest of the batch continues. Items come back in
    /// input order.
    pub async fn process_batch(&self, paths: &[PathBuf], now: DateTime<Utc>) -> BatchOutput {
        let batch_start = Instant::now();
        let total = paths.len();
        let callback = self.config.progress_callback.clone();
        info!(total, concurrency = self.config.concurrency, "starting batch");

        if let Some(ref cb) = callback {
            cb.on_batch_start(total);
        }

        let mut items: Vec<BatchItem> = stream::iter(paths.iter().enumerate().map(|(index, path)| {
            let callback = callback.clone();
            async move {
                if let Some(ref cb) = callback {
                    cb.on_item_start(index, total);
                }
                let item = self.process_batch_item(index, path, now).await;
                if let Some(ref cb) = callback {
                    match (&item.output, &item.error) {
                        (Some(out), _) => cb.on_item_complete(index, total, out.status()),
                        (None, Some(e)) => cb.on_item_error(index, total, &e.to_string()),
                        (None, None) => {}
                    }
                }
                item
            }
        }))
        .buffer_unordered(self.config.concurrency)
        .collect()
        .await;

        items.sort_by_key(|item| item.index);

        let mut stats = summarize(&items);
        stats.total_duration_ms = batch_start.elapsed().as_millis() as u64;

        if let Some(ref cb) = callback {
            cb.on_batch_complete(total, stats.processed);
        }
        info!(
            total = stats.total,
            processed = stats.processed,
            failed = stats.failed,
            auto_approved = stats.auto_approved,
            needs_review = stats.needs_review,
            rejected = stats.rejected,
            duration_ms = stats.total_duration_ms,
            "batch complete"
        );

        BatchOutput { items, stats }
    }

    async fn process_batch_item(&self, index: usize, path: &Path, now: DateTime<Utc>) -> BatchItem {
        let start = Instant::now();
        let result = match tokio::fs::read_to_string(path).await {
            Err(e) => Err(ItemError::ReadFailed {
                index,
                detail: input::io_error(path, e).to_string(),
            }),
            Ok(text) => self
                .process_str(&text, now)
                .map_err(|e| ItemError::PayloadRejected {
                    index,
                    detail: e.to_string(),
                }),
        };

        if let Err(ref e) = result {
            warn!(path = %path.display(), "{e}");
        }

        let (output, error) = match result {
            Ok(out) => (Some(out), None),
            Err(e) => (None, Some(e)),
        };
        BatchItem {
            index,
            source: path.to_path_buf(),
            output,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

fn summarize(items: &[BatchItem]) -> BatchStats {
    let mut stats = BatchStats {
        total: items.len(),
        ..BatchStats::default()
    };
    for item in items {
        let Some(out) = &item.output else {
            stats.failed += 1;
            continue;
        };
        stats.processed += 1;
        if !out.validation.is_valid {
            stats.invalid += 1;
        }
        match out.status() {
            RoutingStatus::AutoApproved => stats.auto_approved += 1,
            RoutingStatus::NeedsReview => stats.needs_review += 1,
            RoutingStatus::Rejected => stats.rejected += 1,
        }
    }
    stats
}

/// Serialise `value` as pretty JSON to `path`.
///
/// Writes to a sibling `.tmp` file first and renames it into place, so a
/// crash never leaves a half-written output behind.
pub async fn write_output<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), InvoiceError> {
    let path = path.as_ref();
    let write_err = |e: std::io::Error| InvoiceError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut json = serde_json::to_vec_pretty(value)
        .map_err(|e| InvoiceError::Internal(format!("failed to serialise output: {e}")))?;
    json.push(b'\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!(path = %path.display(), bytes = json.len(), "output written");
    Ok(())
}

/// Blocking wrapper around [`InvoicePipeline::process_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_file_sync(
    pipeline: &InvoicePipeline,
    path: impl AsRef<Path>,
    now: DateTime<Utc>,
) -> Result<InvoiceOutput, InvoiceError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| InvoiceError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(pipeline.process_file(path, now))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::Map;

    fn arb_amount() -> impl Strategy<Value = Value> {
        prop_oneof![
            "[0-9]{1,29}".prop_map(Value::String),
            "[0-9]{20,29}\\.[0-9]{1,2}".prop_map(Value::String),
            "\\$[0-9]{1,3}(,[0-9]{3}){4,8}".prop_map(Value::String),
            Just(Value::String(rust_decimal::Decimal::MAX.to_string())),
            any::<u64>().prop_map(Value::from),
            (0.0f64..1.0e28).prop_map(Value::from),
        ]
    }

    fn arb_item() -> impl Strategy<Value = Value> {
        (
            prop::option::of(arb_amount()),
            prop::option::of(arb_amount()),
            prop::option::of(arb_amount()),
        )
            .prop_map(|(qty, price, total)| {
                let mut item = Map::new();
                item.insert("description".into(), Value::from("line"));
                for (key, value) in [("qty", qty), ("unit_price", price), ("total", total)] {
                    if let Some(v) = value {
                        item.insert(key.into(), v);
                    }
                }
                Value::Object(item)
            })
    }

    fn arb_payload() -> impl Strategy<Value = Value> {
        (
            prop::option::of(arb_amount()),
            prop::option::of(arb_amount()),
            prop::option::of(arb_amount()),
            prop::collection::vec(arb_item(), 0..4),
        )
            .prop_map(|(subtotal, tax, total, items)| {
                let mut map = Map::new();
                map.insert("vendor".into(), Value::from("Acme"));
                for (key, value) in [("subtotal", subtotal), ("tax", tax), ("total", total)] {
                    if let Some(v) = value {
                        map.insert(key.into(), v);
                    }
                }
                map.insert("line_items".into(), Value::Array(items));
                Value::Object(map)
            })
    }

    proptest! {
        /// Very large amounts still produce a bounded score instead of a panic.
        #[test]
        fn processing_is_total_for_large_amounts(payload in arb_payload()) {
            let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
            let out = InvoicePipeline::default().process_value(payload, now).unwrap();
            prop_assert!((0.0..=1.0).contains(&out.confidence.score));
        }
    }
}
