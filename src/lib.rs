//! # edgequake-invoice
//!
//! Normalize, validate and confidence-score invoice extractions.
//!
//! A document-recognition service returns a loosely structured JSON object
//! for each scanned invoice. Field names drift between runs ("total",
//! "grand_total", "Amount Due"), amounts arrive as `"$1,200.00"` or
//! `"1.200,00 €"`, and dates come in whatever locale the invoice used. This
//! crate turns such a payload into a fixed-shape record, checks it against
//! basic accounting rules, and decides whether it can be auto-approved.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 0. Gate         size, PDF magic, blur/contrast check for images
//!  │     (recognition service runs here, outside this crate)
//!  ├─ 1. Payload      strip fences, surface "error", split off "_usage"
//!  ├─ 2. Canonicalize alias resolution + value coercion → CanonicalInvoice
//!  ├─ 3. Validate     reconciliation, line items, date order, signs
//!  └─ 4. Score        per-field confidence → weighted score → routing
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use edgequake_invoice::{InvoicePipeline, RoutingStatus};
//! use chrono::Utc;
//! use serde_json::json;
//!
//! let pipeline = InvoicePipeline::default();
//! let output = pipeline
//!     .process_value(
//!         json!({
//!             "total_amount": "$1,200.00",
//!             "vendor_name": "Acme Co",
//!             "invoice_date": "2024-01-15"
//!         }),
//!         Utc::now(),
//!     )
//!     .unwrap();
//!
//! assert!(output.validation.is_valid);
//! assert_eq!(output.canonical.currency, "USD");
//! assert_eq!(output.status(), RoutingStatus::NeedsReview);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-normalize` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-invoice = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aliases;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod process;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FieldWeights, PipelineConfig, PipelineConfigBuilder};
pub use error::{InvoiceError, ItemError};
pub use model::{
    BatchItem, BatchOutput, BatchStats, CanonicalInvoice, ConfidenceVerdict, InvoiceOutput,
    LineItem, RawExtraction, RoutingStatus, ValidationFailure, ValidationVerdict,
};
pub use pipeline::canonicalize::{canonicalize, Canonicalizer};
pub use pipeline::input::{resolve_upload, DocumentKind, UploadCheck};
pub use pipeline::payload::{parse_extraction_text, prepare_payload, PreparedPayload};
pub use pipeline::quality::{check_quality, QualityReport};
pub use pipeline::score::{score, ConfidenceScorer};
pub use pipeline::validate::{validate, Validator};
pub use process::{process_file_sync, write_output, InvoicePipeline};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
