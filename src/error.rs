//! Error types for the edgequake-invoice library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InvoiceError`] (**fatal**): the request cannot proceed at all (file
//!   missing or too large, upload failed the quality gate, the recognition
//!   service reported an error, payload is not a JSON object). Returned as
//!   `Err(InvoiceError)` from the `process*` and gate functions.
//!
//! * [`ItemError`] (**non-fatal**): one payload of a batch failed but the
//!   other items are fine. Stored inside [`crate::model::BatchItem`].
//!
//! Neither covers a record that fails business rules: that is not an error.
//! The pipeline always produces a scored record and reports rule violations
//! as [`crate::model::ValidationFailure`] values inside the verdict.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-invoice library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Upload exceeds the configured size limit.
    #[error("File too large ({size} bytes): '{path}' exceeds the {limit}-byte limit")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// Image upload rejected by the blur/contrast gate.
    #[error("Quality Check Failed: {reason} (score {score:.2})")]
    QualityCheckFailed { reason: String, score: f64 },

    // ── Payload errors ────────────────────────────────────────────────────
    /// The extraction payload is not a JSON object.
    #[error("Malformed extraction payload: {detail}")]
    MalformedPayload { detail: String },

    /// The recognition service reported an extraction-level error.
    #[error("Extraction failed upstream: {message}")]
    ExtractionFailed { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read an input file after it was found.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single batch item.
///
/// The batch continues; the failing item keeps its index and source path.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The payload file could not be read.
    #[error("Item {index}: read failed: {detail}")]
    ReadFailed { index: usize, detail: String },

    /// The payload was unusable (not JSON, not an object, upstream error).
    #[error("Item {index}: rejected payload: {detail}")]
    PayloadRejected { index: usize, detail: String },
}
