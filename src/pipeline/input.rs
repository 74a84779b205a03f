//! Upload gate: existence, permission, size, kind and image quality.
//!
//! Runs before a document is sent to the recognition service so obviously
//! unusable uploads are refused early. PDFs are recognised by their `%PDF`
//! magic bytes and skip the quality check; everything else is treated as an
//! image and must pass [`check_quality`].

use crate::config::PipelineConfig;
use crate::error::InvoiceError;
use crate::pipeline::quality::{check_quality, QualityReport};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8] = b"%PDF";

/// What kind of document an upload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Image,
}

/// An upload that passed the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCheck {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub size: u64,
    /// Present for images only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
}

/// Detect the document kind from its leading bytes.
pub fn detect_kind(bytes: &[u8]) -> DocumentKind {
    if bytes.starts_with(PDF_MAGIC) {
        DocumentKind::Pdf
    } else {
        DocumentKind::Image
    }
}

/// Run the upload gate on a local file.
pub async fn resolve_upload(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<UploadCheck, InvoiceError> {
    let path = path.as_ref().to_path_buf();

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| io_error(&path, e))?;
    let size = meta.len();
    if size > config.max_file_size {
        warn!(path = %path.display(), size, limit = config.max_file_size, "upload too large");
        return Err(InvoiceError::FileTooLarge {
            path,
            size,
            limit: config.max_file_size,
        });
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| io_error(&path, e))?;
    let kind = detect_kind(&bytes);
    debug!(path = %path.display(), size, ?kind, "upload read");

    if kind == DocumentKind::Pdf {
        info!(path = %path.display(), "PDF upload accepted");
        return Ok(UploadCheck {
            path,
            kind,
            size,
            quality: None,
        });
    }

    let (blur, contrast) = (config.blur_threshold, config.contrast_threshold);
    let report = tokio::task::spawn_blocking(move || check_quality(&bytes, blur, contrast))
        .await
        .map_err(|e| InvoiceError::Internal(format!("quality check task failed: {e}")))?;

    if report.is_bad {
        warn!(
            path = %path.display(),
            reason = %report.reason,
            score = report.score,
            "upload failed quality check"
        );
        return Err(InvoiceError::QualityCheckFailed {
            reason: report.reason,
            score: report.score,
        });
    }

    info!(path = %path.display(), score = report.score, "image upload accepted");
    Ok(UploadCheck {
        path,
        kind,
        size,
        quality: Some(report),
    })
}

pub(crate) fn io_error(path: &Path, e: std::io::Error) -> InvoiceError {
    let path = path.to_path_buf();
    match e.kind() {
        ErrorKind::NotFound => InvoiceError::FileNotFound { path },
        ErrorKind::PermissionDenied => InvoiceError::PermissionDenied { path },
        _ => InvoiceError::ReadFailed { path, source: e },
    }
}
