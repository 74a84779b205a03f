//! Progress-callback trait for batch processing events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as [`crate::process::InvoicePipeline::process_batch`] works through
//! its payload files. Callers can forward them to a progress bar, a channel
//! or a log; the library does not care.
//!
//! # Example
//!
//! ```rust
//! use edgequake_invoice::{BatchProgressCallback, PipelineConfig, RoutingStatus};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ReviewCounter {
//!     needs_review: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for ReviewCounter {
//!     fn on_item_complete(&self, _index: usize, _total: usize, status: RoutingStatus) {
//!         if status == RoutingStatus::NeedsReview {
//!             self.needs_review.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(ReviewCounter {
//!     needs_review: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::model::RoutingStatus;
use std::sync::Arc;

/// Called by the batch driver as it processes each payload.
///
/// Items run concurrently, so implementations must be `Send + Sync` and
/// protect shared mutable state (`Mutex`, atomics). All methods default to
/// no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any item is read.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called just before an item's payload is read.
    ///
    /// # Arguments
    /// * `index`      : 0-based position in the input list
    /// * `total_items`: batch size
    fn on_item_start(&self, index: usize, total_items: usize) {
        let _ = (index, total_items);
    }

    /// Called when an item was scored.
    ///
    /// # Arguments
    /// * `index`      : 0-based position in the input list
    /// * `total_items`: batch size
    /// * `status`     : routing bucket of the scored record
    fn on_item_complete(&self, index: usize, total_items: usize, status: RoutingStatus) {
        let _ = (index, total_items, status);
    }

    /// Called when an item could not be processed.
    fn on_item_error(&self, index: usize, total_items: usize, error: &str) {
        let _ = (index, total_items, error);
    }

    /// Called once after every item has been attempted.
    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        let _ = (total_items, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
