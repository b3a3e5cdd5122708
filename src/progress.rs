//! Progress-callback trait for upload status events.
//!
//! Inject an [`Arc<dyn UploadProgressCallback>`] via
//! [`crate::config::UploadConfigBuilder::progress_callback`] to receive
//! events as the pipeline runs. Each run holds its own reference; there is
//! no process-wide observer registry.
//!
//! The three core events mirror a classic task monitor:
//! `begin_task(description, total_units)`, `update_status(text)` and
//! `update_percent(percent)`. Percent values are computed from declared page
//! numbers and are not clamped.
//!
//! # Example
//!
//! ```rust
//! use pageput::UploadProgressCallback;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! struct LastPercent(AtomicU32);
//!
//! impl UploadProgressCallback for LastPercent {
//!     fn update_percent(&self, percent: u32) {
//!         self.0.store(percent, Ordering::SeqCst);
//!     }
//! }
//!
//! let cb = LastPercent(AtomicU32::new(0));
//! cb.update_percent(50);
//! assert_eq!(cb.0.load(Ordering::SeqCst), 50);
//! ```

use std::sync::Arc;

/// Receives status and progress events from an upload run.
///
/// Implementations must be `Send + Sync`: the pipeline typically runs on a
/// background task while the callback feeds a UI on another thread. All
/// methods default to no-ops.
pub trait UploadProgressCallback: Send + Sync {
    /// Called once when the run starts.
    ///
    /// # Arguments
    /// * `description`: human-readable task name
    /// * `total_units`: always 100; percent events are in these units
    fn begin_task(&self, description: &str, total_units: u32) {
        let _ = (description, total_units);
    }

    /// Textual status ("Computing checksums...", "Initiating upload...").
    fn update_status(&self, text: &str) {
        let _ = text;
    }

    /// Percent complete, pushed after each stage step.
    fn update_percent(&self, percent: u32) {
        let _ = percent;
    }

    /// Called after a page has been accepted by the server.
    ///
    /// # Arguments
    /// * `page_nr`    : declared page number
    /// * `total_pages`: pages in the document
    fn on_page_uploaded(&self, page_nr: u32, total_pages: usize) {
        let _ = (page_nr, total_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl UploadProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::UploadConfig`].
pub type ProgressCallback = Arc<dyn UploadProgressCallback>;

/// Optional-callback helpers so call sites stay one line.
pub(crate) trait ProgressExt {
    fn status(&self, text: &str);
    fn percent(&self, percent: u32);
}

impl ProgressExt for Option<ProgressCallback> {
    fn status(&self, text: &str) {
        if let Some(cb) = self {
            cb.update_status(text);
        }
    }

    fn percent(&self, percent: u32) {
        if let Some(cb) = self {
            cb.update_percent(percent);
        }
    }
}
