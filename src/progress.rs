//! Batch-level progress callbacks.
//!
//! Install an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to hear about
//! files starting, finishing and failing. Stage-level detail (splitting,
//! scanning, page counts) flows through [`crate::status::StatusTracker`]
//! instead; this trait only covers the coarse file lifecycle.
//!
//! # Example
//!
//! ```rust
//! use label_splitter::{BatchConfig, BatchProgressCallback, FileOutcome};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Done(AtomicUsize);
//!
//! impl BatchProgressCallback for Done {
//!     fn on_file_complete(&self, _file: &Path, outcome: &FileOutcome) {
//!         self.0.fetch_add(outcome.page_count, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(Done(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchReport, FileOutcome};
use std::path::Path;
use std::sync::Arc;

/// Called by the batch orchestrator as files move through the pipeline.
///
/// Files run concurrently, so every method may be called from several
/// tasks at once. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after input discovery, before any file task starts.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file's task acquires its slot and begins splitting.
    fn on_file_start(&self, file: &Path) {
        let _ = file;
    }

    /// Called after a file reached `Done`.
    fn on_file_complete(&self, file: &Path, outcome: &FileOutcome) {
        let _ = (file, outcome);
    }

    /// Called when a file's run stopped on an error.
    fn on_file_error(&self, file: &Path, error: &str) {
        let _ = (file, error);
    }

    /// Called once every launched file reached a terminal state.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
