//! Per-file pipeline context.

use crate::error::SplitterError;
use crate::output::file_name_of;
use crate::status::{ItemStatus, StatusTracker};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Span;

/// Handed to every stage of one file's run: where to report status, which
/// span to log under, and whether the batch asked to stop.
///
/// Cloning is cheap; blocking stages take a clone into `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub tracker: StatusTracker,
    pub source: PathBuf,
    pub carrier: String,
    pub span: Span,
    cancel: Arc<AtomicBool>,
}

impl PipelineContext {
    pub fn new(
        tracker: StatusTracker,
        source: impl Into<PathBuf>,
        carrier: impl Into<String>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let source = source.into();
        let carrier = carrier.into();
        let span = tracing::info_span!(
            "file_pipeline",
            file = %file_name_of(&source),
            carrier = %carrier
        );
        Self {
            tracker,
            source,
            carrier,
            span,
            cancel,
        }
    }

    /// Context with its own cancel flag and a fresh tracker, for tests and
    /// one-off calls.
    pub fn detached(source: impl Into<PathBuf>, carrier: impl Into<String>) -> Self {
        Self::new(
            StatusTracker::new(),
            source,
            carrier,
            Arc::new(AtomicBool::new(false)),
        )
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.source)
    }

    /// Advance this file's status. `false` when the move was backward.
    pub fn set_status(&self, status: ItemStatus) -> bool {
        self.tracker.update_status(&self.source, status)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn check_cancelled(&self) -> Result<(), SplitterError> {
        if self.is_cancelled() {
            Err(SplitterError::Cancelled {
                file: self.file_name(),
            })
        } else {
            Ok(())
        }
    }
}
