//! Reassemble single-page PDFs into one stream document.

use crate::error::SplitterError;
use crate::pipeline::pdf::{ordered_pages, PdfAssembler};
use crate::pipeline::write_atomic;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Merge `pages` (in the given order) into `output`.
///
/// An empty list creates no file and removes an `output` left over from an
/// earlier run; returns whether `output` was written. With `delete_sources`,
/// page files are removed only once `output` is safely on disk.
pub fn concat(pages: &[PathBuf], output: &Path, delete_sources: bool) -> Result<bool, SplitterError> {
    if pages.is_empty() {
        debug!("Nothing to concatenate for {}", output.display());
        if output.is_file() {
            std::fs::remove_file(output).map_err(|source| SplitterError::OutputWriteFailed {
                path: output.to_path_buf(),
                source,
            })?;
            debug!("Removed stale {}", output.display());
        }
        return Ok(false);
    }

    let mut assembler = PdfAssembler::new();
    for (position, file) in pages.iter().enumerate() {
        let fold_err = |detail: String| SplitterError::ConcatFailed {
            path: file.clone(),
            detail,
        };
        let doc = Document::load(file).map_err(|e| fold_err(e.to_string()))?;
        if position == 0 {
            assembler.copy_info(&doc);
        }
        for (_, page_id) in ordered_pages(&doc) {
            assembler
                .append_page(&doc, page_id)
                .map_err(|e| fold_err(e.to_string()))?;
        }
    }

    let page_count = assembler.page_count();
    let bytes = assembler.finish().map_err(|e| SplitterError::ConcatFailed {
        path: output.to_path_buf(),
        detail: e.to_string(),
    })?;
    write_atomic(output, &bytes)?;
    debug!("Wrote {} page(s) to {}", page_count, output.display());

    if delete_sources {
        for file in pages {
            if let Err(e) = std::fs::remove_file(file) {
                warn!("Could not remove page file {}: {e}", file.display());
            }
        }
    }
    Ok(true)
}
