//! Split a source PDF into single-page PDFs.
//!
//! Pages land in `<work_dir>/<file name>-<random>/page-<index>-<total>.pdf`.
//! Every run gets a fresh directory, so concurrent or repeated runs of the
//! same file name never see each other's pages.

use crate::context::PipelineContext;
use crate::error::SplitterError;
use crate::output::{Page, SourceDocument};
use crate::pipeline::pdf::{ordered_pages, PdfAssembler};
use crate::pipeline::write_atomic;
use lopdf::Document;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

/// Create this run's page directory under `work_dir`.
///
/// The directory and everything in it is removed when the guard drops;
/// call [`TempDir::keep`] to leave the pages on disk.
pub fn create_page_dir(work_dir: &Path, source: &SourceDocument) -> Result<TempDir, SplitterError> {
    let io_err = |source: std::io::Error| SplitterError::OutputWriteFailed {
        path: work_dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(work_dir).map_err(io_err)?;
    tempfile::Builder::new()
        .prefix(&format!("{}-", source.file_name()))
        .tempdir_in(work_dir)
        .map_err(io_err)
}

pub fn page_file_name(index: u32, total: usize) -> String {
    format!("page-{index}-{total}.pdf")
}

/// Split `ctx.source` into one file per page in `page_dir`, in page order.
///
/// Blocking; the orchestrator runs it inside `spawn_blocking`. Reports the
/// page count to the status tracker before returning.
pub fn split_document(ctx: &PipelineContext, page_dir: &Path) -> Result<Vec<Page>, SplitterError> {
    let source_path = ctx.source();
    let source = Document::load(source_path).map_err(|e| SplitterError::CorruptPdf {
        path: source_path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let pages = ordered_pages(&source);
    if pages.is_empty() {
        return Err(SplitterError::NoPages {
            path: source_path.to_path_buf(),
        });
    }
    let total = pages.len();
    ctx.tracker.update_page_count(source_path, total);

    let mut out = Vec::with_capacity(total);
    for (index, page_id) in pages {
        let mut assembler = PdfAssembler::new();
        assembler.copy_info(&source);
        let bytes = assembler
            .append_page(&source, page_id)
            .and_then(|()| assembler.finish())
            .map_err(|e| SplitterError::SplitFailed {
                path: source_path.to_path_buf(),
                page: index,
                detail: e.to_string(),
            })?;

        let file = page_dir.join(page_file_name(index, total));
        write_atomic(&file, &bytes)?;
        debug!("Split page {}/{} → {}", index, total, file.display());
        out.push(Page::new(index, file));
    }

    info!(pages = total, "Split complete");
    Ok(out)
}
