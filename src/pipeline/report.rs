//! JSON analysis summary, `<output>/<carrier>/<stem>.json`.

use crate::error::SplitterError;
use crate::output::{AnalysisReport, Page, SourceDocument};
use crate::pipeline::write_atomic;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn report_path(carrier_dir: &Path, source: &SourceDocument) -> PathBuf {
    carrier_dir.join(format!("{}.json", source.stem()))
}

pub fn build_report(source: &Path, pages: &[Page], elapsed_ms: u64) -> AnalysisReport {
    let mut pages = pages.to_vec();
    pages.sort_by_key(|p| p.index);
    AnalysisReport {
        file_source: source.display().to_string(),
        elapsed_ms,
        pages,
    }
}

pub fn write_report(report: &AnalysisReport, path: &Path) -> Result<(), SplitterError> {
    let json = serde_json::to_vec_pretty(report)
        .map_err(|e| SplitterError::Internal(format!("report serialisation: {e}")))?;
    write_atomic(path, &json)?;
    debug!("Report written to {}", path.display());
    Ok(())
}
