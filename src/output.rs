//! Data model shared by every pipeline stage.
//!
//! The JSON shape of [`Page`] and [`AnalysisReport`] is the report schema:
//! camelCase keys, optional fields omitted rather than written as `null`.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A source PDF discovered by the orchestrator.
///
/// Identity is the absolute path; `page_count` is only known once the
/// splitter has opened the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub page_count: usize,
}

impl SourceDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_count: 0,
        }
    }

    /// File name with extension, e.g. `labels.pdf`.
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// File name without extension, e.g. `labels`.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Key under which outputs of this document are named. Two documents
    /// with the same key in one output directory overwrite each other.
    pub fn output_key(&self) -> String {
        self.stem().to_lowercase()
    }
}

/// File name component of `path`, falling back to the full display string.
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A decoded barcode. A page without one has `barcode: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeSignal {
    /// Symbology tag as reported by the decoder, e.g. `PDF_417`, `UPC_E`.
    #[serde(rename = "codeType")]
    pub symbology: String,
    /// Decoded payload.
    #[serde(rename = "value")]
    pub payload: String,
    /// Decode latency in milliseconds.
    #[serde(rename = "processElapsedTimeMs")]
    pub elapsed_ms: u64,
}

impl fmt::Display for BarcodeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.symbology, self.payload)
    }
}

/// One page of a [`SourceDocument`], living in its own single-page PDF.
///
/// Created by the splitter, filled in by the analyzer, read by the
/// classifier and concatenator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based index inside the source document.
    #[serde(rename = "pageNumber")]
    pub index: u32,
    /// Temporary single-page PDF.
    #[serde(rename = "pageFile")]
    pub file: PathBuf,
    #[serde(rename = "code", skip_serializing_if = "Option::is_none")]
    pub barcode: Option<BarcodeSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Letter-level content used for hashing; large, never serialised.
    #[serde(skip)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "processElapsedTimeMs")]
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PageError>,
}

impl Page {
    pub fn new(index: u32, file: impl Into<PathBuf>) -> Self {
        Self {
            index,
            file: file.into(),
            barcode: None,
            text: None,
            content: None,
            hash: None,
            elapsed_ms: 0,
            errors: Vec::new(),
        }
    }

    /// Extracted text, or `""` when extraction was skipped or failed.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}|code: ", self.index)?;
        match &self.barcode {
            Some(code) => write!(f, "{code}")?,
            None => f.write_str("-")?,
        }
        write!(f, "|text: {}", self.text_or_empty())
    }
}

/// Physical delivery stream a page is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTag {
    Thermal,
    Paper,
}

impl StreamTag {
    /// Output sub-directory name.
    pub fn dir_name(self) -> &'static str {
        match self {
            StreamTag::Thermal => "thermal",
            StreamTag::Paper => "paper",
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTag::Thermal => f.write_str("THERMAL"),
            StreamTag::Paper => f.write_str("PAPER"),
        }
    }
}

/// Lightweight reference to a classified page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub index: u32,
    pub file: PathBuf,
}

impl From<&Page> for PageRef {
    fn from(page: &Page) -> Self {
        Self {
            index: page.index,
            file: page.file.clone(),
        }
    }
}

/// Per-document routing: every page lands in exactly one bucket.
///
/// Each bucket is kept in ascending page-index order regardless of the
/// order pages were pushed in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub thermal: Vec<PageRef>,
    pub paper: Vec<PageRef>,
    /// Duplicate pages dropped under `DuplicatePolicy::Skip`.
    pub ignored: Vec<PageRef>,
}

impl ClassificationResult {
    pub fn push(&mut self, tag: StreamTag, page: PageRef) {
        let bucket = match tag {
            StreamTag::Thermal => &mut self.thermal,
            StreamTag::Paper => &mut self.paper,
        };
        insert_ordered(bucket, page);
    }

    pub fn push_ignored(&mut self, page: PageRef) {
        insert_ordered(&mut self.ignored, page);
    }

    pub fn stream(&self, tag: StreamTag) -> &[PageRef] {
        match tag {
            StreamTag::Thermal => &self.thermal,
            StreamTag::Paper => &self.paper,
        }
    }

    /// Page files of one stream, ascending page index.
    pub fn stream_files(&self, tag: StreamTag) -> Vec<PathBuf> {
        self.stream(tag).iter().map(|p| p.file.clone()).collect()
    }

    /// Number of pages accounted for across all buckets.
    pub fn total(&self) -> usize {
        self.thermal.len() + self.paper.len() + self.ignored.len()
    }
}

fn insert_ordered(bucket: &mut Vec<PageRef>, page: PageRef) {
    let pos = bucket.partition_point(|p| p.index < page.index);
    bucket.insert(pos, page);
}

/// Full per-document analysis, written as the JSON summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub file_source: String,
    #[serde(rename = "processElapsedTimeMs")]
    pub elapsed_ms: u64,
    pub pages: Vec<Page>,
}

/// Result of one successful per-file pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub file: PathBuf,
    pub page_count: usize,
    pub thermal_count: usize,
    pub paper_count: usize,
    pub ignored_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal_output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    /// Pages that carried at least one non-fatal [`PageError`].
    pub pages_with_errors: usize,
    pub elapsed_ms: u64,
}

/// A file whose run ended in an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: String,
}

/// Summary of a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub carrier: String,
    pub total_files: usize,
    pub succeeded: Vec<FileOutcome>,
    pub failed: Vec<FileFailure>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn total_pages(&self) -> usize {
        self.succeeded.iter().map(|o| o.page_count).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
