//! Error types for the label-splitter library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SplitterError`]: **Fatal for one file**: the file cannot be split,
//!   classified or delivered (missing file, corrupt PDF, page-count mismatch).
//!   One file's `SplitterError` never aborts its siblings in the same batch;
//!   it is only returned from the batch entry points when it happens before
//!   any file was launched (missing input directory, unknown carrier).
//!
//! * [`PageError`]: **Non-fatal**: a capability failed on a single page
//!   (render glitch, decode crash, text extraction failure, timeout). Stored
//!   on the [`crate::output::Page`] record; the page still gets classified
//!   with whatever signals were gathered.
//!
//! A page without a decodable barcode is neither: it is a valid page state
//! (`Page::barcode == None`).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the label-splitter library.
#[derive(Debug, Error)]
pub enum SplitterError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The batch input directory does not exist or is not a directory.
    #[error("Input directory not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF structure errors ──────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The document opened but declares no pages.
    #[error("PDF '{path}' has no pages")]
    NoPages { path: PathBuf },

    /// A single-page file could not be produced for `page`.
    #[error("Failed to split page {page} of '{path}': {detail}")]
    SplitFailed {
        path: PathBuf,
        page: u32,
        detail: String,
    },

    /// A page file could not be folded into a stream output.
    #[error("Failed to concatenate '{path}': {detail}")]
    ConcatFailed { path: PathBuf, detail: String },

    // ── Correctness errors ────────────────────────────────────────────────
    /// Classified page totals do not add up to the source page count.
    #[error(
        "[{carrier}] Invalid page count for '{file}': thermal {thermal} + paper {paper} \
         + ignored {ignored} != {expected} source pages"
    )]
    Reconciliation {
        file: String,
        carrier: String,
        expected: usize,
        thermal: usize,
        paper: usize,
        ignored: usize,
    },

    /// A page capability failed while `AnalyzeConfig::strict` is set.
    #[error("Page {page} of '{file}' could not be analysed: {detail}")]
    PageAnalysisFailed {
        file: String,
        page: u32,
        detail: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file or directory.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another input of the same batch writes the same output names.
    #[error("'{path}' shares its output names with '{other}'")]
    OutputCollision { path: PathBuf, other: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// No carrier profile is registered under this identifier.
    #[error("Unknown carrier '{0}'")]
    UnknownCarrier(String),

    /// Builder or profile validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Run control ───────────────────────────────────────────────────────
    /// The run was abandoned between two pages.
    #[error("Processing of '{file}' was cancelled")]
    Cancelled { file: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, join failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SplitterError {
    /// `true` for the PDFStructureError family (corrupt or zero-page document).
    pub fn is_pdf_structure(&self) -> bool {
        matches!(
            self,
            SplitterError::CorruptPdf { .. }
                | SplitterError::NoPages { .. }
                | SplitterError::NotAPdf { .. }
        )
    }

    /// `true` for the IOError family (missing paths, unwritable outputs).
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            SplitterError::InputDirNotFound { .. }
                | SplitterError::FileNotFound { .. }
                | SplitterError::PermissionDenied { .. }
                | SplitterError::OutputWriteFailed { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Stored on [`crate::output::Page::errors`]; the page continues through
/// classification unless [`crate::config::AnalyzeConfig::strict`] is set.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// The barcode decoder could not read the raster (not a miss: a crash or
    /// unreadable image).
    #[error("Page {page}: barcode decoding failed: {detail}")]
    DecodeFailed { page: u32, detail: String },

    /// Text extraction failed; the page proceeds with empty text.
    #[error("Page {page}: text extraction failed: {detail}")]
    TextExtractionFailed { page: u32, detail: String },

    /// A capability call did not return within the configured bound.
    #[error("Page {page}: {stage} timed out after {secs}s")]
    Timeout { page: u32, stage: String, secs: u64 },

    /// The blocking task running a capability panicked.
    #[error("Page {page}: {stage} task failed: {detail}")]
    TaskFailed {
        page: u32,
        stage: String,
        detail: String,
    },
}

impl PageError {
    /// 1-based page index the error belongs to.
    pub fn page(&self) -> u32 {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::DecodeFailed { page, .. }
            | PageError::TextExtractionFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::TaskFailed { page, .. } => *page,
        }
    }
}

/// Failure reported by a page capability (rasteriser, decoder, text engine).
///
/// The analyzer wraps it into the matching [`PageError`] variant once it
/// knows which page and stage it belongs to.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CapabilityError(pub String);

impl CapabilityError {
    pub fn new(detail: impl std::fmt::Display) -> Self {
        Self(detail.to_string())
    }
}

impl From<std::io::Error> for CapabilityError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}
