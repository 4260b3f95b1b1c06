//! # label-splitter
//!
//! Split multi-page shipping-label PDFs into a **thermal** stream (labels for
//! a 4×6 label printer) and a **paper** stream (invoices, packing slips) for
//! a regular printer, according to a per-carrier policy.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Discover  every *.pdf in the directory, one concurrent run per file
//!  ├─ 2. Split     one single-page PDF per source page (lopdf)
//!  ├─ 3. Analyze   rasterise → decode barcode, extract text, hash (pdfium, rxing)
//!  ├─ 4. Classify  carrier policy → thermal / paper, then reconcile counts
//!  ├─ 5. Concat    <output>/<Carrier>/thermal|paper/<file name>
//!  └─ 6. Report    optional <output>/<Carrier>/<stem>.json
//! ```
//!
//! Every stage transition of every file is published by the
//! [`StatusTracker`]; subscribe to it to drive a progress display.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use label_splitter::{BatchConfig, BatchOrchestrator};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder().max_concurrent_files(4).build()?;
//!     let orchestrator = BatchOrchestrator::new(config);
//!
//!     let mut updates = orchestrator.tracker().subscribe();
//!     tokio::spawn(async move {
//!         while let Some(record) = updates.recv().await {
//!             eprintln!("{}: {}", record.file_name, record.status);
//!         }
//!     });
//!
//!     let report = orchestrator.run_batch(Path::new("./inbox"), "fedex").await?;
//!     eprintln!("{} ok, {} failed", report.succeeded.len(), report.failed.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Carriers
//!
//! | Carrier | Thermal when | Signals |
//! |---------|--------------|---------|
//! | `fedex` | page carries a PDF417 or UPC-E barcode | barcode, text |
//! | `ups`   | page text does not contain `INVOICE` | text, hash |
//!
//! More carriers are plain data: see [`CarrierRegistry::from_json`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `label-splitter` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! label-splitter = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod status;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchHandle, BatchOrchestrator};
pub use config::{
    AnalyzeConfig, BatchConfig, BatchConfigBuilder, CarrierProfile, CarrierRegistry,
    DuplicatePolicy, PolicyConfig,
};
pub use context::PipelineContext;
pub use error::{CapabilityError, PageError, SplitterError};
pub use output::{
    AnalysisReport, BarcodeSignal, BatchReport, ClassificationResult, FileFailure, FileOutcome,
    Page, PageRef, SourceDocument, StreamTag,
};
pub use pipeline::analyze::Capabilities;
pub use pipeline::text::TextEngine;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use status::{CallbackHandle, ItemStatus, StatusRecord, StatusSubscription, StatusTracker};
