//! Per-page signal gathering.
//!
//! [`PageAnalyzer`] drives the three page capabilities for one page at a
//! time, according to the carrier's [`AnalyzeConfig`]:
//!
//! 1. **Barcode**: rasterise the page file, decode the raster, delete the
//!    raster. The raster is removed on every path, including decoder
//!    failures and timeouts.
//! 2. **Text**: letter-level text in glyph-stream order. A failure leaves
//!    the text empty.
//! 3. **Hash**: base64 SHA-1 over the extracted content, or over the page's
//!    display form when no content was extracted.
//!
//! Every capability call runs in `spawn_blocking` under a timeout. A
//! failing or stalled capability becomes a [`PageError`] on the page and is
//! logged at ERROR level; the page then proceeds with whatever it has,
//! unless `strict` is set.

use crate::config::AnalyzeConfig;
use crate::context::PipelineContext;
use crate::error::{CapabilityError, PageError, SplitterError};
use crate::output::{BarcodeSignal, Page};
use crate::pipeline::barcode::{BarcodeScanner, RxingScanner};
use crate::pipeline::render::{raster_path_for, PageRasterizer, PdfiumRasterizer, RasterOptions};
use crate::pipeline::text::{
    ContentStreamTextExtractor, PdfiumTextExtractor, TextEngine, TextExtractor,
};
use crate::status::ItemStatus;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// The page capabilities a batch runs with.
#[derive(Clone)]
pub struct Capabilities {
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub scanner: Arc<dyn BarcodeScanner>,
    pub text: Arc<dyn TextExtractor>,
}

impl Capabilities {
    /// pdfium rendering and text, rxing decoding.
    pub fn pdfium() -> Self {
        Self::with_text_engine(TextEngine::Pdfium)
    }

    pub fn with_text_engine(engine: TextEngine) -> Self {
        let text: Arc<dyn TextExtractor> = match engine {
            TextEngine::Pdfium => Arc::new(PdfiumTextExtractor::new()),
            TextEngine::ContentStream => Arc::new(ContentStreamTextExtractor),
        };
        Self {
            rasterizer: Arc::new(PdfiumRasterizer::new()),
            scanner: Arc::new(RxingScanner),
            text,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::pdfium()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("rasterizer", &"<dyn PageRasterizer>")
            .field("scanner", &"<dyn BarcodeScanner>")
            .field("text", &"<dyn TextExtractor>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Render,
    Barcode,
    Text,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Render => "render",
            Stage::Barcode => "barcode",
            Stage::Text => "text",
        }
    }

    fn failure(self, page: u32, detail: String) -> PageError {
        match self {
            Stage::Render => PageError::RenderFailed { page, detail },
            Stage::Barcode => PageError::DecodeFailed { page, detail },
            Stage::Text => PageError::TextExtractionFailed { page, detail },
        }
    }
}

/// Removes the raster file when dropped.
struct RasterGuard(PathBuf);

impl Drop for RasterGuard {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_file(&self.0) {
                debug!("Could not remove raster {}: {e}", self.0.display());
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageAnalyzer {
    capabilities: Capabilities,
    config: AnalyzeConfig,
    raster: RasterOptions,
    timeout: Duration,
}

impl PageAnalyzer {
    pub fn new(
        capabilities: Capabilities,
        config: AnalyzeConfig,
        raster: RasterOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            capabilities,
            config,
            raster,
            timeout,
        }
    }

    pub fn config(&self) -> &AnalyzeConfig {
        &self.config
    }

    /// Fill in `page`'s optional signals.
    ///
    /// Only fails when `strict` is set and a capability failed.
    pub async fn analyze(&self, ctx: &PipelineContext, mut page: Page) -> Result<Page, SplitterError> {
        let started = Instant::now();

        if self.config.scan_barcode {
            self.scan_barcode(ctx, &mut page).await;
        }

        if self.config.extract_text {
            ctx.set_status(ItemStatus::SearchingText);
            let file = page.file.clone();
            let text = self.capabilities.text.clone();
            match self
                .run(page.index, Stage::Text, move || text.extract(&file))
                .await
            {
                Ok(extraction) => {
                    if !extraction.text.is_empty() {
                        page.text = Some(extraction.text);
                    }
                    if !extraction.content.is_empty() {
                        page.content = Some(extraction.content);
                    }
                }
                Err(e) => record_failure(&mut page, Stage::Text, e),
            }
        }

        if self.config.compute_hash {
            page.hash = Some(content_hash(&page));
        }

        page.elapsed_ms = started.elapsed().as_millis() as u64;
        ctx.tracker.page_analyzed(ctx.source());

        if self.config.strict {
            if let Some(first) = page.errors.first() {
                return Err(SplitterError::PageAnalysisFailed {
                    file: ctx.file_name(),
                    page: page.index,
                    detail: first.to_string(),
                });
            }
        }
        Ok(page)
    }

    async fn scan_barcode(&self, ctx: &PipelineContext, page: &mut Page) {
        ctx.set_status(ItemStatus::Rasterizing);
        let rasterizer = self.capabilities.rasterizer.clone();
        let scanner = self.capabilities.scanner.clone();
        let (file, options, scan_ctx) = (page.file.clone(), self.raster, ctx.clone());
        let rendered = Arc::new(AtomicBool::new(false));
        let render_done = rendered.clone();

        // Render and decode share one blocking call that owns the raster, so
        // the raster is removed even when the call outlives its timeout.
        let outcome = self
            .run(page.index, Stage::Render, move || {
                let raster = raster_path_for(&file);
                let _guard = RasterGuard(raster.clone());
                rasterizer.rasterize(&file, &raster, options)?;
                render_done.store(true, Ordering::SeqCst);

                scan_ctx.set_status(ItemStatus::SearchingBarCode);
                let decode_started = Instant::now();
                Ok(scanner
                    .scan(&raster)
                    .map(|found| found.map(|decoded| (decoded, decode_started.elapsed()))))
            })
            .await;

        match outcome {
            Ok(Ok(Some((decoded, elapsed)))) => {
                debug!(page = page.index, symbology = %decoded.symbology, "Barcode found");
                page.barcode = Some(BarcodeSignal {
                    symbology: decoded.symbology,
                    payload: decoded.payload,
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
            Ok(Ok(None)) => debug!(page = page.index, "No barcode"),
            Ok(Err(e)) => {
                let failure = Stage::Barcode.failure(page.index, e.0);
                record_failure(page, Stage::Barcode, failure);
            }
            Err(mut e) => {
                let stage = if rendered.load(Ordering::SeqCst) {
                    Stage::Barcode
                } else {
                    Stage::Render
                };
                if let PageError::Timeout { stage: name, .. }
                | PageError::TaskFailed { stage: name, .. } = &mut e
                {
                    *name = stage.name().to_string();
                }
                record_failure(page, stage, e);
            }
        }
    }

    /// Run one blocking capability call under the configured timeout.
    ///
    /// A call that times out keeps its blocking thread until it returns on
    /// its own; its result is discarded.
    async fn run<T, F>(&self, page: u32, stage: Stage, call: F) -> Result<T, PageError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CapabilityError> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(call);
        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(PageError::Timeout {
                page,
                stage: stage.name().to_string(),
                secs: self.timeout.as_secs(),
            }),
            Ok(Err(join)) => Err(PageError::TaskFailed {
                page,
                stage: stage.name().to_string(),
                detail: join.to_string(),
            }),
            Ok(Ok(Err(e))) => Err(stage.failure(page, e.0)),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

fn record_failure(page: &mut Page, stage: Stage, e: PageError) {
    error!(page = page.index, stage = stage.name(), error = %e, "Page capability failed");
    page.errors.push(e);
}

/// Base64 SHA-1 of the page's extracted content, falling back to its
/// display form.
pub fn content_hash(page: &Page) -> String {
    let digest = match &page.content {
        Some(content) => Sha1::digest(content.as_bytes()),
        None => Sha1::digest(page.to_string().as_bytes()),
    };
    base64::engine::general_purpose::STANDARD.encode(digest)
}
