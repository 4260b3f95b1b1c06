//! Batch orchestration: one concurrent pipeline run per input file.
//!
//! ```text
//! discover ─┬─▶ file 1: validate ▶ split ▶ analyze×N ▶ classify ▶ reconcile ▶ concat ▶ report
//!           ├─▶ file 2: …
//!           └─▶ file n: …
//!                   │
//!                   └── every stage transition ─▶ StatusTracker ─▶ subscribers
//! ```
//!
//! Each file runs as its own tokio task in a `JoinSet`; the set is the
//! completion barrier. One file's error is recorded against that file and
//! never reaches its siblings. The periodic "still running" log while
//! waiting is informational only.
//!
//! Every run splits into its own fresh directory under the work dir, so
//! batches may share a work dir. Inputs whose names differ only in case or
//! extension would write the same outputs: the first in path order runs and
//! the others fail with [`SplitterError::OutputCollision`].

use crate::config::{BatchConfig, CarrierProfile, CarrierRegistry};
use crate::context::PipelineContext;
use crate::error::SplitterError;
use crate::output::{BatchReport, FileFailure, FileOutcome, Page, SourceDocument, StreamTag};
use crate::pipeline::analyze::{Capabilities, PageAnalyzer};
use crate::pipeline::classify::{build_classifier, classify_document, reconcile, Classifier};
use crate::pipeline::concat::concat;
use crate::pipeline::render::RasterOptions;
use crate::pipeline::report::{build_report, report_path, write_report};
use crate::pipeline::{input, split};
use crate::progress::ProgressCallback;
use crate::status::{ItemStatus, StatusTracker};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn, Instrument};

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

type FileResult = (PathBuf, Result<FileOutcome, SplitterError>);

/// Everything a file task needs, shared by all tasks of one batch.
struct BatchPlan {
    profile: CarrierProfile,
    classifier: Box<dyn Classifier>,
    analyzer: PageAnalyzer,
    work_dir: PathBuf,
    carrier_dir: PathBuf,
    delete_page_files: bool,
    progress: Option<ProgressCallback>,
}

/// Runs carrier batches over directories of label PDFs.
///
/// # Example
/// ```rust,no_run
/// use label_splitter::{BatchConfig, BatchOrchestrator};
/// use std::path::Path;
///
/// # async fn demo() -> Result<(), label_splitter::SplitterError> {
/// let orchestrator = BatchOrchestrator::new(BatchConfig::default());
/// let report = orchestrator.run_batch(Path::new("./inbox"), "fedex").await?;
/// println!("{} ok, {} failed", report.succeeded.len(), report.failed.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    config: BatchConfig,
    registry: CarrierRegistry,
    capabilities: Capabilities,
    tracker: StatusTracker,
}

impl BatchOrchestrator {
    /// Builtin carriers, pdfium/rxing capabilities, a fresh tracker.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            registry: CarrierRegistry::builtin(),
            capabilities: Capabilities::pdfium(),
            tracker: StatusTracker::new(),
        }
    }

    pub fn with_registry(mut self, registry: CarrierRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Report into an existing tracker, e.g. one a UI already subscribes to.
    pub fn with_tracker(mut self, tracker: StatusTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &CarrierRegistry {
        &self.registry
    }

    fn plan(&self, carrier: &str, input_dir: &Path) -> Result<Arc<BatchPlan>, SplitterError> {
        let profile = self.registry.get(carrier)?.clone();
        profile.validate()?;

        let analyzer = PageAnalyzer::new(
            self.capabilities.clone(),
            profile.analyze,
            RasterOptions {
                dpi: self.config.dpi,
                max_pixels: self.config.max_rendered_pixels,
            },
            Duration::from_secs(self.config.capability_timeout_secs),
        );
        let carrier_dir = self.config.output_root(input_dir).join(&profile.name);

        Ok(Arc::new(BatchPlan {
            classifier: build_classifier(&profile.policy),
            profile,
            analyzer,
            work_dir: self.config.work_dir.clone(),
            carrier_dir,
            delete_page_files: self.config.delete_page_files,
            progress: self.config.progress_callback.clone(),
        }))
    }

    /// Discover the PDFs in `input_dir` and start one task per file.
    ///
    /// Fails only for batch-level problems (unknown carrier, missing input
    /// directory). Must be called from within a tokio runtime; dropping the
    /// returned handle without waiting aborts the runs.
    pub fn launch(&self, input_dir: &Path, carrier: &str) -> Result<BatchHandle, SplitterError> {
        let plan = self.plan(carrier, input_dir)?;
        let files = input::discover_inputs(input_dir)?;
        let mut collisions = input::output_collisions(&files);

        if self.config.reset_status_on_start {
            let dropped = self.tracker.clear_finished();
            debug!("Dropped {dropped} finished status record(s)");
        }
        info!(
            "Batch started: {} file(s) in {} for {}",
            files.len(),
            input_dir.display(),
            plan.profile.name
        );
        if let Some(cb) = &plan.progress {
            cb.on_batch_start(files.len());
        }

        let semaphore = self
            .config
            .max_concurrent_files
            .map(|n| Arc::new(Semaphore::new(n)));
        let cancel = Arc::new(AtomicBool::new(false));
        let outstanding = Arc::new(AtomicUsize::new(files.len()));

        let mut tasks = JoinSet::new();
        let mut task_files = HashMap::new();
        for file in &files {
            self.tracker.update_status(file, ItemStatus::Started);

            let ctx = PipelineContext::new(
                self.tracker.clone(),
                file.clone(),
                plan.profile.name.clone(),
                cancel.clone(),
            );
            let span = ctx.span.clone();
            let plan = plan.clone();
            let semaphore = semaphore.clone();
            let outstanding = outstanding.clone();
            let collides_with = collisions.remove(file);
            let task_file = file.clone();

            let handle = tasks.spawn(
                async move {
                    let _permit = match semaphore {
                        Some(s) => s.acquire_owned().await.ok(),
                        None => None,
                    };
                    let result = run_pipeline(&plan, &ctx, collides_with).await;
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                    (task_file, result)
                }
                .instrument(span),
            );
            task_files.insert(handle.id(), file.clone());
        }

        Ok(BatchHandle {
            carrier: plan.profile.name.clone(),
            total: files.len(),
            tasks,
            task_files,
            outstanding,
            cancel,
            tracker: self.tracker.clone(),
            progress: plan.progress.clone(),
            started: Instant::now(),
        })
    }

    /// Process every PDF in `input_dir` and wait for all of them.
    pub async fn run_batch(&self, input_dir: &Path, carrier: &str) -> Result<BatchReport, SplitterError> {
        Ok(self.launch(input_dir, carrier)?.wait().await)
    }

    /// Process a single file outside of any batch.
    pub async fn run_file(&self, file: &Path, carrier: &str) -> Result<FileOutcome, SplitterError> {
        let input_dir = file.parent().unwrap_or_else(|| Path::new("."));
        let plan = self.plan(carrier, input_dir)?;
        let ctx = PipelineContext::new(
            self.tracker.clone(),
            file,
            plan.profile.name.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        self.tracker.update_status(file, ItemStatus::Started);
        let span = ctx.span.clone();
        run_pipeline(&plan, &ctx, None).instrument(span).await
    }
}

/// A launched batch.
pub struct BatchHandle {
    carrier: String,
    total: usize,
    tasks: JoinSet<FileResult>,
    task_files: HashMap<Id, PathBuf>,
    outstanding: Arc<AtomicUsize>,
    cancel: Arc<AtomicBool>,
    tracker: StatusTracker,
    progress: Option<ProgressCallback>,
    started: Instant,
}

impl BatchHandle {
    pub fn total(&self) -> usize {
        self.total
    }

    /// Runs that have not reached a terminal state yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Ask every run to stop before its next page. Runs stopped this way
    /// fail with [`SplitterError::Cancelled`].
    pub fn cancel_after_current_page(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Wait until every launched run has finished.
    pub async fn wait(self) -> BatchReport {
        let BatchHandle {
            carrier,
            total,
            mut tasks,
            mut task_files,
            outstanding,
            tracker,
            progress,
            started,
            ..
        } = self;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut ticker = tokio::time::interval(PROGRESS_LOG_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                joined = tasks.join_next_with_id() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((id, (_, Ok(outcome)))) => {
                            task_files.remove(&id);
                            succeeded.push(outcome);
                        }
                        Ok((id, (file, Err(e)))) => {
                            task_files.remove(&id);
                            failed.push(FileFailure { file, error: e.to_string() });
                        }
                        Err(join_err) => {
                            // The task never decremented the counter itself.
                            outstanding.fetch_sub(1, Ordering::SeqCst);
                            let file = task_files.remove(&join_err.id()).unwrap_or_default();
                            let message = format!("file task failed: {join_err}");
                            error!(file = %file.display(), carrier = %carrier, "{message}");
                            tracker.mark_failed(&file, message.clone());
                            if let Some(cb) = &progress {
                                cb.on_file_error(&file, &message);
                            }
                            failed.push(FileFailure { file, error: message });
                        }
                    }
                }
                _ = ticker.tick() => {
                    info!(
                        "Batch still running: {}/{} file(s) outstanding",
                        outstanding.load(Ordering::SeqCst),
                        total
                    );
                }
            }
        }

        succeeded.sort_by(|a: &FileOutcome, b: &FileOutcome| a.file.cmp(&b.file));
        failed.sort_by(|a: &FileFailure, b: &FileFailure| a.file.cmp(&b.file));
        let report = BatchReport {
            carrier,
            total_files: total,
            succeeded,
            failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Batch complete: {} ok, {} failed, {} page(s) in {}ms",
            report.succeeded.len(),
            report.failed.len(),
            report.total_pages(),
            report.elapsed_ms
        );
        if let Some(cb) = &progress {
            cb.on_batch_complete(&report);
        }
        report
    }
}

/// Run one file end to end, then record the outcome in the tracker, the log
/// and the progress callback.
///
/// `collides_with` names an earlier input of the batch that owns this file's
/// output names; the run then fails without touching any output.
async fn run_pipeline(
    plan: &BatchPlan,
    ctx: &PipelineContext,
    collides_with: Option<PathBuf>,
) -> Result<FileOutcome, SplitterError> {
    if let Some(cb) = &plan.progress {
        cb.on_file_start(ctx.source());
    }

    let result = match collides_with {
        Some(other) => Err(SplitterError::OutputCollision {
            path: ctx.source().to_path_buf(),
            other,
        }),
        None => process_file(plan, ctx).await,
    };

    match &result {
        Ok(outcome) => {
            if let Some(cb) = &plan.progress {
                cb.on_file_complete(ctx.source(), outcome);
            }
        }
        Err(e) => {
            let stage = ctx
                .tracker
                .get(ctx.source())
                .map(|r| r.status)
                .unwrap_or(ItemStatus::Started);
            error!(
                file = %ctx.file_name(),
                stage = %stage,
                carrier = %ctx.carrier,
                error = %e,
                "File processing failed"
            );
            ctx.tracker.mark_failed(ctx.source(), e.to_string());
            if let Some(cb) = &plan.progress {
                cb.on_file_error(ctx.source(), &e.to_string());
            }
        }
    }
    result
}

async fn process_file(plan: &BatchPlan, ctx: &PipelineContext) -> Result<FileOutcome, SplitterError> {
    let started = Instant::now();
    let mut document = SourceDocument::new(ctx.source());
    let source = document.path.clone();

    // ── Validate + split ────────────────────────────────────────────────
    input::validate_pdf(&source)?;
    ctx.set_status(ItemStatus::Splitting);
    // Removed with everything in it when dropped, on any early return.
    let page_dir = split::create_page_dir(&plan.work_dir, &document)?;
    let pages = {
        let ctx = ctx.clone();
        let dir = page_dir.path().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let _entered = ctx.span.enter();
            split::split_document(&ctx, &dir)
        })
        .await
        .map_err(|e| SplitterError::Internal(format!("split task failed: {e}")))??
    };
    document.page_count = pages.len();
    let page_count = document.page_count;

    // ── Analyze, page by page ───────────────────────────────────────────
    let mut analyzed: Vec<Page> = Vec::with_capacity(page_count);
    for page in pages {
        ctx.check_cancelled()?;
        analyzed.push(plan.analyzer.analyze(ctx, page).await?);
    }

    // ── Classify + reconcile, before anything is written ────────────────
    ctx.set_status(ItemStatus::ProcessingFileType);
    let result = classify_document(plan.classifier.as_ref(), &analyzed, plan.profile.duplicates);
    reconcile(&result, page_count, &ctx.file_name(), &plan.profile)?;

    ctx.tracker
        .update_stream_count(&source, StreamTag::Thermal, result.thermal.len());
    ctx.tracker
        .update_stream_count(&source, StreamTag::Paper, result.paper.len());
    ctx.tracker
        .update_ignored_count(&source, result.ignored.len());

    if plan.delete_page_files {
        for ignored in &result.ignored {
            if let Err(e) = std::fs::remove_file(&ignored.file) {
                warn!("Could not remove ignored page {}: {e}", ignored.file.display());
            }
        }
    }

    // ── Concatenate each stream ─────────────────────────────────────────
    // An empty stream also removes that stream's output from an earlier run.
    let file_name = document.file_name();
    let mut outputs = HashMap::new();
    for tag in [StreamTag::Thermal, StreamTag::Paper] {
        let target = plan.carrier_dir.join(tag.dir_name()).join(&file_name);
        let written = concat_stream(result.stream_files(tag), target, plan.delete_page_files).await?;
        outputs.insert(tag, written);
    }
    if plan.delete_page_files {
        drop(page_dir);
    } else {
        let kept = page_dir.keep();
        debug!("Page files kept in {}", kept.display());
    }

    // ── Optional summary ────────────────────────────────────────────────
    ctx.set_status(ItemStatus::CreatingSummary);
    let report_file = if plan.profile.analyze.make_report {
        let report = build_report(&source, &analyzed, started.elapsed().as_millis() as u64);
        let path = report_path(&plan.carrier_dir, &document);
        match write_report(&report, &path) {
            Ok(()) => Some(path),
            Err(e) => {
                error!(file = %file_name, stage = "report", error = %e, "Report not written");
                None
            }
        }
    } else {
        None
    };

    ctx.set_status(ItemStatus::Done);
    info!(
        input = page_count,
        thermal = result.thermal.len(),
        paper = result.paper.len(),
        ignored = result.ignored.len(),
        "Finished {}",
        file_name
    );

    Ok(FileOutcome {
        file: source,
        page_count,
        thermal_count: result.thermal.len(),
        paper_count: result.paper.len(),
        ignored_count: result.ignored.len(),
        thermal_output: outputs.remove(&StreamTag::Thermal).flatten(),
        paper_output: outputs.remove(&StreamTag::Paper).flatten(),
        report_path: report_file,
        pages_with_errors: analyzed.iter().filter(|p| !p.errors.is_empty()).count(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

async fn concat_stream(
    files: Vec<PathBuf>,
    output: PathBuf,
    delete_sources: bool,
) -> Result<Option<PathBuf>, SplitterError> {
    tokio::task::spawn_blocking(move || {
        concat(&files, &output, delete_sources).map(|written| written.then_some(output))
    })
    .await
    .map_err(|e| SplitterError::Internal(format!("concat task failed: {e}")))?
}
