//! CLI binary for label-splitter.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! draws a progress bar from the status tracker and prints the batch
//! summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use label_splitter::pipeline::render::PdfiumRasterizer;
use label_splitter::{
    BatchConfig, BatchOrchestrator, BatchProgressCallback, BatchReport, Capabilities,
    CarrierRegistry, FileOutcome, ItemStatus, ProgressCallback, StatusTracker, TextEngine,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over the files of the batch, one log line per finished file.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Scanning");
        bar.set_message("looking for PDFs…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    /// Mirror tracker updates into the bar message.
    fn follow(self: &Arc<Self>, tracker: &StatusTracker) {
        let mut updates = tracker.subscribe();
        let me = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(record) = updates.recv().await {
                if record.is_terminal() {
                    continue;
                }
                let detail = match record.status {
                    ItemStatus::Rasterizing
                    | ItemStatus::SearchingBarCode
                    | ItemStatus::SearchingText => format!(
                        "{} page {}/{}",
                        record.status, record.pages_analyzed, record.page_count
                    ),
                    other => other.to_string(),
                };
                me.bar.set_message(format!("{}  {}", record.file_name, dim(&detail)));
            }
        });
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_files as u64);
        self.bar.set_prefix("Splitting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} file(s)…"))
        ));
    }

    fn on_file_complete(&self, file: &Path, outcome: &FileOutcome) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            display_name(file),
            dim(&format!(
                "{} pages → {} thermal, {} paper{}  {:.1}s",
                outcome.page_count,
                outcome.thermal_count,
                outcome.paper_count,
                if outcome.ignored_count > 0 {
                    format!(", {} ignored", outcome.ignored_count)
                } else {
                    String::new()
                },
                outcome.elapsed_ms as f64 / 1000.0
            )),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, file: &Path, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40}  {}",
            red("✗"),
            display_name(file),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # FedEx batch: thermal labels by PDF417/UPC-E barcode
  label-splitter ./inbox --carrier fedex

  # UPS batch with a JSON summary per file, 4 files at a time
  label-splitter ./inbox --carrier ups --report --jobs 4

  # Custom carrier profiles
  label-splitter ./inbox --carrier dhl --profiles carriers.json

  # Machine-readable batch report
  label-splitter ./inbox --carrier fedex --json > batch.json

OUTPUT LAYOUT:
  <output>/<Carrier>/thermal/<file>.pdf   pages for the label printer
  <output>/<Carrier>/paper/<file>.pdf     pages for the office printer
  <output>/<Carrier>/<file>.json          per-page summary (--report)

  <output> defaults to <input dir>/output. A stream with no pages
  produces no file.

PROFILE FILE (--profiles):
  [
    {
      "name": "DHL",
      "policy": { "kind": "textMarker", "marker": "COMMERCIAL INVOICE" },
      "analyze": { "scanBarcode": false, "extractText": true }
    }
  ]

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH           Directory or file of the pdfium shared library
  RUST_LOG                  Log filter, e.g. label_splitter=debug
  LABEL_SPLITTER_*          Every flag below has a matching variable
"#;

/// Split shipping-label PDFs into thermal and paper print streams.
#[derive(Parser, Debug)]
#[command(
    name = "label-splitter",
    version,
    about = "Split shipping-label PDFs into thermal and paper print streams",
    long_about = "Split every PDF in a directory into a thermal-label stream and a paper \
stream, page by page, using the selected carrier's policy (barcode symbology or text marker).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the PDFs to split.
    #[arg(required_unless_present = "list_carriers")]
    input: Option<PathBuf>,

    /// Carrier profile: fedex, ups, or one from --profiles.
    #[arg(short = 'C', long, env = "LABEL_SPLITTER_CARRIER", default_value = "fedex")]
    carrier: String,

    /// JSON file with extra carrier profiles (overlays the builtin ones).
    #[arg(long, env = "LABEL_SPLITTER_PROFILES")]
    profiles: Option<PathBuf>,

    /// Write a per-page JSON summary next to the streams.
    #[arg(long, env = "LABEL_SPLITTER_REPORT")]
    report: bool,

    /// Scratch directory for page files.
    #[arg(long, env = "LABEL_SPLITTER_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Output root (default: <input>/output).
    #[arg(short, long, env = "LABEL_SPLITTER_OUTPUT")]
    output: Option<PathBuf>,

    /// Files processed at once (default: all).
    #[arg(short, long, env = "LABEL_SPLITTER_JOBS")]
    jobs: Option<usize>,

    /// Barcode rasterisation DPI (72–600).
    #[arg(long, env = "LABEL_SPLITTER_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Per-capability timeout in seconds (render, decode, text).
    #[arg(long, env = "LABEL_SPLITTER_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Keep the intermediate single-page files.
    #[arg(long, env = "LABEL_SPLITTER_KEEP_PAGE_FILES")]
    keep_page_files: bool,

    /// Text engine: pdfium or content-stream.
    #[arg(long, env = "LABEL_SPLITTER_TEXT_ENGINE", default_value = "pdfium")]
    text_engine: TextEngine,

    /// Print the known carriers and exit.
    #[arg(long)]
    list_carriers: bool,

    /// Output the batch report as JSON on stdout.
    #[arg(long, env = "LABEL_SPLITTER_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "LABEL_SPLITTER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LABEL_SPLITTER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "LABEL_SPLITTER_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the progress bar active only errors are logged; the bar covers
    // the rest.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Carrier profiles ─────────────────────────────────────────────────
    let registry = match cli.profiles {
        Some(ref path) => CarrierRegistry::from_file(path)
            .with_context(|| format!("Failed to load carrier profiles from {}", path.display()))?,
        None => CarrierRegistry::builtin(),
    };

    if cli.list_carriers {
        for key in registry.carriers() {
            let profile = registry.get(&key)?;
            println!("{key:<12} {}", serde_json::to_string(profile)?);
        }
        return Ok(());
    }

    let mut registry = registry;
    let mut profile = registry
        .get(&cli.carrier)
        .with_context(|| format!("Known carriers: {}", registry.carriers().join(", ")))?
        .clone();
    if cli.report {
        profile.analyze.make_report = true;
        registry.register(profile.clone())?;
    }

    // ── Ensure PDFium is available ───────────────────────────────────────
    let needs_pdfium = profile.analyze.scan_barcode
        || (profile.analyze.extract_text && cli.text_engine == TextEngine::Pdfium);
    if needs_pdfium {
        PdfiumRasterizer::new()
            .probe()
            .context("PDFium is required for this carrier")?;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback))?;

    let orchestrator = BatchOrchestrator::new(config)
        .with_registry(registry)
        .with_capabilities(Capabilities::with_text_engine(cli.text_engine));
    if let Some(ref cb) = progress {
        cb.follow(orchestrator.tracker());
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let input = cli.input.clone().context("No input directory given")?;
    let report = orchestrator
        .run_batch(&input, &cli.carrier)
        .await
        .context("Batch failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report, &orchestrator.config().output_root(&input));
    }

    if !report.failed.is_empty() {
        anyhow::bail!("{} of {} file(s) failed", report.failed.len(), report.total_files);
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .dpi(cli.dpi)
        .capability_timeout_secs(cli.timeout)
        .delete_page_files(!cli.keep_page_files);

    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref dir) = cli.output {
        builder = builder.output_dir(dir);
    }
    if let Some(jobs) = cli.jobs {
        builder = builder.max_concurrent_files(jobs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(report: &BatchReport, output_root: &Path) {
    let thermal: usize = report.succeeded.iter().map(|o| o.thermal_count).sum();
    let paper: usize = report.succeeded.iter().map(|o| o.paper_count).sum();
    eprintln!(
        "{}  {}/{} files  {} pages → {} thermal, {} paper  {}ms  →  {}",
        if report.is_clean() { green("✔") } else { cyan("⚠") },
        report.succeeded.len(),
        report.total_files,
        report.total_pages(),
        thermal,
        paper,
        report.elapsed_ms,
        bold(&output_root.join(&report.carrier).display().to_string()),
    );
    for failure in &report.failed {
        eprintln!("   {} {}: {}", red("✗"), display_name(&failure.file), failure.error);
    }
}
