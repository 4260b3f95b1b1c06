//! Whole-batch tests over generated PDFs.
//!
//! Rendering and barcode decoding are replaced by the fakes in
//! `common/`, so these run without a pdfium library.

mod common;

use common::{config_in, orchestrator, page_texts, write_pdf};
use label_splitter::{
    BatchConfig, BatchProgressCallback, BatchReport, CarrierProfile, CarrierRegistry,
    DuplicatePolicy, FileOutcome, ItemStatus, PolicyConfig, SplitterError,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::assert_ok;

fn registry_with(profile: CarrierProfile) -> CarrierRegistry {
    let mut registry = CarrierRegistry::builtin();
    registry.register(profile).unwrap();
    registry
}

// ── Carrier policies ─────────────────────────────────────────────────────────

#[tokio::test]
async fn fedex_labels_and_paperwork_are_separated() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_pdf(
        input.path(),
        "order-17.pdf",
        &["LABEL 794 6", "Packing list", "UPC 0425261", "QR survey"],
    );

    let mut fedex = CarrierProfile::fedex();
    fedex.analyze.make_report = true;
    let report = orchestrator(config_in(work.path()))
        .with_registry(registry_with(fedex))
        .run_batch(input.path(), "FedEx")
        .await
        .unwrap();

    assert!(report.is_clean());
    let carrier_dir = input.path().join("output/FedEx");
    assert_eq!(
        page_texts(&carrier_dir.join("thermal/order-17.pdf")),
        vec!["LABEL 794 6", "UPC 0425261"]
    );
    assert_eq!(
        page_texts(&carrier_dir.join("paper/order-17.pdf")),
        vec!["Packing list", "QR survey"]
    );

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(carrier_dir.join("order-17.json")).unwrap()).unwrap();
    let pages = json["pages"].as_array().unwrap();
    let codes: Vec<Option<&str>> = pages
        .iter()
        .map(|p| p["code"]["codeType"].as_str())
        .collect();
    assert_eq!(
        codes,
        vec![Some("PDF_417"), None, Some("UPC_E"), Some("QR_CODE")]
    );
    assert_eq!(pages[1]["text"], "Packing list");
}

#[tokio::test]
async fn ups_invoice_pages_go_to_paper() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_pdf(
        input.path(),
        "ups.pdf",
        &["1Z999AA10123456784", "Commercial Invoice", "1Z999AA10123456785"],
    );

    let report = orchestrator(config_in(work.path()))
        .run_batch(input.path(), "ups")
        .await
        .unwrap();

    let outcome = &report.succeeded[0];
    assert_eq!((outcome.thermal_count, outcome.paper_count), (2, 1));
    assert_eq!(
        page_texts(outcome.thermal_output.as_ref().unwrap()),
        vec!["1Z999AA10123456784", "1Z999AA10123456785"]
    );
    assert_eq!(
        page_texts(outcome.paper_output.as_ref().unwrap()),
        vec!["Commercial Invoice"]
    );
}

#[tokio::test]
async fn carrier_defined_in_json() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "acme.pdf", &["QR parcel", "LABEL legacy"]);

    let registry = CarrierRegistry::from_json(
        r#"[{
            "name": "Acme",
            "policy": { "kind": "barcode", "acceptedSymbologies": ["QR_CODE"] }
        }]"#,
    )
    .unwrap();
    assert!(matches!(
        registry.get("acme").unwrap().policy,
        PolicyConfig::Barcode { .. }
    ));

    let report = orchestrator(config_in(work.path()))
        .with_registry(registry)
        .run_batch(input.path(), "acme")
        .await
        .unwrap();

    assert_eq!(report.carrier, "Acme");
    let outcome = &report.succeeded[0];
    assert_eq!((outcome.thermal_count, outcome.paper_count), (1, 1));
    assert!(input.path().join("output/Acme/thermal/acme.pdf").exists());
}

#[tokio::test]
async fn repeated_pages_skipped_when_profile_asks() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_pdf(
        input.path(),
        "dup.pdf",
        &["1Z0001", "1Z0001", "INVOICE 12", "1Z0002"],
    );

    let mut ups = CarrierProfile::ups();
    ups.duplicates = DuplicatePolicy::Skip;
    let report = orchestrator(config_in(work.path()))
        .with_registry(registry_with(ups))
        .run_batch(input.path(), "ups")
        .await
        .unwrap();

    let outcome = &report.succeeded[0];
    assert_eq!(outcome.page_count, 4);
    assert_eq!(
        (outcome.thermal_count, outcome.paper_count, outcome.ignored_count),
        (2, 1, 1)
    );
    assert_eq!(
        page_texts(outcome.thermal_output.as_ref().unwrap()),
        vec!["1Z0001", "1Z0002"]
    );
}

// ── Output layout ────────────────────────────────────────────────────────────

#[tokio::test]
async fn explicit_output_dir_and_no_empty_streams() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "only-labels.pdf", &["LABEL a", "LABEL b"]);

    let config = BatchConfig::builder()
        .work_dir(work.path())
        .output_dir(out.path())
        .build()
        .unwrap();
    let report = orchestrator(config)
        .run_batch(input.path(), "fedex")
        .await
        .unwrap();

    let outcome = &report.succeeded[0];
    assert_eq!(outcome.paper_output, None);
    assert!(out.path().join("FedEx/thermal/only-labels.pdf").exists());
    assert!(!out.path().join("FedEx/paper").exists());
    assert!(!input.path().join("output").exists());
}

#[tokio::test]
async fn page_files_kept_on_request() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "keep.pdf", &["LABEL", "invoice"]);

    let config = BatchConfig::builder()
        .work_dir(work.path())
        .delete_page_files(false)
        .build()
        .unwrap();
    assert_ok!(orchestrator(config).run_batch(input.path(), "fedex").await);

    let dirs = page_dirs(work.path(), "keep.pdf");
    assert_eq!(dirs.len(), 1);
    let page_dir = &dirs[0];
    assert!(page_dir.join("page-1-2.pdf").exists());
    assert!(page_dir.join("page-2-2.pdf").exists());
    // rasters never outlive their page
    assert!(!page_dir.join("page-1-2.pdf.png").exists());
}

/// Page directories of `file_name` runs left in `work`.
fn page_dirs(work: &Path, file_name: &str) -> Vec<std::path::PathBuf> {
    let prefix = format!("{file_name}-");
    std::fs::read_dir(work)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|p| p.is_dir() && p.file_name().unwrap().to_string_lossy().starts_with(&prefix))
        .collect()
}

// ── Batch behaviour ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    completed: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    batches: AtomicUsize,
}

impl BatchProgressCallback for Recorder {
    fn on_file_start(&self, _file: &Path) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_file_complete(&self, file: &Path, _outcome: &FileOutcome) {
        self.completed
            .lock()
            .unwrap()
            .push(file.file_name().unwrap().to_string_lossy().into_owned());
    }

    fn on_file_error(&self, file: &Path, _error: &str) {
        self.errors
            .lock()
            .unwrap()
            .push(file.file_name().unwrap().to_string_lossy().into_owned());
    }

    fn on_batch_complete(&self, _report: &BatchReport) {
        self.batches.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn failing_file_is_isolated() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "a.pdf", &["LABEL", "invoice"]);
    write_pdf(input.path(), "c.pdf", &["UPC 1"]);
    // right magic, broken body
    std::fs::write(input.path().join("b.pdf"), b"%PDF-1.7\ngarbage").unwrap();

    let recorder = Arc::new(Recorder::default());
    let config = BatchConfig::builder()
        .work_dir(work.path())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let orchestrator = orchestrator(config);
    let report = orchestrator.run_batch(input.path(), "fedex").await.unwrap();

    assert_eq!(report.total_files, 3);
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].file.ends_with("b.pdf"));

    assert_eq!(recorder.started.load(Ordering::SeqCst), 3);
    let mut completed = recorder.completed.lock().unwrap().clone();
    completed.sort();
    assert_eq!(completed, vec!["a.pdf", "c.pdf"]);
    assert_eq!(*recorder.errors.lock().unwrap(), vec!["b.pdf"]);
    assert_eq!(recorder.batches.load(Ordering::SeqCst), 1);

    let failed = orchestrator
        .tracker()
        .get(&input.path().join("b.pdf"))
        .unwrap();
    assert!(failed.is_failed());
    assert_eq!(failed.status, ItemStatus::Splitting);
    assert!(page_dirs(work.path(), "b.pdf").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_concurrency_finishes_every_file() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    for i in 0..6 {
        write_pdf(
            input.path(),
            &format!("batch-{i}.pdf"),
            &["LABEL x", "invoice", "LABEL y"],
        );
    }

    let config = BatchConfig::builder()
        .work_dir(work.path())
        .max_concurrent_files(2)
        .build()
        .unwrap();
    let orchestrator = orchestrator(config);
    let report = orchestrator.run_batch(input.path(), "fedex").await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.total_pages(), 18);
    assert_eq!(orchestrator.tracker().in_flight(), 0);
    assert!(orchestrator
        .tracker()
        .snapshot()
        .iter()
        .all(|r| r.status == ItemStatus::Done && r.thermal_count == 2));
}

#[tokio::test]
async fn status_updates_never_go_backwards() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "one.pdf", &["LABEL 1", "paper", "LABEL 2"]);
    write_pdf(input.path(), "two.pdf", &["UPC 9", "paper"]);

    let orchestrator = orchestrator(config_in(work.path()));
    let mut updates = orchestrator.tracker().subscribe();
    orchestrator.run_batch(input.path(), "fedex").await.unwrap();

    let mut seen = Vec::new();
    while let Some(record) = updates.try_recv() {
        seen.push(record);
    }
    for name in ["one.pdf", "two.pdf"] {
        let statuses: Vec<ItemStatus> = seen
            .iter()
            .filter(|r| r.file_name == name)
            .map(|r| r.status)
            .collect();
        assert!(statuses.windows(2).all(|w| w[0] <= w[1]), "{name}: {statuses:?}");
        assert_eq!(statuses.first(), Some(&ItemStatus::Started));
        assert_eq!(statuses.last(), Some(&ItemStatus::Done));
        assert!(statuses.contains(&ItemStatus::Splitting));
        assert!(statuses.contains(&ItemStatus::ProcessingFileType));
    }
}

#[tokio::test]
async fn second_batch_starts_from_clean_tracker() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_pdf(first.path(), "old.pdf", &["LABEL"]);
    write_pdf(second.path(), "new.pdf", &["LABEL"]);

    let orchestrator = orchestrator(config_in(work.path()));
    orchestrator.run_batch(first.path(), "fedex").await.unwrap();
    orchestrator.run_batch(second.path(), "fedex").await.unwrap();

    let names: Vec<String> = orchestrator
        .tracker()
        .snapshot()
        .into_iter()
        .map(|r| r.file_name)
        .collect();
    assert_eq!(names, vec!["new.pdf"]);
}

#[tokio::test]
async fn missing_input_directory() {
    let work = tempfile::tempdir().unwrap();
    let err = orchestrator(config_in(work.path()))
        .run_batch(Path::new("/definitely/not/here"), "fedex")
        .await
        .unwrap_err();
    assert!(matches!(err, SplitterError::InputDirNotFound { .. }));
}

#[tokio::test]
async fn empty_directory_gives_empty_report() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("notes.txt"), b"not a pdf").unwrap();

    let report = orchestrator(config_in(work.path()))
        .run_batch(input.path(), "fedex")
        .await
        .unwrap();
    assert_eq!(report.total_files, 0);
    assert!(report.is_clean());
}
