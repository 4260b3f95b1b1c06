//! Shared fixtures for the integration tests: a tiny lopdf document
//! builder and capabilities that need no native libraries.

#![allow(dead_code)]

use label_splitter::pipeline::barcode::{BarcodeScanner, DecodedBarcode};
use label_splitter::pipeline::render::{PageRasterizer, RasterOptions};
use label_splitter::pipeline::text::ContentStreamTextExtractor;
use label_splitter::{BatchConfig, BatchOrchestrator, CapabilityError, Capabilities};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Write a PDF whose page `i` shows `texts[i]` in Courier.
pub fn write_pdf(dir: &Path, name: &str, texts: &[&str]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids = Vec::new();
    for text in texts {
        let content = format!("BT /F1 10 Tf 20 400 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 288.into(), 432.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => texts.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("write test pdf");
    path
}

/// Page texts of a PDF, in page order.
pub fn page_texts(path: &Path) -> Vec<String> {
    let doc = Document::load(path).expect("load pdf");
    doc.get_pages()
        .keys()
        .map(|n| doc.extract_text(&[*n]).unwrap_or_default().trim().to_string())
        .collect()
}

/// The "raster" is a copy of the page PDF.
pub struct CopyRasterizer;

impl PageRasterizer for CopyRasterizer {
    fn rasterize(&self, page: &Path, output: &Path, _o: RasterOptions) -> Result<(), CapabilityError> {
        std::fs::copy(page, output)?;
        Ok(())
    }
}

/// Pages whose text starts with `LABEL` carry a PDF417 code, `UPC` pages a
/// UPC-E code, `QR` pages a QR code; anything else has none.
pub struct TextScanner;

impl BarcodeScanner for TextScanner {
    fn scan(&self, raster: &Path) -> Result<Option<DecodedBarcode>, CapabilityError> {
        let doc = Document::load(raster).map_err(CapabilityError::new)?;
        let text = doc.extract_text(&[1]).map_err(CapabilityError::new)?;
        let text = text.trim();
        let symbology = if text.starts_with("LABEL") {
            "PDF_417"
        } else if text.starts_with("UPC") {
            "UPC_E"
        } else if text.starts_with("QR") {
            "QR_CODE"
        } else {
            return Ok(None);
        };
        Ok(Some(DecodedBarcode {
            symbology: symbology.to_string(),
            payload: text.to_string(),
        }))
    }
}

pub fn fake_capabilities() -> Capabilities {
    Capabilities {
        rasterizer: Arc::new(CopyRasterizer),
        scanner: Arc::new(TextScanner),
        text: Arc::new(ContentStreamTextExtractor),
    }
}

pub fn orchestrator(config: BatchConfig) -> BatchOrchestrator {
    BatchOrchestrator::new(config).with_capabilities(fake_capabilities())
}

pub fn config_in(work: &Path) -> BatchConfig {
    BatchConfig::builder().work_dir(work).build().expect("config")
}
