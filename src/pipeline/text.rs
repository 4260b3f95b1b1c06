//! Page text extraction.
//!
//! Both engines return the page's letters in glyph-stream order (never
//! sorted by position) together with a `content` string that describes the
//! page more fully and is used for content hashing.

use crate::error::CapabilityError;
use crate::pipeline::pdf::ordered_pages;
use crate::pipeline::render::bind_pdfium;
use lopdf::content::Content;
use lopdf::{Document, Object};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Letter-level text of a page plus its hashing content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextExtraction {
    pub text: String,
    pub content: String,
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, page_file: &Path) -> Result<TextExtraction, CapabilityError>;
}

/// Which [`TextExtractor`] a batch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEngine {
    /// pdfium's per-character text layer.
    #[default]
    Pdfium,
    /// `Tj`/`TJ`/`'`/`"` operands of the page content stream, via lopdf.
    ContentStream,
}

impl std::str::FromStr for TextEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdfium" => Ok(TextEngine::Pdfium),
            "content-stream" | "content_stream" | "lopdf" => Ok(TextEngine::ContentStream),
            other => Err(format!(
                "unknown text engine '{other}' (expected pdfium or content-stream)"
            )),
        }
    }
}

/// Character-level extraction through pdfium. `content` lists every glyph
/// with its loose bounding box.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextExtractor {
    library_path: Option<PathBuf>,
}

impl PdfiumTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

impl TextExtractor for PdfiumTextExtractor {
    fn extract(&self, page_file: &Path) -> Result<TextExtraction, CapabilityError> {
        let pdfium = bind_pdfium(self.library_path.as_deref()).map_err(CapabilityError)?;
        let document = pdfium
            .load_pdf_from_file(page_file, None)
            .map_err(|e| CapabilityError::new(format!("open: {e:?}")))?;
        let pages = document.pages();
        let page = pages
            .first()
            .map_err(|e| CapabilityError::new(format!("page: {e:?}")))?;
        let page_text = page
            .text()
            .map_err(|e| CapabilityError::new(format!("text layer: {e:?}")))?;

        let mut out = TextExtraction::default();
        for glyph in page_text.chars().iter() {
            let Some(c) = glyph.unicode_char() else {
                continue;
            };
            out.text.push(c);
            match glyph.loose_bounds() {
                Ok(bounds) => {
                    let _ = write!(out.content, "{c}@{bounds:?};");
                }
                Err(_) => out.content.push(c),
            }
        }
        Ok(out)
    }
}

/// Show-text operands of the page content stream, decoded as Latin-1.
/// `content` is the raw (decompressed) content stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentStreamTextExtractor;

impl TextExtractor for ContentStreamTextExtractor {
    fn extract(&self, page_file: &Path) -> Result<TextExtraction, CapabilityError> {
        let doc = Document::load(page_file)
            .map_err(|e| CapabilityError::new(format!("open: {e}")))?;
        let (_, page_id) = ordered_pages(&doc)
            .first()
            .copied()
            .ok_or_else(|| CapabilityError::new("document has no pages"))?;
        let raw = doc
            .get_page_content(page_id)
            .map_err(|e| CapabilityError::new(format!("content stream: {e}")))?;
        let content = Content::decode(&raw)
            .map_err(|e| CapabilityError::new(format!("content decode: {e}")))?;

        let mut text = String::new();
        for op in &content.operations {
            match op.operator.as_str() {
                "Tj" | "'" | "\"" => {
                    if let Some(Object::String(bytes, _)) = op.operands.last() {
                        push_latin1(&mut text, bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            if let Object::String(bytes, _) = item {
                                push_latin1(&mut text, bytes);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(TextExtraction {
            text,
            content: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}

fn push_latin1(out: &mut String, bytes: &[u8]) {
    out.extend(bytes.iter().map(|&b| b as char));
}
