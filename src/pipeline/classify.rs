//! Carrier classification policies and page-count reconciliation.
//!
//! A [`Classifier`] maps one analysed [`Page`] to a [`StreamTag`]. Which
//! classifier a carrier uses is data ([`PolicyConfig`]), so a new carrier
//! only needs a profile entry.

use crate::config::{CarrierProfile, DuplicatePolicy, PolicyConfig};
use crate::error::SplitterError;
use crate::output::{ClassificationResult, Page, PageRef, StreamTag};
use crate::pipeline::barcode::symbology_tag;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

pub trait Classifier: Send + Sync {
    fn classify(&self, page: &Page) -> StreamTag;
}

/// Thermal iff the page carries a barcode of an accepted symbology.
#[derive(Debug, Clone)]
pub struct BarcodePolicy {
    accepted: BTreeSet<String>,
}

impl BarcodePolicy {
    pub fn new<I, S>(accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            accepted: accepted
                .into_iter()
                .map(|s| symbology_tag(s.as_ref()))
                .collect(),
        }
    }
}

impl Classifier for BarcodePolicy {
    fn classify(&self, page: &Page) -> StreamTag {
        match &page.barcode {
            Some(code) if self.accepted.contains(&symbology_tag(&code.symbology)) => {
                StreamTag::Thermal
            }
            _ => StreamTag::Paper,
        }
    }
}

/// Paper iff the upper-cased page text contains the marker.
#[derive(Debug, Clone)]
pub struct TextMarkerPolicy {
    marker: String,
}

impl TextMarkerPolicy {
    pub fn new(marker: impl AsRef<str>) -> Self {
        Self {
            marker: marker.as_ref().to_uppercase(),
        }
    }
}

impl Classifier for TextMarkerPolicy {
    fn classify(&self, page: &Page) -> StreamTag {
        if page.text_or_empty().to_uppercase().contains(&self.marker) {
            StreamTag::Paper
        } else {
            StreamTag::Thermal
        }
    }
}

pub fn build_classifier(policy: &PolicyConfig) -> Box<dyn Classifier> {
    match policy {
        PolicyConfig::Barcode {
            accepted_symbologies,
        } => Box::new(BarcodePolicy::new(accepted_symbologies)),
        PolicyConfig::TextMarker { marker } => Box::new(TextMarkerPolicy::new(marker)),
    }
}

/// Classify every page of one document in page order.
///
/// Under [`DuplicatePolicy::Skip`], a page whose hash matches an earlier
/// page of the same document goes to `ignored` instead of a stream. Pages
/// without a hash are never treated as duplicates.
pub fn classify_document(
    classifier: &dyn Classifier,
    pages: &[Page],
    duplicates: DuplicatePolicy,
) -> ClassificationResult {
    let mut ordered: Vec<&Page> = pages.iter().collect();
    ordered.sort_by_key(|p| p.index);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut result = ClassificationResult::default();
    for page in ordered {
        if duplicates == DuplicatePolicy::Skip {
            if let Some(hash) = page.hash.as_deref() {
                if !seen.insert(hash) {
                    debug!(page = page.index, "Duplicate page ignored");
                    result.push_ignored(PageRef::from(page));
                    continue;
                }
            }
        }
        let tag = classifier.classify(page);
        debug!(page = page.index, stream = %tag, "Page classified");
        result.push(tag, PageRef::from(page));
    }
    result
}

/// Check that every source page landed in exactly one bucket.
pub fn reconcile(
    result: &ClassificationResult,
    page_count: usize,
    file: &str,
    profile: &CarrierProfile,
) -> Result<(), SplitterError> {
    let mismatch = || SplitterError::Reconciliation {
        file: file.to_string(),
        carrier: profile.name.clone(),
        expected: page_count,
        thermal: result.thermal.len(),
        paper: result.paper.len(),
        ignored: result.ignored.len(),
    };

    if profile.duplicates == DuplicatePolicy::Keep && !result.ignored.is_empty() {
        return Err(mismatch());
    }
    if result.total() != page_count {
        return Err(mismatch());
    }

    let indices: BTreeSet<u32> = result
        .thermal
        .iter()
        .chain(&result.paper)
        .chain(&result.ignored)
        .map(|p| p.index)
        .collect();
    let expected = (1..=page_count as u32).collect::<BTreeSet<u32>>();
    if indices != expected {
        return Err(mismatch());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::BarcodeSignal;

    fn page(index: u32) -> Page {
        Page::new(index, format!("/work/page-{index}.pdf"))
    }

    fn with_code(index: u32, symbology: &str) -> Page {
        let mut p = page(index);
        p.barcode = Some(BarcodeSignal {
            symbology: symbology.into(),
            payload: "x".into(),
            elapsed_ms: 0,
        });
        p
    }

    fn with_text(index: u32, text: &str) -> Page {
        let mut p = page(index);
        p.text = Some(text.into());
        p
    }

    #[test]
    fn fedex_policy() {
        let policy = build_classifier(&CarrierProfile::fedex().policy);
        assert_eq!(policy.classify(&with_code(1, "PDF_417")), StreamTag::Thermal);
        assert_eq!(policy.classify(&with_code(1, "UPC_E")), StreamTag::Thermal);
        assert_eq!(policy.classify(&with_code(1, "QR_CODE")), StreamTag::Paper);
        assert_eq!(policy.classify(&page(1)), StreamTag::Paper);
    }

    #[test]
    fn ups_policy() {
        let policy = build_classifier(&CarrierProfile::ups().policy);
        assert_eq!(
            policy.classify(&with_text(1, "Commercial invoice #42")),
            StreamTag::Paper
        );
        assert_eq!(
            policy.classify(&with_text(1, "TRACKING 1Z999AA10123456784")),
            StreamTag::Thermal
        );
        // no text at all is still a label
        assert_eq!(policy.classify(&page(1)), StreamTag::Thermal);
    }

    #[test]
    fn streams_follow_page_order() {
        let policy = BarcodePolicy::new(["PDF_417"]);
        let pages = vec![
            with_code(3, "PDF_417"),
            with_code(1, "PDF_417"),
            with_code(2, "PDF_417"),
        ];
        let result = classify_document(&policy, &pages, DuplicatePolicy::Keep);
        let order: Vec<u32> = result.thermal.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn duplicates_skipped_only_when_asked() {
        let policy = TextMarkerPolicy::new("INVOICE");
        let mut pages = vec![with_text(1, "label"), with_text(2, "label"), with_text(3, "other")];
        pages[0].hash = Some("h1".into());
        pages[1].hash = Some("h1".into());
        pages[2].hash = Some("h2".into());

        let kept = classify_document(&policy, &pages, DuplicatePolicy::Keep);
        assert_eq!(kept.thermal.len(), 3);
        assert!(kept.ignored.is_empty());

        let skipped = classify_document(&policy, &pages, DuplicatePolicy::Skip);
        assert_eq!(skipped.thermal.len(), 2);
        assert_eq!(skipped.ignored.len(), 1);
        assert_eq!(skipped.ignored[0].index, 2);
    }

    #[test]
    fn reconciliation_counts_every_bucket() {
        let mut profile = CarrierProfile::ups();
        let policy = TextMarkerPolicy::new("INVOICE");
        let mut pages = vec![with_text(1, "a"), with_text(2, "a")];
        pages[0].hash = Some("h".into());
        pages[1].hash = Some("h".into());

        let result = classify_document(&policy, &pages, DuplicatePolicy::Keep);
        assert!(reconcile(&result, 2, "a.pdf", &profile).is_ok());
        assert!(matches!(
            reconcile(&result, 3, "a.pdf", &profile),
            Err(SplitterError::Reconciliation { expected: 3, thermal: 2, .. })
        ));

        profile.duplicates = DuplicatePolicy::Skip;
        let result = classify_document(&policy, &pages, DuplicatePolicy::Skip);
        assert!(reconcile(&result, 2, "a.pdf", &profile).is_ok());
    }

    #[test]
    fn reconciliation_catches_duplicated_page() {
        let profile = CarrierProfile::fedex();
        let mut result = ClassificationResult::default();
        result.push(StreamTag::Thermal, PageRef::from(&page(1)));
        result.push(StreamTag::Paper, PageRef::from(&page(1)));
        assert!(reconcile(&result, 2, "a.pdf", &profile).is_err());
    }
}
