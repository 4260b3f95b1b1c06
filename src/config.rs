//! Configuration types for label splitting.
//!
//! Three layers of configuration exist:
//!
//! * [`AnalyzeConfig`]: which signals the analyzer gathers for every page.
//! * [`CarrierProfile`]: how one carrier's pages are classified, together with
//!   the analysis flags that classification needs. Profiles live in a
//!   [`CarrierRegistry`] keyed by a case-insensitive carrier identifier.
//! * [`BatchConfig`]: everything about one batch run (directories, fan-out,
//!   rendering, timeouts), built via [`BatchConfigBuilder`].

use crate::error::SplitterError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

// ── Analysis flags ───────────────────────────────────────────────────────

/// Per-run analysis flags. Immutable once a file's pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzeConfig {
    /// Rasterise each page and run the barcode decoder on it.
    pub scan_barcode: bool,
    /// Extract letter-level page text.
    pub extract_text: bool,
    /// Compute a SHA-1 content hash per page.
    pub compute_hash: bool,
    /// Write `<stem>.json` next to the stream outputs.
    pub make_report: bool,
    /// Fail the file on any page-level capability error instead of letting
    /// the page proceed with the signals gathered so far.
    pub strict: bool,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            scan_barcode: true,
            extract_text: true,
            compute_hash: false,
            make_report: false,
            strict: false,
        }
    }
}

// ── Carrier profiles ─────────────────────────────────────────────────────

/// Classification policy of a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PolicyConfig {
    /// Thermal iff the page has a barcode whose symbology is accepted.
    #[serde(rename_all = "camelCase")]
    Barcode {
        accepted_symbologies: BTreeSet<String>,
    },
    /// Thermal iff the upper-cased page text does not contain `marker`.
    TextMarker { marker: String },
}

/// What to do with a page whose content hash was already seen in the same
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    /// Classify it like any other page.
    #[default]
    Keep,
    /// Route it to the ignored bucket and drop its page file.
    Skip,
}

/// Everything needed to process one carrier's documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierProfile {
    /// Display name; also the output sub-directory.
    pub name: String,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub analyze: AnalyzeConfig,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

impl CarrierProfile {
    pub fn fedex() -> Self {
        Self {
            name: "FedEx".to_string(),
            policy: PolicyConfig::Barcode {
                accepted_symbologies: ["PDF_417", "UPC_E"].iter().map(|s| s.to_string()).collect(),
            },
            analyze: AnalyzeConfig {
                scan_barcode: true,
                extract_text: true,
                compute_hash: false,
                make_report: false,
                strict: false,
            },
            duplicates: DuplicatePolicy::Keep,
        }
    }

    pub fn ups() -> Self {
        Self {
            name: "UPS".to_string(),
            policy: PolicyConfig::TextMarker {
                marker: "INVOICE".to_string(),
            },
            analyze: AnalyzeConfig {
                scan_barcode: false,
                extract_text: true,
                compute_hash: true,
                make_report: false,
                strict: false,
            },
            duplicates: DuplicatePolicy::Keep,
        }
    }

    /// Check that the analysis flags provide the signals the policy reads.
    pub fn validate(&self) -> Result<(), SplitterError> {
        if self.name.trim().is_empty() {
            return Err(SplitterError::InvalidConfig(
                "carrier profile name must not be empty".into(),
            ));
        }
        match &self.policy {
            PolicyConfig::Barcode {
                accepted_symbologies,
            } => {
                if !self.analyze.scan_barcode {
                    return Err(SplitterError::InvalidConfig(format!(
                        "carrier '{}': barcode policy requires scanBarcode",
                        self.name
                    )));
                }
                if accepted_symbologies.is_empty() {
                    return Err(SplitterError::InvalidConfig(format!(
                        "carrier '{}': acceptedSymbologies is empty",
                        self.name
                    )));
                }
            }
            PolicyConfig::TextMarker { marker } => {
                if !self.analyze.extract_text {
                    return Err(SplitterError::InvalidConfig(format!(
                        "carrier '{}': text marker policy requires extractText",
                        self.name
                    )));
                }
                if marker.trim().is_empty() {
                    return Err(SplitterError::InvalidConfig(format!(
                        "carrier '{}': marker is empty",
                        self.name
                    )));
                }
            }
        }
        if self.duplicates == DuplicatePolicy::Skip && !self.analyze.compute_hash {
            return Err(SplitterError::InvalidConfig(format!(
                "carrier '{}': duplicate skipping requires computeHash",
                self.name
            )));
        }
        Ok(())
    }
}

/// Carrier identifier → profile.
#[derive(Debug, Clone, Default)]
pub struct CarrierRegistry {
    profiles: HashMap<String, CarrierProfile>,
}

impl CarrierRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// FedEx and UPS.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.profiles.insert("fedex".into(), CarrierProfile::fedex());
        registry.profiles.insert("ups".into(), CarrierProfile::ups());
        registry
    }

    /// Register (or replace) a profile under its lower-cased name.
    pub fn register(&mut self, profile: CarrierProfile) -> Result<(), SplitterError> {
        profile.validate()?;
        self.profiles.insert(normalize(&profile.name), profile);
        Ok(())
    }

    /// Parse a JSON array of profiles and register each of them.
    pub fn extend_from_json(&mut self, json: &str) -> Result<(), SplitterError> {
        let profiles: Vec<CarrierProfile> = serde_json::from_str(json)
            .map_err(|e| SplitterError::InvalidConfig(format!("carrier profiles: {e}")))?;
        for profile in profiles {
            self.register(profile)?;
        }
        Ok(())
    }

    /// Builtin profiles overlaid with the ones in `json`.
    pub fn from_json(json: &str) -> Result<Self, SplitterError> {
        let mut registry = Self::builtin();
        registry.extend_from_json(json)?;
        Ok(registry)
    }

    pub fn from_file(path: &Path) -> Result<Self, SplitterError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SplitterError::InvalidConfig(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn get(&self, carrier: &str) -> Result<&CarrierProfile, SplitterError> {
        self.profiles
            .get(&normalize(carrier))
            .ok_or_else(|| SplitterError::UnknownCarrier(carrier.to_string()))
    }

    /// Registered identifiers, sorted.
    pub fn carriers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

fn normalize(carrier: &str) -> String {
    carrier.trim().to_lowercase()
}

// ── Batch configuration ──────────────────────────────────────────────────

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`] or [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use label_splitter::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .dpi(200)
///     .max_concurrent_files(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Root of the per-document page directories. Default: `<tmp>/label-splitter`.
    pub work_dir: PathBuf,

    /// Root of the carrier output tree. Default: `<input dir>/output`.
    pub output_dir: Option<PathBuf>,

    /// Cap on files processed at once. Default: `None` (one task per file).
    pub max_concurrent_files: Option<usize>,

    /// Raster density for barcode scanning. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Upper bound on either raster dimension. Default: 4000.
    ///
    /// A 300-DPI render of an oversized page would otherwise allocate
    /// hundreds of megabytes before the decoder ever sees it.
    pub max_rendered_pixels: u32,

    /// Bound on a single render/decode/extract call, in seconds. Default: 60.
    pub capability_timeout_secs: u64,

    /// Remove single-page files once folded into a stream. Default: true.
    pub delete_page_files: bool,

    /// Drop finished records from the status tracker when a batch starts.
    /// Records still in flight, e.g. those of another batch sharing the
    /// tracker, are kept. Default: true.
    pub reset_status_on_start: bool,

    /// Optional batch progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("label-splitter"),
            output_dir: None,
            max_concurrent_files: None,
            dpi: 300,
            max_rendered_pixels: 4000,
            capability_timeout_secs: 60,
            delete_page_files: true,
            reset_status_on_start: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("work_dir", &self.work_dir)
            .field("output_dir", &self.output_dir)
            .field("max_concurrent_files", &self.max_concurrent_files)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("capability_timeout_secs", &self.capability_timeout_secs)
            .field("delete_page_files", &self.delete_page_files)
            .field("reset_status_on_start", &self.reset_status_on_start)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Output root for a batch over `input_dir`.
    pub fn output_root(&self, input_dir: &Path) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| input_dir.join("output"))
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn max_concurrent_files(mut self, n: usize) -> Self {
        self.config.max_concurrent_files = Some(n);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn capability_timeout_secs(mut self, secs: u64) -> Self {
        self.config.capability_timeout_secs = secs;
        self
    }

    pub fn delete_page_files(mut self, v: bool) -> Self {
        self.config.delete_page_files = v;
        self
    }

    pub fn reset_status_on_start(mut self, v: bool) -> Self {
        self.config.reset_status_on_start = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, SplitterError> {
        let c = &self.config;
        if !(72..=600).contains(&c.dpi) {
            return Err(SplitterError::InvalidConfig(format!(
                "DPI must be 72-600, got {}",
                c.dpi
            )));
        }
        if c.max_concurrent_files == Some(0) {
            return Err(SplitterError::InvalidConfig(
                "max_concurrent_files must be at least 1".into(),
            ));
        }
        if c.capability_timeout_secs == 0 {
            return Err(SplitterError::InvalidConfig(
                "capability timeout must be at least 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup_is_case_insensitive() {
        let registry = CarrierRegistry::builtin();
        assert_eq!(registry.get("FEDEX").unwrap().name, "FedEx");
        assert_eq!(registry.get(" ups ").unwrap().name, "UPS");
        assert!(matches!(
            registry.get("dhl"),
            Err(SplitterError::UnknownCarrier(_))
        ));
        assert_eq!(registry.carriers(), vec!["fedex", "ups"]);
    }

    #[test]
    fn builtin_profiles_validate() {
        CarrierProfile::fedex().validate().unwrap();
        CarrierProfile::ups().validate().unwrap();
    }

    #[test]
    fn json_profile_adds_carrier() {
        let json = r#"[
            {
                "name": "DHL",
                "policy": { "kind": "barcode", "acceptedSymbologies": ["CODE_128"] },
                "analyze": { "scanBarcode": true, "extractText": false }
            }
        ]"#;
        let registry = CarrierRegistry::from_json(json).unwrap();
        let dhl = registry.get("dhl").unwrap();
        assert!(dhl.analyze.scan_barcode);
        assert!(!dhl.analyze.extract_text);
        assert_eq!(dhl.duplicates, DuplicatePolicy::Keep);
        // builtins survive the overlay
        assert!(registry.get("fedex").is_ok());
    }

    #[test]
    fn skip_without_hash_is_rejected() {
        let mut profile = CarrierProfile::ups();
        profile.analyze.compute_hash = false;
        profile.duplicates = DuplicatePolicy::Skip;
        assert!(matches!(
            profile.validate(),
            Err(SplitterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn barcode_policy_needs_scanning() {
        let mut profile = CarrierProfile::fedex();
        profile.analyze.scan_barcode = false;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn batch_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.dpi, 300);
        assert_eq!(config.capability_timeout_secs, 60);
        assert!(config.max_concurrent_files.is_none());
        assert!(config.delete_page_files);
        assert_eq!(
            config.output_root(Path::new("/in")),
            PathBuf::from("/in/output")
        );
    }

    #[test]
    fn builder_validates() {
        assert!(BatchConfig::builder().dpi(50).build().is_err());
        assert!(BatchConfig::builder().max_concurrent_files(0).build().is_err());
        assert!(BatchConfig::builder().capability_timeout_secs(0).build().is_err());

        let config = BatchConfig::builder()
            .dpi(150)
            .output_dir("/out")
            .build()
            .unwrap();
        assert_eq!(config.output_root(Path::new("/in")), PathBuf::from("/out"));
    }
}
