//! Barcode decoding from page rasters.
//!
//! Finding nothing is a normal outcome (`Ok(None)`); only an unreadable
//! raster is an error.

use crate::error::CapabilityError;
use std::path::Path;
use tracing::trace;

/// A decoded barcode before timing is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBarcode {
    /// Upper-case symbology tag, e.g. `PDF_417`.
    pub symbology: String,
    pub payload: String,
}

pub trait BarcodeScanner: Send + Sync {
    fn scan(&self, raster: &Path) -> Result<Option<DecodedBarcode>, CapabilityError>;
}

/// [`BarcodeScanner`] backed by `rxing` (multi-format, pure Rust).
#[derive(Debug, Clone, Copy, Default)]
pub struct RxingScanner;

impl BarcodeScanner for RxingScanner {
    fn scan(&self, raster: &Path) -> Result<Option<DecodedBarcode>, CapabilityError> {
        let image = image::open(raster)
            .map_err(|e| CapabilityError::new(format!("read {}: {e}", raster.display())))?
            .into_luma8();
        let (width, height) = image.dimensions();

        match rxing::helpers::detect_in_luma(image.into_raw(), width, height, None) {
            Ok(result) => Ok(Some(DecodedBarcode {
                symbology: symbology_tag(&format!("{:?}", result.getBarcodeFormat())),
                payload: result.getText().to_string(),
            })),
            Err(miss) => {
                trace!("No barcode in {}: {miss}", raster.display());
                Ok(None)
            }
        }
    }
}

/// Normalise a decoder format name to the `PDF_417` / `UPC_E` style.
pub fn symbology_tag(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalised() {
        assert_eq!(symbology_tag("PDF_417"), "PDF_417");
        assert_eq!(symbology_tag("upc-e"), "UPC_E");
        assert_eq!(symbology_tag(" qr code "), "QR_CODE");
    }

    #[test]
    fn blank_raster_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.png");
        image::GrayImage::from_pixel(200, 200, image::Luma([255u8]))
            .save(&path)
            .unwrap();
        assert_eq!(RxingScanner.scan(&path).unwrap(), None);
    }

    #[test]
    fn unreadable_raster_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");
        assert!(RxingScanner.scan(&path).is_err());
    }
}
