//! Page rasterisation for barcode scanning.
//!
//! pdfium is a blocking C library; callers run [`PageRasterizer::rasterize`]
//! inside `spawn_blocking` (see [`crate::pipeline::analyze`]).
//!
//! The raster is written as an 8-bit greyscale PNG next to the page file
//! and removed by the analyzer once the decoder has seen it.

use crate::error::{CapabilityError, SplitterError};
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Raster settings derived from [`crate::config::BatchConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    pub dpi: u32,
    pub max_pixels: u32,
}

/// Renders the single page of a page file to an image file.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(
        &self,
        page_file: &Path,
        output: &Path,
        options: RasterOptions,
    ) -> Result<(), CapabilityError>;
}

/// Where the raster for `page_file` is written: `<page file>.png`.
pub fn raster_path_for(page_file: &Path) -> PathBuf {
    let mut name = page_file.as_os_str().to_os_string();
    name.push(".png");
    PathBuf::from(name)
}

/// Bind to pdfium: `$PDFIUM_LIB_PATH` (file or directory) first, then the
/// system library.
pub(crate) fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, String> {
    let from_env = std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from);
    let configured = explicit.map(Path::to_path_buf).or(from_env);

    let bindings = match configured {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(&lib)
                .map_err(|e| format!("{}: {e}", lib.display()))?
        }
        None => Pdfium::bind_to_system_library().map_err(|e| e.to_string())?,
    };
    Ok(Pdfium::new(bindings))
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    /// Bind once up front so a missing library is reported before any file
    /// is processed.
    pub fn probe(&self) -> Result<(), SplitterError> {
        bind_pdfium(self.library_path.as_deref())
            .map(|_| ())
            .map_err(SplitterError::PdfiumBindingFailed)
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        page_file: &Path,
        output: &Path,
        options: RasterOptions,
    ) -> Result<(), CapabilityError> {
        let pdfium = bind_pdfium(self.library_path.as_deref()).map_err(CapabilityError)?;
        let document = pdfium
            .load_pdf_from_file(page_file, None)
            .map_err(|e| CapabilityError::new(format!("open: {e:?}")))?;
        let pages = document.pages();
        let page = pages
            .first()
            .map_err(|e| CapabilityError::new(format!("page: {e:?}")))?;

        let max = options.max_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.dpi as f32 / 72.0)
            .set_maximum_width(max)
            .set_maximum_height(max);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| CapabilityError::new(format!("render: {e:?}")))?;
        let image = bitmap.as_image().to_luma8();
        debug!(
            "Rendered {} → {}x{} px",
            page_file.display(),
            image.width(),
            image.height()
        );

        image
            .save_with_format(output, ImageFormat::Png)
            .map_err(|e| CapabilityError::new(format!("write {}: {e}", output.display())))
    }
}
