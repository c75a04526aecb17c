//! PDF rasterisation: render selected pages to image files via pdfium.
//!
//! ## Threading
//!
//! pdfium is bound, used and dropped inside a single `spawn_blocking`
//! closure. Rasterising and encoding a page can take hundreds of
//! milliseconds, which must not happen on a runtime worker.
//!
//! ## Parameter resolution
//!
//! [`RenderParams::resolve`] turns the requested format/dpi/quality into
//! what is actually encoded. `small-jpg` is a preset that overrides dpi and
//! quality; quality only applies to JPEG. Rejections are recorded as
//! `validation` failures, not fatal request errors.

use crate::config::{
    ImageEncoding, JobConfig, OutputFormat, PageSelector, SMALL_JPG_DPI, SMALL_JPG_QUALITY,
    VALID_DPI_VALUES, VALID_QUALITY_VALUES,
};
use crate::error::JobError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Points per inch in PDF user space.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Fully resolved rendering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderParams {
    pub encoding: ImageEncoding,
    pub dpi: u32,
    /// JPEG quality; always `Some` for jpg and `None` for png.
    pub quality: Option<u8>,
    pub pages: PageSelector,
}

impl RenderParams {
    /// Resolve presets and defaults, then validate against the allowed sets.
    pub fn resolve(
        format: OutputFormat,
        dpi: u32,
        quality: Option<u8>,
        pages: PageSelector,
        config: &JobConfig,
    ) -> Result<Self, JobError> {
        let (encoding, dpi, quality) = match format {
            OutputFormat::SmallJpg => (ImageEncoding::Jpg, SMALL_JPG_DPI, Some(SMALL_JPG_QUALITY)),
            OutputFormat::Jpg => (
                ImageEncoding::Jpg,
                dpi,
                Some(quality.unwrap_or(config.default_jpg_quality)),
            ),
            OutputFormat::Png => (ImageEncoding::Png, dpi, quality),
        };

        if !VALID_DPI_VALUES.contains(&dpi) {
            return Err(JobError::validation(format!("Unsupported dpi: {dpi}")));
        }

        if let Some(q) = quality {
            if encoding != ImageEncoding::Jpg {
                return Err(JobError::validation(
                    "JPEG quality is supported only for jpg format",
                ));
            }
            if !VALID_QUALITY_VALUES.contains(&q) {
                return Err(JobError::validation(format!("Unsupported JPEG quality: {q}")));
            }
        }

        Ok(Self {
            encoding,
            dpi,
            quality,
            pages,
        })
    }
}

/// A page written to disk by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// 1-indexed page number.
    pub page: usize,
    pub path: PathBuf,
    pub encoding: ImageEncoding,
}

/// Renders a local PDF into image files.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render the selected pages into `out_dir`, in page order.
    async fn render(
        &self,
        pdf_path: &Path,
        params: &RenderParams,
        out_dir: &Path,
    ) -> Result<Vec<RenderedPage>, JobError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    lib_dir: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Bind to the pdfium library in `lib_dir`, or the system library when `None`.
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render(
        &self,
        pdf_path: &Path,
        params: &RenderParams,
        out_dir: &Path,
    ) -> Result<Vec<RenderedPage>, JobError> {
        let path = pdf_path.to_path_buf();
        let out = out_dir.to_path_buf();
        let lib_dir = self.lib_dir.clone();
        let params = *params;

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(&path, lib_dir.as_deref(), &params, &out)
        })
        .await
        .map_err(|e| JobError::internal(format!("Render task panicked: {e}")))?
    }
}

fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, JobError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| JobError::render(format!("Failed to bind to pdfium library: {e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf_path: &Path,
    lib_dir: Option<&Path>,
    params: &RenderParams,
    out_dir: &Path,
) -> Result<Vec<RenderedPage>, JobError> {
    let pdfium = bind_pdfium(lib_dir)?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| JobError::render(format!("Failed to open PDF: {e:?}")))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(JobError::render("PDF has no pages"));
    }
    info!("PDF loaded: {} pages", total_pages);

    let render_config =
        PdfRenderConfig::new().scale_page_by_factor(params.dpi as f32 / PDF_POINTS_PER_INCH);

    let indices = params.pages.to_indices(total_pages);
    let mut results = Vec::with_capacity(indices.len());

    for idx in indices {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| JobError::render(format!("Page {page_num}: {e:?}")))?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| JobError::render(format!("Rasterisation failed for page {page_num}: {e:?}")))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        let path = out_dir.join(format!("page-{}.{}", page_num, params.encoding.extension()));
        write_image(&image, &path, params.encoding, params.quality).map_err(|e| {
            JobError::render(format!("Image encoding failed for page {page_num}: {e}"))
        })?;

        results.push(RenderedPage {
            page: page_num,
            path,
            encoding: params.encoding,
        });
    }

    Ok(results)
}

/// Encode a rasterised page to disk.
///
/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn write_image(
    img: &DynamicImage,
    path: &Path,
    encoding: ImageEncoding,
    quality: Option<u8>,
) -> Result<(), image::ImageError> {
    match encoding {
        ImageEncoding::Png => img.save_with_format(path, ImageFormat::Png),
        ImageEncoding::Jpg => {
            let mut writer = BufWriter::new(File::create(path)?);
            let encoder = JpegEncoder::new_with_quality(&mut writer, quality.unwrap_or(80));
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
    }
}
