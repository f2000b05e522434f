//! PDF access via Google PDFium: embedded text layer and page rasterization.
//!
//! `PdfiumRenderer` holds no state. The upstream `Pdfium` handle is `!Send`,
//! so every call binds the library again; the OS keeps it loaded after the
//! first `dlopen`.

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Scanned report pages are rasterized at this resolution before OCR.
pub const DEFAULT_RENDER_DPI: u32 = 300;

/// Longest side of a rendered page. Oversized pages are scaled down.
const MAX_DIMENSION_PX: u32 = 4096;

const POINTS_PER_INCH: f32 = 72.0;

/// Environment override for the PDFium shared library location.
pub const ENV_PDFIUM_PATH: &str = "PDFIUM_DYNAMIC_LIB_PATH";

pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Fails when no PDFium library can be bound, so callers can run
    /// without PDF support instead of failing every PDF later.
    pub fn new() -> Result<Self, ExtractionError> {
        load_pdfium()?;
        Ok(Self)
    }
}

/// Bind PDFium: explicit env path, then next to the executable (and its
/// `lib/` sibling), then the system search path.
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var(ENV_PDFIUM_PATH) {
        debug!(path = %path, "Loading PDFium from environment");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::PdfRendering {
                page: 0,
                reason: format!("Failed to load PDFium from {path}: {e}"),
            }
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        for dir in [exe_dir.clone(), exe_dir.join("..").join("lib")] {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %dir.display(), "Loaded PDFium next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings =
        Pdfium::bind_to_system_library().map_err(|e| ExtractionError::PdfRendering {
            page: 0,
            reason: format!("PDFium library not found. Set {ENV_PDFIUM_PATH} or install PDFium: {e}"),
        })?;
    Ok(Pdfium::new(bindings))
}

/// Password-protected documents get their own error.
fn map_load_error(e: PdfiumError) -> ExtractionError {
    let lower = e.to_string().to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfRendering {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        }
    }
}

fn page_index(page_number: usize) -> Result<u16, ExtractionError> {
    u16::try_from(page_number).map_err(|_| ExtractionError::PdfRendering {
        page: page_number,
        reason: format!("Page index {page_number} exceeds u16 maximum"),
    })
}

/// Pixel size for a page at `dpi`, at least 1px and capped at
/// `MAX_DIMENSION_PX` on the longer side with aspect ratio kept.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    if longest <= MAX_DIMENSION_PX as f32 {
        return (raw_w as u32, raw_h as u32);
    }
    let ratio = MAX_DIMENSION_PX as f32 / longest;
    let clamp = |v: f32| ((v * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
    (clamp(raw_w), clamp(raw_h))
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn page_text(&self, pdf_bytes: &[u8], page_number: usize) -> Result<String, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let page = document
            .pages()
            .get(page_index(page_number)?)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Page not found: {e}"),
            })?;
        let text = page.text().map_err(|e| ExtractionError::PdfRendering {
            page: page_number,
            reason: format!("Text layer unreadable: {e}"),
        })?;
        Ok(text.all())
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();
        let page = pages
            .get(page_index(page_number)?)
            .map_err(|_| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (document has {} pages)",
                    pages.len()
                ),
            })?;

        let (width_pt, height_pt) = (page.width().value, page.height().value);
        let (target_w, target_h) = compute_render_dimensions(width_pt, height_pt, dpi);
        if target_w.max(target_h) == MAX_DIMENSION_PX {
            warn!(page = page_number, dpi, "Rendered page capped to {MAX_DIMENSION_PX}px");
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("PNG encoding failed: {e}"),
            })?;
        let png = cursor.into_inner();

        debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            bytes = png.len(),
            "Rendered PDF page"
        );
        Ok(png)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// In-memory PDF stand-in: one entry per page, holding that page's
/// text layer. An empty string models a scanned page.
pub struct MockPdfPageRenderer {
    pages: Vec<String>,
}

impl MockPdfPageRenderer {
    pub fn new<S: Into<String>>(pages: impl IntoIterator<Item = S>) -> Self {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }

    /// `count` scanned pages without a text layer.
    pub fn scanned(count: usize) -> Self {
        Self {
            pages: vec![String::new(); count],
        }
    }

    fn check(&self, page_number: usize) -> Result<(), ExtractionError> {
        if page_number < self.pages.len() {
            Ok(())
        } else {
            Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Page {page_number} out of range (mock has {} pages)", self.pages.len()),
            })
        }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.pages.len())
    }

    fn page_text(&self, _pdf_bytes: &[u8], page_number: usize) -> Result<String, ExtractionError> {
        self.check(page_number)?;
        Ok(self.pages[page_number].clone())
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        self.check(page_number)?;
        white_page_png()
    }
}

/// A plain white page, large enough to pass image validation.
fn white_page_png() -> Result<Vec<u8>, ExtractionError> {
    super::preprocess::encode_png(&image::GrayImage::from_pixel(128, 128, image::Luma([255u8])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_at_default_dpi() {
        let (w, h) = compute_render_dimensions(595.0, 842.0, DEFAULT_RENDER_DPI);
        // 595pt * 300/72 ~ 2479, 842pt ~ 3508
        assert!((2470..2490).contains(&w), "width {w}");
        assert!((3500..3520).contains(&h), "height {h}");
    }

    #[test]
    fn oversized_page_capped_with_ratio_kept() {
        let (w, h) = compute_render_dimensions(5000.0, 10000.0, DEFAULT_RENDER_DPI);
        assert_eq!(h, MAX_DIMENSION_PX);
        let ratio = h as f32 / w as f32;
        assert!((ratio - 2.0).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn degenerate_page_is_at_least_one_pixel() {
        assert_eq!(compute_render_dimensions(0.0, 0.0, 300), (1, 1));
        let (_, h) = compute_render_dimensions(40000.0, 1.0, 300);
        assert!(h >= 1);
    }

    #[test]
    fn page_index_rejects_huge_numbers() {
        assert!(page_index(70_000).is_err());
        assert_eq!(page_index(3).unwrap(), 3);
    }

    #[test]
    fn mock_serves_text_layer_per_page() {
        let mock = MockPdfPageRenderer::new(["Glucose 5.1", ""]);
        assert_eq!(mock.page_count(&[]).unwrap(), 2);
        assert_eq!(mock.page_text(&[], 0).unwrap(), "Glucose 5.1");
        assert!(mock.page_text(&[], 1).unwrap().is_empty());
    }

    #[test]
    fn mock_renders_decodable_png() {
        let png = MockPdfPageRenderer::scanned(1).render_page(&[], 0, 300).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
        assert!(image::load_from_memory(&png).is_ok());
    }

    #[test]
    fn mock_out_of_range_page() {
        let err = MockPdfPageRenderer::scanned(2).render_page(&[], 2, 300).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfRendering { page: 2, .. }));
    }
}
