use tracing::{debug, info, warn};

use super::layout::{assemble_lines, lines_from_text};
use super::pdfium::DEFAULT_RENDER_DPI;
use super::preprocess::ImageNormalizer;
use super::types::{Document, OcrEngine, PdfPageRenderer, RecognizedLine, RecognizedText};
use super::ExtractionError;
use crate::models::{DocumentKind, ExtractionMethod, ProcessingWarning};

/// A PDF page whose text layer has fewer non-whitespace characters than
/// this is treated as scanned and recognized from its rendering.
pub const MIN_TEXT_LAYER_CHARS: usize = 20;

/// Turns a document into recognized lines: plain text is read as is,
/// images go through normalization and OCR, PDFs are handled per page.
pub struct TextRecognizer {
    normalizer: Box<dyn ImageNormalizer>,
    ocr: Box<dyn OcrEngine>,
    pdf: Option<Box<dyn PdfPageRenderer>>,
    render_dpi: u32,
}

/// Lines and warnings from one recognized page.
struct PageRecognition {
    lines: Vec<RecognizedLine>,
    confidence: f32,
    warnings: Vec<ProcessingWarning>,
}

impl TextRecognizer {
    /// `pdf = None` disables PDF input; such documents fail with
    /// `PdfRendering`.
    pub fn new(
        normalizer: Box<dyn ImageNormalizer>,
        ocr: Box<dyn OcrEngine>,
        pdf: Option<Box<dyn PdfPageRenderer>>,
    ) -> Self {
        Self {
            normalizer,
            ocr,
            pdf,
            render_dpi: DEFAULT_RENDER_DPI,
        }
    }

    pub fn with_render_dpi(mut self, dpi: u32) -> Self {
        self.render_dpi = dpi;
        self
    }

    pub fn recognize(&self, document: &Document) -> Result<RecognizedText, ExtractionError> {
        let text = match document.kind {
            DocumentKind::PlainText => self.recognize_plain_text(&document.bytes)?,
            DocumentKind::Image => {
                let page = self.recognize_image(&document.bytes, 0, 0)?;
                RecognizedText::new(
                    ExtractionMethod::TesseractOcr,
                    page.confidence,
                    1,
                    page.lines,
                    page.warnings,
                )
            }
            DocumentKind::Pdf => self.recognize_pdf(&document.bytes)?,
        };

        info!(
            filename = %document.filename,
            method = %text.method,
            lines = text.line_count(),
            confidence = text.confidence,
            "Text recognized"
        );
        Ok(text)
    }

    fn recognize_plain_text(&self, bytes: &[u8]) -> Result<RecognizedText, ExtractionError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractionError::EncodingError(format!("Input is not UTF-8: {e}")))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Ok(RecognizedText::new(
            ExtractionMethod::PlainTextRead,
            1.0,
            1,
            lines_from_text(text, 0, 0),
            Vec::new(),
        ))
    }

    fn recognize_image(
        &self,
        bytes: &[u8],
        page_number: usize,
        first_index: usize,
    ) -> Result<PageRecognition, ExtractionError> {
        let normalized = self.normalizer.normalize(bytes)?;
        let warnings = normalized
            .quality
            .issues
            .iter()
            .map(|reason| ProcessingWarning::PoorImageQuality {
                page: page_number,
                reason: reason.clone(),
            })
            .collect();

        let result = self.ocr.ocr_image(&normalized.png)?;
        if result.text.trim().is_empty() || result.confidence <= 0.0 {
            return Err(ExtractionError::NoTextRecognized(format!(
                "page {page_number}: engine returned no confident text"
            )));
        }

        let lines = assemble_lines(&result, page_number, first_index);
        if lines.is_empty() {
            return Err(ExtractionError::NoTextRecognized(format!(
                "page {page_number}: nothing left after cleanup"
            )));
        }

        debug!(
            page = page_number,
            fragments = result.fragments.len(),
            lines = lines.len(),
            confidence = result.confidence,
            "OCR page assembled"
        );
        Ok(PageRecognition {
            lines,
            confidence: result.confidence,
            warnings,
        })
    }

    fn recognize_pdf(&self, bytes: &[u8]) -> Result<RecognizedText, ExtractionError> {
        let renderer = self.pdf.as_deref().ok_or_else(|| ExtractionError::PdfRendering {
            page: 0,
            reason: "PDF support is not available (PDFium not loaded)".into(),
        })?;

        let page_count = renderer.page_count(bytes)?;
        if page_count == 0 {
            return Err(ExtractionError::PdfRendering {
                page: 0,
                reason: "document has no pages".into(),
            });
        }

        let mut lines: Vec<RecognizedLine> = Vec::new();
        let mut warnings = Vec::new();
        let mut confidences = Vec::new();
        let (mut direct_pages, mut ocr_pages) = (0usize, 0usize);
        let mut last_error = None;

        for page in 0..page_count {
            // An unreadable text layer falls through to render + OCR.
            let layer = renderer.page_text(bytes, page).unwrap_or_else(|e| {
                warn!(page, error = %e, "PDF text layer unreadable");
                String::new()
            });
            let layer_chars = layer.chars().filter(|c| !c.is_whitespace()).count();

            if layer_chars >= MIN_TEXT_LAYER_CHARS {
                let page_lines = lines_from_text(&layer, page, lines.len());
                debug!(page, lines = page_lines.len(), "Read PDF text layer");
                lines.extend(page_lines);
                confidences.push(1.0);
                direct_pages += 1;
                continue;
            }

            let recognized = renderer
                .render_page(bytes, page, self.render_dpi)
                .and_then(|png| self.recognize_image(&png, page, lines.len()));
            match recognized {
                Ok(result) => {
                    lines.extend(result.lines);
                    warnings.extend(result.warnings);
                    confidences.push(result.confidence);
                    ocr_pages += 1;
                }
                Err(e) => {
                    warn!(page, error = %e, "PDF page yielded no text");
                    warnings.push(ProcessingWarning::PoorImageQuality {
                        page,
                        reason: format!("no text recognized: {e}"),
                    });
                    last_error = Some(e);
                }
            }
        }

        if lines.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ExtractionError::NoTextRecognized("no page of the PDF contains text".into())
            }));
        }

        let method = match (direct_pages, ocr_pages) {
            (_, 0) => ExtractionMethod::PdfDirect,
            (0, _) => ExtractionMethod::TesseractOcr,
            _ => ExtractionMethod::Mixed,
        };
        let confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;

        Ok(RecognizedText::new(method, confidence, page_count, lines, warnings))
    }
}
