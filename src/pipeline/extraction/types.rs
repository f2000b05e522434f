use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::models::{DocumentKind, ExtractionMethod, ProcessingWarning};

/// Raw document as handed over by the upload collaborator.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(filename: impl Into<String>, kind: DocumentKind, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            kind,
            bytes,
        }
    }

    /// Plain digital text, bypassing recognition.
    pub fn plain_text(filename: impl Into<String>, text: &str) -> Self {
        Self::new(filename, DocumentKind::PlainText, text.as_bytes().to_vec())
    }

    /// Read a file and detect its kind from magic bytes.
    pub fn from_path(path: &std::path::Path) -> Result<Self, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let kind = super::format::detect_kind(&bytes).ok_or(ExtractionError::UnsupportedFormat)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(filename, kind, bytes))
    }
}

/// One line of recognized text. `index` is the top-to-bottom ordinal across
/// the whole document; `x`/`y` are approximate pixel (or column/row) offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub page: usize,
}

/// Recognized text of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedText {
    pub method: ExtractionMethod,
    /// Mean engine confidence, 0.0-1.0. Digital text is 1.0.
    pub confidence: f32,
    pub page_count: usize,
    pub warnings: Vec<ProcessingWarning>,
    lines: Vec<RecognizedLine>,
}

impl RecognizedText {
    pub fn new(
        method: ExtractionMethod,
        confidence: f32,
        page_count: usize,
        lines: Vec<RecognizedLine>,
        warnings: Vec<ProcessingWarning>,
    ) -> Self {
        Self {
            method,
            confidence,
            page_count,
            warnings,
            lines,
        }
    }

    /// Lines top to bottom. Each call starts a fresh pass.
    pub fn lines(&self) -> std::slice::Iter<'_, RecognizedLine> {
        self.lines.iter()
    }

    pub fn as_slice(&self) -> &[RecognizedLine] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn full_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Bounding box for a recognized region, in pixels of the normalized image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn center_y(&self) -> f32 {
        self.y as f32 + self.height as f32 / 2.0
    }
}

/// A recognized text fragment (word or text line) with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWordResult {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

/// Raw OCR result from the engine
#[derive(Debug, Clone)]
pub struct OcrPageResult {
    pub text: String,
    /// Mean confidence, 0.0-1.0
    pub confidence: f32,
    pub fragments: Vec<OcrWordResult>,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    fn ocr_image(&self, png_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// PDF access: embedded text layer plus page rasterization.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// Embedded text of one page. Empty for scanned pages.
    fn page_text(&self, pdf_bytes: &[u8], page_number: usize) -> Result<String, ExtractionError>;

    /// Render one page to PNG bytes at the given DPI.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}
