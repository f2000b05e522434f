pub mod types;
pub mod format;
pub mod sanitize;
pub mod preprocess;
pub mod ocr;
pub mod layout;
pub mod pdfium;
pub mod recognizer;

pub use types::*;
pub use format::*;
pub use sanitize::*;
pub use preprocess::*;
pub use ocr::*;
pub use layout::*;
pub use pdfium::*;
pub use recognizer::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal, per-document extraction failures. None of these are retried:
/// corrupt input and deterministic OCR give the same result twice.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Text encoding error: {0}")]
    EncodingError(String),

    #[error("Unsupported format for extraction")]
    UnsupportedFormat,

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("No text recognized: {0}")]
    NoTextRecognized(String),
}

/// Caller-facing classification of a fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unreadable or corrupt input.
    Preprocessing,
    /// Recognition engine error or empty output.
    Recognition,
}

impl ExtractionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Io(_)
            | Self::Preprocessing(_)
            | Self::EncodingError(_)
            | Self::UnsupportedFormat
            | Self::PdfRendering { .. }
            | Self::PdfEncrypted => FailureKind::Preprocessing,
            Self::OcrInit(_) | Self::OcrProcessing(_) | Self::NoTextRecognized(_) => {
                FailureKind::Recognition
            }
        }
    }
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocessing => "preprocessing_failure",
            Self::Recognition => "recognition_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_input_is_preprocessing_failure() {
        let err = ExtractionError::Preprocessing("bad header".into());
        assert_eq!(err.failure_kind(), FailureKind::Preprocessing);
        assert_eq!(
            ExtractionError::UnsupportedFormat.failure_kind(),
            FailureKind::Preprocessing
        );
    }

    #[test]
    fn engine_problems_are_recognition_failures() {
        assert_eq!(
            ExtractionError::NoTextRecognized("blank".into()).failure_kind(),
            FailureKind::Recognition
        );
        assert_eq!(
            ExtractionError::OcrInit("no tessdata".into()).failure_kind(),
            FailureKind::Recognition
        );
    }

    #[test]
    fn failure_kind_labels() {
        assert_eq!(FailureKind::Preprocessing.as_str(), "preprocessing_failure");
        assert_eq!(FailureKind::Recognition.as_str(), "recognition_failure");
    }
}
