//! Single-document entry point: recognize → extract → assemble.
//!
//! Engines are injected through the `TextRecognizer`, so the processor is
//! fully testable with mock OCR and PDF implementations.

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::config::RuntimeConfig;
use crate::models::{ExtractedRecord, ExtractionMethod, ProcessingWarning};
use crate::pipeline::extraction::{
    BinarizingNormalizer, Document, ExtractionError, OcrEngine, PdfPageRenderer, PdfiumRenderer,
    TextRecognizer,
};
use crate::pipeline::structuring::{assemble, extract_candidates, extract_patient, extract_study_date};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Assembled record plus everything non-fatal that happened on the way.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutput {
    pub record: ExtractedRecord,
    /// Recognition warnings first, then assembly warnings.
    pub warnings: Vec<ProcessingWarning>,
    pub method: ExtractionMethod,
    /// Mean engine confidence, 0.0-1.0.
    pub recognition_confidence: f32,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Processes one document end to end. Holds no per-document state, so one
/// instance can be shared by every batch worker.
pub struct DocumentProcessor {
    recognizer: TextRecognizer,
    /// Fixed "today" for date plausibility; the local date when unset.
    reference_date: Option<NaiveDate>,
}

impl DocumentProcessor {
    pub fn new(recognizer: TextRecognizer) -> Self {
        Self {
            recognizer,
            reference_date: None,
        }
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Fails only when no text can be recognized. Everything after that,
    /// including a document without a single biomarker, yields a record.
    pub fn process(&self, document: &Document) -> Result<ProcessingOutput, ExtractionError> {
        let recognized = self.recognizer.recognize(document)?;
        let lines = recognized.as_slice();

        let candidates = extract_candidates(lines);
        let date = extract_study_date(lines, self.today());
        let patient = extract_patient(lines);

        let (record, assembly_warnings) = assemble(&document.filename, candidates, date, patient);

        let mut warnings = recognized.warnings.clone();
        warnings.extend(assembly_warnings);

        tracing::info!(
            filename = %document.filename,
            biomarkers = record.biomarkers.len(),
            study_date = ?record.study_date,
            warnings = warnings.len(),
            "Document processed"
        );

        Ok(ProcessingOutput {
            record,
            warnings,
            method: recognized.method,
            recognition_confidence: recognized.confidence,
        })
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build a `DocumentProcessor` with production engines.
///
/// - OCR: `TesseractEngine` (feature-gated) or `UnavailableOcrEngine`
/// - PDF: `PdfiumRenderer` when the library can be bound, else disabled
pub fn build_processor(config: &RuntimeConfig) -> DocumentProcessor {
    let pdf: Option<Box<dyn PdfPageRenderer>> = match PdfiumRenderer::new() {
        Ok(renderer) => Some(Box::new(renderer)),
        Err(e) => {
            tracing::warn!(error = %e, "PDFium not available, PDF input disabled");
            None
        }
    };

    let recognizer = TextRecognizer::new(
        Box::new(BinarizingNormalizer::default()),
        build_ocr_engine(config),
        pdf,
    );
    DocumentProcessor::new(recognizer)
}

/// Build the OCR engine, respecting feature flags.
fn build_ocr_engine(config: &RuntimeConfig) -> Box<dyn OcrEngine> {
    #[cfg(feature = "ocr")]
    {
        match crate::pipeline::extraction::TesseractEngine::new(
            config.tessdata_dir.as_deref(),
            &config.ocr_languages,
        ) {
            Ok(engine) => return Box::new(engine),
            Err(e) => tracing::warn!(error = %e, "Tesseract unavailable, images will fail"),
        }
    }
    #[cfg(not(feature = "ocr"))]
    tracing::info!(
        languages = %config.ocr_languages,
        "Built without OCR support, image input disabled"
    );

    Box::new(crate::pipeline::extraction::UnavailableOcrEngine)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BiomarkerKind, DocumentKind, ReferenceRange};
    use crate::pipeline::extraction::{FailureKind, MockOcrEngine, MockPdfPageRenderer};

    const SCENARIO: &str = "Patient: Smith 12345\n\
                            Date of collection: 15.03.2024\n\
                            Cholesterol 5.2 mmol/L  (3.0-5.5)\n\
                            Glucose 6.8 mmol/L (3.9-5.5)\n";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn processor_with(ocr: MockOcrEngine, pdf: Option<MockPdfPageRenderer>) -> DocumentProcessor {
        let recognizer = TextRecognizer::new(
            Box::new(BinarizingNormalizer::default()),
            Box::new(ocr),
            pdf.map(|p| Box::new(p) as Box<dyn PdfPageRenderer>),
        );
        DocumentProcessor::new(recognizer).with_reference_date(today())
    }

    fn text_processor() -> DocumentProcessor {
        processor_with(MockOcrEngine::new("", 0.0), None)
    }

    fn check_scenario(output: &ProcessingOutput) {
        let record = &output.record;
        assert_eq!(record.study_date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(record.patient.surname.as_deref(), Some("Smith"));
        assert_eq!(record.patient.number.as_deref(), Some("12345"));
        assert_eq!(record.biomarkers.len(), 2);

        let chol = record.biomarker(BiomarkerKind::TotalCholesterol).unwrap();
        assert_eq!(chol.value, 5.2);
        assert_eq!(chol.unit, "mmol/L");
        assert_eq!(chol.reference_range, Some(ReferenceRange::between(3.0, 5.5)));
        assert!(!chol.low_confidence);

        let glucose = record.biomarker(BiomarkerKind::Glucose).unwrap();
        assert_eq!(glucose.value, 6.8);
        assert_eq!(glucose.unit, "mmol/L");
        assert_eq!(glucose.reference_range, Some(ReferenceRange::between(3.9, 5.5)));
        assert!(!glucose.low_confidence);
    }

    #[test]
    fn plain_text_report_end_to_end() {
        let output = text_processor()
            .process(&Document::plain_text("report.txt", SCENARIO))
            .unwrap();
        check_scenario(&output);
        assert_eq!(output.method, ExtractionMethod::PlainTextRead);
        assert!(output.warnings.is_empty(), "{:?}", output.warnings);
        assert_eq!(output.record.source_filename, "report.txt");
    }

    #[test]
    fn scanned_report_end_to_end() {
        let processor = processor_with(MockOcrEngine::new(SCENARIO, 0.87), None);
        let png = crate::pipeline::extraction::encode_png(&image::GrayImage::from_pixel(
            200,
            200,
            image::Luma([255u8]),
        ))
        .unwrap();
        let output = processor
            .process(&Document::new("scan.png", DocumentKind::Image, png))
            .unwrap();
        check_scenario(&output);
        assert_eq!(output.method, ExtractionMethod::TesseractOcr);
        assert!((output.recognition_confidence - 0.87).abs() < 1e-6);
    }

    #[test]
    fn digital_pdf_end_to_end() {
        let processor = processor_with(
            MockOcrEngine::new("", 0.0),
            Some(MockPdfPageRenderer::new([SCENARIO])),
        );
        let output = processor
            .process(&Document::new("report.pdf", DocumentKind::Pdf, b"%PDF-1.7".to_vec()))
            .unwrap();
        check_scenario(&output);
        assert_eq!(output.method, ExtractionMethod::PdfDirect);
    }

    #[test]
    fn report_without_biomarkers_is_not_an_error() {
        let output = text_processor()
            .process(&Document::plain_text("letter.txt", "Dear colleague,\nsee attached.\n"))
            .unwrap();
        assert!(output.record.biomarkers.is_empty());
        assert_eq!(output.warnings, vec![ProcessingWarning::EmptyExtraction]);
    }

    #[test]
    fn conflicting_creatinine_keeps_plausible_value() {
        let text = "Creatinine 8400 µmol/L\nКреатинин 84 мкмоль/л\n";
        let output = text_processor()
            .process(&Document::plain_text("dup.txt", text))
            .unwrap();
        let kept = output.record.biomarker(BiomarkerKind::Creatinine).unwrap();
        assert_eq!(kept.value, 84.0);
        assert!(!kept.low_confidence);
    }

    #[test]
    fn unlabeled_date_warns_ambiguous() {
        let text = "Лаборатория 12.03.2024\nГлюкоза 5,4 ммоль/л\n";
        let output = text_processor()
            .process(&Document::plain_text("a.txt", text))
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        assert_eq!(output.record.study_date, Some(date));
        assert!(output
            .warnings
            .contains(&ProcessingWarning::AmbiguousDate { selected: date }));
    }

    #[test]
    fn corrupt_image_is_preprocessing_failure() {
        let err = text_processor()
            .process(&Document::new("3.jpg", DocumentKind::Image, b"\xFF\xD8 garbage".to_vec()))
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Preprocessing);
    }

    #[test]
    fn blank_ocr_is_recognition_failure() {
        let processor = processor_with(MockOcrEngine::new("", 0.0), None);
        let png = crate::pipeline::extraction::encode_png(&image::GrayImage::from_pixel(
            200,
            200,
            image::Luma([255u8]),
        ))
        .unwrap();
        let err = processor
            .process(&Document::new("blank.png", DocumentKind::Image, png))
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Recognition);
    }

    #[test]
    fn output_serializes() {
        let output = text_processor()
            .process(&Document::plain_text("report.txt", SCENARIO))
            .unwrap();
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"source_filename\":\"report.txt\""));
        assert!(json.contains("mmol/L"));
    }
}
