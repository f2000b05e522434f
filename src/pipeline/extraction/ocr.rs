use super::types::{BoundingBox, OcrEngine, OcrPageResult, OcrWordResult};
use super::ExtractionError;

/// Tesseract OCR engine via `leptess`.
/// Only available when compiled with the `ocr` feature flag.
///
/// `LepTess` is not `Sync`, so a fresh instance is created per page; the
/// traineddata files are memory-mapped and cached by the OS after first load.
#[cfg(feature = "ocr")]
pub struct TesseractEngine {
    tessdata_dir: Option<std::path::PathBuf>,
    languages: String,
}

#[cfg(feature = "ocr")]
impl TesseractEngine {
    /// Verify Tesseract initializes with `languages` (e.g. "rus+eng").
    /// `tessdata_dir = None` uses the system tessdata location.
    pub fn new(
        tessdata_dir: Option<&std::path::Path>,
        languages: &str,
    ) -> Result<Self, ExtractionError> {
        let engine = Self {
            tessdata_dir: tessdata_dir.map(|p| p.to_path_buf()),
            languages: languages.to_string(),
        };
        engine.init()?;
        tracing::info!(languages = %languages, "Tesseract initialized");
        Ok(engine)
    }

    fn init(&self) -> Result<leptess::LepTess, ExtractionError> {
        let tessdata = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?,
            ),
            None => None,
        };
        leptess::LepTess::new(tessdata, &self.languages).map_err(|e| {
            ExtractionError::OcrInit(format!(
                "Failed to initialize Tesseract with language '{}': {e}. \
                 Make sure the traineddata files are installed",
                self.languages
            ))
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractEngine {
    fn ocr_image(&self, png_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let mut lt = self.init()?;

        // PSM 3: fully automatic page segmentation (multi-column reports).
        lt.set_variable(leptess::Variable::TesseditPagesegMode, "3")
            .map_err(|e| ExtractionError::OcrInit(format!("Failed to set PSM: {e}")))?;

        lt.set_image_from_mem(png_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("Failed to load image: {e}")))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("Text decoding failed: {e}")))?;
        let confidence = lt.mean_text_conf().max(0) as f32 / 100.0;

        // Text-line boxes feed row assembly. None means nothing was found.
        let mut fragments = Vec::new();
        if let Some(boxes) =
            lt.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE, true)
        {
            for bbox in &boxes {
                let geom = bbox.get_geometry();
                lt.set_rectangle(geom.x, geom.y, geom.w, geom.h);

                let line_text = lt.get_utf8_text().unwrap_or_default().trim().to_string();
                if line_text.is_empty() {
                    continue;
                }
                fragments.push(OcrWordResult {
                    text: line_text,
                    confidence: lt.mean_text_conf().max(0) as f32 / 100.0,
                    bounding_box: Some(BoundingBox {
                        x: geom.x.max(0) as u32,
                        y: geom.y.max(0) as u32,
                        width: geom.w.max(0) as u32,
                        height: geom.h.max(0) as u32,
                    }),
                });
            }
        }

        tracing::debug!(
            chars = text.len(),
            fragments = fragments.len(),
            confidence,
            "Tesseract page recognized"
        );

        Ok(OcrPageResult {
            text,
            confidence,
            fragments,
        })
    }
}

/// Stand-in used when the binary is built without the `ocr` feature.
/// Every image fails with a recognition error; text and PDF input still work.
pub struct UnavailableOcrEngine;

impl OcrEngine for UnavailableOcrEngine {
    fn ocr_image(&self, _png_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrInit(
            "built without OCR support (enable the `ocr` feature)".into(),
        ))
    }
}

/// Mock OCR engine for unit testing without Tesseract.
///
/// Each line of `text` becomes one fragment stacked 30px apart,
/// unless explicit fragments are supplied.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
    pub fragments: Option<Vec<OcrWordResult>>,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            fragments: None,
        }
    }

    /// Positioned fragments, e.g. table cells returned out of reading order.
    pub fn with_fragments(fragments: Vec<OcrWordResult>, confidence: f32) -> Self {
        let text = fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            text,
            confidence,
            fragments: Some(fragments),
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _png_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let fragments = match &self.fragments {
            Some(fragments) => fragments.clone(),
            None => self
                .text
                .lines()
                .enumerate()
                .filter(|(_, l)| !l.trim().is_empty())
                .map(|(i, l)| OcrWordResult {
                    text: l.to_string(),
                    confidence: self.confidence,
                    bounding_box: Some(BoundingBox {
                        x: 10,
                        y: 10 + i as u32 * 30,
                        width: (l.chars().count() as u32 * 12).max(1),
                        height: 20,
                    }),
                })
                .collect(),
        };

        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
            fragments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_stacks_lines_top_to_bottom() {
        let engine = MockOcrEngine::new("Glucose 5.4\n\nCholesterol 5.2", 0.9);
        let page = engine.ocr_image(&[]).unwrap();
        assert_eq!(page.fragments.len(), 2);
        let ys: Vec<u32> = page
            .fragments
            .iter()
            .map(|f| f.bounding_box.unwrap().y)
            .collect();
        assert!(ys[0] < ys[1]);
        assert_eq!(page.confidence, 0.9);
    }

    #[test]
    fn unavailable_engine_is_recognition_failure() {
        let err = UnavailableOcrEngine.ocr_image(&[]).unwrap_err();
        assert_eq!(err.failure_kind(), super::super::FailureKind::Recognition);
    }
}
