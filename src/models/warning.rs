use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::BiomarkerKind;

/// Non-fatal conditions that travel with a processed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingWarning {
    /// No biomarker mention anywhere in the document.
    EmptyExtraction,
    LowConfidenceValue { biomarker: BiomarkerKind, value: f64 },
    /// Study date picked by position, no label nearby.
    AmbiguousDate { selected: NaiveDate },
    PoorImageQuality { page: usize, reason: String },
}

impl ProcessingWarning {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyExtraction => "empty_extraction",
            Self::LowConfidenceValue { .. } => "low_confidence_value",
            Self::AmbiguousDate { .. } => "ambiguous_date",
            Self::PoorImageQuality { .. } => "poor_image_quality",
        }
    }
}

impl std::fmt::Display for ProcessingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyExtraction => write!(f, "no biomarkers found, needs manual review"),
            Self::LowConfidenceValue { biomarker, value } => {
                write!(f, "low confidence value for {biomarker}: {value}")
            }
            Self::AmbiguousDate { selected } => {
                write!(f, "study date {selected} chosen without a label")
            }
            Self::PoorImageQuality { page, reason } => {
                write!(f, "page {page}: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let warning = ProcessingWarning::LowConfidenceValue {
            biomarker: BiomarkerKind::Creatinine,
            value: 9000.0,
        };
        let json = serde_json::to_string(&warning).unwrap();
        assert!(json.contains("\"type\":\"low_confidence_value\""));
        let back: ProcessingWarning = serde_json::from_str(&json).unwrap();
        assert_eq!(back, warning);
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ProcessingWarning::EmptyExtraction.code(), "empty_extraction");
        let ambiguous = ProcessingWarning::AmbiguousDate {
            selected: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        };
        assert_eq!(ambiguous.code(), "ambiguous_date");
        assert!(ambiguous.to_string().contains("2024-03-15"));
    }
}
