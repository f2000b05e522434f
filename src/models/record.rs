use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::BiomarkerKind;
use super::warning::ProcessingWarning;

/// Reference interval as printed on the report. Either bound may be absent
/// (`< 5.2` carries only an upper bound).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl ReferenceRange {
    pub fn between(low: f64, high: f64) -> Self {
        Self {
            low: Some(low),
            high: Some(high),
        }
    }

    pub fn upper(high: f64) -> Self {
        Self {
            low: None,
            high: Some(high),
        }
    }

    pub fn lower(low: f64) -> Self {
        Self {
            low: Some(low),
            high: None,
        }
    }

    /// Whether `value` falls outside the printed interval.
    pub fn is_outside(&self, value: f64) -> bool {
        self.low.is_some_and(|low| value < low) || self.high.is_some_and(|high| value > high)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedBiomarker {
    pub kind: BiomarkerKind,
    pub value: f64,
    /// Canonical unit (`mmol/L`), or empty when none was printed.
    pub unit: String,
    pub reference_range: Option<ReferenceRange>,
    /// Line the value was read from.
    pub line_index: usize,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub surname: Option<String>,
    pub name: Option<String>,
    pub patronymic: Option<String>,
    pub number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

impl PatientInfo {
    pub fn is_empty(&self) -> bool {
        self.surname.is_none()
            && self.name.is_none()
            && self.patronymic.is_none()
            && self.number.is_none()
            && self.date_of_birth.is_none()
    }
}

/// One processed document. Biomarkers are unique per kind and ordered by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub source_filename: String,
    pub study_date: Option<NaiveDate>,
    pub patient: PatientInfo,
    pub biomarkers: Vec<FinalizedBiomarker>,
}

impl ExtractedRecord {
    pub fn biomarker(&self, kind: BiomarkerKind) -> Option<&FinalizedBiomarker> {
        self.biomarkers.iter().find(|b| b.kind == kind)
    }
}

// ── Persisted views ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBiomarker {
    pub biomarker: FinalizedBiomarker,
    pub is_abnormal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub created_at: NaiveDateTime,
    pub source_filename: String,
    pub study_date: Option<NaiveDate>,
    pub patient: PatientInfo,
    pub biomarkers: Vec<StoredBiomarker>,
    pub warnings: Vec<ProcessingWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: Uuid,
    pub created_at: NaiveDateTime,
    pub source_filename: String,
    pub study_date: Option<NaiveDate>,
    pub surname: Option<String>,
    pub patient_number: Option<String>,
    pub biomarker_count: usize,
    pub abnormal_count: usize,
}

/// One point in a biomarker trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub record_id: Uuid,
    pub study_date: Option<NaiveDate>,
    pub value: f64,
    pub unit: String,
    pub reference_range: Option<ReferenceRange>,
    pub is_abnormal: bool,
    pub low_confidence: bool,
}
