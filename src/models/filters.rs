use chrono::NaiveDate;

use super::enums::{BiomarkerKind, RecordSortField, SortOrder};

/// Search criteria for stored records. All fields combine with AND.
#[derive(Debug, Default, Clone)]
pub struct RecordFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive substring of the surname.
    pub surname: Option<String>,
    pub patient_number: Option<String>,
    pub biomarker: Option<BiomarkerKind>,
    pub abnormal_only: bool,
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub sort: RecordSortField,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            sort: RecordSortField::default(),
            order: SortOrder::default(),
            limit: 20,
            offset: 0,
        }
    }
}

/// Patient selector for trend queries. `None` fields match anything.
#[derive(Debug, Default, Clone)]
pub struct PatientSelector {
    pub surname: Option<String>,
    pub number: Option<String>,
}
