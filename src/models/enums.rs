use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            /// Every variant in declaration order.
            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Declaration order is the output order of assembled records.
str_enum!(BiomarkerKind {
    TotalCholesterol => "total_cholesterol",
    LdlCholesterol => "ldl_c",
    HdlCholesterol => "hdl_c",
    Triglycerides => "triglycerides",
    Creatinine => "creatinine",
    Urea => "urea",
    UricAcid => "uric_acid",
    Alt => "alt",
    Ast => "ast",
    Cpk => "cpk",
    Crp => "crp",
    TotalBilirubin => "total_bilirubin",
    Potassium => "potassium",
    Sodium => "sodium",
    Glucose => "glucose",
    GlycatedHemoglobin => "glycated_hemoglobin",
    Tsh => "tsh",
    T4 => "t4",
});

str_enum!(DocumentKind {
    Image => "image",
    Pdf => "pdf",
    PlainText => "plain_text",
});

str_enum!(ExtractionMethod {
    PdfDirect => "pdf_direct",
    TesseractOcr => "tesseract_ocr",
    PlainTextRead => "plain_text_read",
    Mixed => "mixed",
});

str_enum!(DateSource {
    Labeled => "labeled",
    Positional => "positional",
});

str_enum!(RecordSortField {
    StudyDate => "study_date",
    CreatedAt => "created_at",
    Surname => "surname",
    PatientNumber => "patient_number",
});

str_enum!(SortOrder {
    Asc => "asc",
    Desc => "desc",
});

impl BiomarkerKind {
    /// Human-readable label for reports and CLI output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TotalCholesterol => "Total cholesterol",
            Self::LdlCholesterol => "LDL cholesterol",
            Self::HdlCholesterol => "HDL cholesterol",
            Self::Triglycerides => "Triglycerides",
            Self::Creatinine => "Creatinine",
            Self::Urea => "Urea",
            Self::UricAcid => "Uric acid",
            Self::Alt => "ALT",
            Self::Ast => "AST",
            Self::Cpk => "CPK",
            Self::Crp => "C-reactive protein",
            Self::TotalBilirubin => "Total bilirubin",
            Self::Potassium => "Potassium",
            Self::Sodium => "Sodium",
            Self::Glucose => "Glucose",
            Self::GlycatedHemoglobin => "HbA1c",
            Self::Tsh => "TSH",
            Self::T4 => "Free T4",
        }
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Desc
    }
}

impl Default for RecordSortField {
    fn default() -> Self {
        Self::StudyDate
    }
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn biomarker_kind_round_trips_through_str() {
        for kind in BiomarkerKind::all() {
            assert_eq!(BiomarkerKind::from_str(kind.as_str()).unwrap(), *kind);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = BiomarkerKind::from_str("vitamin_d").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
        assert!(err.to_string().contains("vitamin_d"));
    }

    #[test]
    fn biomarker_order_follows_declaration() {
        assert!(BiomarkerKind::TotalCholesterol < BiomarkerKind::Glucose);
        assert!(BiomarkerKind::Glucose < BiomarkerKind::T4);
        assert_eq!(BiomarkerKind::all().len(), 18);
    }

    #[test]
    fn display_uses_canonical_identifier() {
        assert_eq!(BiomarkerKind::LdlCholesterol.to_string(), "ldl_c");
        assert_eq!(DocumentKind::PlainText.to_string(), "plain_text");
    }

    #[test]
    fn sort_defaults_newest_study_first() {
        assert_eq!(RecordSortField::default(), RecordSortField::StudyDate);
        assert_eq!(SortOrder::default().as_sql(), "DESC");
    }
}
