use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::date::DateSelection;
use super::entity::BiomarkerCandidate;
use crate::models::{
    BiomarkerKind, DateSource, ExtractedRecord, FinalizedBiomarker, PatientInfo, ProcessingWarning,
};

/// Merge one document's candidates, date and patient fields into a record.
///
/// One biomarker per kind survives, output in kind order. Warnings cover
/// retained low-confidence values, a positionally chosen date, and a
/// document with no biomarker mention at all.
pub fn assemble(
    filename: &str,
    candidates: Vec<BiomarkerCandidate>,
    date: Option<DateSelection>,
    patient: PatientInfo,
) -> (ExtractedRecord, Vec<ProcessingWarning>) {
    let mut warnings = Vec::new();
    let total = candidates.len();

    let mut best: BTreeMap<BiomarkerKind, BiomarkerCandidate> = BTreeMap::new();
    for candidate in candidates {
        match best.get(&candidate.kind) {
            Some(kept) if !prefer(&candidate, kept) => {}
            _ => {
                best.insert(candidate.kind, candidate);
            }
        }
    }

    let biomarkers: Vec<FinalizedBiomarker> = best
        .into_values()
        .map(|c| {
            let low_confidence = c.is_low_confidence();
            if low_confidence {
                warnings.push(ProcessingWarning::LowConfidenceValue {
                    biomarker: c.kind,
                    value: c.value,
                });
            }
            FinalizedBiomarker {
                kind: c.kind,
                value: c.value,
                unit: c.unit.map(|u| u.as_str().to_string()).unwrap_or_default(),
                reference_range: c.reference_range,
                line_index: c.line_index,
                low_confidence,
            }
        })
        .collect();

    if let Some(selection) = &date {
        if selection.source == DateSource::Positional {
            warnings.push(ProcessingWarning::AmbiguousDate {
                selected: selection.date,
            });
        }
    }

    if total == 0 {
        warnings.push(ProcessingWarning::EmptyExtraction);
    }

    tracing::debug!(
        filename,
        candidates = total,
        biomarkers = biomarkers.len(),
        warnings = warnings.len(),
        "Record assembled"
    );

    let record = ExtractedRecord {
        source_filename: filename.to_string(),
        study_date: date.map(|d| d.date),
        patient,
        biomarkers,
    };
    (record, warnings)
}

/// Whether `challenger` replaces `kept`: higher confidence, then within
/// plausible bounds, then earlier in the document.
fn prefer(challenger: &BiomarkerCandidate, kept: &BiomarkerCandidate) -> bool {
    let order = challenger
        .confidence
        .cmp(&kept.confidence)
        .then(challenger.in_bounds.cmp(&kept.in_bounds))
        .then(
            (kept.line_index, kept.column).cmp(&(challenger.line_index, challenger.column)),
        );
    order == Ordering::Greater
}
