use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_date, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

/// Abnormality against the printed reference range. Computed only here, at
/// storage time; values without a printed range are never abnormal.
pub fn is_abnormal(biomarker: &FinalizedBiomarker) -> bool {
    biomarker
        .reference_range
        .is_some_and(|range| range.is_outside(biomarker.value))
}

pub fn insert_biomarker(
    conn: &Connection,
    record_id: &Uuid,
    biomarker: &FinalizedBiomarker,
) -> Result<(), DatabaseError> {
    let range = biomarker.reference_range;
    conn.execute(
        "INSERT INTO biomarkers (record_id, kind, value, unit, reference_low, reference_high,
         is_abnormal, low_confidence, line_index)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record_id.to_string(),
            biomarker.kind.as_str(),
            biomarker.value,
            biomarker.unit,
            range.and_then(|r| r.low),
            range.and_then(|r| r.high),
            is_abnormal(biomarker),
            biomarker.low_confidence,
            biomarker.line_index as i64,
        ],
    )?;
    Ok(())
}

pub fn get_biomarkers_for_record(
    conn: &Connection,
    record_id: &Uuid,
) -> Result<Vec<StoredBiomarker>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT kind, value, unit, reference_low, reference_high, is_abnormal,
         low_confidence, line_index
         FROM biomarkers WHERE record_id = ?1",
    )?;

    let rows = stmt.query_map(params![record_id.to_string()], |row| {
        Ok(BiomarkerRow {
            kind: row.get(0)?,
            value: row.get(1)?,
            unit: row.get(2)?,
            reference_low: row.get(3)?,
            reference_high: row.get(4)?,
            is_abnormal: row.get(5)?,
            low_confidence: row.get(6)?,
            line_index: row.get(7)?,
        })
    })?;

    let mut biomarkers = Vec::new();
    for row in rows {
        biomarkers.push(biomarker_from_row(row?)?);
    }
    // Enum order, not alphabetical id order.
    biomarkers.sort_by_key(|b| b.biomarker.kind);
    Ok(biomarkers)
}

/// Trend of one biomarker across records, oldest study first.
/// Records without a study date sort last, by insertion time.
pub fn get_biomarker_history(
    conn: &Connection,
    kind: BiomarkerKind,
    patient: &PatientSelector,
) -> Result<Vec<HistoryPoint>, DatabaseError> {
    let mut sql = String::from(
        "SELECT r.id, r.study_date, b.value, b.unit, b.reference_low, b.reference_high,
         b.is_abnormal, b.low_confidence
         FROM biomarkers b JOIN records r ON r.id = b.record_id
         WHERE b.kind = ?",
    );
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(kind.as_str())];

    if let Some(surname) = &patient.surname {
        sql.push_str(" AND r.surname_key = ?");
        values.push(Box::new(surname.trim().to_lowercase()));
    }
    if let Some(number) = &patient.number {
        sql.push_str(" AND r.patient_number = ?");
        values.push(Box::new(number.trim().to_string()));
    }
    sql.push_str(" ORDER BY r.study_date IS NULL, r.study_date ASC, r.created_at ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        |row| {
            Ok(HistoryRow {
                record_id: row.get(0)?,
                study_date: row.get(1)?,
                value: row.get(2)?,
                unit: row.get(3)?,
                reference_low: row.get(4)?,
                reference_high: row.get(5)?,
                is_abnormal: row.get(6)?,
                low_confidence: row.get(7)?,
            })
        },
    )?;

    let mut points = Vec::new();
    for row in rows {
        let row = row?;
        points.push(HistoryPoint {
            record_id: parse_uuid(&row.record_id)?,
            study_date: parse_date(row.study_date)?,
            value: row.value,
            unit: row.unit,
            reference_range: range_from_bounds(row.reference_low, row.reference_high),
            is_abnormal: row.is_abnormal,
            low_confidence: row.low_confidence,
        });
    }
    Ok(points)
}

// Internal row types
struct BiomarkerRow {
    kind: String,
    value: f64,
    unit: String,
    reference_low: Option<f64>,
    reference_high: Option<f64>,
    is_abnormal: bool,
    low_confidence: bool,
    line_index: i64,
}

struct HistoryRow {
    record_id: String,
    study_date: Option<String>,
    value: f64,
    unit: String,
    reference_low: Option<f64>,
    reference_high: Option<f64>,
    is_abnormal: bool,
    low_confidence: bool,
}

fn biomarker_from_row(row: BiomarkerRow) -> Result<StoredBiomarker, DatabaseError> {
    Ok(StoredBiomarker {
        biomarker: FinalizedBiomarker {
            kind: BiomarkerKind::from_str(&row.kind)?,
            value: row.value,
            unit: row.unit,
            reference_range: range_from_bounds(row.reference_low, row.reference_high),
            line_index: row.line_index.max(0) as usize,
            low_confidence: row.low_confidence,
        },
        is_abnormal: row.is_abnormal,
    })
}

fn range_from_bounds(low: Option<f64>, high: Option<f64>) -> Option<ReferenceRange> {
    if low.is_none() && high.is_none() {
        None
    } else {
        Some(ReferenceRange { low, high })
    }
}
