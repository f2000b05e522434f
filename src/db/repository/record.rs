use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, get_biomarkers_for_record, parse_date, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_record(
    conn: &Connection,
    id: &Uuid,
    created_at: &NaiveDateTime,
    record: &ExtractedRecord,
    warnings: &[ProcessingWarning],
) -> Result<(), DatabaseError> {
    let warnings_json = serde_json::to_string(warnings)?;
    let patient = &record.patient;

    conn.execute(
        "INSERT INTO records (id, source_filename, study_date, surname, surname_key, name,
         patronymic, patient_number, date_of_birth, warnings, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id.to_string(),
            record.source_filename,
            record.study_date.map(|d| d.to_string()),
            patient.surname,
            patient.surname.as_ref().map(|s| s.to_lowercase()),
            patient.name,
            patient.patronymic,
            patient.number,
            patient.date_of_birth.map(|d| d.to_string()),
            warnings_json,
            format_datetime(created_at),
        ],
    )?;
    Ok(())
}

pub fn get_record(conn: &Connection, id: &Uuid) -> Result<Option<StoredRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, created_at, source_filename, study_date, surname, name, patronymic,
             patient_number, date_of_birth, warnings
             FROM records WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(RecordRow {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    source_filename: row.get(2)?,
                    study_date: row.get(3)?,
                    surname: row.get(4)?,
                    name: row.get(5)?,
                    patronymic: row.get(6)?,
                    patient_number: row.get(7)?,
                    date_of_birth: row.get(8)?,
                    warnings: row.get(9)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id = parse_uuid(&row.id)?;
    let warnings: Vec<ProcessingWarning> = serde_json::from_str(&row.warnings)?;

    Ok(Some(StoredRecord {
        id,
        created_at: parse_datetime(&row.created_at)?,
        source_filename: row.source_filename,
        study_date: parse_date(row.study_date)?,
        patient: PatientInfo {
            surname: row.surname,
            name: row.name,
            patronymic: row.patronymic,
            number: row.patient_number,
            date_of_birth: parse_date(row.date_of_birth)?,
        },
        biomarkers: get_biomarkers_for_record(conn, &id)?,
        warnings,
    }))
}

pub fn delete_record(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute("DELETE FROM records WHERE id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "record".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Page of record summaries matching `filter`, sorted per `options`.
pub fn list_records(
    conn: &Connection,
    filter: &RecordFilter,
    options: &ListOptions,
) -> Result<Vec<RecordSummary>, DatabaseError> {
    let (where_sql, mut values) = filter_clause(filter);
    let order = options.order.as_sql();
    let sort_column = match options.sort {
        RecordSortField::StudyDate => "r.study_date",
        RecordSortField::CreatedAt => "r.created_at",
        RecordSortField::Surname => "r.surname_key",
        RecordSortField::PatientNumber => "r.patient_number",
    };

    let sql = format!(
        "SELECT r.id, r.created_at, r.source_filename, r.study_date, r.surname, r.patient_number,
         (SELECT COUNT(*) FROM biomarkers b WHERE b.record_id = r.id),
         (SELECT COUNT(*) FROM biomarkers b WHERE b.record_id = r.id AND b.is_abnormal = 1)
         FROM records r{where_sql}
         ORDER BY {sort_column} {order}, r.created_at {order}
         LIMIT ? OFFSET ?"
    );
    values.push(Box::new(options.limit as i64));
    values.push(Box::new(options.offset as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        |row| {
            Ok(SummaryRow {
                id: row.get(0)?,
                created_at: row.get(1)?,
                source_filename: row.get(2)?,
                study_date: row.get(3)?,
                surname: row.get(4)?,
                patient_number: row.get(5)?,
                biomarker_count: row.get(6)?,
                abnormal_count: row.get(7)?,
            })
        },
    )?;

    let mut summaries = Vec::new();
    for row in rows {
        let row = row?;
        summaries.push(RecordSummary {
            id: parse_uuid(&row.id)?,
            created_at: parse_datetime(&row.created_at)?,
            source_filename: row.source_filename,
            study_date: parse_date(row.study_date)?,
            surname: row.surname,
            patient_number: row.patient_number,
            biomarker_count: row.biomarker_count.max(0) as usize,
            abnormal_count: row.abnormal_count.max(0) as usize,
        });
    }
    Ok(summaries)
}

pub fn count_records(conn: &Connection, filter: &RecordFilter) -> Result<usize, DatabaseError> {
    let (where_sql, values) = filter_clause(filter);
    let sql = format!("SELECT COUNT(*) FROM records r{where_sql}");
    let count: i64 = conn.query_row(
        &sql,
        rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        |row| row.get(0),
    )?;
    Ok(count.max(0) as usize)
}

/// Build the WHERE clause for a filter. Every value is bound, never inlined.
fn filter_clause(filter: &RecordFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(from) = filter.date_from {
        conditions.push("r.study_date >= ?");
        values.push(Box::new(from.to_string()));
    }
    if let Some(to) = filter.date_to {
        conditions.push("r.study_date <= ?");
        values.push(Box::new(to.to_string()));
    }
    if let Some(surname) = filter.surname.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("r.surname_key LIKE ?");
        values.push(Box::new(format!("%{}%", surname.to_lowercase())));
    }
    if let Some(number) = filter.patient_number.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("r.patient_number = ?");
        values.push(Box::new(number.to_string()));
    }
    match (filter.biomarker, filter.abnormal_only) {
        (Some(kind), true) => {
            conditions.push(
                "EXISTS (SELECT 1 FROM biomarkers b WHERE b.record_id = r.id AND b.kind = ? AND b.is_abnormal = 1)",
            );
            values.push(Box::new(kind.as_str()));
        }
        (Some(kind), false) => {
            conditions.push("EXISTS (SELECT 1 FROM biomarkers b WHERE b.record_id = r.id AND b.kind = ?)");
            values.push(Box::new(kind.as_str()));
        }
        (None, true) => {
            conditions.push("EXISTS (SELECT 1 FROM biomarkers b WHERE b.record_id = r.id AND b.is_abnormal = 1)");
        }
        (None, false) => {}
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

// Internal row types
struct RecordRow {
    id: String,
    created_at: String,
    source_filename: String,
    study_date: Option<String>,
    surname: Option<String>,
    name: Option<String>,
    patronymic: Option<String>,
    patient_number: Option<String>,
    date_of_birth: Option<String>,
    warnings: String,
}

struct SummaryRow {
    id: String,
    created_at: String,
    source_filename: String,
    study_date: Option<String>,
    surname: Option<String>,
    patient_number: Option<String>,
    biomarker_count: i64,
    abnormal_count: i64,
}
