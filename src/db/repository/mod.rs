//! Repository layer: record-scoped database operations on a borrowed connection.
//!
//! Transactions are owned by the caller (`SqliteRecordStore`).

mod biomarker;
mod record;

pub use biomarker::*;
pub use record::*;

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::DatabaseError;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::CorruptRow(e.to_string()))
}

pub(crate) fn parse_date(raw: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    raw.map(|s| {
        NaiveDate::from_str(&s)
            .map_err(|e| DatabaseError::CorruptRow(format!("bad date '{s}': {e}")))
    })
    .transpose()
}

pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn parse_datetime(raw: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map_err(|e| DatabaseError::CorruptRow(format!("bad timestamp '{raw}': {e}")))
}
