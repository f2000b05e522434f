use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::*;

/// Persistence seam used by batch processing: one call per assembled record.
pub trait RecordSink: Send + Sync {
    fn save(
        &self,
        record: &ExtractedRecord,
        warnings: &[ProcessingWarning],
    ) -> Result<Uuid, DatabaseError>;
}

/// SQLite-backed record store. The connection is serialized behind a mutex so
/// the store can be shared across batch workers.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = open_database(path)?;
        tracing::info!(path = %path.display(), "Opened record store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(open_memory_database()?),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    pub fn get_record(&self, id: &Uuid) -> Result<Option<StoredRecord>, DatabaseError> {
        repository::get_record(&*self.lock()?, id)
    }

    pub fn delete_record(&self, id: &Uuid) -> Result<(), DatabaseError> {
        repository::delete_record(&*self.lock()?, id)
    }

    pub fn list_records(&self, options: &ListOptions) -> Result<Vec<RecordSummary>, DatabaseError> {
        repository::list_records(&*self.lock()?, &RecordFilter::default(), options)
    }

    pub fn search_records(
        &self,
        filter: &RecordFilter,
        options: &ListOptions,
    ) -> Result<Vec<RecordSummary>, DatabaseError> {
        repository::list_records(&*self.lock()?, filter, options)
    }

    pub fn count_records(&self, filter: &RecordFilter) -> Result<usize, DatabaseError> {
        repository::count_records(&*self.lock()?, filter)
    }

    pub fn biomarker_history(
        &self,
        kind: BiomarkerKind,
        patient: &PatientSelector,
    ) -> Result<Vec<HistoryPoint>, DatabaseError> {
        repository::get_biomarker_history(&*self.lock()?, kind, patient)
    }
}

impl RecordSink for SqliteRecordStore {
    /// Record and biomarkers are written in one transaction.
    fn save(
        &self,
        record: &ExtractedRecord,
        warnings: &[ProcessingWarning],
    ) -> Result<Uuid, DatabaseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let id = Uuid::new_v4();
        let created_at = Utc::now().naive_utc();

        repository::insert_record(&tx, &id, &created_at, record, warnings)?;
        for biomarker in &record.biomarkers {
            repository::insert_biomarker(&tx, &id, biomarker)?;
        }
        tx.commit()?;

        tracing::info!(
            record_id = %id,
            filename = %record.source_filename,
            biomarkers = record.biomarkers.len(),
            "Stored extracted record"
        );
        Ok(id)
    }
}
