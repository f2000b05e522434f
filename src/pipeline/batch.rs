//! Bulk submissions: many documents through a bounded worker pool.
//!
//! Each document runs on a blocking thread (OCR is CPU-bound); a Tokio
//! semaphore caps how many run at once. A failing document becomes a
//! `Failed` outcome in its own slot and never affects the others.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::extraction::{Document, FailureKind};
use super::processor::{DocumentProcessor, ProcessingOutput};
use crate::config::MAX_BATCH_DOCUMENTS;
use crate::db::RecordSink;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch of {count} documents exceeds the limit of {max}")]
    TooManyDocuments { count: usize, max: usize },
}

/// Why one document of a batch has no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailureKind {
    Preprocessing,
    Recognition,
    /// Processed, but the record could not be saved.
    Storage,
    /// The worker thread panicked.
    Worker,
}

impl From<FailureKind> for ItemFailureKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Preprocessing => Self::Preprocessing,
            FailureKind::Recognition => Self::Recognition,
        }
    }
}

impl ItemFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocessing => "preprocessing_failure",
            Self::Recognition => "recognition_failure",
            Self::Storage => "storage_failure",
            Self::Worker => "worker_failure",
        }
    }
}

/// Per-document result, in submission order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemOutcome {
    Processed {
        filename: String,
        output: ProcessingOutput,
        /// Set when the record was saved.
        record_id: Option<Uuid>,
    },
    Failed {
        filename: String,
        kind: ItemFailureKind,
        reason: String,
    },
}

impl BatchItemOutcome {
    pub fn filename(&self) -> &str {
        match self {
            Self::Processed { filename, .. } | Self::Failed { filename, .. } => filename,
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }
}

pub struct BatchProcessor {
    processor: Arc<DocumentProcessor>,
    workers: usize,
    max_documents: usize,
}

impl BatchProcessor {
    /// `workers` is clamped to at least one.
    pub fn new(processor: Arc<DocumentProcessor>, workers: usize) -> Self {
        Self {
            processor,
            workers: workers.max(1),
            max_documents: MAX_BATCH_DOCUMENTS,
        }
    }

    pub fn with_max_documents(mut self, max: usize) -> Self {
        self.max_documents = max;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every document; nothing is saved.
    pub async fn process_batch(
        &self,
        documents: Vec<Document>,
    ) -> Result<Vec<BatchItemOutcome>, BatchError> {
        self.run(documents, None).await
    }

    /// Process every document and save each successful record through
    /// `sink`. A failed save turns that document into a `Storage` failure.
    pub async fn process_and_store(
        &self,
        documents: Vec<Document>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Vec<BatchItemOutcome>, BatchError> {
        self.run(documents, Some(sink)).await
    }

    async fn run(
        &self,
        documents: Vec<Document>,
        sink: Option<Arc<dyn RecordSink>>,
    ) -> Result<Vec<BatchItemOutcome>, BatchError> {
        if documents.len() > self.max_documents {
            return Err(BatchError::TooManyDocuments {
                count: documents.len(),
                max: self.max_documents,
            });
        }

        tracing::info!(
            documents = documents.len(),
            workers = self.workers,
            store = sink.is_some(),
            "Batch started"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(documents.len());

        for document in documents {
            let semaphore = Arc::clone(&semaphore);
            let processor = Arc::clone(&self.processor);
            let sink = sink.clone();
            let filename = document.filename.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let permit = semaphore.acquire_owned().await.ok();
                let outcome = tokio::task::spawn_blocking(move || {
                    process_one(&processor, &document, sink.as_deref())
                })
                .await;
                drop(permit);
                outcome
            });
            handles.push((filename, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (filename, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) | Err(e) => {
                    tracing::error!(filename = %filename, error = %e, "Batch worker failed");
                    BatchItemOutcome::Failed {
                        filename,
                        kind: ItemFailureKind::Worker,
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let processed = outcomes.iter().filter(|o| o.is_processed()).count();
        tracing::info!(
            processed,
            failed = outcomes.len() - processed,
            "Batch complete"
        );
        Ok(outcomes)
    }
}

fn process_one(
    processor: &DocumentProcessor,
    document: &Document,
    sink: Option<&dyn RecordSink>,
) -> BatchItemOutcome {
    let filename = document.filename.clone();

    let output = match processor.process(document) {
        Ok(output) => output,
        Err(e) => {
            let kind = ItemFailureKind::from(e.failure_kind());
            tracing::warn!(
                filename = %filename,
                kind = kind.as_str(),
                error = %e,
                "Document skipped"
            );
            return BatchItemOutcome::Failed {
                filename,
                kind,
                reason: e.to_string(),
            };
        }
    };

    let record_id = match sink {
        Some(sink) => match sink.save(&output.record, &output.warnings) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "Failed to save record");
                return BatchItemOutcome::Failed {
                    filename,
                    kind: ItemFailureKind::Storage,
                    reason: e.to_string(),
                };
            }
        },
        None => None,
    };

    BatchItemOutcome::Processed {
        filename,
        output,
        record_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseError, SqliteRecordStore};
    use crate::models::{
        BiomarkerKind, DocumentKind, ExtractedRecord, ListOptions, ProcessingWarning,
        RecordFilter,
    };
    use crate::pipeline::extraction::{BinarizingNormalizer, MockOcrEngine, TextRecognizer};
    use chrono::NaiveDate;

    fn processor() -> Arc<DocumentProcessor> {
        let recognizer = TextRecognizer::new(
            Box::new(BinarizingNormalizer::default()),
            Box::new(MockOcrEngine::new("", 0.0)),
            None,
        );
        Arc::new(
            DocumentProcessor::new(recognizer)
                .with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
        )
    }

    fn report(i: usize) -> Document {
        Document::plain_text(
            format!("{i}.txt"),
            &format!("Пациент: Иванов {i}0000\nДата взятия: 0{i}.03.2024\nГлюкоза {i},1 ммоль/л\n"),
        )
    }

    fn five_with_corrupt_third() -> Vec<Document> {
        let mut docs: Vec<Document> = (1..=5).map(report).collect();
        docs[2] = Document::new("3.jpg", DocumentKind::Image, vec![0xFF, 0xD8, 0xFF, 0x00].repeat(64));
        docs
    }

    struct FailingSink;

    impl RecordSink for FailingSink {
        fn save(
            &self,
            _record: &ExtractedRecord,
            _warnings: &[ProcessingWarning],
        ) -> Result<Uuid, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
    }

    #[tokio::test]
    async fn corrupt_document_does_not_stop_the_batch() {
        let batch = BatchProcessor::new(processor(), 2);
        let outcomes = batch.process_batch(five_with_corrupt_third()).await.unwrap();

        assert_eq!(outcomes.len(), 5);
        let names: Vec<&str> = outcomes.iter().map(|o| o.filename()).collect();
        assert_eq!(names, vec!["1.txt", "2.txt", "3.jpg", "4.txt", "5.txt"]);

        for (i, outcome) in outcomes.iter().enumerate() {
            if i == 2 {
                assert!(matches!(
                    outcome,
                    BatchItemOutcome::Failed {
                        kind: ItemFailureKind::Preprocessing,
                        ..
                    }
                ));
                continue;
            }
            match outcome {
                BatchItemOutcome::Processed {
                    output, record_id, ..
                } => {
                    let glucose = output.record.biomarker(BiomarkerKind::Glucose).unwrap();
                    assert_eq!(glucose.value, (i + 1) as f64 + 0.1);
                    assert!(record_id.is_none());
                }
                other => panic!("document {} failed: {other:?}", i + 1),
            }
        }
    }

    #[tokio::test]
    async fn oversized_submission_rejected() {
        let batch = BatchProcessor::new(processor(), 4).with_max_documents(3);
        let docs: Vec<Document> = (1..=4).map(report).collect();
        let err = batch.process_batch(docs).await.unwrap_err();
        assert!(matches!(
            err,
            BatchError::TooManyDocuments { count: 4, max: 3 }
        ));
    }

    #[tokio::test]
    async fn default_limit_is_one_hundred() {
        let batch = BatchProcessor::new(processor(), 1);
        let docs: Vec<Document> = (0..101)
            .map(|i| Document::plain_text(format!("{i}.txt"), "x"))
            .collect();
        assert!(batch.process_batch(docs).await.is_err());
    }

    #[tokio::test]
    async fn stored_records_get_ids() {
        let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
        let batch = BatchProcessor::new(processor(), 3);
        let outcomes = batch
            .process_and_store(five_with_corrupt_third(), store.clone())
            .await
            .unwrap();

        let ids: Vec<Uuid> = outcomes
            .iter()
            .filter_map(|o| match o {
                BatchItemOutcome::Processed { record_id, .. } => *record_id,
                BatchItemOutcome::Failed { .. } => None,
            })
            .collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(store.count_records(&RecordFilter::default()).unwrap(), 4);
        assert_eq!(
            store.list_records(&ListOptions::default()).unwrap().len(),
            4
        );
    }

    #[tokio::test]
    async fn storage_failure_is_reported_per_document() {
        let batch = BatchProcessor::new(processor(), 2);
        let outcomes = batch
            .process_and_store(vec![report(1)], Arc::new(FailingSink))
            .await
            .unwrap();
        assert!(matches!(
            outcomes[0],
            BatchItemOutcome::Failed {
                kind: ItemFailureKind::Storage,
                ..
            }
        ));
    }

    #[test]
    fn zero_workers_clamped() {
        assert_eq!(BatchProcessor::new(processor(), 0).workers(), 1);
    }
}
