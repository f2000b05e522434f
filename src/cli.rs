//! Command-line front end: bulk processing from disk plus queries over
//! the record store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::db::{DatabaseError, SqliteRecordStore};
use crate::models::*;
use crate::pipeline::batch::{BatchError, BatchItemOutcome, BatchProcessor, ItemFailureKind};
use crate::pipeline::extraction::{Document, ExtractionError};
use crate::pipeline::processor::build_processor;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No record with id {0}")]
    RecordNotFound(Uuid),
}

#[derive(Parser, Debug)]
#[command(
    name = "labtrace",
    version,
    about = "Extract biomarker values from blood-test reports and track them over time"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database file
    #[arg(long, global = true, env = "LABTRACE_DB")]
    pub db: Option<PathBuf>,

    /// Documents processed in parallel
    #[arg(long, global = true, env = "LABTRACE_WORKERS")]
    pub workers: Option<usize>,

    /// Tesseract traineddata directory
    #[arg(long, global = true, env = "LABTRACE_TESSDATA")]
    pub tessdata: Option<PathBuf>,

    /// Tesseract languages, e.g. rus+eng
    #[arg(long, global = true, env = "LABTRACE_OCR_LANGS")]
    pub langs: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract records from files without storing them
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Extract records from files and store them
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List stored records
    List {
        #[arg(long, default_value = "study_date")]
        sort: RecordSortField,
        #[arg(long, default_value = "desc")]
        order: SortOrder,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show one stored record with its biomarkers and warnings
    Show { id: Uuid },

    /// Delete a stored record
    Delete { id: Uuid },

    /// Search stored records
    Search {
        /// Earliest study date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest study date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        surname: Option<String>,
        #[arg(long)]
        number: Option<String>,
        /// Only records containing this biomarker, e.g. glucose
        #[arg(long)]
        biomarker: Option<BiomarkerKind>,
        /// Only records with a value outside its printed range
        #[arg(long)]
        abnormal: bool,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Values of one biomarker over time
    History {
        biomarker: BiomarkerKind,
        #[arg(long)]
        surname: Option<String>,
        #[arg(long)]
        number: Option<String>,
    },
}

impl Cli {
    /// Environment first, flags on top.
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::from_env();
        if let Some(db) = &self.db {
            config.database_path = db.clone();
        }
        if let Some(workers) = self.workers.filter(|n| *n > 0) {
            config.workers = workers;
        }
        if let Some(dir) = &self.tessdata {
            config.tessdata_dir = Some(dir.clone());
        }
        if let Some(langs) = &self.langs {
            config.ocr_languages = langs.clone();
        }
        config
    }
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.runtime_config();
    let json = cli.json;

    match cli.command {
        Command::Process { files } => {
            let outcomes = process_files(&config, files, None).await?;
            report_outcomes(&outcomes, json)
        }
        Command::Import { files } => {
            let store = Arc::new(SqliteRecordStore::open(&config.database_path)?);
            let outcomes = process_files(&config, files, Some(store)).await?;
            report_outcomes(&outcomes, json)
        }
        Command::List {
            sort,
            order,
            limit,
            offset,
        } => {
            let store = SqliteRecordStore::open(&config.database_path)?;
            let options = ListOptions {
                sort,
                order,
                limit,
                offset,
            };
            let records = store.list_records(&options)?;
            let total = store.count_records(&RecordFilter::default())?;
            report_summaries(&records, total, json)
        }
        Command::Show { id } => {
            let store = SqliteRecordStore::open(&config.database_path)?;
            let record = store
                .get_record(&id)?
                .ok_or(CliError::RecordNotFound(id))?;
            if json {
                return print_json(&record);
            }
            print!("{}", format_record(&record));
            Ok(())
        }
        Command::Delete { id } => {
            let store = SqliteRecordStore::open(&config.database_path)?;
            store.delete_record(&id)?;
            println!("Deleted {id}");
            Ok(())
        }
        Command::Search {
            from,
            to,
            surname,
            number,
            biomarker,
            abnormal,
            limit,
            offset,
        } => {
            let store = SqliteRecordStore::open(&config.database_path)?;
            let filter = RecordFilter {
                date_from: from,
                date_to: to,
                surname,
                patient_number: number,
                biomarker,
                abnormal_only: abnormal,
            };
            let options = ListOptions {
                limit,
                offset,
                ..ListOptions::default()
            };
            let records = store.search_records(&filter, &options)?;
            let total = store.count_records(&filter)?;
            report_summaries(&records, total, json)
        }
        Command::History {
            biomarker,
            surname,
            number,
        } => {
            let store = SqliteRecordStore::open(&config.database_path)?;
            let points = store.biomarker_history(biomarker, &PatientSelector { surname, number })?;
            if json {
                return print_json(&points);
            }
            print!("{}", format_history(biomarker, &points));
            Ok(())
        }
    }
}

/// Read every file, then run the readable ones as one batch. Unreadable
/// files are reported in place with the same outcome shape.
async fn process_files(
    config: &RuntimeConfig,
    files: Vec<PathBuf>,
    store: Option<Arc<SqliteRecordStore>>,
) -> Result<Vec<BatchItemOutcome>, CliError> {
    let mut documents = Vec::new();
    let mut slots: Vec<Option<BatchItemOutcome>> = Vec::with_capacity(files.len());

    for path in &files {
        match Document::from_path(path) {
            Ok(document) => {
                documents.push(document);
                slots.push(None);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read document");
                slots.push(Some(unreadable(path, &e)));
            }
        }
    }

    let batch = BatchProcessor::new(Arc::new(build_processor(config)), config.workers);
    let processed = match store {
        Some(store) => batch.process_and_store(documents, store).await?,
        None => batch.process_batch(documents).await?,
    };

    let mut processed = processed.into_iter();
    Ok(slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| processed.next()))
        .collect())
}

fn unreadable(path: &std::path::Path, error: &ExtractionError) -> BatchItemOutcome {
    BatchItemOutcome::Failed {
        filename: path.display().to_string(),
        kind: ItemFailureKind::from(error.failure_kind()),
        reason: error.to_string(),
    }
}

// ── Output ───────────────────────────────────────────────

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_outcomes(outcomes: &[BatchItemOutcome], json: bool) -> Result<(), CliError> {
    if json {
        return print_json(outcomes);
    }
    for outcome in outcomes {
        print!("{}", format_outcome(outcome));
    }
    let ok = outcomes.iter().filter(|o| o.is_processed()).count();
    println!("{ok}/{} documents processed", outcomes.len());
    Ok(())
}

fn report_summaries(records: &[RecordSummary], total: usize, json: bool) -> Result<(), CliError> {
    if json {
        return print_json(records);
    }
    for r in records {
        println!(
            "{}  {}  {:<20} {:<10} {:>2} values {:>2} abnormal  {}",
            r.id,
            r.study_date.map_or_else(|| "----------".to_string(), |d| d.to_string()),
            r.surname.as_deref().unwrap_or("-"),
            r.patient_number.as_deref().unwrap_or("-"),
            r.biomarker_count,
            r.abnormal_count,
            r.source_filename,
        );
    }
    println!("{} of {total} records", records.len());
    Ok(())
}

fn format_outcome(outcome: &BatchItemOutcome) -> String {
    match outcome {
        BatchItemOutcome::Processed {
            filename,
            output,
            record_id,
        } => {
            let record = &output.record;
            let mut text = format!(
                "ok      {filename}: {} biomarkers, study date {}",
                record.biomarkers.len(),
                record
                    .study_date
                    .map_or_else(|| "unknown".to_string(), |d| d.to_string()),
            );
            if let Some(id) = record_id {
                text.push_str(&format!(" [{id}]"));
            }
            text.push('\n');
            for b in &record.biomarkers {
                text.push_str(&format_biomarker(b));
            }
            for w in &output.warnings {
                text.push_str(&format!("  ! {w}\n"));
            }
            text
        }
        BatchItemOutcome::Failed {
            filename,
            kind,
            reason,
        } => format!("FAILED  {filename}: {} ({reason})\n", kind.as_str()),
    }
}

fn format_biomarker(b: &FinalizedBiomarker) -> String {
    let range = b
        .reference_range
        .map(format_range)
        .unwrap_or_default();
    let flag = if b.low_confidence { "  (low confidence)" } else { "" };
    format!(
        "  {:<20} {:>8} {:<9}{range}{flag}\n",
        b.kind.display_name(),
        b.value,
        b.unit
    )
}

fn format_range(range: ReferenceRange) -> String {
    match (range.low, range.high) {
        (Some(low), Some(high)) => format!(" [{low} - {high}]"),
        (None, Some(high)) => format!(" [< {high}]"),
        (Some(low), None) => format!(" [> {low}]"),
        (None, None) => String::new(),
    }
}

fn format_record(record: &StoredRecord) -> String {
    let patient = &record.patient;
    let name = [&patient.surname, &patient.name, &patient.patronymic]
        .iter()
        .filter_map(|p| p.as_deref())
        .collect::<Vec<_>>()
        .join(" ");

    let mut text = format!("Record    {}\n", record.id);
    text.push_str(&format!("File      {}\n", record.source_filename));
    text.push_str(&format!(
        "Study     {}\n",
        record
            .study_date
            .map_or_else(|| "unknown".to_string(), |d| d.to_string())
    ));
    if !name.is_empty() {
        text.push_str(&format!("Patient   {name}\n"));
    }
    if let Some(number) = &patient.number {
        text.push_str(&format!("Number    {number}\n"));
    }
    if let Some(dob) = patient.date_of_birth {
        text.push_str(&format!("Born      {dob}\n"));
    }
    for stored in &record.biomarkers {
        let line = format_biomarker(&stored.biomarker);
        if stored.is_abnormal {
            text.push_str(&format!("{}  *\n", line.trim_end()));
        } else {
            text.push_str(&line);
        }
    }
    for w in &record.warnings {
        text.push_str(&format!("  ! {w}\n"));
    }
    text
}

fn format_history(kind: BiomarkerKind, points: &[HistoryPoint]) -> String {
    let mut text = format!("{}\n", kind.display_name());
    for p in points {
        text.push_str(&format!(
            "  {}  {:>8} {:<9}{}{}\n",
            p.study_date
                .map_or_else(|| "----------".to_string(), |d| d.to_string()),
            p.value,
            p.unit,
            p.reference_range.map(format_range).unwrap_or_default(),
            if p.is_abnormal { "  *" } else { "" },
        ));
    }
    if points.is_empty() {
        text.push_str("  no values\n");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processor::ProcessingOutput;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("labtrace").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn list_sorts_by_patient_number() {
        match parse(&["list", "--sort", "patient_number", "--order", "asc"]).command {
            Command::List { sort, order, .. } => {
                assert_eq!(sort, RecordSortField::PatientNumber);
                assert_eq!(order, SortOrder::Asc);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn list_defaults() {
        let cli = parse(&["list"]);
        match cli.command {
            Command::List {
                sort,
                order,
                limit,
                offset,
            } => {
                assert_eq!(sort, RecordSortField::StudyDate);
                assert_eq!(order, SortOrder::Desc);
                assert_eq!((limit, offset), (20, 0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn search_parses_typed_filters() {
        let cli = parse(&[
            "search",
            "--from",
            "2024-01-01",
            "--biomarker",
            "ldl_c",
            "--abnormal",
        ]);
        match cli.command {
            Command::Search {
                from,
                biomarker,
                abnormal,
                ..
            } => {
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(biomarker, Some(BiomarkerKind::LdlCholesterol));
                assert!(abnormal);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_biomarker_rejected() {
        let result = Cli::try_parse_from(["labtrace", "history", "vitamin_d"]);
        assert!(result.is_err());
    }

    #[test]
    fn process_requires_files() {
        assert!(Cli::try_parse_from(["labtrace", "process"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&["--db", "/tmp/x.db", "--workers", "3", "--langs", "eng", "list"]);
        let config = cli.runtime_config();
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.workers, 3);
        assert_eq!(config.ocr_languages, "eng");
    }

    #[test]
    fn failed_outcome_line() {
        let line = format_outcome(&BatchItemOutcome::Failed {
            filename: "3.jpg".into(),
            kind: ItemFailureKind::Preprocessing,
            reason: "bad header".into(),
        });
        assert_eq!(line, "FAILED  3.jpg: preprocessing_failure (bad header)\n");
    }

    #[test]
    fn processed_outcome_lists_values_and_warnings() {
        let output = ProcessingOutput {
            record: ExtractedRecord {
                source_filename: "a.txt".into(),
                study_date: NaiveDate::from_ymd_opt(2024, 3, 15),
                patient: PatientInfo::default(),
                biomarkers: vec![FinalizedBiomarker {
                    kind: BiomarkerKind::Glucose,
                    value: 6.8,
                    unit: "mmol/L".into(),
                    reference_range: Some(ReferenceRange::between(3.9, 5.5)),
                    line_index: 3,
                    low_confidence: false,
                }],
            },
            warnings: vec![ProcessingWarning::EmptyExtraction],
            method: ExtractionMethod::PlainTextRead,
            recognition_confidence: 1.0,
        };
        let text = format_outcome(&BatchItemOutcome::Processed {
            filename: "a.txt".into(),
            output,
            record_id: None,
        });
        assert!(text.starts_with("ok      a.txt: 1 biomarkers, study date 2024-03-15\n"));
        assert!(text.contains("Glucose"));
        assert!(text.contains("[3.9 - 5.5]"));
        assert!(text.contains("  ! no biomarkers found"));
    }

    #[test]
    fn open_ranges_render_one_side() {
        assert_eq!(format_range(ReferenceRange::upper(5.2)), " [< 5.2]");
        assert_eq!(format_range(ReferenceRange::lower(1.0)), " [> 1]");
    }
}
