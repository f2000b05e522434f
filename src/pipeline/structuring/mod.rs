//! Recognized lines to a structured record: biomarker mentions, study
//! date and patient header, merged by the assembler.

pub mod confidence;
pub mod units;
pub mod numeric;
pub mod lexicon;
pub mod entity;
pub mod date;
pub mod patient;
pub mod assembler;

pub use confidence::{penalty, Confidence};
pub use units::{canonical_unit, find_unit, Unit};
pub use numeric::{find_numbers, parse_decimal, NumberToken};
pub use lexicon::{spec, BiomarkerSpec, Lexicon, NameMatch, LEXICON};
pub use entity::{extract_candidates, parse_range, BiomarkerCandidate};
pub use date::{extract_study_date, find_dates, DateSelection, DateToken};
pub use patient::extract_patient;
pub use assembler::assemble;
