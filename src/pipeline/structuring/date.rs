//! Study date selection.
//!
//! Dates come in `15.03.2024`, `15/03/24`, `2024-03-15`, `15 марта 2024`,
//! `15 Mar 2024` and `March 15, 2024` forms. A date preceded on its line
//! by a collection/study label (or sitting on the line after a bare
//! label) wins over unlabeled ones; dates after birth labels never count.

use std::sync::LazyLock;

use chrono::{Months, NaiveDate};
use regex::Regex;

use super::lexicon::fold;
use crate::models::DateSource;
use crate::pipeline::extraction::RecognizedLine;

/// Dates more than this many years before processing are implausible.
const MAX_AGE_YEARS: u32 = 120;

/// Two-digit years below this are 20xx, the rest 19xx.
const TWO_DIGIT_PIVOT: i32 = 50;

static NUMERIC_DMY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})([./\\-])(\d{1,2})([./\\-])(\d{4}|\d{2})\b").expect("valid regex")
});
static NUMERIC_YMD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})([./-])(\d{1,2})([./-])(\d{1,2})\b").expect("valid regex")
});
static TEXTUAL_DMY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s+(\p{L}{3,})\.?,?\s+(\d{4}|\d{2})\b").expect("valid regex")
});
static TEXTUAL_MDY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\p{L}{3,})\.?\s+(\d{1,2}),?\s+(\d{4})\b").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    /// Strength 2 for collection/study labels, 1 for a bare "date".
    Study(u8),
    Birth,
}

static LABELS: LazyLock<Vec<(Regex, Label)>> = LazyLock::new(|| {
    [
        (
            r"(?i)дата\s+(?:взятия|забора|сбора|исследования|анализа|выполнения|получения)",
            Label::Study(2),
        ),
        (r"(?i)\b(?:взят[оа]?|забор)\b", Label::Study(2)),
        (
            r"(?i)\bdate\s+of\s+(?:collection|study|sampling|test|analysis|examination)",
            Label::Study(2),
        ),
        (r"(?i)\b(?:collection|sampling|study|test|specimen)\s+date", Label::Study(2)),
        (r"(?i)\bcollected\b", Label::Study(2)),
        (r"(?i)\b(?:дата|date)\b", Label::Study(1)),
        (r"(?i)\bот\b", Label::Study(1)),
        (r"(?i)дата\s+рождения|\bд\.\s?р\.|\bг\.\s?р\.", Label::Birth),
        (r"(?i)\bdate\s+of\s+birth|\bdob\b|\bborn\b|\bbirth\s*date", Label::Birth),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid regex"), label))
    .collect()
});

/// A date found in a line, with its byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateToken {
    pub date: NaiveDate,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSelection {
    pub date: NaiveDate,
    pub source: DateSource,
    /// Line the date was read from.
    pub line_index: usize,
    /// Plausible non-birth dates seen in the document.
    pub candidates: usize,
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(match raw.len() {
        2 if year < TWO_DIGIT_PIVOT => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

fn ymd(year: Option<i32>, month: Option<u32>, day: Option<u32>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year?, month?, day?)
}

/// Month number from a Russian (any case form) or English month name,
/// full or abbreviated to at least three letters.
pub fn month_from_word(word: &str) -> Option<u32> {
    const RU: [(&str, u32); 12] = [
        ("январ", 1),
        ("феврал", 2),
        ("март", 3),
        ("апрел", 4),
        ("ма", 5),
        ("июн", 6),
        ("июл", 7),
        ("август", 8),
        ("сентябр", 9),
        ("октябр", 10),
        ("ноябр", 11),
        ("декабр", 12),
    ];
    const EN: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august",
        "september", "october", "november", "december",
    ];

    let w = fold(word.trim_end_matches('.'));
    if matches!(w.as_str(), "маи" | "мая") {
        return Some(5);
    }
    let len = w.chars().count();
    if len < 3 {
        return None;
    }
    RU.iter()
        .filter(|(stem, _)| *stem != "ма")
        .find(|(stem, _)| w.starts_with(stem) || stem.starts_with(w.as_str()))
        .map(|(_, m)| *m)
        .or_else(|| {
            EN.iter()
                .position(|full| {
                    full.starts_with(w.as_str()) || (w == "sept" && *full == "september")
                })
                .map(|i| i as u32 + 1)
        })
}

/// Every date in `text`, left to right, without overlaps.
pub fn find_dates(text: &str) -> Vec<DateToken> {
    let mut found: Vec<DateToken> = Vec::new();
    let mut push = |date: Option<NaiveDate>, start: usize, end: usize| {
        if let Some(date) = date {
            found.push(DateToken { date, start, end });
        }
    };

    for caps in NUMERIC_DMY.captures_iter(text) {
        let (Some(whole), Some(d), Some(s1), Some(m), Some(s2), Some(y)) = (
            caps.get(0),
            caps.get(1),
            caps.get(2),
            caps.get(3),
            caps.get(4),
            caps.get(5),
        ) else {
            continue;
        };
        if s1.as_str() != s2.as_str() {
            continue;
        }
        let date = ymd(
            expand_year(y.as_str()),
            m.as_str().parse().ok(),
            d.as_str().parse().ok(),
        );
        push(date, whole.start(), whole.end());
    }

    for caps in NUMERIC_YMD.captures_iter(text) {
        let (Some(whole), Some(y), Some(s1), Some(m), Some(s2), Some(d)) = (
            caps.get(0),
            caps.get(1),
            caps.get(2),
            caps.get(3),
            caps.get(4),
            caps.get(5),
        ) else {
            continue;
        };
        if s1.as_str() != s2.as_str() {
            continue;
        }
        let date = ymd(
            y.as_str().parse().ok(),
            m.as_str().parse().ok(),
            d.as_str().parse().ok(),
        );
        push(date, whole.start(), whole.end());
    }

    for caps in TEXTUAL_DMY.captures_iter(text) {
        let (Some(whole), Some(d), Some(mon), Some(y)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let date = ymd(
            expand_year(y.as_str()),
            month_from_word(mon.as_str()),
            d.as_str().parse().ok(),
        );
        push(date, whole.start(), whole.end());
    }

    for caps in TEXTUAL_MDY.captures_iter(text) {
        let (Some(whole), Some(mon), Some(d), Some(y)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let date = ymd(
            y.as_str().parse().ok(),
            month_from_word(mon.as_str()),
            d.as_str().parse().ok(),
        );
        push(date, whole.start(), whole.end());
    }

    found.sort_by_key(|t| (t.start, std::cmp::Reverse(t.end)));
    let mut kept: Vec<DateToken> = Vec::with_capacity(found.len());
    for token in found {
        if kept.last().map_or(true, |last| token.start >= last.end) {
            kept.push(token);
        }
    }
    kept
}

/// Label ending closest before `pos`; at equal ends a birth label wins.
fn label_before(text: &str, pos: usize) -> Option<Label> {
    LABELS
        .iter()
        .flat_map(|(re, label)| re.find_iter(text).map(move |m| (m.end(), *label)))
        .filter(|(end, _)| *end <= pos)
        .max_by_key(|(end, label)| (*end, *label == Label::Birth))
        .map(|(_, label)| label)
}

/// Last label on a line, if any.
fn trailing_label(text: &str) -> Option<Label> {
    label_before(text, text.len())
}

fn is_plausible(date: NaiveDate, today: NaiveDate) -> bool {
    let floor = today
        .checked_sub_months(Months::new(MAX_AGE_YEARS * 12))
        .unwrap_or(NaiveDate::MIN);
    date <= today && date >= floor
}

struct Scored {
    date: NaiveDate,
    order: usize,
    start: usize,
    line_index: usize,
    weight: Option<u8>,
}

/// Pick the study date. Labeled dates beat unlabeled ones (stronger
/// label first, then nearer the top); without labels the date closest
/// to the top is taken, the earliest one when a line holds several.
pub fn extract_study_date(lines: &[RecognizedLine], today: NaiveDate) -> Option<DateSelection> {
    let mut scored: Vec<Scored> = Vec::new();

    for (order, line) in lines.iter().enumerate() {
        let dates = find_dates(&line.text);
        for token in &dates {
            let label = label_before(&line.text, token.start).or_else(|| {
                // A bare label line applies to the line below it.
                let previous = order.checked_sub(1).and_then(|p| lines.get(p))?;
                if find_dates(&previous.text).is_empty() {
                    trailing_label(&previous.text)
                } else {
                    None
                }
            });

            let weight = match label {
                Some(Label::Birth) => continue,
                Some(Label::Study(weight)) => Some(weight),
                None => None,
            };
            if !is_plausible(token.date, today) {
                tracing::debug!(date = %token.date, line = line.index, "Implausible date skipped");
                continue;
            }
            scored.push(Scored {
                date: token.date,
                order,
                start: token.start,
                line_index: line.index,
                weight,
            });
        }
    }

    let candidates = scored.len();
    let labeled = scored
        .iter()
        .filter(|s| s.weight.is_some())
        .min_by_key(|s| (std::cmp::Reverse(s.weight), s.order, s.start));

    let (best, source) = match labeled {
        Some(best) => (best, DateSource::Labeled),
        None => (
            scored.iter().min_by_key(|s| (s.order, s.date))?,
            DateSource::Positional,
        ),
    };

    Some(DateSelection {
        date: best.date,
        source,
        line_index: best.line_index,
        candidates,
    })
}
