use std::sync::LazyLock;

use regex::Regex;

use super::date::find_dates;
use crate::models::PatientInfo;
use crate::pipeline::extraction::RecognizedLine;

// A bare `name` needs a colon: table headers use the word too.
static NAME_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:пациентка|пациент|patient\s+name|patient|фио|full\s+name)\b|ф\.\s*и\.\s*о\.?|\bname\s*:)\s*[:\-]?",
    )
    .expect("valid regex")
});

static NUMBER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:№|#|\b(?:номер|карта|карты|number|card|id|mrn)\b)\s*[:.]?")
        .expect("valid regex")
});

static BIRTH_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:дата\s+рождения|д\.\s*р\.|date\s+of\s+birth|birth\s*date|\bdob\b|\bborn\b)")
        .expect("valid regex")
});

/// Words that end a name run when they follow it on the same line.
const STOP_WORDS: &[&str] = &[
    "дата", "date", "dob", "born", "номер", "карта", "card", "number", "id", "mrn", "возраст",
    "age", "пол", "sex", "gender",
];

/// Tokens following a number label that are searched for a digit.
const NUMBER_LOOKAHEAD: usize = 3;

/// Patient header fields. Each field comes from the top-most line that
/// supplies it.
pub fn extract_patient(lines: &[RecognizedLine]) -> PatientInfo {
    let mut info = PatientInfo::default();

    for line in lines {
        let text = line.text.as_str();

        if let Some(label) = NAME_LABEL.find(text) {
            let rest = &text[label.end()..];
            if info.surname.is_none() {
                let parts = name_parts(rest);
                let mut parts = parts.into_iter();
                info.surname = parts.next();
                info.name = parts.next();
                info.patronymic = parts.next();
            }
            if info.number.is_none() && !NUMBER_LABEL.is_match(rest) {
                info.number = bare_number(rest);
            }
        }

        if info.number.is_none() {
            info.number = NUMBER_LABEL
                .find_iter(text)
                .find_map(|label| labeled_number(&text[label.end()..]));
        }

        if info.date_of_birth.is_none() {
            if let Some(label) = BIRTH_LABEL.find(text) {
                info.date_of_birth = find_dates(&text[label.end()..]).first().map(|t| t.date);
            }
        }
    }

    if !info.is_empty() {
        tracing::debug!(
            has_surname = info.surname.is_some(),
            has_number = info.number.is_some(),
            has_birth_date = info.date_of_birth.is_some(),
            "Patient identifiers extracted"
        );
    }
    info
}

fn clean(word: &str) -> &str {
    word.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '"' | '«' | '»'))
}

/// Surname, name and patronymic from the text after a name label. Initials
/// (`И.И.`) fill the name and patronymic.
fn name_parts(rest: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for raw in rest.split_whitespace() {
        let word = clean(raw);
        if word.is_empty() || STOP_WORDS.contains(&word.to_lowercase().trim_end_matches('.')) {
            break;
        }
        if let Some(initials) = initials(word) {
            parts.extend(initials);
        } else if is_name_word(word) {
            parts.push(word.to_string());
        } else {
            break;
        }
        if parts.len() >= 3 {
            break;
        }
    }
    parts.truncate(3);
    parts
}

fn is_name_word(word: &str) -> bool {
    word.chars().any(char::is_alphabetic)
        && word
            .chars()
            .all(|c| c.is_alphabetic() || c == '-' || c == '\'')
}

/// `И.И.` or `J.` as single-letter parts.
fn initials(word: &str) -> Option<Vec<String>> {
    if !word.contains('.') {
        return None;
    }
    let letters: Vec<&str> = word.split('.').filter(|p| !p.is_empty()).collect();
    let all_single = !letters.is_empty()
        && letters
            .iter()
            .all(|p| p.chars().count() == 1 && p.chars().all(char::is_alphabetic));
    all_single.then(|| letters.into_iter().map(String::from).collect())
}

/// First token containing a digit shortly after a number label.
fn labeled_number(rest: &str) -> Option<String> {
    rest.split_whitespace()
        .take(NUMBER_LOOKAHEAD)
        .map(clean)
        .find(|w| w.chars().any(|c| c.is_ascii_digit()))
        .map(|w| w.trim_end_matches('.').to_string())
}

/// A standalone run of at least three digits on the patient line.
fn bare_number(rest: &str) -> Option<String> {
    rest.split_whitespace()
        .map(clean)
        .find(|w| w.len() >= 3 && w.chars().all(|c| c.is_ascii_digit()))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn lines(texts: &[&str]) -> Vec<RecognizedLine> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| RecognizedLine {
                text: t.to_string(),
                index: i,
                x: 0,
                y: i as u32 * 30,
                page: 0,
            })
            .collect()
    }

    #[test]
    fn surname_and_bare_number_on_patient_line() {
        let info = extract_patient(&lines(&["Patient: Smith 12345"]));
        assert_eq!(info.surname.as_deref(), Some("Smith"));
        assert_eq!(info.number.as_deref(), Some("12345"));
        assert!(info.name.is_none());
    }

    #[test]
    fn russian_full_name_with_card_number() {
        let info = extract_patient(&lines(&[
            "Пациент: Иванова Мария Петровна",
            "Карта № 4471/23",
            "Дата рождения: 02.11.1961",
        ]));
        assert_eq!(info.surname.as_deref(), Some("Иванова"));
        assert_eq!(info.name.as_deref(), Some("Мария"));
        assert_eq!(info.patronymic.as_deref(), Some("Петровна"));
        assert_eq!(info.number.as_deref(), Some("4471/23"));
        assert_eq!(info.date_of_birth, NaiveDate::from_ymd_opt(1961, 11, 2));
    }

    #[test]
    fn initials_fill_name_and_patronymic() {
        let info = extract_patient(&lines(&["Ф.И.О.: Петров И.С."]));
        assert_eq!(info.surname.as_deref(), Some("Петров"));
        assert_eq!(info.name.as_deref(), Some("И"));
        assert_eq!(info.patronymic.as_deref(), Some("С"));
    }

    #[test]
    fn name_stops_at_other_label() {
        let info = extract_patient(&lines(&["Patient: Brown DOB 04/07/1975 ID: A-2291"]));
        assert_eq!(info.surname.as_deref(), Some("Brown"));
        assert!(info.name.is_none());
        assert_eq!(info.number.as_deref(), Some("A-2291"));
        assert_eq!(info.date_of_birth, NaiveDate::from_ymd_opt(1975, 7, 4));
    }

    #[test]
    fn top_most_line_wins() {
        let info = extract_patient(&lines(&[
            "Patient: Smith 12345",
            "Patient: Jones 99999",
        ]));
        assert_eq!(info.surname.as_deref(), Some("Smith"));
        assert_eq!(info.number.as_deref(), Some("12345"));
    }

    #[test]
    fn short_digit_runs_are_not_numbers() {
        let info = extract_patient(&lines(&["Patient: Smith 42"]));
        assert!(info.number.is_none());
    }

    #[test]
    fn lab_lines_have_no_patient() {
        let info = extract_patient(&lines(&["Glucose 5.4 mmol/L", "Cholesterol 5.1"]));
        assert!(info.is_empty());
    }
}
