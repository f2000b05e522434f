use std::sync::LazyLock;

use regex::Regex;

/// An unsigned decimal with an optional `.` or `,` fraction.
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("valid regex"));

/// A number found in text, with its byte span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberToken {
    pub value: f64,
    pub start: usize,
    pub end: usize,
}

/// Parse a decimal written with either `,` or `.` as the separator.
/// Thousands separators are not recognized: `1,234` reads as 1.234.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s.matches(['.', ',']).count() > 1 {
        return None;
    }
    s.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numbers in `text` not preceded by a letter. Digits after a letter
/// (`A1c`, `T4`, `B12`) belong to a name, not a value; `5.2mmol/L` still
/// yields 5.2.
pub fn find_numbers(text: &str) -> Vec<NumberToken> {
    NUMBER
        .find_iter(text)
        .filter(|m| {
            let before = text[..m.start()].chars().next_back();
            !before.is_some_and(char::is_alphabetic)
        })
        .filter_map(|m| {
            parse_decimal(m.as_str()).map(|value| NumberToken {
                value,
                start: m.start(),
                end: m.end(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_and_dot_parse_the_same() {
        assert_eq!(parse_decimal("5.2"), Some(5.2));
        assert_eq!(parse_decimal("5,2"), Some(5.2));
        assert_eq!(parse_decimal("140"), Some(140.0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("1.2.3"), None);
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn numbers_glued_to_letters_are_skipped() {
        let values: Vec<f64> = find_numbers("HbA1c 6,1 % T4 15.2")
            .iter()
            .map(|n| n.value)
            .collect();
        assert_eq!(values, vec![6.1, 15.2]);
    }

    #[test]
    fn value_glued_to_unit_is_found() {
        assert_eq!(find_numbers("6.8mmol/L")[0].value, 6.8);
    }

    #[test]
    fn spans_point_into_text() {
        let text = "Глюкоза 5,4 ммоль/л";
        let n = find_numbers(text)[0];
        assert_eq!(&text[n.start..n.end], "5,4");
    }

    #[test]
    fn range_yields_two_numbers() {
        let values: Vec<f64> = find_numbers("(3.0-5.5)").iter().map(|n| n.value).collect();
        assert_eq!(values, vec![3.0, 5.5]);
    }
}
