/// Characters kept besides letters, digits and whitespace: punctuation that
/// carries meaning in lab reports (decimals, ranges, units, labels).
fn is_report_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | ';' | ':' | '-' | '/' | '\\' | '(' | ')' | '[' | ']' | '{' | '}'
            | '+' | '=' | '%' | '#' | '&' | '\'' | '"' | '<' | '>' | '*' | '_' | '^' | '|'
            | '°' | '²' | '³' | '№'
            | '\u{2264}' // ≤
            | '\u{2265}' // ≥
            | '\u{00B1}' // ±
            | '\u{2013}' // En-dash
            | '\u{2014}' // Em-dash
            | '\u{2212}' // Minus sign
            | '«' | '»'
    )
}

/// Clean a single line: drop control and stray symbol characters, turn tabs
/// into spaces, trim the ends. Interior spacing is kept (column gaps).
pub fn sanitize_line(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == ' ' || is_report_punctuation(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize extracted text before passing downstream.
/// Strips control characters, drops blank lines, preserves report punctuation.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.lines()
        .map(sanitize_line)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_null_bytes() {
        let clean = sanitize_extracted_text("Patient: Ivanov\x00Petr");
        assert!(!clean.contains('\x00'));
        assert!(clean.contains("IvanovPetr"));
    }

    #[test]
    fn strips_control_characters() {
        let clean = sanitize_extracted_text("Glucose 5.4\x01\x02\x03\nDate: 2024-01-15");
        assert_eq!(clean, "Glucose 5.4\nDate: 2024-01-15");
    }

    #[test]
    fn preserves_units_and_ranges() {
        let raw = "Potassium: 4.2 mmol/L (3.5-5.0)";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn preserves_cyrillic_and_number_sign() {
        let raw = "Карта № 12345, креатинин 85 мкмоль/л (62–106)";
        assert_eq!(sanitize_line(raw), raw);
    }

    #[test]
    fn preserves_comparison_signs() {
        assert_eq!(sanitize_line("CRP ≤5.0 mg/L"), "CRP ≤5.0 mg/L");
        assert_eq!(sanitize_line("TSH < 4.0"), "TSH < 4.0");
    }

    #[test]
    fn tabs_become_spaces_and_gaps_survive() {
        assert_eq!(sanitize_line("\tGlucose\t\t6.8  mmol/L\t"), "Glucose  6.8  mmol/L");
    }

    #[test]
    fn collapses_blank_lines() {
        let raw = "Line one\n\n\n\nLine two\n   \nLine three";
        assert_eq!(sanitize_extracted_text(raw), "Line one\nLine two\nLine three");
    }

    #[test]
    fn only_control_chars_returns_empty() {
        assert_eq!(sanitize_extracted_text("\x00\x01\x02"), "");
        assert_eq!(sanitize_extracted_text(""), "");
    }

    #[test]
    fn preserves_accented_latin() {
        let clean = sanitize_line("Créatinine µmol/L");
        assert_eq!(clean, "Créatinine µmol/L");
    }
}
