use std::sync::LazyLock;

use regex::Regex;

use super::confidence::{penalty, Confidence};
use super::lexicon::{spec, NameMatch, LEXICON};
use super::numeric::{find_numbers, parse_decimal};
use super::units::{find_unit, Unit};
use crate::models::{BiomarkerKind, ReferenceRange};
use crate::pipeline::extraction::RecognizedLine;

/// `low - high` with any dash; the first pair with low <= high is taken.
static RANGE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:[.,]\d+)?)\s*[-–—−]\s*(\d+(?:[.,]\d+)?)").expect("valid regex")
});

/// One-sided forms: `< 5.2`, `до 5,2` (upper) and `> 1.0`, `от 1,0` (lower).
static RANGE_UPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:<=?|≤|\bдо\b)\s*(\d+(?:[.,]\d+)?)").expect("valid regex")
});
static RANGE_LOWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:>=?|≥|\bот\b)\s*(\d+(?:[.,]\d+)?)").expect("valid regex")
});

/// A biomarker reading found in the text, before duplicate resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomarkerCandidate {
    pub kind: BiomarkerKind,
    pub value: f64,
    pub unit: Option<Unit>,
    pub reference_range: Option<ReferenceRange>,
    /// Line holding the biomarker name.
    pub line_index: usize,
    /// Byte offset of the name within its line.
    pub column: usize,
    pub confidence: Confidence,
    pub in_bounds: bool,
    /// Value read from the line after the name.
    pub cross_line: bool,
}

impl BiomarkerCandidate {
    pub fn is_low_confidence(&self) -> bool {
        !self.in_bounds || self.confidence.is_low()
    }
}

/// Value, unit and range read from one text segment.
struct Reading {
    value: f64,
    unit: Option<Unit>,
    range: Option<ReferenceRange>,
}

/// Every biomarker reading in document order.
///
/// The value is the first number after the name, up to the next name on
/// the same line. Without one, the start of the following line (before
/// any name there) is tried. A name with no number nearby yields nothing.
pub fn extract_candidates(lines: &[RecognizedLine]) -> Vec<BiomarkerCandidate> {
    let mentions: Vec<Vec<NameMatch>> = lines
        .iter()
        .map(|l| LEXICON.find_mentions(&l.text))
        .collect();

    let mut candidates = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        for (m, mention) in mentions[i].iter().enumerate() {
            let segment_end = mentions[i]
                .get(m + 1)
                .map_or(line.text.len(), |next| next.start);
            let same_line = read_segment(&line.text[mention.end..segment_end]);

            let (reading, cross_line) = match same_line {
                Some(reading) => (reading, false),
                None => {
                    let next = lines.get(i + 1).and_then(|next_line| {
                        let end = mentions[i + 1]
                            .first()
                            .map_or(next_line.text.len(), |n| n.start);
                        read_segment(&next_line.text[..end])
                    });
                    match next {
                        Some(reading) => (reading, true),
                        None => {
                            tracing::debug!(
                                line = line.index,
                                biomarker = %mention.kind,
                                "Biomarker name without a value"
                            );
                            continue;
                        }
                    }
                }
            };

            candidates.push(score(mention, reading, line.index, cross_line));
        }
    }

    tracing::debug!(lines = lines.len(), candidates = candidates.len(), "Entities extracted");
    candidates
}

fn score(
    mention: &NameMatch,
    reading: Reading,
    line_index: usize,
    cross_line: bool,
) -> BiomarkerCandidate {
    let spec = spec(mention.kind);
    let edits = mention.distance.min(6) as u8;
    let mut confidence = Confidence::MAX.penalize(edits * penalty::NAME_EDIT);

    if cross_line {
        confidence = confidence.penalize(penalty::CROSS_LINE);
    }
    if let (Some(unit), Some(spec)) = (reading.unit, spec) {
        if !spec.accepts_unit(unit) {
            confidence = confidence.penalize(penalty::UNIT_MISMATCH);
        }
    }
    let in_bounds = spec.map_or(true, |s| s.is_plausible(reading.value, reading.unit));
    if !in_bounds {
        confidence = confidence.penalize(penalty::OUT_OF_BOUNDS);
    }

    BiomarkerCandidate {
        kind: mention.kind,
        value: reading.value,
        unit: reading.unit,
        reference_range: reading.range,
        line_index,
        column: mention.start,
        confidence,
        in_bounds,
        cross_line,
    }
}

/// First number in `segment`, the unit after it (else before it), and a
/// reference range after it.
fn read_segment(segment: &str) -> Option<Reading> {
    let value = *find_numbers(segment).first()?;
    let tail = &segment[value.end..];
    let unit = find_unit(tail)
        .or_else(|| find_unit(&segment[..value.start]))
        .map(|(unit, _, _)| unit);

    Some(Reading {
        value: value.value,
        unit,
        range: parse_range(tail),
    })
}

/// Reference range in text following a value.
pub fn parse_range(text: &str) -> Option<ReferenceRange> {
    let pair = RANGE_PAIR.captures_iter(text).find_map(|caps| {
        let low = parse_decimal(caps.get(1)?.as_str())?;
        let high = parse_decimal(caps.get(2)?.as_str())?;
        (low <= high).then(|| ReferenceRange::between(low, high))
    });
    if pair.is_some() {
        return pair;
    }

    let bound = |re: &Regex| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_decimal(m.as_str()).map(|v| (m.start(), v)))
    };
    match (bound(&RANGE_LOWER), bound(&RANGE_UPPER)) {
        // `от 3,5 до 5,5`
        (Some((l_pos, low)), Some((u_pos, high))) if l_pos < u_pos && low <= high => {
            Some(ReferenceRange::between(low, high))
        }
        (Some((l_pos, low)), Some((u_pos, high))) => Some(if l_pos < u_pos {
            ReferenceRange::lower(low)
        } else {
            ReferenceRange::upper(high)
        }),
        (Some((_, low)), None) => Some(ReferenceRange::lower(low)),
        (None, Some((_, high))) => Some(ReferenceRange::upper(high)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn single(text: &str) -> BiomarkerCandidate {
        let found = extract_candidates(&lines(&[text]));
        assert_eq!(found.len(), 1, "{text}: {found:?}");
        found.into_iter().next().unwrap()
    }

    #[test]
    fn decimal_comma_and_dot_agree() {
        assert_eq!(single("Glucose 5.2 mmol/L").value, 5.2);
        assert_eq!(single("Glucose 5,2 mmol/L").value, 5.2);
    }

    #[test]
    fn exact_same_line_in_range_is_maximal() {
        let c = single("Cholesterol 5.2 mmol/L  (3.0-5.5)");
        assert_eq!(c.kind, BiomarkerKind::TotalCholesterol);
        assert_eq!(c.confidence, Confidence::MAX);
        assert_eq!(c.unit, Some(Unit::MmolPerL));
        assert_eq!(c.reference_range, Some(ReferenceRange::between(3.0, 5.5)));
        assert!(!c.is_low_confidence());
    }

    #[test]
    fn russian_line_with_cyrillic_unit() {
        let c = single("Креатинин 84,5 мкмоль/л 62 – 106");
        assert_eq!(c.kind, BiomarkerKind::Creatinine);
        assert_eq!(c.value, 84.5);
        assert_eq!(c.unit, Some(Unit::UmolPerL));
        assert_eq!(c.reference_range, Some(ReferenceRange::between(62.0, 106.0)));
    }

    #[test]
    fn value_on_next_line_is_penalized() {
        let found = extract_candidates(&lines(&["Глюкоза", "5,4 ммоль/л"]));
        assert_eq!(found.len(), 1);
        assert!(found[0].cross_line);
        assert_eq!(found[0].value, 5.4);
        assert_eq!(found[0].confidence.value(), 100 - penalty::CROSS_LINE);
        assert_eq!(found[0].line_index, 0);
    }

    #[test]
    fn number_before_name_is_ignored() {
        let c = single("12 Glucose 6.8 mmol/L");
        assert_eq!(c.value, 6.8);
    }

    #[test]
    fn two_biomarkers_on_one_line_keep_their_values() {
        let found = extract_candidates(&lines(&["АЛТ 25 Ед/л АСТ 31 Ед/л"]));
        let values: Vec<(BiomarkerKind, f64)> = found.iter().map(|c| (c.kind, c.value)).collect();
        assert_eq!(
            values,
            vec![(BiomarkerKind::Alt, 25.0), (BiomarkerKind::Ast, 31.0)]
        );
    }

    #[test]
    fn implausible_value_kept_but_low_confidence() {
        let c = single("Creatinine 8400 µmol/L");
        assert!(!c.in_bounds);
        assert!(c.is_low_confidence());
        assert_eq!(c.value, 8400.0);
    }

    #[test]
    fn foreign_unit_penalized() {
        let c = single("Glucose 5.4 U/L");
        assert_eq!(c.confidence.value(), 100 - penalty::UNIT_MISMATCH);
    }

    #[test]
    fn fuzzy_name_costs_confidence() {
        let c = single("Glucosa 5.4 mmol/L");
        assert_eq!(c.kind, BiomarkerKind::Glucose);
        assert_eq!(c.confidence.value(), 100 - penalty::NAME_EDIT);
    }

    #[test]
    fn unit_before_value_used_as_fallback() {
        let c = single("Мочевина, ммоль/л 5,1");
        assert_eq!(c.unit, Some(Unit::MmolPerL));
        assert_eq!(c.value, 5.1);
    }

    #[test]
    fn one_sided_ranges() {
        assert_eq!(parse_range(" mmol/L < 5,2"), Some(ReferenceRange::upper(5.2)));
        assert_eq!(parse_range(" ммоль/л до 5,2"), Some(ReferenceRange::upper(5.2)));
        assert_eq!(parse_range(" mmol/L > 1.0"), Some(ReferenceRange::lower(1.0)));
        assert_eq!(parse_range(" ммоль/л от 1,0"), Some(ReferenceRange::lower(1.0)));
        assert_eq!(parse_range(" mmol/L"), None);
        assert_eq!(
            parse_range(" ммоль/л от 3,5 до 5,5"),
            Some(ReferenceRange::between(3.5, 5.5))
        );
    }

    #[test]
    fn inverted_pair_is_not_a_range() {
        assert_eq!(parse_range(" 5.5-3.0"), None);
    }

    #[test]
    fn name_without_value_yields_nothing() {
        assert!(extract_candidates(&lines(&["Glucose", "Cholesterol 5.1"]))
            .iter()
            .all(|c| c.kind != BiomarkerKind::Glucose));
    }

    #[test]
    fn no_mentions_no_candidates() {
        assert!(extract_candidates(&lines(&["Лаборатория", "Подпись врача"])).is_empty());
    }
}
