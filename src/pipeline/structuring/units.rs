//! Measurement units printed on lab reports, with their Russian and Latin
//! spellings mapped to one canonical form.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    MmolPerL,
    UmolPerL,
    MgPerDl,
    GPerL,
    UPerL,
    MiuPerL,
    PmolPerL,
    NmolPerL,
    MmolPerMol,
    Percent,
    MgPerL,
}

impl Unit {
    /// Canonical display form, as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MmolPerL => "mmol/L",
            Self::UmolPerL => "µmol/L",
            Self::MgPerDl => "mg/dL",
            Self::GPerL => "g/L",
            Self::UPerL => "U/L",
            Self::MiuPerL => "mIU/L",
            Self::PmolPerL => "pmol/L",
            Self::NmolPerL => "nmol/L",
            Self::MmolPerMol => "mmol/mol",
            Self::Percent => "%",
            Self::MgPerL => "mg/L",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys are lowercase, without spaces, `µ`/`μ` written as `u` and `\` as `/`.
static ALIASES: LazyLock<HashMap<&'static str, Unit>> = LazyLock::new(|| {
    use Unit::*;
    [
        ("mmol/l", MmolPerL),
        ("ммоль/л", MmolPerL),
        ("umol/l", UmolPerL),
        ("mcmol/l", UmolPerL),
        ("мкмоль/л", UmolPerL),
        ("mg/dl", MgPerDl),
        ("мг/дл", MgPerDl),
        ("g/l", GPerL),
        ("г/л", GPerL),
        ("u/l", UPerL),
        ("iu/l", UPerL),
        ("ед/л", UPerL),
        ("е/л", UPerL),
        ("ме/л", UPerL),
        ("miu/l", MiuPerL),
        ("mu/l", MiuPerL),
        ("uiu/ml", MiuPerL),
        ("мме/л", MiuPerL),
        ("мкме/мл", MiuPerL),
        ("мед/л", MiuPerL),
        ("pmol/l", PmolPerL),
        ("пмоль/л", PmolPerL),
        ("nmol/l", NmolPerL),
        ("нмоль/л", NmolPerL),
        ("mmol/mol", MmolPerMol),
        ("ммоль/моль", MmolPerMol),
        ("%", Percent),
        ("mg/l", MgPerL),
        ("мг/л", MgPerL),
    ]
    .into_iter()
    .collect()
});

/// Something that looks like a unit: `word/word` (spaces around the slash
/// allowed) or a percent sign.
static UNIT_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}µμ]+\s*[/\\]\s*\p{L}+|%").expect("valid regex"));

/// Map a printed unit token to its canonical unit.
pub fn canonical_unit(token: &str) -> Option<Unit> {
    let key: String = token
        .trim()
        .trim_end_matches('.')
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            'µ' | 'μ' => 'u',
            '\\' => '/',
            c => c,
        })
        .flat_map(char::to_lowercase)
        .collect();
    ALIASES.get(key.as_str()).copied()
}

/// First recognized unit in `text`, with its byte span.
pub fn find_unit(text: &str) -> Option<(Unit, usize, usize)> {
    UNIT_SHAPE
        .find_iter(text)
        .find_map(|m| canonical_unit(m.as_str()).map(|unit| (unit, m.start(), m.end())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn russian_and_latin_spellings_agree() {
        assert_eq!(canonical_unit("ммоль/л"), Some(Unit::MmolPerL));
        assert_eq!(canonical_unit("mmol/L"), Some(Unit::MmolPerL));
        assert_eq!(canonical_unit("мкмоль/л"), Some(Unit::UmolPerL));
        assert_eq!(canonical_unit("µmol/L"), Some(Unit::UmolPerL));
        assert_eq!(canonical_unit("Ед/л"), Some(Unit::UPerL));
        assert_eq!(canonical_unit("мМЕ/л"), Some(Unit::MiuPerL));
    }

    #[test]
    fn tolerates_spacing_and_backslash() {
        assert_eq!(canonical_unit("mmol / L"), Some(Unit::MmolPerL));
        assert_eq!(canonical_unit("mg\\dL"), Some(Unit::MgPerDl));
    }

    #[test]
    fn unknown_unit_is_none() {
        assert_eq!(canonical_unit("furlongs/fortnight"), None);
    }

    #[test]
    fn find_skips_unknown_shapes() {
        let (unit, start, _) = find_unit(" кл/мкл then 5 ммоль / л").unwrap();
        assert_eq!(unit, Unit::MmolPerL);
        assert!(start > 10);
        assert_eq!(find_unit(" 6,1 %").map(|u| u.0), Some(Unit::Percent));
        assert!(find_unit(" (3.0-5.5)").is_none());
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(Unit::UmolPerL.to_string(), "µmol/L");
    }
}
