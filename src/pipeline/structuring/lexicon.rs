//! Biomarker lexicon: canonical kinds, their printed name variants in
//! Russian and English, unit families and plausible value bounds.
//!
//! Built once on first use and shared read-only by every worker.

use std::sync::LazyLock;

use strsim::levenshtein;

use super::units::Unit;
use crate::models::BiomarkerKind;

// ═══════════════════════════════════════════════════════════
// Static table
// ═══════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct BiomarkerSpec {
    pub kind: BiomarkerKind,
    pub variants: &'static [&'static str],
    /// Units the biomarker is reported in.
    pub units: &'static [Unit],
    /// Inclusive plausible bounds, per unit.
    pub plausible: &'static [(Unit, f64, f64)],
}

impl BiomarkerSpec {
    pub fn accepts_unit(&self, unit: Unit) -> bool {
        self.units.contains(&unit)
    }

    /// Bounds check in the printed unit when it belongs to the family,
    /// otherwise against every family unit's bounds.
    pub fn is_plausible(&self, value: f64, unit: Option<Unit>) -> bool {
        let within = |(_, min, max): &(Unit, f64, f64)| value >= *min && value <= *max;
        match unit.filter(|u| self.accepts_unit(*u)) {
            Some(unit) => self
                .plausible
                .iter()
                .filter(|(u, _, _)| *u == unit)
                .all(within),
            None => self.plausible.is_empty() || self.plausible.iter().any(within),
        }
    }
}

use BiomarkerKind as K;
use Unit::*;

const SPECS: &[BiomarkerSpec] = &[
    BiomarkerSpec {
        kind: K::TotalCholesterol,
        variants: &[
            "холестерин",
            "холестерин общий",
            "общий холестерин",
            "cholesterol",
            "total cholesterol",
            "cholesterol total",
            "chol",
        ],
        units: &[MmolPerL, MgPerDl],
        plausible: &[(MmolPerL, 0.5, 20.0), (MgPerDl, 20.0, 800.0)],
    },
    BiomarkerSpec {
        kind: K::LdlCholesterol,
        variants: &[
            "лпнп",
            "холестерин лпнп",
            "лпнп холестерин",
            "холестерин липопротеинов низкой плотности",
            "ldl",
            "ldl-c",
            "ldl cholesterol",
            "cholesterol ldl",
        ],
        units: &[MmolPerL, MgPerDl],
        plausible: &[(MmolPerL, 0.1, 15.0), (MgPerDl, 5.0, 600.0)],
    },
    BiomarkerSpec {
        kind: K::HdlCholesterol,
        variants: &[
            "лпвп",
            "холестерин лпвп",
            "лпвп холестерин",
            "холестерин липопротеинов высокой плотности",
            "hdl",
            "hdl-c",
            "hdl cholesterol",
            "cholesterol hdl",
        ],
        units: &[MmolPerL, MgPerDl],
        plausible: &[(MmolPerL, 0.1, 5.0), (MgPerDl, 5.0, 200.0)],
    },
    BiomarkerSpec {
        kind: K::Triglycerides,
        variants: &["триглицериды", "триглицерид", "тг", "triglycerides", "triglyceride", "tg"],
        units: &[MmolPerL, MgPerDl],
        plausible: &[(MmolPerL, 0.1, 50.0), (MgPerDl, 10.0, 4500.0)],
    },
    BiomarkerSpec {
        kind: K::Creatinine,
        variants: &["креатинин", "creatinine", "crea"],
        units: &[UmolPerL, MgPerDl],
        plausible: &[(UmolPerL, 10.0, 2000.0), (MgPerDl, 0.1, 25.0)],
    },
    BiomarkerSpec {
        kind: K::Urea,
        variants: &["мочевина", "urea"],
        units: &[MmolPerL, MgPerDl],
        plausible: &[(MmolPerL, 0.5, 60.0), (MgPerDl, 2.0, 170.0)],
    },
    BiomarkerSpec {
        kind: K::UricAcid,
        variants: &["мочевая кислота", "uric acid"],
        units: &[UmolPerL, MgPerDl],
        plausible: &[(UmolPerL, 50.0, 1500.0), (MgPerDl, 1.0, 25.0)],
    },
    BiomarkerSpec {
        kind: K::Alt,
        variants: &[
            "алт",
            "алат",
            "аланинаминотрансфераза",
            "alt",
            "alat",
            "alanine aminotransferase",
        ],
        units: &[UPerL],
        plausible: &[(UPerL, 1.0, 5000.0)],
    },
    BiomarkerSpec {
        kind: K::Ast,
        variants: &[
            "аст",
            "асат",
            "аспартатаминотрансфераза",
            "ast",
            "asat",
            "aspartate aminotransferase",
        ],
        units: &[UPerL],
        plausible: &[(UPerL, 1.0, 5000.0)],
    },
    BiomarkerSpec {
        kind: K::Cpk,
        variants: &[
            "кфк",
            "креатинкиназа",
            "креатинфосфокиназа",
            "cpk",
            "ck",
            "creatine kinase",
        ],
        units: &[UPerL],
        plausible: &[(UPerL, 5.0, 100_000.0)],
    },
    BiomarkerSpec {
        kind: K::Crp,
        variants: &["срб", "с-реактивный белок", "crp", "c-reactive protein"],
        units: &[MgPerL],
        plausible: &[(MgPerL, 0.0, 500.0)],
    },
    BiomarkerSpec {
        kind: K::TotalBilirubin,
        variants: &[
            "билирубин",
            "билирубин общий",
            "общий билирубин",
            "bilirubin",
            "total bilirubin",
            "bilirubin total",
            "tbil",
        ],
        units: &[UmolPerL, MgPerDl],
        plausible: &[(UmolPerL, 1.0, 700.0), (MgPerDl, 0.05, 40.0)],
    },
    BiomarkerSpec {
        kind: K::Potassium,
        variants: &["калий", "potassium", "kalium", "k+"],
        units: &[MmolPerL],
        plausible: &[(MmolPerL, 1.0, 10.0)],
    },
    BiomarkerSpec {
        kind: K::Sodium,
        variants: &["натрий", "sodium", "natrium", "na", "na+"],
        units: &[MmolPerL],
        plausible: &[(MmolPerL, 100.0, 200.0)],
    },
    BiomarkerSpec {
        kind: K::Glucose,
        variants: &["глюкоза", "глюкоза крови", "glucose", "blood glucose", "glu"],
        units: &[MmolPerL, MgPerDl],
        plausible: &[(MmolPerL, 1.0, 50.0), (MgPerDl, 20.0, 900.0)],
    },
    BiomarkerSpec {
        kind: K::GlycatedHemoglobin,
        variants: &[
            "гликированный гемоглобин",
            "гемоглобин гликированный",
            "гликозилированный гемоглобин",
            "hba1c",
            "glycated hemoglobin",
            "hemoglobin a1c",
        ],
        units: &[Percent, MmolPerMol],
        plausible: &[(Percent, 3.0, 20.0), (MmolPerMol, 10.0, 200.0)],
    },
    BiomarkerSpec {
        kind: K::Tsh,
        variants: &["ттг", "тиреотропный гормон", "tsh", "thyrotropin"],
        units: &[MiuPerL],
        plausible: &[(MiuPerL, 0.001, 150.0)],
    },
    BiomarkerSpec {
        kind: K::T4,
        variants: &[
            "т4",
            "т4 свободный",
            "свободный т4",
            "тироксин",
            "тироксин свободный",
            "t4",
            "ft4",
            "free t4",
            "thyroxine",
        ],
        units: &[PmolPerL, NmolPerL],
        plausible: &[(PmolPerL, 1.0, 100.0), (NmolPerL, 10.0, 400.0)],
    },
];

/// Names that overlap a tracked variant but denote another analyte.
/// They win the overlap and produce no mention.
const BLOCKERS: &[&str] = &[
    "билирубин прямой",
    "прямой билирубин",
    "билирубин непрямой",
    "непрямой билирубин",
    "direct bilirubin",
    "bilirubin direct",
    "indirect bilirubin",
    "лпонп",
    "холестерин лпонп",
    "vldl",
    "не лпвп",
    "холестерин не лпвп",
    "non hdl",
    "non-hdl cholesterol",
    "т3 свободный",
    "свободный т3",
    "free t3",
];

pub fn spec(kind: BiomarkerKind) -> Option<&'static BiomarkerSpec> {
    SPECS.iter().find(|s| s.kind == kind)
}

// ═══════════════════════════════════════════════════════════
// Text folding
// ═══════════════════════════════════════════════════════════

/// Latin/Cyrillic pairs OCR confuses, lowercase.
const HOMOGLYPHS: &[(char, char)] = &[
    ('a', 'а'),
    ('e', 'е'),
    ('o', 'о'),
    ('p', 'р'),
    ('c', 'с'),
    ('x', 'х'),
    ('y', 'у'),
    ('k', 'к'),
    ('m', 'м'),
    ('t', 'т'),
    ('h', 'н'),
    ('b', 'в'),
];

fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ё' => 'е',
        'й' => 'и',
        c => c,
    }
}

/// Lowercase and strip diacritics (`ё` and `й` count as diacritics).
pub fn fold(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).map(fold_char).collect()
}

fn is_cyrillic(c: char) -> bool {
    ('\u{0400}'..='\u{04FF}').contains(&c)
}

/// In a token mixing scripts, rewrite look-alike letters into the script
/// most of its letters use. Ties go to Cyrillic.
fn unify_script(token: &str) -> String {
    let latin = token.chars().filter(char::is_ascii_alphabetic).count();
    let cyrillic = token.chars().filter(|c| is_cyrillic(*c)).count();
    if latin == 0 || cyrillic == 0 {
        return token.to_string();
    }
    let to_cyrillic = cyrillic >= latin;
    token
        .chars()
        .map(|c| {
            HOMOGLYPHS
                .iter()
                .find_map(|&(lat, cyr)| match (to_cyrillic, c) {
                    (true, c) if c == lat => Some(cyr),
                    (false, c) if c == cyr => Some(lat),
                    _ => None,
                })
                .unwrap_or(c)
        })
        .collect()
}

/// Cyrillic reading of an all-Latin token whose every letter has a
/// Cyrillic look-alike (`act` → `аст`).
fn cyrillic_reading(token: &str) -> Option<String> {
    if !token.chars().any(|c| c.is_ascii_alphabetic()) || token.chars().any(is_cyrillic) {
        return None;
    }
    token
        .chars()
        .map(|c| {
            if c.is_ascii_alphabetic() {
                HOMOGLYPHS.iter().find(|(lat, _)| *lat == c).map(|(_, cyr)| *cyr)
            } else {
                Some(c)
            }
        })
        .collect()
}

/// A word of a line: folded text plus its byte span in the original.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    /// Cyrillic reading when the token is written in Latin look-alikes.
    pub cyrillic: Option<String>,
    pub start: usize,
    pub end: usize,
}

/// Alphanumeric runs, each keeping a directly trailing `+` (`K+`, `Na+`).
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if !c.is_alphanumeric() {
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = chars.peek() {
            if !next.is_alphanumeric() {
                break;
            }
            end = i + next.len_utf8();
            chars.next();
        }
        if let Some(&(i, '+')) = chars.peek() {
            end = i + 1;
            chars.next();
        }
        let text = unify_script(&fold(&line[start..end]));
        tokens.push(Token {
            cyrillic: cyrillic_reading(&text),
            text,
            start,
            end,
        });
    }
    tokens
}

/// Edits tolerated for a name of `len` letters.
fn allowed_distance(len: usize) -> usize {
    match len {
        0..=4 => 0,
        5..=7 => 1,
        _ => 2,
    }
}

// ═══════════════════════════════════════════════════════════
// Matching
// ═══════════════════════════════════════════════════════════

/// A biomarker name found in a line. `start`/`end` are byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameMatch {
    pub kind: BiomarkerKind,
    pub start: usize,
    pub end: usize,
    pub distance: usize,
}

struct Variant {
    /// `None` for blockers.
    kind: Option<BiomarkerKind>,
    joined: String,
    token_count: usize,
    max_distance: usize,
}

impl Variant {
    fn new(kind: Option<BiomarkerKind>, name: &str) -> Self {
        let tokens = tokenize(name);
        let letters: usize = tokens.iter().map(|t| t.text.chars().count()).sum();
        Self {
            kind,
            joined: tokens
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            token_count: tokens.len(),
            max_distance: allowed_distance(letters),
        }
    }
}

struct Hit {
    kind: Option<BiomarkerKind>,
    first: usize,
    last: usize,
    span: usize,
    distance: usize,
}

pub struct Lexicon {
    variants: Vec<Variant>,
}

pub static LEXICON: LazyLock<Lexicon> = LazyLock::new(Lexicon::builtin);

impl Lexicon {
    fn builtin() -> Self {
        let mut variants: Vec<Variant> = SPECS
            .iter()
            .flat_map(|spec| spec.variants.iter().map(|v| Variant::new(Some(spec.kind), v)))
            .collect();
        variants.extend(BLOCKERS.iter().map(|b| Variant::new(None, b)));
        tracing::debug!(variants = variants.len(), "Biomarker lexicon built");
        Self { variants }
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    /// Biomarker names in `line`, left to right, without overlaps.
    ///
    /// Every token window is compared with every variant of the same word
    /// count. Where matches overlap, the longer one wins, then the closer.
    pub fn find_mentions(&self, line: &str) -> Vec<NameMatch> {
        let tokens = tokenize(line);
        let mut hits: Vec<Hit> = Vec::new();

        for first in 0..tokens.len() {
            if !tokens[first].text.starts_with(char::is_alphabetic) {
                continue;
            }
            for variant in &self.variants {
                let last = first + variant.token_count;
                if variant.token_count == 0 || last > tokens.len() {
                    continue;
                }
                let window = &tokens[first..last];
                let latin = window
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let span = latin.chars().count();
                if span.abs_diff(variant.joined.chars().count()) > variant.max_distance {
                    continue;
                }
                let mut distance = levenshtein(&latin, &variant.joined);
                if window.iter().any(|t| t.cyrillic.is_some()) {
                    let cyrillic = window
                        .iter()
                        .map(|t| t.cyrillic.as_deref().unwrap_or(&t.text))
                        .collect::<Vec<_>>()
                        .join(" ");
                    distance = distance.min(levenshtein(&cyrillic, &variant.joined));
                }
                if distance <= variant.max_distance {
                    hits.push(Hit {
                        kind: variant.kind,
                        first,
                        last,
                        span,
                        distance,
                    });
                }
            }
        }

        hits.sort_by(|a, b| {
            b.span
                .cmp(&a.span)
                .then(a.distance.cmp(&b.distance))
                .then(a.first.cmp(&b.first))
        });

        let mut taken = vec![false; tokens.len()];
        let mut mentions = Vec::new();
        for hit in hits {
            if taken[hit.first..hit.last].iter().any(|t| *t) {
                continue;
            }
            taken[hit.first..hit.last].iter_mut().for_each(|t| *t = true);
            if let Some(kind) = hit.kind {
                mentions.push(NameMatch {
                    kind,
                    start: tokens[hit.first].start,
                    end: tokens[hit.last - 1].end,
                    distance: hit.distance,
                });
            }
        }
        mentions.sort_by_key(|m| m.start);
        mentions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<BiomarkerKind> {
        LEXICON.find_mentions(line).iter().map(|m| m.kind).collect()
    }

    #[test]
    fn every_kind_has_a_spec() {
        for kind in BiomarkerKind::all() {
            let spec = spec(*kind).unwrap();
            assert!(!spec.variants.is_empty());
            assert!(!spec.units.is_empty());
        }
        let names: usize = SPECS.iter().map(|s| s.variants.len()).sum();
        assert_eq!(LEXICON.variant_count(), names + BLOCKERS.len());
    }

    #[test]
    fn fold_strips_case_and_diacritics() {
        assert_eq!(fold("Ёжик ЙОД"), "ежик иод");
        assert_eq!(fold("Glucosé"), "glucose");
    }

    #[test]
    fn mixed_script_token_unified_to_majority() {
        // Latin 'o' and 'a' inside a Cyrillic word.
        assert_eq!(kinds("Глюкoзa 5,4"), vec![K::Glucose]);
        // Cyrillic 'с' inside a Latin word.
        assert_eq!(kinds("Glu\u{0441}ose 5.4"), vec![K::Glucose]);
    }

    #[test]
    fn all_latin_lookalikes_read_as_cyrillic() {
        // "АСТ" recognized with Latin letters.
        assert_eq!(kinds("ACT 31 Ед/л"), vec![K::Ast]);
        assert_eq!(LEXICON.find_mentions("ACT 31")[0].distance, 0);
        assert_eq!(cyrillic_reading("act").as_deref(), Some("аст"));
        // 'l' has no Cyrillic look-alike.
        assert_eq!(cyrillic_reading("alt"), None);
    }

    #[test]
    fn exact_names_in_both_languages() {
        assert_eq!(kinds("Cholesterol 5.2 mmol/L"), vec![K::TotalCholesterol]);
        assert_eq!(kinds("Креатинин 80 мкмоль/л"), vec![K::Creatinine]);
        assert_eq!(kinds("АЛТ 25 Ед/л"), vec![K::Alt]);
        assert_eq!(kinds("HbA1c 6.1 %"), vec![K::GlycatedHemoglobin]);
    }

    #[test]
    fn ocr_substitutions_tolerated_by_length() {
        let m = LEXICON.find_mentions("Creatinlne 80");
        assert_eq!(m[0].kind, K::Creatinine);
        assert_eq!(m[0].distance, 1);
        // Short names must match exactly.
        assert!(kinds("ALX 25").is_empty());
    }

    #[test]
    fn longest_name_wins_overlap() {
        assert_eq!(kinds("Холестерин ЛПНП 3,1"), vec![K::LdlCholesterol]);
        assert_eq!(kinds("HDL cholesterol 1.4"), vec![K::HdlCholesterol]);
    }

    #[test]
    fn blockers_suppress_other_analytes() {
        assert!(kinds("Билирубин прямой 3,4").is_empty());
        assert!(kinds("Холестерин ЛПОНП 0,5").is_empty());
        assert_eq!(kinds("Билирубин общий 12"), vec![K::TotalBilirubin]);
    }

    #[test]
    fn several_mentions_in_one_line() {
        let m = LEXICON.find_mentions("АЛТ 25 АСТ 30");
        assert_eq!(m.iter().map(|m| m.kind).collect::<Vec<_>>(), vec![K::Alt, K::Ast]);
        assert!(m[0].end <= m[1].start);
    }

    #[test]
    fn plus_suffix_kept_in_tokens() {
        let tokens = tokenize("K+ 4.2, Na+ 140");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["k+", "4", "2", "na+", "140"]);
        assert_eq!(kinds("K+ 4.2"), vec![K::Potassium]);
    }

    #[test]
    fn plausibility_per_unit() {
        let creatinine = spec(K::Creatinine).unwrap();
        assert!(creatinine.is_plausible(80.0, Some(UmolPerL)));
        assert!(!creatinine.is_plausible(80.0, Some(MgPerDl)));
        // Unknown unit: any family unit's bounds.
        assert!(creatinine.is_plausible(1.1, None));
        assert!(!creatinine.is_plausible(9000.0, None));
        assert!(creatinine.is_plausible(80.0, Some(Percent)));
    }
}
