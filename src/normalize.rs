use regex::Regex;
use tracing::warn;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

pub const DEFAULT_SYMBOLS: &[&str] = &[
    "...", ":", "-", "_", ".", "/", "\\", "|", "(", ")", "[", "]", "{", "}", "¿", "?", "¡", "!",
    "&", "@", "°",
];

pub const DEFAULT_PHRASES: &[&str] = &[
    "continua",
    "N D",
    "ejemplo",
    "borrar",
    "DEDUCIR",
    "EL",
    "COSTO",
    "DE",
    "REACONDICIONAMIENTO",
    "Linea",
    "Nueva",
    "Unidades",
    "Usadas",
    "Actualizacion",
    "Nuevas",
    "Precios",
    "Lista",
    "Anterior",
    "Dolares",
];

const APOSTROPHES: &[char] = &['\'', '\u{2019}', '\u{2018}'];

/// Canonicalizes raw OCR strings into comparable tokens.
///
/// Steps run in a fixed order: strip diacritics, delete symbols, delete
/// apostrophes, remove noise phrases on word boundaries, collapse whitespace.
/// Steps after the first repeat until the text stops changing, so the output
/// is a fixed point for any configured symbol and phrase set.
#[derive(Debug, Clone)]
pub struct Normalizer {
    symbols: Vec<String>,
    phrases: Option<Regex>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_SYMBOLS.iter().map(|value| value.to_string()),
            DEFAULT_PHRASES.iter().map(|value| value.to_string()),
        )
        .expect("default phrase pattern")
    }
}

impl Normalizer {
    /// Fails when the phrase list cannot be compiled into one pattern,
    /// e.g. when it exceeds the regex size limit.
    pub fn new<S, P>(symbols: S, phrases: P) -> Result<Self, regex::Error>
    where
        S: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
    {
        let mut symbols = symbols
            .into_iter()
            .filter(|value| !value.is_empty())
            .filter(|value| {
                // accents are gone before symbols are deleted
                let reachable = strip_diacritics(value) == *value;
                if !reachable {
                    warn!(symbol = %value, "ignoring symbol with diacritics");
                }
                reachable
            })
            .collect::<Vec<_>>();
        // multi-character symbols first so "..." is not eaten piecewise by "."
        symbols.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        symbols.dedup();

        let mut phrases = phrases
            .into_iter()
            .map(|value| strip_diacritics(value.trim()))
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>();
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        phrases.dedup();

        Ok(Self {
            symbols,
            phrases: build_phrase_pattern(&phrases)?,
        })
    }

    pub fn normalize(&self, raw: &str) -> String {
        let mut text = strip_diacritics(raw.trim());
        // deleting apostrophes or phrases can join the parts of a symbol
        loop {
            let mut next = self.remove_symbols(text.clone());
            next.retain(|ch| !APOSTROPHES.contains(&ch));
            next = self.remove_phrases(collapse_whitespace(&next));
            if next == text {
                return next;
            }
            text = next;
        }
    }

    /// Missing text stays missing.
    pub fn normalize_opt(&self, raw: Option<&str>) -> Option<String> {
        raw.map(|value| self.normalize(value))
    }

    fn remove_symbols(&self, mut text: String) -> String {
        loop {
            let before = text.len();
            for symbol in &self.symbols {
                if text.contains(symbol.as_str()) {
                    text = text.replace(symbol.as_str(), "");
                }
            }
            if text.len() == before {
                return text;
            }
        }
    }

    fn remove_phrases(&self, mut text: String) -> String {
        let Some(pattern) = &self.phrases else {
            return text;
        };
        // removing one phrase can bring the halves of another together
        loop {
            let replaced = collapse_whitespace(&pattern.replace_all(&text, " "));
            if replaced == text {
                return text;
            }
            text = replaced;
        }
    }
}

fn build_phrase_pattern(phrases: &[String]) -> Result<Option<Regex>, regex::Error> {
    if phrases.is_empty() {
        return Ok(None);
    }
    let alternation = phrases
        .iter()
        .map(|phrase| regex::escape(phrase))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).map(Some)
}

pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|ch| !is_combining_mark(*ch)).collect()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Accent- and case-insensitive key used for catalog lookups.
pub fn fold_key(text: &str) -> String {
    collapse_whitespace(&strip_diacritics(text)).to_uppercase()
}
