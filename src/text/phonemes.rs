//! Grapheme → phoneme conversion.
//!
//! English, Spanish, Urdu and Hindi have tables; every other language
//! falls back to one phoneme per character.  Whitespace and punctuation
//! become a single [`Phoneme::Pause`].

use std::fmt;

use crate::text::language;

/// One synthesis unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Phoneme {
    Sound(String),
    Pause,
}

impl Phoneme {
    pub fn is_pause(&self) -> bool {
        matches!(self, Phoneme::Pause)
    }
}

impl fmt::Display for Phoneme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phoneme::Sound(s) => f.write_str(s),
            Phoneme::Pause => f.write_str("_"),
        }
    }
}

/// Grapheme table; longer graphemes are listed before their prefixes.
/// An empty phoneme marks a silent letter.
type Table = &'static [(&'static str, &'static str)];

static ENGLISH: Table = &[
    ("tch", "CH"),
    ("th", "TH"),
    ("sh", "SH"),
    ("ch", "CH"),
    ("ng", "NG"),
    ("ph", "F"),
    ("wh", "W"),
    ("ck", "K"),
    ("qu", "K W"),
    ("ee", "IY"),
    ("ea", "IY"),
    ("oo", "UW"),
    ("ai", "EY"),
    ("ay", "EY"),
    ("ou", "AW"),
    ("ow", "OW"),
    ("oi", "OY"),
    ("a", "AE"),
    ("b", "B"),
    ("c", "K"),
    ("d", "D"),
    ("e", "EH"),
    ("f", "F"),
    ("g", "G"),
    ("h", "HH"),
    ("i", "IH"),
    ("j", "JH"),
    ("k", "K"),
    ("l", "L"),
    ("m", "M"),
    ("n", "N"),
    ("o", "AA"),
    ("p", "P"),
    ("q", "K"),
    ("r", "R"),
    ("s", "S"),
    ("t", "T"),
    ("u", "AH"),
    ("v", "V"),
    ("w", "W"),
    ("x", "K S"),
    ("y", "Y"),
    ("z", "Z"),
];

static SPANISH: Table = &[
    ("ch", "CH"),
    ("ll", "Y"),
    ("rr", "RR"),
    ("qu", "K"),
    ("gue", "G E"),
    ("gui", "G I"),
    ("a", "A"),
    ("á", "A"),
    ("b", "B"),
    ("c", "K"),
    ("d", "D"),
    ("e", "E"),
    ("é", "E"),
    ("f", "F"),
    ("g", "G"),
    ("h", ""),
    ("i", "I"),
    ("í", "I"),
    ("j", "X"),
    ("k", "K"),
    ("l", "L"),
    ("m", "M"),
    ("n", "N"),
    ("ñ", "NY"),
    ("o", "O"),
    ("ó", "O"),
    ("p", "P"),
    ("r", "R"),
    ("s", "S"),
    ("t", "T"),
    ("u", "U"),
    ("ú", "U"),
    ("ü", "U"),
    ("v", "B"),
    ("w", "W"),
    ("x", "K S"),
    ("y", "Y"),
    ("z", "S"),
];

static URDU: Table = &[
    ("آ", "AA"),
    ("ا", "A"),
    ("ب", "B"),
    ("پ", "P"),
    ("ت", "T"),
    ("ٹ", "TT"),
    ("ث", "S"),
    ("ج", "JH"),
    ("چ", "CH"),
    ("ح", "H"),
    ("خ", "KH"),
    ("د", "D"),
    ("ڈ", "DD"),
    ("ذ", "Z"),
    ("ر", "R"),
    ("ڑ", "RR"),
    ("ز", "Z"),
    ("ژ", "ZH"),
    ("س", "S"),
    ("ش", "SH"),
    ("ص", "S"),
    ("ض", "Z"),
    ("ط", "T"),
    ("ظ", "Z"),
    ("ع", "A"),
    ("غ", "GH"),
    ("ف", "F"),
    ("ق", "Q"),
    ("ک", "K"),
    ("گ", "G"),
    ("ل", "L"),
    ("م", "M"),
    ("ن", "N"),
    ("ں", "N"),
    ("و", "V"),
    ("ہ", "H"),
    ("ھ", "H"),
    ("ء", ""),
    ("ی", "Y"),
    ("ے", "E"),
];

static HINDI: Table = &[
    ("अ", "A"),
    ("आ", "AA"),
    ("इ", "I"),
    ("ई", "II"),
    ("उ", "U"),
    ("ऊ", "UU"),
    ("ए", "E"),
    ("ऐ", "AI"),
    ("ओ", "O"),
    ("औ", "AU"),
    ("क", "K"),
    ("ख", "KH"),
    ("ग", "G"),
    ("घ", "GH"),
    ("च", "CH"),
    ("छ", "CHH"),
    ("ज", "JH"),
    ("झ", "JHH"),
    ("ट", "TT"),
    ("ठ", "TTH"),
    ("ड", "DD"),
    ("ढ", "DDH"),
    ("ण", "NN"),
    ("त", "T"),
    ("थ", "TH"),
    ("द", "D"),
    ("ध", "DH"),
    ("न", "N"),
    ("प", "P"),
    ("फ", "PH"),
    ("ब", "B"),
    ("भ", "BH"),
    ("म", "M"),
    ("य", "Y"),
    ("र", "R"),
    ("ल", "L"),
    ("व", "V"),
    ("श", "SH"),
    ("ष", "SS"),
    ("स", "S"),
    ("ह", "H"),
    ("ा", "AA"),
    ("ि", "I"),
    ("ी", "II"),
    ("ु", "U"),
    ("ू", "UU"),
    ("े", "E"),
    ("ै", "AI"),
    ("ो", "O"),
    ("ौ", "AU"),
    ("ं", "N"),
    ("ँ", "N"),
    ("्", ""),
];

fn table_for(language_code: &str) -> Option<Table> {
    match language::primary(language_code).as_str() {
        "en" => Some(ENGLISH),
        "es" => Some(SPANISH),
        "ur" => Some(URDU),
        "hi" => Some(HINDI),
        _ => None,
    }
}

/// Returns `true` if `language_code` has its own phoneme table.
pub fn has_table(language_code: &str) -> bool {
    table_for(language_code).is_some()
}

fn is_break(c: char) -> bool {
    c.is_whitespace()
        || c.is_ascii_punctuation()
        || matches!(c, '۔' | '؟' | '،' | '؛' | '।' | '¿' | '¡' | '…' | '“' | '”' | '‘' | '’')
}

/// Convert `text` to an ordered phoneme sequence for `language_code`.
///
/// Runs of whitespace or punctuation collapse into one pause; leading and
/// trailing pauses are kept.
pub fn to_phonemes(text: &str, language_code: &str) -> Vec<Phoneme> {
    let table = table_for(language_code);
    let lower = text.to_lowercase();
    let mut out: Vec<Phoneme> = Vec::new();
    let mut rest = lower.as_str();

    while let Some(c) = rest.chars().next() {
        if is_break(c) {
            if out.last() != Some(&Phoneme::Pause) {
                out.push(Phoneme::Pause);
            }
            rest = &rest[c.len_utf8()..];
            continue;
        }

        let matched = table.and_then(|t| t.iter().find(|(g, _)| rest.starts_with(g)));
        match matched {
            Some((grapheme, phonemes)) => {
                out.extend(
                    phonemes
                        .split_whitespace()
                        .map(|p| Phoneme::Sound(p.to_string())),
                );
                rest = &rest[grapheme.len()..];
            }
            None => {
                out.push(Phoneme::Sound(c.to_uppercase().collect()));
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}
