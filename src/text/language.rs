//! Static language metadata and script-based language detection.

use serde::Serialize;

/// Request value asking for the language to be inferred from the text.
pub const AUTO: &str = "auto";

/// Metadata for one supported language code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub locale: &'static str,
    pub script: &'static str,
}

const fn lang(
    code: &'static str,
    name: &'static str,
    locale: &'static str,
    script: &'static str,
) -> LanguageInfo {
    LanguageInfo {
        code,
        name,
        locale,
        script,
    }
}

static LANGUAGES: &[LanguageInfo] = &[
    lang("en", "English", "en-US", "Latin"),
    lang("es", "Spanish", "es-ES", "Latin"),
    lang("fr", "French", "fr-FR", "Latin"),
    lang("de", "German", "de-DE", "Latin"),
    lang("it", "Italian", "it-IT", "Latin"),
    lang("pt", "Portuguese", "pt-BR", "Latin"),
    lang("ur", "Urdu", "ur-PK", "Arabic"),
    lang("ar", "Arabic", "ar-SA", "Arabic"),
    lang("hi", "Hindi", "hi-IN", "Devanagari"),
    lang("ru", "Russian", "ru-RU", "Cyrillic"),
    lang("zh", "Chinese", "zh-CN", "Han"),
    lang("ja", "Japanese", "ja-JP", "Japanese"),
];

/// Primary subtag of a language tag: `"en-GB"` → `"en"`.
pub fn primary(code: &str) -> String {
    code.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Metadata for `code` (a bare code or a full tag such as `"es-MX"`).
pub fn info(code: &str) -> Option<&'static LanguageInfo> {
    let primary = primary(code);
    LANGUAGES.iter().find(|l| l.code == primary)
}

/// All known languages, in table order.
pub fn all() -> &'static [LanguageInfo] {
    LANGUAGES
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Arabic,
    Devanagari,
    Cyrillic,
    Han,
    Kana,
}

fn script_of(c: char) -> Option<Script> {
    match c as u32 {
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => Some(Script::Latin),
        0x0600..=0x06FF | 0x0750..=0x077F | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF => {
            Some(Script::Arabic)
        }
        0x0900..=0x097F => Some(Script::Devanagari),
        0x0400..=0x04FF => Some(Script::Cyrillic),
        0x3040..=0x30FF => Some(Script::Kana),
        0x4E00..=0x9FFF => Some(Script::Han),
        _ => None,
    }
}

/// Guess the language of `text` from its dominant script.
///
/// Arabic script is taken as Urdu, Devanagari as Hindi.  Latin text is
/// Spanish when it carries Spanish-only marks, English otherwise.  `None`
/// when the text has no letters from a known script.
pub fn detect(text: &str) -> Option<&'static str> {
    let mut counts = [0usize; 6];
    let scripts = [
        Script::Latin,
        Script::Arabic,
        Script::Devanagari,
        Script::Cyrillic,
        Script::Han,
        Script::Kana,
    ];
    for c in text.chars() {
        if let Some(s) = script_of(c) {
            if let Some(i) = scripts.iter().position(|&x| x == s) {
                counts[i] += 1;
            }
        }
    }
    // Any kana means Japanese even when Han characters dominate.
    if counts[5] > 0 {
        return Some("ja");
    }
    let (best, &count) = counts.iter().enumerate().max_by_key(|&(i, c)| (*c, usize::MAX - i))?;
    if count == 0 {
        return None;
    }
    Some(match scripts[best] {
        Script::Latin => {
            if text.chars().any(|c| "ñÑ¿¡áéíóúÁÉÍÓÚ".contains(c)) {
                "es"
            } else {
                "en"
            }
        }
        Script::Arabic => "ur",
        Script::Devanagari => "hi",
        Script::Cyrillic => "ru",
        Script::Han => "zh",
        Script::Kana => "ja",
    })
}

/// Effective language for a request: `requested` unless it is [`AUTO`],
/// in which case the detected language, falling back to `fallback`.
pub fn resolve(requested: &str, text: &str, fallback: &str) -> String {
    if requested.trim().eq_ignore_ascii_case(AUTO) || requested.trim().is_empty() {
        detect(text).unwrap_or(fallback).to_string()
    } else {
        primary(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_accepts_full_tags() {
        let es = info("es-MX").unwrap();
        assert_eq!(es.name, "Spanish");
        assert_eq!(es.script, "Latin");
        assert_eq!(info("UR").unwrap().locale, "ur-PK");
        assert!(info("xx").is_none());
    }

    #[test]
    fn detects_by_script() {
        assert_eq!(detect("Hello there"), Some("en"));
        assert_eq!(detect("¿Dónde está la biblioteca?"), Some("es"));
        assert_eq!(detect("آپ کیسے ہیں؟"), Some("ur"));
        assert_eq!(detect("आप कैसे हैं"), Some("hi"));
        assert_eq!(detect("Привет"), Some("ru"));
        assert_eq!(detect("こんにちは世界"), Some("ja"));
        assert_eq!(detect("1234 !!"), None);
    }

    #[test]
    fn resolve_auto_falls_back_to_profile_language() {
        assert_eq!(resolve("auto", "1234", "es"), "es");
        assert_eq!(resolve("AUTO", "नमस्ते", "en"), "hi");
        assert_eq!(resolve("en-GB", "नमस्ते", "es"), "en");
    }
}
