//! User-language detection and the reply-language instruction.
//!
//! Script ranges settle Cyrillic and Arabic outright. Latin-script text is
//! scored against short function-word lists plus diacritics; with no
//! evidence it falls back to English at low confidence.

/// Languages the shell can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    French,
    Spanish,
    German,
    Russian,
    Arabic,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::French => "fr",
            Self::Spanish => "es",
            Self::German => "de",
            Self::Russian => "ru",
            Self::Arabic => "ar",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::French => "French",
            Self::Spanish => "Spanish",
            Self::German => "German",
            Self::Russian => "Russian",
            Self::Arabic => "Arabic",
        }
    }

    /// Parse a locale such as `en`, `fr-CA` or `de_DE.UTF-8`.
    pub fn from_locale(locale: &str) -> Option<Self> {
        let code = locale
            .split(['-', '_', '.'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        [
            Self::English,
            Self::French,
            Self::Spanish,
            Self::German,
            Self::Russian,
            Self::Arabic,
        ]
        .into_iter()
        .find(|l| l.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub language: Language,
    /// In `[0, 1]`.
    pub confidence: f32,
}

/// Below this, a non-default detection is not trusted enough to switch languages.
pub const MIN_SWITCH_CONFIDENCE: f32 = 0.5;

const LATIN_MARKERS: &[(Language, &[&str], &[char])] = &[
    (
        Language::English,
        &[
            "the", "is", "are", "was", "with", "this", "that", "and", "for", "not", "you", "what",
            "how", "have", "do", "can", "it", "my", "me",
        ],
        &[],
    ),
    (
        Language::French,
        &[
            "le", "la", "les", "des", "est", "dans", "avec", "une", "pour", "pas", "qui", "que",
            "je", "tu", "vous", "nous", "suis", "bonjour", "merci",
        ],
        &['é', 'è', 'ê', 'ç', 'à', 'ù', 'œ'],
    ),
    (
        Language::Spanish,
        &[
            "el", "los", "las", "está", "por", "para", "pero", "como", "qué", "hola", "gracias",
            "yo", "usted", "muy", "es", "un", "una",
        ],
        &['ñ', 'á', 'í', 'ó', 'ú', '¿', '¡'],
    ),
    (
        Language::German,
        &[
            "der", "die", "das", "und", "ist", "nicht", "ich", "du", "sie", "mit", "ein", "eine",
            "wie", "was", "danke", "hallo",
        ],
        &['ä', 'ö', 'ß'],
    ),
];

/// Detect the dominant language of `text`.
pub fn detect(text: &str) -> Detection {
    let mut cyrillic = 0usize;
    let mut arabic = 0usize;
    let mut alpha = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        alpha += 1;
        match c {
            '\u{0400}'..='\u{052F}' => cyrillic += 1,
            '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}' | '\u{FB50}'..='\u{FDFF}' | '\u{FE70}'..='\u{FEFF}' => {
                arabic += 1
            }
            _ => {}
        }
    }
    if alpha == 0 {
        return Detection {
            language: Language::English,
            confidence: 0.0,
        };
    }
    let share = |n: usize| n as f32 / alpha as f32;
    if share(cyrillic) > 0.5 {
        return Detection {
            language: Language::Russian,
            confidence: (0.7 + share(cyrillic) * 0.25).min(0.95),
        };
    }
    if share(arabic) > 0.5 {
        return Detection {
            language: Language::Arabic,
            confidence: (0.7 + share(arabic) * 0.25).min(0.95),
        };
    }
    detect_latin(text)
}

fn detect_latin(text: &str) -> Detection {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();
    let n = words.len().max(1) as f32;

    let mut scores: Vec<(Language, f32)> = LATIN_MARKERS
        .iter()
        .map(|(lang, markers, marks)| {
            let hits = words.iter().filter(|w| markers.contains(w)).count() as f32;
            let diacritics = if marks.iter().any(|m| lower.contains(*m)) { 2.0 } else { 0.0 };
            (*lang, (hits + diacritics) / n)
        })
        .collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (best, best_score) = scores[0];
    let runner_up = scores.get(1).map_or(0.0, |s| s.1);
    if best_score < 0.01 {
        return Detection {
            language: Language::English,
            confidence: 0.4,
        };
    }
    Detection {
        language: best,
        confidence: (0.6 + (best_score - runner_up).min(0.25)).min(0.85),
    }
}

/// The language block of the assembled prompt.
///
/// A confident detection differing from the default locale pins the reply
/// language; otherwise the backend is told to mirror the user.
pub fn language_instruction(input: &str, default_locale: &str) -> String {
    let detection = detect(input);
    let default = Language::from_locale(default_locale).unwrap_or(Language::English);
    if detection.language != default && detection.confidence >= MIN_SWITCH_CONFIDENCE {
        format!(
            "LANGUAGE: The user is writing in {name}. Respond entirely in {name} and never \
             switch back to {default} unless the user does.",
            name = detection.language.name(),
            default = default.name()
        )
    } else {
        "LANGUAGE: Mirror whatever language the user writes in.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts() {
        assert_eq!(detect("Собака является млекопитающим").language, Language::Russian);
        assert_eq!(detect("القطة حيوان أليف").language, Language::Arabic);
    }

    #[test]
    fn latin_languages() {
        assert_eq!(detect("Bonjour, je suis très content").language, Language::French);
        assert_eq!(detect("¿Qué tal? Hola, muy bien").language, Language::Spanish);
        assert_eq!(detect("Ich bin müde und das ist nicht gut").language, Language::German);
        assert_eq!(detect("What is the meaning of this?").language, Language::English);
    }

    #[test]
    fn no_evidence_defaults_to_english() {
        let d = detect("12345");
        assert_eq!(d.language, Language::English);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn locale_parsing() {
        assert_eq!(Language::from_locale("fr-CA"), Some(Language::French));
        assert_eq!(Language::from_locale("de_DE.UTF-8"), Some(Language::German));
        assert_eq!(Language::from_locale("xx"), None);
    }

    #[test]
    fn instruction_switches_only_for_foreign_input() {
        assert!(language_instruction("Bonjour, je suis là", "en").contains("Respond entirely in French"));
        assert!(language_instruction("How are you doing?", "en").contains("Mirror"));
        assert!(language_instruction("Bonjour, je suis là", "fr").contains("Mirror"));
    }
}
