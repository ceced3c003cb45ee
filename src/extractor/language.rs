use whatlang::{Lang, detect};

const MIN_CONFIDENCE: f64 = 0.25;
const MIN_TEXT_LENGTH: usize = 50;

/// ISO 639-1 codes for the languages we expect to see most.
const TWO_LETTER_CODES: &[(Lang, &str)] = &[
    (Lang::Eng, "en"),
    (Lang::Spa, "es"),
    (Lang::Fra, "fr"),
    (Lang::Deu, "de"),
    (Lang::Ita, "it"),
    (Lang::Por, "pt"),
    (Lang::Nld, "nl"),
    (Lang::Pol, "pl"),
    (Lang::Swe, "sv"),
    (Lang::Dan, "da"),
    (Lang::Fin, "fi"),
    (Lang::Tur, "tr"),
    (Lang::Rus, "ru"),
    (Lang::Ukr, "uk"),
    (Lang::Cmn, "zh"),
    (Lang::Jpn, "ja"),
    (Lang::Kor, "ko"),
    (Lang::Ara, "ar"),
    (Lang::Heb, "he"),
    (Lang::Hin, "hi"),
];

/// Best-effort language of an article body. `None` for short or ambiguous text.
pub fn detect_language(text: &str) -> Option<String> {
    if text.trim().len() < MIN_TEXT_LENGTH {
        return None;
    }

    let info = detect(text)?;
    if info.confidence() < MIN_CONFIDENCE {
        return None;
    }

    let lang = info.lang();
    let code = TWO_LETTER_CODES
        .iter()
        .find(|(known, _)| *known == lang)
        .map(|(_, code)| (*code).to_string())
        .unwrap_or_else(|| lang.code().to_string());
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_english() {
        let text = "This is a test of the English language detection system. It should work well.";
        assert_eq!(detect_language(text), Some("en".to_string()));
    }

    #[test]
    fn test_detect_spanish() {
        let text = "Esto es una prueba del sistema de detección de idiomas en español. Debería funcionar bien.";
        assert_eq!(detect_language(text), Some("es".to_string()));
    }

    #[test]
    fn test_short_text_returns_none() {
        assert_eq!(detect_language("Short"), None);
    }
}
