//! Answer matching for cloze blanks and typed answers.

/// Punctuation stripped from lyric words before comparing them to vocabulary.
const WORD_PUNCTUATION: &[char] = &['.', ',', '!', '?', '¿', '¡'];

/// Lowercase a lyric word and strip surrounding sentence punctuation.
pub fn normalize_word(word: &str) -> String {
    word.to_lowercase()
        .chars()
        .filter(|c| !WORD_PUNCTUATION.contains(c))
        .collect()
}

/// Replace Spanish accented vowels and ñ with their plain letters.
pub fn strip_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            'Á' => 'A',
            'É' => 'E',
            'Í' => 'I',
            'Ó' => 'O',
            'Ú' | 'Ü' => 'U',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

/// Case-insensitive comparison that forgives missing accents.
pub fn check_answer(expected: &str, given: &str) -> bool {
    let expected = normalize_whitespace(expected).to_lowercase();
    let given = normalize_whitespace(given).to_lowercase();
    if expected == given {
        return true;
    }
    strip_accents(&expected) == strip_accents(&given)
}

/// Trim and collapse runs of whitespace.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_word("¡Hola!"), "hola");
        assert_eq!(normalize_word("¿Qué,"), "qué");
        assert_eq!(normalize_word("Corazón."), "corazón");
    }

    #[test]
    fn strip_accents_covers_spanish_letters() {
        assert_eq!(strip_accents("áéíóúüñ"), "aeiouun");
        assert_eq!(strip_accents("ÁÑO"), "ANO");
        assert_eq!(strip_accents("plain"), "plain");
    }

    #[test]
    fn exact_answer_matches() {
        assert!(check_answer("canción", "canción"));
    }

    #[test]
    fn case_and_whitespace_are_ignored() {
        assert!(check_answer("Corazón", "  corazón "));
        assert!(check_answer("te quiero", "Te   Quiero"));
    }

    #[test]
    fn missing_accents_are_accepted() {
        assert!(check_answer("canción", "cancion"));
        assert!(check_answer("año", "ano"));
        assert!(check_answer("pingüino", "pinguino"));
    }

    #[test]
    fn every_accented_word_accepts_both_spellings() {
        let words = ["mañana", "corazón", "también", "aquí", "música", "Ñandú", "vergüenza"];
        for word in words {
            assert!(check_answer(word, word), "{}", word);
            assert!(check_answer(word, &strip_accents(word)), "{}", word);
        }
    }

    #[test]
    fn wrong_answers_are_rejected() {
        assert!(!check_answer("canción", "cantar"));
        assert!(!check_answer("sol", ""));
    }
}
