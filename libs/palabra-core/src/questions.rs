//! Practice questions for the mcq, fill-blank and sentence-build modes.
//!
//! Generated questions come from the enrichment service; the builders here
//! produce local stand-ins from the card alone.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Card, PracticeMode};

/// Placeholder distractors used when the catalogue has too few translations.
pub const PLACEHOLDER_DISTRACTORS: [&str; 3] = ["something else", "another word", "different meaning"];

const MCQ_OPTIONS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqQuestion {
    pub stem: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillBlankQuestion {
    pub sentence: String,
    pub answer: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceBuildQuestion {
    pub target_sentence: String,
    pub word_bank: Vec<String>,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    Mcq(McqQuestion),
    FillBlank(FillBlankQuestion),
    SentenceBuild(SentenceBuildQuestion),
}

impl Question {
    pub fn mode(&self) -> PracticeMode {
        match self {
            Self::Mcq(_) => PracticeMode::Mcq,
            Self::FillBlank(_) => PracticeMode::FillBlank,
            Self::SentenceBuild(_) => PracticeMode::SentenceBuild,
        }
    }

    /// Structural checks for questions that arrive from outside.
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::Mcq(q) => {
                !q.stem.trim().is_empty()
                    && q.options.len() == MCQ_OPTIONS
                    && q.correct_index < q.options.len()
            }
            Self::FillBlank(q) => q.sentence.contains("____") && !q.answer.trim().is_empty(),
            Self::SentenceBuild(q) => {
                !q.word_bank.is_empty() && !q.target_sentence.trim().is_empty()
            }
        }
    }

    /// Local question for `mode`, or `None` for flashcard modes.
    pub fn fallback<R: Rng + ?Sized>(
        mode: PracticeMode,
        card: &Card,
        distractors: &[String],
        rng: &mut R,
    ) -> Option<Self> {
        match mode {
            PracticeMode::Mcq => Some(Self::Mcq(fallback_mcq(card, distractors, rng))),
            PracticeMode::FillBlank => Some(Self::FillBlank(fallback_fill_blank(card))),
            PracticeMode::SentenceBuild => {
                Some(Self::SentenceBuild(fallback_sentence_build(card, rng)))
            }
            PracticeMode::Standard | PracticeMode::Reverse | PracticeMode::Typing => None,
        }
    }
}

/// Meaning question with the card's translation among up to three distractors.
pub fn fallback_mcq<R: Rng + ?Sized>(card: &Card, distractors: &[String], rng: &mut R) -> McqQuestion {
    let mut wrong: Vec<String> = Vec::with_capacity(MCQ_OPTIONS - 1);
    for candidate in distractors
        .iter()
        .map(String::as_str)
        .chain(PLACEHOLDER_DISTRACTORS)
    {
        if wrong.len() == MCQ_OPTIONS - 1 {
            break;
        }
        let taken = candidate.eq_ignore_ascii_case(&card.translation)
            || wrong.iter().any(|w| w.eq_ignore_ascii_case(candidate));
        if !taken && !candidate.trim().is_empty() {
            wrong.push(candidate.to_string());
        }
    }

    let correct_index = rng.random_range(0..=wrong.len());
    let mut options = wrong;
    options.insert(correct_index, card.translation.clone());

    McqQuestion {
        stem: format!("What does '{}' mean?", card.term),
        options,
        correct_index,
        explanation: format!("'{}' means '{}' in English.", card.term, card.translation),
    }
}

/// The card's example with the term masked out.
pub fn fallback_fill_blank(card: &Card) -> FillBlankQuestion {
    let masked = card
        .example
        .as_deref()
        .and_then(|example| mask_term(example, &card.term));
    FillBlankQuestion {
        sentence: masked.unwrap_or_else(|| "____ es una palabra importante.".to_string()),
        answer: card.term.clone(),
        hint: card.translation.clone(),
        context: card.translation.clone(),
    }
}

/// The card's example split into a shuffled word bank.
pub fn fallback_sentence_build<R: Rng + ?Sized>(card: &Card, rng: &mut R) -> SentenceBuildQuestion {
    let target_sentence = match card.example.as_deref().map(str::trim) {
        Some(example) if !example.is_empty() => example.to_string(),
        _ => format!("{} es importante.", card.term),
    };
    let mut word_bank: Vec<String> = target_sentence.split_whitespace().map(str::to_string).collect();
    word_bank.shuffle(rng);

    SentenceBuildQuestion {
        target_sentence,
        word_bank,
        translation: card.translation.clone(),
        hint: "Arrange the words to form a sentence".to_string(),
    }
}

/// Replace the first occurrence of `term`, also trying it capitalised.
fn mask_term(sentence: &str, term: &str) -> Option<String> {
    if term.is_empty() {
        return None;
    }
    if sentence.contains(term) {
        return Some(sentence.replacen(term, "____", 1));
    }
    let mut chars = term.chars();
    let capitalised: String = chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default();
    sentence
        .contains(capitalised.as_str())
        .then(|| sentence.replacen(capitalised.as_str(), "____", 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardSource;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn card(term: &str, translation: &str, example: Option<&str>) -> Card {
        Card {
            id: 1,
            term: term.to_string(),
            translation: translation.to_string(),
            example: example.map(str::to_string),
            island_id: Some(1),
            frequency_rank: Some(10),
            source: CardSource::Curriculum,
            source_song_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn mcq_uses_catalogue_distractors_first() {
        let card = card("hablar", "to speak", None);
        let distractors = vec!["to eat".to_string(), "to speak".to_string(), "to run".to_string()];
        let mcq = fallback_mcq(&card, &distractors, &mut StdRng::seed_from_u64(3));

        assert_eq!(mcq.options.len(), 4);
        assert_eq!(mcq.options[mcq.correct_index], "to speak");
        assert_eq!(mcq.options.iter().filter(|o| *o == "to speak").count(), 1);
        assert!(mcq.options.contains(&"to eat".to_string()));
        assert!(mcq.options.contains(&"to run".to_string()));
        assert!(mcq.options.contains(&"something else".to_string()));
        assert_eq!(mcq.stem, "What does 'hablar' mean?");
    }

    #[test]
    fn mcq_pads_with_placeholders() {
        let card = card("sol", "sun", None);
        let mcq = fallback_mcq(&card, &[], &mut StdRng::seed_from_u64(9));
        let mut wrong: Vec<&str> = mcq
            .options
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != mcq.correct_index)
            .map(|(_, o)| o.as_str())
            .collect();
        wrong.sort();
        assert_eq!(wrong, vec!["another word", "different meaning", "something else"]);
        assert!(Question::Mcq(mcq).is_well_formed());
    }

    #[test]
    fn fill_blank_masks_term_in_example() {
        let question = fallback_fill_blank(&card("casa", "house", Some("Mi casa es tu casa.")));
        assert_eq!(question.sentence, "Mi ____ es tu casa.");
        assert_eq!(question.answer, "casa");

        let capital = fallback_fill_blank(&card("agua", "water", Some("Agua fría, por favor.")));
        assert_eq!(capital.sentence, "____ fría, por favor.");
    }

    #[test]
    fn fill_blank_without_usable_example() {
        let none = fallback_fill_blank(&card("perro", "dog", None));
        assert_eq!(none.sentence, "____ es una palabra importante.");
        let unrelated = fallback_fill_blank(&card("perro", "dog", Some("El gato duerme.")));
        assert_eq!(unrelated.sentence, "____ es una palabra importante.");
    }

    #[test]
    fn sentence_build_shuffles_example_words() {
        let card = card("gato", "cat", Some("El gato negro duerme."));
        let question = fallback_sentence_build(&card, &mut StdRng::seed_from_u64(1));
        let mut bank = question.word_bank.clone();
        bank.sort();
        let mut expected = vec!["El", "gato", "negro", "duerme."];
        expected.sort();
        assert_eq!(bank, expected);
        assert_eq!(question.target_sentence, "El gato negro duerme.");
    }

    #[test]
    fn flashcard_modes_have_no_question() {
        let card = card("sol", "sun", None);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Question::fallback(PracticeMode::Typing, &card, &[], &mut rng).is_none());
        let question = Question::fallback(PracticeMode::SentenceBuild, &card, &[], &mut rng).unwrap();
        assert_eq!(question.mode(), PracticeMode::SentenceBuild);
    }

    #[test]
    fn malformed_questions_are_rejected() {
        let bad = Question::Mcq(McqQuestion {
            stem: "?".into(),
            options: vec!["a".into(), "b".into()],
            correct_index: 0,
            explanation: String::new(),
        });
        assert!(!bad.is_well_formed());
        let bad_blank = Question::FillBlank(FillBlankQuestion {
            sentence: "no blank here".into(),
            answer: "x".into(),
            hint: String::new(),
            context: String::new(),
        });
        assert!(!bad_blank.is_well_formed());
    }
}
