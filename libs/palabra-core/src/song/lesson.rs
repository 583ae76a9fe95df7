use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use super::{SongDetails, SongLine, SongMode, SongPhase, SongVocab};
use crate::error::{CoreError, Result};
use crate::matching::{check_answer, normalize_word};
use crate::types::{PracticeMode, Rating};

/// Cloze items per song lesson.
pub const BLANK_COUNT: usize = 8;

const BLANK_MARKER: &str = "____";

/// A key vocabulary word shown as a flashcard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongVocabCard {
    #[serde(flatten)]
    pub vocab: SongVocab,
    pub mode: PracticeMode,
}

/// One hidden word in a lyric line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongBlank {
    /// Index into the lesson's lines.
    pub line_index: usize,
    pub line_id: i64,
    pub word: String,
    pub word_index: usize,
    pub display: String,
    pub answer: Option<String>,
    pub is_correct: Option<bool>,
}

/// Result of checking one blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlankOutcome {
    pub correct: bool,
    pub expected: String,
    pub given: String,
}

/// Counters accumulated while a song lesson runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SongStats {
    pub vocab_reviewed: i64,
    pub vocab_correct: i64,
    pub lines_studied: i64,
    pub blanks_correct: i64,
    /// Blanks answered so far.
    pub blanks_total: i64,
}

/// An in-progress song lesson.
///
/// Each work phase walks its own items with `index`; when they run out the
/// lesson moves to the next phase of its mode, skipping work phases that
/// have nothing in them. Listen phases always wait for [`SongLesson::next_phase`].
#[derive(Debug, Clone, Serialize)]
pub struct SongLesson {
    pub details: SongDetails,
    pub mode: SongMode,
    pub phase: SongPhase,
    pub index: usize,
    pub vocab_cards: Vec<SongVocabCard>,
    pub blanks: Vec<SongBlank>,
    pub stats: SongStats,
    pub estimated_minutes: i64,
}

impl SongLesson {
    pub fn build<R: Rng + ?Sized>(details: SongDetails, mode: SongMode, rng: &mut R) -> Self {
        let vocab_cards = vocab_cards(&details.vocabulary, rng);
        let blanks = build_blanks(&details.lines, &details.vocabulary, BLANK_COUNT, rng);
        let estimated_minutes = 3
            + vocab_cards.len() as i64 / 2
            + details.lines.len() as i64 / 4
            + blanks.len() as i64 / 2;

        let mut lesson = Self {
            details,
            mode,
            phase: mode.first_phase(),
            index: 0,
            vocab_cards,
            blanks,
            stats: SongStats::default(),
            estimated_minutes,
        };
        lesson.settle();
        lesson
    }

    pub fn is_complete(&self) -> bool {
        self.phase == SongPhase::Complete
    }

    pub fn current_vocab(&self) -> Option<&SongVocabCard> {
        match self.phase {
            SongPhase::VocabPreview => self.vocab_cards.get(self.index),
            _ => None,
        }
    }

    pub fn current_line(&self) -> Option<&SongLine> {
        match self.phase {
            SongPhase::LineBreakdown => self.details.lines.get(self.index),
            _ => None,
        }
    }

    pub fn current_blank(&self) -> Option<&SongBlank> {
        match self.phase {
            SongPhase::FillBlanks => self.blanks.get(self.index),
            _ => None,
        }
    }

    /// Work items in the current phase.
    pub fn phase_len(&self) -> usize {
        self.items_in(self.phase)
    }

    /// Rate the current vocabulary card.
    pub fn rate_vocab(&mut self, rating: Rating) -> Result<()> {
        self.expect_phase(SongPhase::VocabPreview)?;
        self.stats.vocab_reviewed += 1;
        if rating.is_correct() {
            self.stats.vocab_correct += 1;
        }
        self.step();
        Ok(())
    }

    /// Leave a listen phase. Returns `true` when the finished listen counts
    /// toward the song's listen total.
    pub fn next_phase(&mut self) -> Result<bool> {
        if !self.phase.is_listen() {
            return Err(self.wrong_phase("a listen phase"));
        }
        let counted = self.phase == SongPhase::FirstListen;
        self.advance();
        Ok(counted)
    }

    /// Mark the current line studied and move on.
    pub fn next_line(&mut self) -> Result<()> {
        self.expect_phase(SongPhase::LineBreakdown)?;
        self.stats.lines_studied += 1;
        self.step();
        Ok(())
    }

    /// Move past the current line without counting it.
    pub fn skip_line(&mut self) -> Result<()> {
        self.expect_phase(SongPhase::LineBreakdown)?;
        self.step();
        Ok(())
    }

    /// Check an answer for the current blank and move on.
    pub fn submit_blank(&mut self, answer: &str) -> Result<BlankOutcome> {
        self.expect_phase(SongPhase::FillBlanks)?;
        let expected = match self.blanks.get(self.index) {
            Some(blank) => blank.word.clone(),
            None => return Err(self.wrong_phase(SongPhase::FillBlanks.as_str())),
        };
        let given = answer.trim().to_string();
        let correct = check_answer(&expected, &given);
        if let Some(blank) = self.blanks.get_mut(self.index) {
            blank.answer = Some(given.clone());
            blank.is_correct = Some(correct);
        }
        let outcome = BlankOutcome {
            correct,
            expected,
            given,
        };

        self.stats.blanks_total += 1;
        if correct {
            self.stats.blanks_correct += 1;
        }
        self.step();
        Ok(outcome)
    }

    pub fn vocab_accuracy(&self) -> f64 {
        ratio(self.stats.vocab_correct, self.stats.vocab_reviewed)
    }

    pub fn blanks_accuracy(&self) -> f64 {
        ratio(self.stats.blanks_correct, self.stats.blanks_total)
    }

    /// Combined accuracy over vocabulary and blanks, 0.0 when nothing was answered.
    pub fn accuracy(&self) -> f64 {
        ratio(
            self.stats.vocab_correct + self.stats.blanks_correct,
            self.stats.vocab_reviewed + self.stats.blanks_total,
        )
    }

    pub fn accuracy_percent(&self) -> i64 {
        (self.accuracy() * 100.0).floor() as i64
    }

    pub fn xp(&self) -> i64 {
        super::song_xp(
            self.mode,
            self.stats.vocab_correct,
            self.stats.vocab_reviewed,
            self.stats.blanks_correct,
            self.stats.blanks_total,
        )
    }

    fn step(&mut self) {
        self.index += 1;
        if self.index >= self.phase_len() {
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.index = 0;
        self.phase = self.mode.next_phase(self.phase);
        self.settle();
    }

    /// Skip work phases that have no items.
    fn settle(&mut self) {
        while !self.phase.is_listen()
            && self.phase != SongPhase::Complete
            && self.items_in(self.phase) == 0
        {
            self.phase = self.mode.next_phase(self.phase);
        }
    }

    fn items_in(&self, phase: SongPhase) -> usize {
        match phase {
            SongPhase::VocabPreview => self.vocab_cards.len(),
            SongPhase::LineBreakdown => self.details.lines.len(),
            SongPhase::FillBlanks => self.blanks.len(),
            SongPhase::FirstListen | SongPhase::FinalListen | SongPhase::Complete => 0,
        }
    }

    fn expect_phase(&self, expected: SongPhase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(self.wrong_phase(expected.as_str()))
        }
    }

    fn wrong_phase(&self, expected: &str) -> CoreError {
        CoreError::WrongSongPhase {
            expected: expected.to_string(),
            actual: self.phase.as_str().to_string(),
        }
    }
}

fn ratio(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

fn vocab_cards<R: Rng + ?Sized>(vocabulary: &[SongVocab], rng: &mut R) -> Vec<SongVocabCard> {
    vocabulary
        .iter()
        .filter(|v| v.is_key)
        .map(|v| SongVocabCard {
            vocab: v.clone(),
            mode: if rng.random_bool(0.3) {
                PracticeMode::Reverse
            } else {
                PracticeMode::Standard
            },
        })
        .collect()
}

/// Pick up to `count` cloze blanks, preferring words from the song's vocabulary.
pub(crate) fn build_blanks<R: Rng + ?Sized>(
    lines: &[SongLine],
    vocabulary: &[SongVocab],
    count: usize,
    rng: &mut R,
) -> Vec<SongBlank> {
    let vocab_words: HashSet<String> = vocabulary.iter().map(|v| normalize_word(&v.word)).collect();
    let mut seen = HashSet::new();
    let mut blanks = Vec::new();

    for (line_index, line) in lines.iter().enumerate() {
        let words: Vec<&str> = line.spanish_text.split_whitespace().collect();
        if words.len() < 3 {
            continue;
        }
        for (word_index, word) in words.iter().enumerate() {
            let clean = normalize_word(word);
            if vocab_words.contains(&clean) && seen.insert((line_index, word_index)) {
                blanks.push(blank(line_index, line, word_index, clean));
            }
        }
    }

    if blanks.len() < count {
        let mut order: Vec<usize> = (0..lines.len()).collect();
        order.shuffle(rng);
        for line_index in order {
            if blanks.len() >= count * 2 {
                break;
            }
            let line = &lines[line_index];
            let words: Vec<&str> = line.spanish_text.split_whitespace().collect();
            if words.len() < 3 {
                continue;
            }
            let word_index = rng.random_range(1..words.len() - 1);
            let clean = normalize_word(words[word_index]);
            if clean.chars().count() >= 3 && seen.insert((line_index, word_index)) {
                blanks.push(blank(line_index, line, word_index, clean));
            }
        }
    }

    blanks.shuffle(rng);
    blanks.truncate(count);
    blanks
}

fn blank(line_index: usize, line: &SongLine, word_index: usize, word: String) -> SongBlank {
    SongBlank {
        line_index,
        line_id: line.id,
        word,
        word_index,
        display: render_blank_line(&line.spanish_text, word_index),
        answer: None,
        is_correct: None,
    }
}

/// Replace the word at `word_index` with a blank, keeping its punctuation.
pub fn render_blank_line(text: &str, word_index: usize) -> String {
    let mut words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    let Some(word) = words.get_mut(word_index) else {
        return text.to_string();
    };
    let is_letter = |c: char| c.is_alphanumeric() || c == '\'';
    match (word.find(is_letter), word.rfind(is_letter)) {
        (Some(start), Some(end)) => {
            let end = end + word[end..].chars().next().map_or(1, char::len_utf8);
            word.replace_range(start..end, BLANK_MARKER);
        }
        _ => *word = BLANK_MARKER.to_string(),
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::Song;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn line(n: i64, text: &str) -> SongLine {
        SongLine {
            id: 100 + n,
            song_id: 1,
            line_number: n,
            start_time_ms: n * 4000,
            end_time_ms: (n + 1) * 4000,
            spanish_text: text.to_string(),
            english_text: None,
        }
    }

    fn vocab(id: i64, word: &str, is_key: bool) -> SongVocab {
        SongVocab {
            id,
            song_id: 1,
            word: word.to_string(),
            translation: format!("{} (en)", word),
            is_key,
            card_id: None,
        }
    }

    fn details(lines: Vec<SongLine>, vocabulary: Vec<SongVocab>) -> SongDetails {
        SongDetails {
            song: Song {
                id: 1,
                title: "Canción de prueba".into(),
                artist: "Artista".into(),
                album: None,
                duration_secs: Some(200),
                audio_path: None,
                created_at: Utc::now(),
            },
            lines,
            vocabulary,
        }
    }

    fn full_song() -> SongDetails {
        let lines = vec![
            line(1, "Mi corazón late por ti"),
            line(2, "Bajo la luna de verano"),
            line(3, "Quiero bailar contigo esta noche"),
            line(4, "Y cantar una canción nueva"),
            line(5, "Siempre vuelvo a tu puerta"),
            line(6, "Las estrellas brillan sobre el mar"),
            line(7, "Nunca olvido tu sonrisa"),
            line(8, "Todo el mundo quiere amor"),
            line(9, "Ay"),
        ];
        let vocabulary = vec![
            vocab(1, "corazón", true),
            vocab(2, "luna", true),
            vocab(3, "bailar", false),
            vocab(4, "canción", true),
            vocab(5, "noche", false),
            vocab(6, "puerta", false),
            vocab(7, "estrellas", false),
            vocab(8, "sonrisa", false),
            vocab(9, "mundo", false),
        ];
        details(lines, vocabulary)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn full_lesson_walks_every_phase() {
        let mut lesson = SongLesson::build(full_song(), SongMode::Full, &mut rng());
        assert_eq!(lesson.phase, SongPhase::VocabPreview);
        assert_eq!(lesson.vocab_cards.len(), 3);
        assert_eq!(lesson.blanks.len(), BLANK_COUNT);

        lesson.rate_vocab(Rating::Good).unwrap();
        lesson.rate_vocab(Rating::Again).unwrap();
        assert_eq!(lesson.index, 2);
        lesson.rate_vocab(Rating::Easy).unwrap();
        assert_eq!(lesson.phase, SongPhase::FirstListen);

        assert!(lesson.next_phase().unwrap());
        assert_eq!(lesson.phase, SongPhase::LineBreakdown);
        for _ in 0..lesson.details.lines.len() {
            lesson.next_line().unwrap();
        }
        assert_eq!(lesson.phase, SongPhase::FillBlanks);

        for i in 0..BLANK_COUNT {
            let word = lesson.current_blank().unwrap().word.clone();
            let answer = if i < 6 { word } else { "nada".to_string() };
            lesson.submit_blank(&answer).unwrap();
        }
        assert_eq!(lesson.phase, SongPhase::FinalListen);
        assert!(!lesson.next_phase().unwrap());
        assert!(lesson.is_complete());

        assert_eq!(lesson.stats.vocab_reviewed, 3);
        assert_eq!(lesson.stats.vocab_correct, 2);
        assert_eq!(lesson.stats.lines_studied, 9);
        assert_eq!(lesson.stats.blanks_total, 8);
        assert_eq!(lesson.stats.blanks_correct, 6);
        // 30 + floor(2/3 * 10) + floor(6/8 * 15)
        assert_eq!(lesson.xp(), 30 + 6 + 11);
        assert_eq!(lesson.accuracy_percent(), 72);
    }

    #[test]
    fn single_phase_modes_complete_after_their_phase() {
        let mut vocab_lesson = SongLesson::build(full_song(), SongMode::Vocab, &mut rng());
        for _ in 0..3 {
            vocab_lesson.rate_vocab(Rating::Good).unwrap();
        }
        assert!(vocab_lesson.is_complete());

        let mut lyrics = SongLesson::build(full_song(), SongMode::Lyrics, &mut rng());
        assert_eq!(lyrics.phase, SongPhase::LineBreakdown);
        for _ in 0..9 {
            lyrics.skip_line().unwrap();
        }
        assert!(lyrics.is_complete());
        assert_eq!(lyrics.stats.lines_studied, 0);

        let listening = SongLesson::build(full_song(), SongMode::Listening, &mut rng());
        assert_eq!(listening.phase, SongPhase::FillBlanks);
    }

    #[test]
    fn empty_work_phases_are_skipped() {
        let song = details(vec![line(1, "Hola")], Vec::new());
        let mut lesson = SongLesson::build(song, SongMode::Full, &mut rng());
        assert!(lesson.blanks.is_empty());
        assert_eq!(lesson.phase, SongPhase::FirstListen);

        lesson.next_phase().unwrap();
        lesson.next_line().unwrap();
        assert_eq!(lesson.phase, SongPhase::FinalListen);
        lesson.next_phase().unwrap();
        assert!(lesson.is_complete());
        assert_eq!(lesson.accuracy(), 0.0);
        assert_eq!(lesson.xp(), 30);
    }

    #[test]
    fn modes_with_nothing_to_do_start_complete() {
        let song = details(Vec::new(), Vec::new());
        assert!(SongLesson::build(song.clone(), SongMode::Vocab, &mut rng()).is_complete());
        assert!(SongLesson::build(song.clone(), SongMode::Lyrics, &mut rng()).is_complete());
        assert!(SongLesson::build(song, SongMode::Listening, &mut rng()).is_complete());
    }

    #[test]
    fn actions_in_the_wrong_phase_are_rejected() {
        let mut lesson = SongLesson::build(full_song(), SongMode::Full, &mut rng());
        assert!(matches!(
            lesson.next_line(),
            Err(CoreError::WrongSongPhase { .. })
        ));
        assert!(lesson.next_phase().is_err());
        assert!(lesson.submit_blank("hola").is_err());
        assert_eq!(lesson.stats, SongStats::default());
        assert_eq!(lesson.index, 0);
    }

    #[test]
    fn blank_answers_forgive_accents() {
        let song = details(
            vec![line(1, "Y cantar una canción nueva")],
            vec![vocab(1, "canción", false)],
        );
        let mut lesson = SongLesson::build(song, SongMode::Listening, &mut rng());
        let vocab_blank = lesson
            .blanks
            .iter()
            .position(|b| b.word == "canción")
            .unwrap();
        lesson.index = vocab_blank;
        let outcome = lesson.submit_blank("  Cancion ").unwrap();
        assert!(outcome.correct);
        assert_eq!(outcome.expected, "canción");
        assert_eq!(outcome.given, "Cancion");
    }

    #[test]
    fn vocab_words_are_preferred_for_blanks() {
        let song = full_song();
        let vocab: HashSet<String> = song.vocabulary.iter().map(|v| v.word.clone()).collect();
        for seed in 0..10 {
            let blanks = build_blanks(&song.lines, &song.vocabulary, 3, &mut StdRng::seed_from_u64(seed));
            assert_eq!(blanks.len(), 3);
            assert!(blanks.iter().all(|b| vocab.contains(&b.word)));
        }
    }

    #[test]
    fn random_blanks_avoid_line_edges_and_short_words() {
        let song = full_song();
        for seed in 0..20 {
            let blanks = build_blanks(&song.lines, &[], BLANK_COUNT, &mut StdRng::seed_from_u64(seed));
            for blank in &blanks {
                let words: Vec<&str> = song.lines[blank.line_index].spanish_text.split_whitespace().collect();
                assert!(blank.word_index > 0 && blank.word_index < words.len() - 1);
                assert!(blank.word.chars().count() >= 3);
                assert!(blank.display.contains("____"));
            }
            let positions: HashSet<(usize, usize)> =
                blanks.iter().map(|b| (b.line_index, b.word_index)).collect();
            assert_eq!(positions.len(), blanks.len());
        }
    }

    #[test]
    fn render_keeps_punctuation() {
        assert_eq!(render_blank_line("¡Hola, mi amor!", 2), "¡Hola, mi ____!");
        assert_eq!(render_blank_line("¿Dónde estás, corazón?", 1), "¿Dónde ____, corazón?");
        assert_eq!(render_blank_line("uno dos", 5), "uno dos");
        assert_eq!(render_blank_line("a ... b", 1), "a ____ b");
    }

    #[test]
    fn estimated_minutes_counts_every_part() {
        let lesson = SongLesson::build(full_song(), SongMode::Full, &mut rng());
        // 3 + 3/2 + 9/4 + 8/2
        assert_eq!(lesson.estimated_minutes, 3 + 1 + 2 + 4);
    }
}
