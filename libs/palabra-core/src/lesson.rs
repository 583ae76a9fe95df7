//! Progress through a composed daily lesson and its closing summary.

use rand::Rng;
use serde::Serialize;

use crate::compose::{DailyLesson, LessonCard};
use crate::curriculum::motivational_message;
use crate::types::{Achievement, LessonTotals, PracticeMode, Rating};

/// Outcome of one reviewed card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardResult {
    pub card_id: i64,
    pub term: String,
    pub translation: String,
    pub mode: PracticeMode,
    pub rating: Rating,
    pub duration_ms: i64,
    pub xp_earned: i64,
    pub was_new: bool,
}

/// End-of-lesson report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonSummary {
    pub day_number: i64,
    pub phase_id: i64,
    pub phase_name: String,
    pub total_cards: usize,
    pub reviewed_cards: usize,
    pub correct_count: i64,
    /// Percent, rounded down.
    pub accuracy: i64,
    pub total_time_ms: i64,
    pub avg_time_per_card_ms: i64,
    pub xp_earned: i64,
    pub new_learned: i64,
    pub results: Vec<CardResult>,
    pub struggles: Vec<CardResult>,
    pub achievements: Vec<Achievement>,
    pub message: String,
}

/// Position and running aggregates of an in-progress lesson.
#[derive(Debug, Clone)]
pub struct LessonProgress {
    lesson: DailyLesson,
    current_index: usize,
    totals: LessonTotals,
    total_time_ms: i64,
    results: Vec<CardResult>,
}

impl LessonProgress {
    pub fn new(lesson: DailyLesson) -> Self {
        Self {
            lesson,
            current_index: 0,
            totals: LessonTotals::default(),
            total_time_ms: 0,
            results: Vec::new(),
        }
    }

    pub fn lesson(&self) -> &DailyLesson {
        &self.lesson
    }

    pub fn current(&self) -> Option<&LessonCard> {
        self.lesson.cards.get(self.current_index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn total_cards(&self) -> usize {
        self.lesson.cards.len()
    }

    pub fn totals(&self) -> LessonTotals {
        self.totals
    }

    pub fn results(&self) -> &[CardResult] {
        &self.results
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.lesson.cards.len()
    }

    /// Record a rating for the current card and move on. Returns `true` when
    /// that was the last card. No-op once finished.
    pub fn record(&mut self, rating: Rating, duration_ms: i64, xp: i64) -> bool {
        let Some(card) = self.lesson.cards.get(self.current_index) else {
            return true;
        };
        let correct = rating.is_correct();

        self.totals.cards_reviewed += 1;
        self.totals.xp_earned += xp;
        if correct {
            self.totals.cards_correct += 1;
            if card.is_new {
                self.totals.new_cards_learned += 1;
            }
        }
        self.total_time_ms += duration_ms.max(0);
        self.results.push(CardResult {
            card_id: card.card.card.id,
            term: card.card.card.term.clone(),
            translation: card.card.card.translation.clone(),
            mode: card.mode,
            rating,
            duration_ms: duration_ms.max(0),
            xp_earned: xp,
            was_new: card.is_new,
        });
        self.current_index += 1;
        self.is_finished()
    }

    /// Move past the current card without touching aggregates.
    pub fn skip(&mut self) -> bool {
        if !self.is_finished() {
            self.current_index += 1;
        }
        self.is_finished()
    }

    /// Integer percentage of correct answers among reviewed cards.
    pub fn accuracy(&self) -> i64 {
        if self.totals.cards_reviewed == 0 {
            return 0;
        }
        self.totals.cards_correct * 100 / self.totals.cards_reviewed
    }

    pub fn summary<R: Rng + ?Sized>(&self, achievements: Vec<Achievement>, rng: &mut R) -> LessonSummary {
        let reviewed = self.results.len();
        let accuracy = self.accuracy();
        let avg_time_per_card_ms = if reviewed == 0 {
            0
        } else {
            self.total_time_ms / reviewed as i64
        };

        LessonSummary {
            day_number: self.lesson.day_number,
            phase_id: self.lesson.phase.id,
            phase_name: self.lesson.phase.name.to_string(),
            total_cards: self.lesson.cards.len(),
            reviewed_cards: reviewed,
            correct_count: self.totals.cards_correct,
            accuracy,
            total_time_ms: self.total_time_ms,
            avg_time_per_card_ms,
            xp_earned: self.totals.xp_earned,
            new_learned: self.totals.new_cards_learned,
            results: self.results.clone(),
            struggles: self
                .results
                .iter()
                .filter(|r| !r.rating.is_correct())
                .cloned()
                .collect(),
            achievements,
            message: motivational_message(self.lesson.day_number, accuracy, rng),
        }
    }
}
