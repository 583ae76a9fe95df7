//! Daily lesson composition: new-card budget, interleaving and mode assignment.

use std::collections::HashMap;

use rand::Rng;
use serde::Serialize;

use crate::curriculum::{phase_for_day, CurriculumPhase};
use crate::types::{CardSource, CardState, CardWithProgress, ModeWeights, PracticeMode};

/// Minimum number of reviews placed before each new card.
const MIN_REVIEW_GAP: usize = 3;

/// A card in today's lesson with its presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonCard {
    #[serde(flatten)]
    pub card: CardWithProgress,
    pub mode: PracticeMode,
    pub is_new: bool,
    pub is_song_vocab: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_title: Option<String>,
}

/// Today's composed lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyLesson {
    pub day_number: i64,
    pub phase: &'static CurriculumPhase,
    pub cards: Vec<LessonCard>,
    pub estimated_minutes: i64,
    pub due_review_count: usize,
    pub new_card_count: usize,
}

impl DailyLesson {
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Cards fetched from the store for composition.
#[derive(Debug, Clone, Default)]
pub struct LessonPools {
    pub due_curriculum: Vec<CardWithProgress>,
    pub due_song_vocab: Vec<CardWithProgress>,
    pub new_curriculum: Vec<CardWithProgress>,
    pub new_song_vocab: Vec<CardWithProgress>,
    /// Song titles keyed by song id, for song-sourced cards.
    pub song_titles: HashMap<i64, String>,
}

/// Builds the lesson for one journey day.
#[derive(Debug, Clone, Copy)]
pub struct LessonComposer {
    pub day_number: i64,
    pub phase: &'static CurriculumPhase,
    /// Daily new-card allowance before load shedding.
    pub new_cards_per_day: usize,
}

impl LessonComposer {
    pub fn for_day(day_number: i64) -> Self {
        let phase = phase_for_day(day_number);
        Self {
            day_number,
            phase,
            new_cards_per_day: phase.new_cards_per_day,
        }
    }

    /// Replace the phase allowance with the learner's own.
    pub fn with_new_cards_per_day(mut self, new_cards_per_day: usize) -> Self {
        self.new_cards_per_day = new_cards_per_day;
        self
    }

    /// New cards to introduce given the number of due reviews. Shedding
    /// never raises the budget above the allowance.
    pub fn new_card_budget(&self, due_load: usize) -> usize {
        let base = self.new_cards_per_day;
        if due_load > 150 {
            base.saturating_sub(20).max(50).min(base)
        } else if due_load > 100 {
            base.saturating_sub(10).max(60).min(base)
        } else {
            base
        }
    }

    pub fn compose<R: Rng + ?Sized>(&self, pools: LessonPools, rng: &mut R) -> DailyLesson {
        let LessonPools {
            due_curriculum,
            due_song_vocab,
            new_curriculum,
            new_song_vocab,
            song_titles,
        } = pools;

        let due_review_count = due_curriculum.len() + due_song_vocab.len();
        let new_card_count = new_curriculum.len() + new_song_vocab.len();

        let reviews: Vec<_> = due_curriculum.into_iter().chain(due_song_vocab).collect();
        let fresh: Vec<_> = new_curriculum.into_iter().chain(new_song_vocab).collect();

        let mut selector = ModeSelector::new(self.phase.mode_weights);
        let cards: Vec<LessonCard> = interleave(reviews, fresh)
            .into_iter()
            .map(|(card, is_new)| {
                let is_song_vocab = card.card.source == CardSource::Song;
                let song_title = card
                    .card
                    .source_song_id
                    .filter(|_| is_song_vocab)
                    .and_then(|id| song_titles.get(&id).cloned());
                let mode = selector.select(&card, is_new, rng);
                LessonCard {
                    card,
                    mode,
                    is_new,
                    is_song_vocab,
                    song_title,
                }
            })
            .collect();

        DailyLesson {
            day_number: self.day_number,
            phase: self.phase,
            estimated_minutes: estimated_minutes(cards.len()),
            cards,
            due_review_count,
            new_card_count,
        }
    }
}

/// A free practice session: due reviews first, topped up with new cards
/// to `max_cards`, every card shown in `mode`.
pub fn practice_lesson(
    day_number: i64,
    due: Vec<CardWithProgress>,
    fresh: Vec<CardWithProgress>,
    max_cards: usize,
    mode: PracticeMode,
) -> DailyLesson {
    let due: Vec<_> = due.into_iter().take(max_cards).collect();
    let room = max_cards - due.len();
    let fresh: Vec<_> = fresh.into_iter().take(room).collect();
    let due_review_count = due.len();
    let new_card_count = fresh.len();

    let cards: Vec<LessonCard> = due
        .into_iter()
        .map(|card| (card, false))
        .chain(fresh.into_iter().map(|card| (card, true)))
        .map(|(card, is_new)| LessonCard {
            is_song_vocab: card.card.source == CardSource::Song,
            card,
            mode,
            is_new,
            song_title: None,
        })
        .collect();

    DailyLesson {
        day_number,
        phase: phase_for_day(day_number),
        estimated_minutes: estimated_minutes(cards.len()),
        cards,
        due_review_count,
        new_card_count,
    }
}

/// About a minute and a half per card, rounded up.
pub fn estimated_minutes(card_count: usize) -> i64 {
    ((card_count * 3 + 1) / 2) as i64
}

/// Merge reviews and new cards, flagging the new ones.
///
/// Each new card is preceded by `k = max(3, (reviews+1)/(new+1))` reviews.
/// Leftover reviews trail the last new card.
pub fn interleave(
    reviews: Vec<CardWithProgress>,
    new_cards: Vec<CardWithProgress>,
) -> Vec<(CardWithProgress, bool)> {
    let gaps = review_gaps(reviews.len(), new_cards.len());
    let mut out = Vec::with_capacity(reviews.len() + new_cards.len());
    let mut reviews = reviews.into_iter();

    for (card, take) in new_cards.into_iter().zip(gaps) {
        out.extend(reviews.by_ref().take(take).map(|c| (c, false)));
        out.push((card, true));
    }
    out.extend(reviews.map(|c| (c, false)));
    out
}

/// Reviews placed before each new card.
///
/// Short on reviews, every gap first gets one so no two new cards touch, then
/// the leading gaps are topped up to `k` one at a time. With fewer reviews than
/// new cards the reviews are spread evenly.
pub fn review_gaps(review_count: usize, new_count: usize) -> Vec<usize> {
    if new_count == 0 {
        return Vec::new();
    }

    let k = ((review_count + 1) / (new_count + 1)).max(MIN_REVIEW_GAP);
    if k * new_count <= review_count {
        return vec![k; new_count];
    }

    if review_count < new_count {
        return (0..new_count)
            .map(|i| (i + 1) * review_count / new_count - i * review_count / new_count)
            .collect();
    }

    let mut gaps = vec![1; new_count];
    let mut spare = review_count - new_count;
    for gap in gaps.iter_mut() {
        let top_up = (k - 1).min(spare);
        *gap += top_up;
        spare -= top_up;
        if spare == 0 {
            break;
        }
    }
    gaps
}

/// Assigns practice modes while remembering recent assignments.
#[derive(Debug, Clone)]
pub struct ModeSelector {
    weights: ModeWeights,
    history: Vec<PracticeMode>,
}

impl ModeSelector {
    pub fn new(weights: ModeWeights) -> Self {
        Self {
            weights,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[PracticeMode] {
        &self.history
    }

    pub fn select<R: Rng + ?Sized>(
        &mut self,
        card: &CardWithProgress,
        is_new: bool,
        rng: &mut R,
    ) -> PracticeMode {
        // Two in a row of one mode forces a different one.
        let mode = match self.history.as_slice() {
            [.., a, b] if a == b => weighted(self.weights.excluding(*b), rng),
            _ => self.by_memory_state(card, is_new, rng),
        };
        self.history.push(mode);
        mode
    }

    fn by_memory_state<R: Rng + ?Sized>(
        &self,
        card: &CardWithProgress,
        is_new: bool,
        rng: &mut R,
    ) -> PracticeMode {
        let progress = match card.progress.as_ref() {
            Some(p) if !is_new && p.state != CardState::New => p,
            _ => {
                return if rng.random_bool(0.5) {
                    PracticeMode::Mcq
                } else {
                    PracticeMode::Standard
                };
            }
        };

        if progress.state == CardState::Relearning || progress.lapses > 2 {
            if rng.random_range(0..100) < 30 {
                return PracticeMode::Mcq;
            }
            return self.weighted_with_bias(PracticeMode::Standard, 70, rng);
        }

        if progress.stability < 5.0 {
            if rng.random_range(0..100) < 25 {
                return PracticeMode::Mcq;
            }
            return weighted(self.weights.excluding(PracticeMode::Typing), rng);
        }

        if progress.stability <= 21.0 {
            return match rng.random_range(0..100) {
                0..=19 => PracticeMode::Mcq,
                20..=34 => PracticeMode::FillBlank,
                _ => weighted(self.weights, rng),
            };
        }

        if progress.reps >= 5 {
            return match rng.random_range(0..100) {
                0..=14 => PracticeMode::Mcq,
                15..=29 => PracticeMode::FillBlank,
                30..=44 => PracticeMode::SentenceBuild,
                _ => self.weighted_with_bias(PracticeMode::Typing, 40, rng),
            };
        }

        weighted(self.weights, rng)
    }

    fn weighted_with_bias<R: Rng + ?Sized>(
        &self,
        preferred: PracticeMode,
        bias_percent: u32,
        rng: &mut R,
    ) -> PracticeMode {
        if rng.random_range(0..100) < bias_percent {
            preferred
        } else {
            weighted(self.weights, rng)
        }
    }
}

/// Categorical draw over standard, reverse and typing.
pub fn weighted<R: Rng + ?Sized>(weights: ModeWeights, rng: &mut R) -> PracticeMode {
    let total = weights.total();
    if total == 0 {
        return PracticeMode::Standard;
    }
    let roll = rng.random_range(0..total);
    if roll < weights.standard {
        PracticeMode::Standard
    } else if roll < weights.standard + weights.reverse {
        PracticeMode::Reverse
    } else {
        PracticeMode::Typing
    }
}
