//! The 14-day sprint curriculum and its day/phase arithmetic.

use chrono::NaiveDate;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;

use crate::types::ModeWeights;

/// Last day of the journey. Days beyond it stay in the final phase.
pub const MAX_DAYS: i64 = 14;

/// A contiguous day range with its own intake policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurriculumPhase {
    pub id: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub start_day: i64,
    pub end_day: i64,
    pub new_cards_per_day: usize,
    pub target_islands: &'static [i64],
    pub mode_weights: ModeWeights,
}

impl CurriculumPhase {
    pub fn contains(&self, day: i64) -> bool {
        (self.start_day..=self.end_day).contains(&day)
    }
}

pub static PHASES: [CurriculumPhase; 2] = [
    CurriculumPhase {
        id: 1,
        name: "Sprint Week 1",
        description: "Core 500 most frequent words",
        start_day: 1,
        end_day: 7,
        new_cards_per_day: 72,
        target_islands: &[1, 2, 3],
        mode_weights: ModeWeights {
            standard: 60,
            reverse: 30,
            typing: 10,
        },
    },
    CurriculumPhase {
        id: 2,
        name: "Sprint Week 2",
        description: "Advanced 500 words + Review",
        start_day: 8,
        end_day: 14,
        new_cards_per_day: 72,
        target_islands: &[4, 5, 6, 7, 8, 9],
        mode_weights: ModeWeights {
            standard: 50,
            reverse: 35,
            typing: 15,
        },
    },
];

/// Phase covering `day`; the last phase past the end, the first before the start.
pub fn phase_for_day(day: i64) -> &'static CurriculumPhase {
    if let Some(phase) = PHASES.iter().find(|p| p.contains(day)) {
        return phase;
    }
    if day < PHASES[0].start_day {
        &PHASES[0]
    } else {
        &PHASES[PHASES.len() - 1]
    }
}

/// Phase by id, for sessions persisted with a phase id.
pub fn phase_by_id(id: i64) -> Option<&'static CurriculumPhase> {
    PHASES.iter().find(|p| p.id == id)
}

/// Day of the journey, counting the start date as day 1, clamped to [1, MAX_DAYS].
pub fn day_number(start_date: NaiveDate, today: NaiveDate) -> i64 {
    ((today - start_date).num_days() + 1).clamp(1, MAX_DAYS)
}

/// Encouragement shown with a lesson summary. Milestone days win over accuracy.
pub fn motivational_message<R: Rng + ?Sized>(day_number: i64, accuracy: i64, rng: &mut R) -> String {
    let milestone = match day_number {
        1 => Some("Day 1! Let's crush 1000 words in 2 weeks."),
        3 => Some("Day 3! You've already learned ~200 words!"),
        7 => Some("Week 1 complete! ~500 words down, 500 to go!"),
        10 => Some("Day 10! Over 700 words learned. The finish line is close!"),
        14 => Some("YOU DID IT! 1000 words in 14 days. Absolute legend."),
        _ => None,
    };
    if let Some(message) = milestone {
        return message.to_string();
    }

    let pool: &[&str] = if accuracy >= 90 {
        &["Outstanding accuracy!", "You're crushing it!", "Nearly perfect!"]
    } else if accuracy >= 80 {
        &["Solid performance!", "Great recall today!", "Keep it up!"]
    } else if accuracy < 60 {
        &[
            "Every mistake is a lesson!",
            "You're building foundations!",
            "Practice makes progress!",
        ]
    } else {
        &[
            "Great job today!",
            "You're making progress!",
            "Keep up the momentum!",
            "One step closer to fluency!",
            "Your consistency is paying off!",
        ]
    };
    pool.choose(rng).copied().unwrap_or("Great job today!").to_string()
}
