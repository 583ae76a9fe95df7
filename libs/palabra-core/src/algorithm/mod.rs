//! Spaced repetition scheduling.

pub mod fsrs;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CardProgress, CardState, Rating};

/// Hypothetical outcome of rating a card, without persisting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingPreview {
    pub next_due: DateTime<Utc>,
    pub interval_days: i64,
    pub retrievability_at_due: f64,
}

/// Trait for memory-model schedulers.
pub trait Scheduler: Send + Sync {
    /// Algorithm identifier.
    fn name(&self) -> &'static str;

    /// Progress after rating the card at `now`.
    fn apply(&self, progress: &CardProgress, rating: Rating, now: DateTime<Utc>) -> CardProgress;

    /// Outcome of each of the four ratings.
    fn preview(&self, progress: &CardProgress, now: DateTime<Utc>) -> BTreeMap<Rating, RatingPreview>;

    /// Probability of recall at `now`.
    fn retrievability(&self, progress: &CardProgress, now: DateTime<Utc>) -> f64;

    /// Whether the card should be shown at `now`. Absent or new progress is always due.
    fn is_due(&self, progress: Option<&CardProgress>, now: DateTime<Utc>) -> bool {
        match progress {
            None => true,
            Some(p) if p.state == CardState::New => true,
            Some(p) => match p.due {
                Some(due) => due.timestamp() <= now.timestamp(),
                None => true,
            },
        }
    }
}
