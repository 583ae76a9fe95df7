//! FSRS (Free Spaced Repetition Scheduler), version 5.
//!
//! Memory is modelled with three variables:
//! - Difficulty (D): how hard the card is, 1-10
//! - Stability (S): days until recall probability decays to 90%
//! - Retrievability (R): probability of recall right now
//!
//! New and learning cards move through short minute steps before they
//! graduate to day intervals. Cards that lapse from review come back the
//! next day as relearning.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::{RatingPreview, Scheduler};
use crate::types::{CardProgress, CardState, Rating};

const DECAY: f64 = -0.5;
/// Chosen so that R = 0.9 when elapsed time equals stability.
const FACTOR: f64 = 19.0 / 81.0;

/// FSRS scheduler with configurable parameters.
#[derive(Debug, Clone)]
pub struct Fsrs {
    pub request_retention: f64,
    pub maximum_interval: i64,
    /// FSRS-5 parameters (19 weights).
    pub w: [f64; 19],
}

impl Default for Fsrs {
    fn default() -> Self {
        Self {
            request_retention: 0.9,
            maximum_interval: 36500,
            w: [
                0.40255, 1.18385, 3.173, 15.69105, // w[0-3]: initial stability per rating
                7.1949,  // w[4]: initial difficulty base
                0.5345,  // w[5]: initial difficulty slope
                1.4604,  // w[6]: difficulty change per rating step
                0.0046,  // w[7]: mean reversion weight
                1.54575, // w[8]: recall stability scale
                0.1192,  // w[9]: stability saturation
                1.01925, // w[10]: retrievability effect on recall
                1.9395,  // w[11]: forget stability scale
                0.11,    // w[12]: difficulty effect on forget
                0.29605, // w[13]: stability effect on forget
                2.2698,  // w[14]: retrievability effect on forget
                0.2315,  // w[15]: hard penalty
                2.9898,  // w[16]: easy bonus
                0.51655, // w[17]: short-term stability scale
                0.6621,  // w[18]: short-term stability offset
            ],
        }
    }
}

impl Fsrs {
    /// Default weights with a custom target retention.
    pub fn with_retention(request_retention: f64) -> Self {
        Self {
            request_retention: request_retention.clamp(0.7, 0.99),
            ..Self::default()
        }
    }

    /// S0(G) = w[G-1]
    fn initial_stability(&self, rating: Rating) -> f64 {
        self.w[usize::from(rating.to_value() - 1)].max(0.1)
    }

    /// D0(G) = w[4] - e^(w[5] * (G - 1)) + 1
    fn initial_difficulty(&self, rating: Rating) -> f64 {
        let g = f64::from(rating.to_value());
        (self.w[4] - (self.w[5] * (g - 1.0)).exp() + 1.0).clamp(1.0, 10.0)
    }

    /// Linear damping towards 10, then mean reversion towards D0(Easy).
    fn next_difficulty(&self, difficulty: f64, rating: Rating) -> f64 {
        let g = f64::from(rating.to_value());
        let delta = -self.w[6] * (g - 3.0);
        let damped = difficulty + delta * (10.0 - difficulty) / 9.0;
        let reverted =
            self.w[7] * self.initial_difficulty(Rating::Easy) + (1.0 - self.w[7]) * damped;
        reverted.clamp(1.0, 10.0)
    }

    /// R(t) = (1 + FACTOR * t / S)^DECAY
    fn retention_at(elapsed_days: f64, stability: f64) -> f64 {
        if stability <= 0.0 {
            return 0.0;
        }
        (1.0 + FACTOR * elapsed_days.max(0.0) / stability).powf(DECAY)
    }

    /// S' = S * (1 + e^w[8] * (11 - D) * S^-w[9] * (e^(w[10]*(1-R)) - 1) * penalty * bonus)
    fn recall_stability(&self, stability: f64, difficulty: f64, r: f64, rating: Rating) -> f64 {
        let hard_penalty = if rating == Rating::Hard { self.w[15] } else { 1.0 };
        let easy_bonus = if rating == Rating::Easy { self.w[16] } else { 1.0 };
        let growth = self.w[8].exp()
            * (11.0 - difficulty)
            * stability.powf(-self.w[9])
            * ((self.w[10] * (1.0 - r)).exp() - 1.0)
            * hard_penalty
            * easy_bonus;
        (stability * (1.0 + growth)).clamp(0.1, self.maximum_interval as f64)
    }

    /// S' = w[11] * D^-w[12] * ((S+1)^w[13] - 1) * e^(w[14]*(1-R)), never above S / e^(w[17]*w[18])
    fn forget_stability(&self, stability: f64, difficulty: f64, r: f64) -> f64 {
        let long_term = self.w[11]
            * difficulty.powf(-self.w[12])
            * ((stability + 1.0).powf(self.w[13]) - 1.0)
            * (self.w[14] * (1.0 - r)).exp();
        let ceiling = stability / (self.w[17] * self.w[18]).exp();
        long_term.min(ceiling).max(0.1)
    }

    /// Same-day review of a learning card: S' = S * e^(w[17] * (G - 3 + w[18]))
    fn short_term_stability(&self, stability: f64, rating: Rating) -> f64 {
        let g = f64::from(rating.to_value());
        (stability * (self.w[17] * (g - 3.0 + self.w[18])).exp()).max(0.1)
    }

    /// I = S / FACTOR * (R^(1/DECAY) - 1), in whole days.
    fn next_interval(&self, stability: f64) -> i64 {
        let raw = stability / FACTOR * (self.request_retention.powf(1.0 / DECAY) - 1.0);
        (raw.round() as i64).clamp(1, self.maximum_interval)
    }

    /// Results for Again, Hard, Good and Easy, in that order.
    fn outcomes(&self, progress: &CardProgress, now: DateTime<Utc>) -> [CardProgress; 4] {
        // Clocks may regress between requests; never schedule before the last review.
        let now = match progress.last_review {
            Some(last) if last > now => last,
            _ => now,
        };
        let fresh = progress.state == CardState::New || progress.stability <= 0.0;
        let elapsed_days = match progress.last_review {
            Some(last) if !fresh => (now - last).num_days().max(0),
            _ => 0,
        };
        let base = CardProgress {
            elapsed_days,
            reps: progress.reps + 1,
            last_review: Some(now),
            ..progress.clone()
        };

        if fresh {
            self.first_review(&base, now)
        } else if progress.state == CardState::Review {
            self.review_outcomes(&base, progress, now)
        } else {
            self.learning_outcomes(&base, progress, now)
        }
    }

    fn first_review(&self, base: &CardProgress, now: DateTime<Utc>) -> [CardProgress; 4] {
        Rating::ALL.map(|rating| {
            let mut next = base.clone();
            next.stability = self.initial_stability(rating);
            next.difficulty = self.initial_difficulty(rating);
            match rating {
                Rating::Again => schedule_minutes(&mut next, CardState::Learning, 1, now),
                Rating::Hard => schedule_minutes(&mut next, CardState::Learning, 5, now),
                Rating::Good => schedule_minutes(&mut next, CardState::Learning, 10, now),
                Rating::Easy => {
                    let interval = self.next_interval(next.stability);
                    schedule_days(&mut next, CardState::Review, interval, now)
                }
            }
            next
        })
    }

    fn learning_outcomes(
        &self,
        base: &CardProgress,
        prev: &CardProgress,
        now: DateTime<Utc>,
    ) -> [CardProgress; 4] {
        let good_interval = self.next_interval(self.short_term_stability(prev.stability, Rating::Good));
        let easy_interval = self
            .next_interval(self.short_term_stability(prev.stability, Rating::Easy))
            .max(good_interval + 1)
            .min(self.maximum_interval);
        let relearning = prev.state == CardState::Relearning;

        Rating::ALL.map(|rating| {
            let mut next = base.clone();
            next.stability = self.short_term_stability(prev.stability, rating);
            next.difficulty = self.next_difficulty(prev.difficulty, rating);
            match rating {
                Rating::Again => {
                    next.lapses += 1;
                    if relearning {
                        schedule_days(&mut next, CardState::Relearning, 1, now)
                    } else {
                        schedule_minutes(&mut next, CardState::Learning, 5, now)
                    }
                }
                Rating::Hard if relearning => {
                    schedule_days(&mut next, CardState::Relearning, 1, now)
                }
                Rating::Hard => schedule_minutes(&mut next, CardState::Learning, 10, now),
                Rating::Good => schedule_days(&mut next, CardState::Review, good_interval, now),
                Rating::Easy => schedule_days(&mut next, CardState::Review, easy_interval, now),
            }
            next
        })
    }

    fn review_outcomes(
        &self,
        base: &CardProgress,
        prev: &CardProgress,
        now: DateTime<Utc>,
    ) -> [CardProgress; 4] {
        let r = Self::retention_at(base.elapsed_days as f64, prev.stability);
        let recall = |rating| self.recall_stability(prev.stability, prev.difficulty, r, rating);

        let hard_interval = self
            .next_interval(recall(Rating::Hard))
            .min(self.next_interval(recall(Rating::Good)));
        let good_interval = self
            .next_interval(recall(Rating::Good))
            .max(hard_interval + 1)
            .min(self.maximum_interval);
        let easy_interval = self
            .next_interval(recall(Rating::Easy))
            .max(good_interval + 1)
            .min(self.maximum_interval);

        Rating::ALL.map(|rating| {
            let mut next = base.clone();
            next.difficulty = self.next_difficulty(prev.difficulty, rating);
            match rating {
                Rating::Again => {
                    next.stability = self.forget_stability(prev.stability, prev.difficulty, r);
                    next.lapses += 1;
                    schedule_days(&mut next, CardState::Relearning, 1, now)
                }
                Rating::Hard => {
                    next.stability = recall(rating);
                    schedule_days(&mut next, CardState::Review, hard_interval, now)
                }
                Rating::Good => {
                    next.stability = recall(rating);
                    schedule_days(&mut next, CardState::Review, good_interval, now)
                }
                Rating::Easy => {
                    next.stability = recall(rating);
                    schedule_days(&mut next, CardState::Review, easy_interval, now)
                }
            }
            next
        })
    }
}

fn schedule_minutes(progress: &mut CardProgress, state: CardState, minutes: i64, now: DateTime<Utc>) {
    progress.state = state;
    progress.scheduled_days = 0;
    progress.due = Some(now + Duration::minutes(minutes));
}

fn schedule_days(progress: &mut CardProgress, state: CardState, days: i64, now: DateTime<Utc>) {
    progress.state = state;
    progress.scheduled_days = days;
    progress.due = Some(now + Duration::days(days));
}

fn rating_index(rating: Rating) -> usize {
    usize::from(rating.to_value() - 1)
}

impl Scheduler for Fsrs {
    fn name(&self) -> &'static str {
        "fsrs"
    }

    fn apply(&self, progress: &CardProgress, rating: Rating, now: DateTime<Utc>) -> CardProgress {
        let [again, hard, good, easy] = self.outcomes(progress, now);
        match rating {
            Rating::Again => again,
            Rating::Hard => hard,
            Rating::Good => good,
            Rating::Easy => easy,
        }
    }

    fn preview(&self, progress: &CardProgress, now: DateTime<Utc>) -> BTreeMap<Rating, RatingPreview> {
        let outcomes = self.outcomes(progress, now);
        Rating::ALL
            .into_iter()
            .map(|rating| {
                let next = &outcomes[rating_index(rating)];
                let last = next.last_review.unwrap_or(now);
                let next_due = next.due.unwrap_or(now);
                let days_until_due = (next_due - last).num_seconds() as f64 / 86400.0;
                let preview = RatingPreview {
                    next_due,
                    interval_days: next.scheduled_days,
                    retrievability_at_due: Self::retention_at(days_until_due, next.stability),
                };
                (rating, preview)
            })
            .collect()
    }

    fn retrievability(&self, progress: &CardProgress, now: DateTime<Utc>) -> f64 {
        if progress.state == CardState::New {
            return 0.0;
        }
        match progress.last_review {
            Some(last) => {
                let elapsed = (now - last).num_seconds() as f64 / 86400.0;
                Self::retention_at(elapsed, progress.stability)
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn fresh() -> CardProgress {
        CardProgress::new(1, 42)
    }

    fn review_progress(stability: f64, difficulty: f64, days_since: i64, at: DateTime<Utc>) -> CardProgress {
        let last = at - Duration::days(days_since);
        CardProgress {
            stability,
            difficulty,
            elapsed_days: days_since,
            scheduled_days: days_since,
            reps: 5,
            lapses: 0,
            state: CardState::Review,
            due: Some(last + Duration::days(stability.round() as i64)),
            last_review: Some(last),
            ..fresh()
        }
    }

    fn learning_progress(state: CardState, at: DateTime<Utc>) -> CardProgress {
        CardProgress {
            stability: 3.0,
            difficulty: 5.0,
            reps: 1,
            state,
            due: Some(at),
            last_review: Some(at - Duration::minutes(10)),
            ..fresh()
        }
    }

    #[test]
    fn new_card_first_review_good() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let result = fsrs.apply(&fresh(), Rating::Good, current_time);

        assert_eq!(result.state, CardState::Learning);
        assert_eq!(result.reps, 1);
        assert!(result.stability > 0.0);
        assert!(result.difficulty >= 1.0);
        assert_eq!(result.last_review, Some(current_time));
        assert!(result.due.unwrap() > current_time);
    }

    #[test]
    fn new_card_first_review_again() {
        let fsrs = Fsrs::default();
        let result = fsrs.apply(&fresh(), Rating::Again, now());

        assert_eq!(result.state, CardState::Learning);
        assert_eq!(result.lapses, 0);
        assert_eq!(result.scheduled_days, 0);
    }

    #[test]
    fn new_card_easy_goes_straight_to_review() {
        let fsrs = Fsrs::default();
        let result = fsrs.apply(&fresh(), Rating::Easy, now());

        assert_eq!(result.state, CardState::Review);
        assert!(result.scheduled_days >= 1);
    }

    #[test]
    fn new_card_easy_higher_stability() {
        let fsrs = Fsrs::default();
        let good = fsrs.apply(&fresh(), Rating::Good, now());
        let easy = fsrs.apply(&fresh(), Rating::Easy, now());

        assert!(easy.stability > good.stability);
    }

    #[test]
    fn first_review_leaves_new_state_for_every_rating() {
        let fsrs = Fsrs::default();
        for rating in Rating::ALL {
            let result = fsrs.apply(&fresh(), rating, now());
            assert_eq!(result.reps, 1, "{:?}", rating);
            assert_ne!(result.state, CardState::New, "{:?}", rating);
        }
    }

    #[test]
    fn review_good_is_due_later_than_again() {
        let fsrs = Fsrs::default();
        let current_time = now();
        for (stability, difficulty, days) in [(1.0, 5.0, 1), (5.0, 3.0, 6), (30.0, 8.0, 20), (200.0, 1.0, 400)] {
            let p = review_progress(stability, difficulty, days, current_time);
            let good = fsrs.apply(&p, Rating::Good, current_time);
            let again = fsrs.apply(&p, Rating::Again, current_time);

            assert!(good.due.unwrap() > current_time);
            assert!(good.scheduled_days >= again.scheduled_days);
        }
    }

    #[test]
    fn review_again_is_a_lapse() {
        let fsrs = Fsrs::default();
        let current_time = now();
        for lapses in [0, 1, 7] {
            let p = CardProgress {
                lapses,
                ..review_progress(10.0, 5.0, 10, current_time)
            };
            let result = fsrs.apply(&p, Rating::Again, current_time);

            assert_eq!(result.lapses, lapses + 1);
            assert_eq!(result.state, CardState::Relearning);
            assert!(result.scheduled_days >= 1);
        }
    }

    #[test]
    fn stability_increases_on_successful_recall() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = review_progress(5.0, 5.0, 5, current_time);

        let result = fsrs.apply(&p, Rating::Good, current_time);
        assert!(result.stability > 5.0);
    }

    #[test]
    fn stability_decreases_on_lapse() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = review_progress(10.0, 5.0, 10, current_time);

        let result = fsrs.apply(&p, Rating::Again, current_time);
        assert!(result.stability < 10.0);
    }

    #[test]
    fn difficulty_moves_with_rating() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = review_progress(5.0, 5.0, 5, current_time);

        assert!(fsrs.apply(&p, Rating::Easy, current_time).difficulty < 5.0);
        assert!(fsrs.apply(&p, Rating::Again, current_time).difficulty > 5.0);
    }

    #[test]
    fn difficulty_clamped_to_bounds() {
        let fsrs = Fsrs::default();
        let current_time = now();

        let hardest = review_progress(5.0, 10.0, 5, current_time);
        assert!(fsrs.apply(&hardest, Rating::Again, current_time).difficulty <= 10.0);

        let easiest = review_progress(5.0, 1.0, 5, current_time);
        assert!(fsrs.apply(&easiest, Rating::Easy, current_time).difficulty >= 1.0);
    }

    #[test]
    fn review_intervals_are_ordered_by_rating() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = review_progress(12.0, 6.0, 12, current_time);
        let preview = fsrs.preview(&p, current_time);

        let days: Vec<i64> = Rating::ALL.iter().map(|r| preview[r].interval_days).collect();
        assert!(days[0] <= days[1]);
        assert!(days[1] < days[2]);
        assert!(days[2] < days[3]);
    }

    #[test]
    fn interval_respects_maximum() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = review_progress(50000.0, 5.0, 1000, current_time);

        let result = fsrs.apply(&p, Rating::Easy, current_time);
        assert!(result.scheduled_days <= fsrs.maximum_interval);
    }

    #[test]
    fn retrievability_formula() {
        // At t=0, R should be 1.0
        assert!((Fsrs::retention_at(0.0, 10.0) - 1.0).abs() < 1e-9);
        // At t = S, R = 0.9
        assert!((Fsrs::retention_at(10.0, 10.0) - 0.9).abs() < 1e-9);
        // No memory, no recall
        assert_eq!(Fsrs::retention_at(3.0, 0.0), 0.0);
    }

    #[test]
    fn interval_matches_stability_at_default_retention() {
        let fsrs = Fsrs::default();
        assert_eq!(fsrs.next_interval(10.0), 10);
        assert_eq!(fsrs.next_interval(0.2), 1);
    }

    #[test]
    fn retrievability_of_new_card_is_zero() {
        let fsrs = Fsrs::default();
        assert_eq!(fsrs.retrievability(&fresh(), now()), 0.0);
    }

    #[test]
    fn retrievability_decays_over_time() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = review_progress(10.0, 5.0, 0, current_time);

        let soon = fsrs.retrievability(&p, current_time + Duration::days(1));
        let later = fsrs.retrievability(&p, current_time + Duration::days(20));
        assert!(soon > later);
        assert!(later > 0.0);
    }

    #[test]
    fn learning_card_graduates_on_good() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = learning_progress(CardState::Learning, current_time);

        let result = fsrs.apply(&p, Rating::Good, current_time);
        assert_eq!(result.state, CardState::Review);
        assert!(result.scheduled_days >= 1);
    }

    #[test]
    fn learning_card_stays_on_again_and_hard() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = learning_progress(CardState::Learning, current_time);

        assert_eq!(fsrs.apply(&p, Rating::Again, current_time).state, CardState::Learning);
        assert_eq!(fsrs.apply(&p, Rating::Hard, current_time).state, CardState::Learning);
    }

    #[test]
    fn relearning_card_transitions() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = learning_progress(CardState::Relearning, current_time);

        assert_eq!(fsrs.apply(&p, Rating::Again, current_time).state, CardState::Relearning);
        assert_eq!(fsrs.apply(&p, Rating::Hard, current_time).state, CardState::Relearning);
        assert_eq!(fsrs.apply(&p, Rating::Good, current_time).state, CardState::Review);
        assert_eq!(fsrs.apply(&p, Rating::Easy, current_time).state, CardState::Review);
    }

    #[test]
    fn hard_penalty_reduces_stability_growth() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = review_progress(10.0, 5.0, 10, current_time);

        let good = fsrs.apply(&p, Rating::Good, current_time);
        let hard = fsrs.apply(&p, Rating::Hard, current_time);
        assert!(hard.stability < good.stability);
    }

    #[test]
    fn regressed_clock_uses_last_review() {
        let fsrs = Fsrs::default();
        let current_time = now();
        let p = review_progress(10.0, 5.0, 0, current_time);

        let result = fsrs.apply(&p, Rating::Good, current_time - Duration::hours(3));
        assert_eq!(result.last_review, p.last_review);
        assert_eq!(result.elapsed_days, 0);
        assert!(result.due.unwrap() > current_time);
    }

    #[test]
    fn preview_covers_all_ratings_without_mutating() {
        let fsrs = Fsrs::default();
        let p = fresh();
        let preview = fsrs.preview(&p, now());

        assert_eq!(preview.len(), 4);
        assert_eq!(p, fresh());
        assert!(preview[&Rating::Easy].interval_days >= 1);
        assert!(preview[&Rating::Good].retrievability_at_due > 0.9);
    }

    #[test]
    fn is_due_handles_missing_and_future_due() {
        let fsrs = Fsrs::default();
        let current_time = now();
        assert!(fsrs.is_due(None, current_time));
        assert!(fsrs.is_due(Some(&fresh()), current_time));

        let mut p = review_progress(10.0, 5.0, 2, current_time);
        p.due = Some(current_time + Duration::days(1));
        assert!(!fsrs.is_due(Some(&p), current_time));

        p.due = Some(current_time);
        assert!(fsrs.is_due(Some(&p), current_time));
    }
}
