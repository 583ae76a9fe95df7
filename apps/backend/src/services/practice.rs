//! Free practice outside the daily lesson.
//!
//! A practice session takes due cards first and tops up with new ones, all
//! shown in the learner's default mode. Ratings are scheduled and booked the
//! same way as in the daily lesson but leave today's lesson session alone.

use chrono::{DateTime, Utc};
use palabra_core::compose::practice_lesson;
use palabra_core::curriculum::day_number;
use palabra_core::LessonProgress;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::services::registry::Registry;
use crate::services::{accountant, runner};
use crate::store::{JourneyStore, ProgressStore, SettingsStore};
use crate::AppState;

const MAX_PRACTICE_CARDS: usize = 200;

#[derive(Debug)]
pub struct ActivePractice {
    progress: LessonProgress,
    started_at: DateTime<Utc>,
}

pub type PracticeRegistry = Registry<ActivePractice>;

fn stale() -> ApiError {
    ApiError::StaleSession("no practice session, start a new one".to_string())
}

/// Start a practice session of up to `max_cards`, defaulting to the
/// learner's session size. An unfinished session is picked up instead.
pub async fn start(state: &AppState, user_id: i64, max_cards: Option<usize>) -> Result<LessonStep> {
    if let Some(entry) = state.practice.get(user_id) {
        let active = entry.lock().await;
        if let Some(step) = runner::next_step(state, user_id, &active.progress).await? {
            tracing::debug!(user_id, index = active.progress.current_index(), "practice resumed");
            return Ok(step);
        }
    }

    let store = &state.store;
    let now = state.clock.now();
    let today = state.clock.today();
    let settings = store.user_settings(user_id).await?;
    let default_size = usize::try_from(settings.reviews_per_session).unwrap_or(1);
    let max_cards = max_cards.unwrap_or(default_size).clamp(1, MAX_PRACTICE_CARDS);

    let due = store.due_cards(user_id, now, max_cards as i64).await?;
    let fresh = if due.len() < max_cards {
        store.new_cards(user_id, (max_cards - due.len()) as i64).await?
    } else {
        Vec::new()
    };
    let journey = store.get_or_create_journey(user_id, today).await?;
    let lesson = practice_lesson(
        day_number(journey.start_date, today),
        due,
        fresh,
        max_cards,
        settings.default_mode,
    );

    if lesson.is_empty() {
        state.practice.remove(user_id);
        tracing::info!(user_id, "nothing to practice");
        let progress = LessonProgress::new(lesson);
        return Ok(LessonStep::Finished(progress.summary(Vec::new(), &mut rand::rng())));
    }

    tracing::info!(
        user_id,
        cards = lesson.cards.len(),
        due = lesson.due_review_count,
        new = lesson.new_card_count,
        mode = settings.default_mode.as_str(),
        "practice started"
    );

    let entry = state.practice.insert(
        user_id,
        ActivePractice {
            progress: LessonProgress::new(lesson),
            started_at: now,
        },
    );
    let active = entry.lock().await;
    runner::next_step(state, user_id, &active.progress)
        .await?
        .ok_or_else(stale)
}

pub async fn current(state: &AppState, user_id: i64) -> Result<LessonCardView> {
    let entry = state.practice.get(user_id).ok_or_else(stale)?;
    let active = entry.lock().await;
    runner::card_view(state, user_id, &active.progress)
        .await?
        .ok_or_else(stale)
}

pub async fn review(state: &AppState, user_id: i64, request: ReviewRequest) -> Result<LessonStep> {
    let rating = Rating::try_from(request.rating)?;
    let entry = state.practice.get(user_id).ok_or_else(stale)?;
    let mut active = entry.lock().await;
    runner::ensure_current(&active.progress, request.card_id, stale)?;

    let duration_ms = request.duration_ms.max(0);
    let xp = runner::apply_rating(state, user_id, request.card_id, rating, duration_ms).await?;

    if active.progress.record(rating, duration_ms, xp) {
        let summary = finish(state, user_id, &active).await?;
        state.practice.remove_entry(user_id, &entry);
        return Ok(LessonStep::Finished(summary));
    }
    runner::next_step(state, user_id, &active.progress)
        .await?
        .ok_or_else(stale)
}

pub async fn skip(state: &AppState, user_id: i64) -> Result<LessonStep> {
    let entry = state.practice.get(user_id).ok_or_else(stale)?;
    let mut active = entry.lock().await;
    if active.progress.is_finished() {
        return Err(stale());
    }

    if active.progress.skip() {
        let summary = finish(state, user_id, &active).await?;
        state.practice.remove_entry(user_id, &entry);
        return Ok(LessonStep::Finished(summary));
    }
    runner::next_step(state, user_id, &active.progress)
        .await?
        .ok_or_else(stale)
}

/// Counters of the running session.
pub async fn stats(state: &AppState, user_id: i64) -> Result<PracticeStats> {
    let entry = state.practice.get(user_id).ok_or_else(stale)?;
    let active = entry.lock().await;
    Ok(practice_stats(&active, state.clock.now()))
}

fn practice_stats(active: &ActivePractice, now: DateTime<Utc>) -> PracticeStats {
    let progress = &active.progress;
    let totals = progress.totals();
    let reviewed = progress.results().len();
    let accuracy = if reviewed > 0 {
        totals.cards_correct as f64 / reviewed as f64 * 100.0
    } else {
        0.0
    };
    PracticeStats {
        total_cards: progress.total_cards(),
        reviewed,
        remaining: progress.total_cards().saturating_sub(progress.current_index()),
        correct: totals.cards_correct,
        accuracy,
        xp_earned: totals.xp_earned,
        duration_ms: (now - active.started_at).num_milliseconds().max(0),
    }
}

async fn finish(state: &AppState, user_id: i64, active: &ActivePractice) -> Result<LessonSummary> {
    let achievements = accountant::check_achievements(state, user_id).await?;
    let totals = active.progress.totals();
    tracing::info!(
        user_id,
        reviewed = totals.cards_reviewed,
        correct = totals.cards_correct,
        xp = totals.xp_earned,
        "practice finished"
    );
    Ok(active.progress.summary(achievements, &mut rand::rng()))
}
