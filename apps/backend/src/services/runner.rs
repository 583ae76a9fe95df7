//! Daily lesson runner.
//!
//! The active lesson lives in the [`Registry`] under the user's id. Each
//! review holds that user's entry lock from validation until the lesson has
//! advanced, so submissions are applied one at a time in arrival order.

use palabra_core::xp::review_xp;
use palabra_core::LessonProgress;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::services::registry::Registry;
use crate::services::{accountant, cards, composer};
use crate::store::{ActivityStore, CardStore, JourneyStore, ProgressStore, SettingsStore};
use crate::AppState;

/// A lesson being worked through, with the session row it reports into.
#[derive(Debug)]
pub struct ActiveLesson {
    progress: LessonProgress,
    /// `None` once today's session has been completed; further lessons that
    /// day are extra practice and leave the session untouched.
    session_id: Option<i64>,
    /// Aggregates the session already held when this lesson started.
    base: LessonTotals,
}

impl ActiveLesson {
    pub fn progress(&self) -> &LessonProgress {
        &self.progress
    }

    pub fn session_id(&self) -> Option<i64> {
        self.session_id
    }

    fn session_totals(&self) -> LessonTotals {
        self.base + self.progress.totals()
    }
}

pub type LessonRegistry = Registry<ActiveLesson>;

fn stale() -> ApiError {
    ApiError::StaleSession("no active lesson, start a new one".to_string())
}

/// Compose today's lesson and make it the user's active lesson.
pub async fn start(state: &AppState, user_id: i64) -> Result<LessonStep> {
    let lesson = composer::compose_today(state, user_id).await?;
    let today = state.clock.today();

    if lesson.is_empty() {
        state.lessons.remove(user_id);
        tracing::info!(user_id, day = lesson.day_number, "nothing to study today");
        let progress = LessonProgress::new(lesson);
        return Ok(LessonStep::Finished(progress.summary(Vec::new(), &mut rand::rng())));
    }

    let (session_id, base) = match state.store.today_lesson_session(user_id, today).await? {
        Some(session) if session.is_completed() => (None, LessonTotals::default()),
        Some(session) => (Some(session.id), session.totals()),
        None => {
            let session = state
                .store
                .create_lesson_session(user_id, today, lesson.day_number, lesson.phase.id)
                .await?;
            (Some(session.id), session.totals())
        }
    };

    tracing::info!(
        user_id,
        day = lesson.day_number,
        cards = lesson.cards.len(),
        due = lesson.due_review_count,
        new = lesson.new_card_count,
        "lesson started"
    );

    let entry = state.lessons.insert(
        user_id,
        ActiveLesson {
            progress: LessonProgress::new(lesson),
            session_id,
            base,
        },
    );
    let active = entry.lock().await;
    next_step(state, user_id, &active.progress).await?.ok_or_else(stale)
}

/// The card the user is looking at.
pub async fn current(state: &AppState, user_id: i64) -> Result<LessonCardView> {
    let entry = state.lessons.get(user_id).ok_or_else(stale)?;
    let active = entry.lock().await;
    card_view(state, user_id, &active.progress).await?.ok_or_else(stale)
}

/// Rate the current card.
pub async fn review(state: &AppState, user_id: i64, request: ReviewRequest) -> Result<LessonStep> {
    let rating = Rating::try_from(request.rating)?;
    let entry = state.lessons.get(user_id).ok_or_else(stale)?;
    let mut active = entry.lock().await;
    ensure_current(&active.progress, request.card_id, stale)?;

    let duration_ms = request.duration_ms.max(0);
    let xp = apply_rating(state, user_id, request.card_id, rating, duration_ms).await?;

    let finished = active.progress.record(rating, duration_ms, xp);
    if let Some(session_id) = active.session_id {
        state
            .store
            .update_lesson_session(session_id, active.session_totals())
            .await?;
    }

    if finished {
        let summary = finalize(state, user_id, &active).await?;
        state.lessons.remove_entry(user_id, &entry);
        return Ok(LessonStep::Finished(summary));
    }
    next_step(state, user_id, &active.progress).await?.ok_or_else(stale)
}

/// Fail unless `card_id` is the card `progress` is waiting on.
pub(crate) fn ensure_current(progress: &LessonProgress, card_id: i64, none: fn() -> ApiError) -> Result<()> {
    let current_id = progress.current().map(|c| c.card.card.id).ok_or_else(none)?;
    if current_id != card_id {
        return Err(ApiError::NotFound(format!(
            "Card {} is not the current lesson card",
            card_id
        )));
    }
    Ok(())
}

/// Schedule a rating and book it. Returns the XP earned.
///
/// Writes go review log, streak, XP, daily counters and finally the card's
/// progress, so a failure part way leaves the card due as before.
pub(crate) async fn apply_rating(
    state: &AppState,
    user_id: i64,
    card_id: i64,
    rating: Rating,
    duration_ms: i64,
) -> Result<i64> {
    let now = state.clock.now();
    let today = state.clock.today();
    let settings = state.store.user_settings(user_id).await?;
    let scheduler = state.scheduler_for(&settings);

    let before = state
        .store
        .get_progress(user_id, card_id)
        .await?
        .unwrap_or_else(|| CardProgress::new(user_id, card_id));
    let was_new = before.is_new();
    let after = scheduler.apply(&before, rating, now);

    state
        .store
        .log_review(&ReviewLog {
            user_id,
            card_id,
            rating,
            elapsed_days: before.elapsed_days,
            scheduled_days: before.scheduled_days,
            duration_ms,
            reviewed_at: now,
        })
        .await?;
    let streak = accountant::touch_streak(state, user_id, today).await?;
    let xp = review_xp(rating, was_new, streak.current_streak);
    state.store.add_xp(user_id, xp).await?;
    state
        .store
        .increment_daily(user_id, today, DailyDelta::for_review(rating, was_new, xp))
        .await?;
    state.store.upsert_progress(&after).await?;

    tracing::debug!(
        user_id,
        card_id,
        rating = rating.to_value(),
        xp,
        state = after.state.as_str(),
        scheduled_days = after.scheduled_days,
        "card reviewed"
    );
    Ok(xp)
}

/// Move past the current card without rating it.
pub async fn skip(state: &AppState, user_id: i64) -> Result<LessonStep> {
    let entry = state.lessons.get(user_id).ok_or_else(stale)?;
    let mut active = entry.lock().await;
    if active.progress.is_finished() {
        return Err(stale());
    }

    if active.progress.skip() {
        let summary = finalize(state, user_id, &active).await?;
        state.lessons.remove_entry(user_id, &entry);
        return Ok(LessonStep::Finished(summary));
    }
    next_step(state, user_id, &active.progress).await?.ok_or_else(stale)
}

/// Close the lesson: award achievements, complete the day's session once,
/// and build the summary. Safe to call again for the same lesson.
pub async fn finalize(state: &AppState, user_id: i64, active: &ActiveLesson) -> Result<LessonSummary> {
    let achievements = accountant::check_achievements(state, user_id).await?;

    if let Some(session_id) = active.session_id {
        let completed = state
            .store
            .complete_lesson_session(session_id, active.session_totals(), state.clock.now())
            .await?;
        if !completed {
            tracing::debug!(user_id, session_id, "lesson session already completed");
        }
    }

    let totals = active.progress.totals();
    tracing::info!(
        user_id,
        reviewed = totals.cards_reviewed,
        correct = totals.cards_correct,
        xp = totals.xp_earned,
        achievements = achievements.len(),
        "lesson finished"
    );
    Ok(active.progress.summary(achievements, &mut rand::rng()))
}

/// The current card as a step, `None` when the lesson has run out.
pub(crate) async fn next_step(
    state: &AppState,
    user_id: i64,
    progress: &LessonProgress,
) -> Result<Option<LessonStep>> {
    Ok(card_view(state, user_id, progress).await?.map(LessonStep::Card))
}

/// Everything the client needs to show the current card.
pub(crate) async fn card_view(
    state: &AppState,
    user_id: i64,
    progress: &LessonProgress,
) -> Result<Option<LessonCardView>> {
    let Some(current) = progress.current() else {
        return Ok(None);
    };
    let now = state.clock.now();
    let card = &current.card.card;
    let settings = state.store.user_settings(user_id).await?;
    let scheduler = state.scheduler_for(&settings);

    let memory = current.card.progress_or_new(user_id);
    let preview = scheduler.preview(&memory, now);
    let retrievability = (!memory.is_new()).then(|| scheduler.retrievability(&memory, now));
    let question = cards::question_for(state, card, current.mode).await?;
    let bridges = if settings.show_bridges {
        state.store.card_bridges(card.id).await?
    } else {
        None
    };
    let lesson = progress.lesson();

    Ok(Some(LessonCardView {
        index: progress.current_index(),
        total: progress.total_cards(),
        card: current.clone(),
        preview,
        retrievability,
        question,
        bridges,
        day_number: lesson.day_number,
        estimated_minutes: lesson.estimated_minutes,
    }))
}
