//! Builds today's lesson from the store.

use chrono::NaiveDate;
use palabra_core::compose::{LessonComposer, LessonPools};
use palabra_core::curriculum::{day_number, MAX_DAYS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::*;
use crate::store::{ActivityStore, JourneyStore, ProgressStore, SettingsStore, SongStore};
use crate::AppState;

const DUE_LIMIT: i64 = 100;
const SONG_DUE_LIMIT: i64 = 5;
const SONG_NEW_LIMIT: i64 = 2;

/// RNG seeded from the user and the study day, so a lesson lost from memory
/// is rebuilt identically while the store is unchanged.
pub fn daily_rng(user_id: i64, date: NaiveDate) -> StdRng {
    let digest = Sha256::digest(format!("{}:{}", user_id, date).as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}

/// Compose the lesson for the user's current journey day.
pub async fn compose_today(state: &AppState, user_id: i64) -> Result<DailyLesson> {
    let store = &state.store;
    let now = state.clock.now();
    let today = state.clock.today();

    let journey = store.get_or_create_journey(user_id, today).await?;
    let mut composer = LessonComposer::for_day(day_number(journey.start_date, today));
    if let Some(allowance) = store.user_settings(user_id).await?.new_cards_per_day {
        composer = composer.with_new_cards_per_day(allowance);
    }

    let due_curriculum = store.due_cards(user_id, now, DUE_LIMIT).await?;
    let due_song_vocab = store.song_vocab_due(user_id, now, SONG_DUE_LIMIT).await?;
    let in_progress = store.songs_in_progress(user_id).await?;
    let new_song_vocab = store
        .song_vocab_new(user_id, &in_progress, SONG_NEW_LIMIT)
        .await?;

    let due_load = store.count_due(user_id, now).await?;
    let budget = composer.new_card_budget(usize::try_from(due_load).unwrap_or(0));
    let new_curriculum = store
        .new_cards_from_islands(user_id, composer.phase.target_islands, budget as i64)
        .await?;

    let mut song_ids: Vec<i64> = due_song_vocab
        .iter()
        .chain(&new_song_vocab)
        .filter_map(|c| c.card.source_song_id)
        .collect();
    song_ids.sort_unstable();
    song_ids.dedup();
    let song_titles = store.song_titles(&song_ids).await?;

    tracing::debug!(
        user_id,
        day = composer.day_number,
        due = due_curriculum.len(),
        due_load,
        budget,
        new = new_curriculum.len(),
        "composing lesson"
    );

    let pools = LessonPools {
        due_curriculum,
        due_song_vocab,
        new_curriculum,
        new_song_vocab,
        song_titles,
    };
    Ok(composer.compose(pools, &mut daily_rng(user_id, today)))
}

/// Home screen: where the journey stands and what today holds. The preview
/// counts come from today's composed lesson, song vocabulary included.
pub async fn journey_home(state: &AppState, user_id: i64) -> Result<JourneyHome> {
    let store = &state.store;
    let now = state.clock.now();
    let today = state.clock.today();

    let lesson = compose_today(state, user_id).await?;
    let due_count = store.count_due(user_id, now).await?;

    let session = store.today_lesson_session(user_id, today).await?;
    let today_completed = session.as_ref().is_some_and(LessonSession::is_completed);
    let today_stats = session.filter(LessonSession::is_completed).map(|s| {
        let accuracy = if s.cards_reviewed > 0 {
            s.cards_correct * 100 / s.cards_reviewed
        } else {
            0
        };
        format!("{} cards, {}% accuracy", s.cards_reviewed, accuracy)
    });

    let user = store.get_user(user_id).await?;
    let (current_streak, total_xp) = user.map_or((0, 0), |u| (u.current_streak, u.total_xp));

    Ok(JourneyHome {
        day_number: lesson.day_number,
        total_days: MAX_DAYS,
        phase_id: lesson.phase.id,
        phase_name: lesson.phase.name.to_string(),
        phase_description: lesson.phase.description.to_string(),
        today_completed,
        today_stats,
        due_count,
        new_count: lesson.new_card_count,
        estimated_minutes: lesson.estimated_minutes,
        current_streak,
        total_xp,
    })
}
