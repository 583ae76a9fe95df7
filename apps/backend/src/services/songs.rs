//! Song lessons: running the phase machine against the store.

use palabra_core::song::{apply_song_result, completion_message, SongLesson};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::services::registry::Registry;
use crate::store::{ActivityStore, CardStore, SongStore};
use crate::AppState;

/// A song lesson in progress and the session row it reports into.
#[derive(Debug)]
pub struct ActiveSongLesson {
    lesson: SongLesson,
    session_id: i64,
    writes: CompletionWrites,
    completion: Option<SongCompletion>,
}

/// Completion writes already applied. A retry after a failed write skips
/// these, so nothing is credited twice.
#[derive(Debug, Default, Clone, Copy)]
struct CompletionWrites {
    session_closed: bool,
    /// Set when this lesson was the one that closed the session.
    owes_xp: bool,
    xp_added: bool,
    daily_logged: bool,
}

impl ActiveSongLesson {
    pub fn lesson(&self) -> &SongLesson {
        &self.lesson
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }
}

pub type SongLessonRegistry = Registry<ActiveSongLesson>;

fn stale() -> ApiError {
    ApiError::StaleSession("no active song lesson, start one from the song list".to_string())
}

/// Create curriculum cards for the song's vocabulary that has none yet, so
/// those words join the daily lessons. Returns how many were created.
pub async fn ensure_song_vocab_cards(state: &AppState, song_id: i64) -> Result<usize> {
    let unlinked = state.store.unlinked_song_vocab(song_id).await?;
    for vocab in &unlinked {
        let card = state
            .store
            .create_card(&NewCard {
                term: vocab.word.clone(),
                translation: vocab.translation.clone(),
                source: CardSource::Song,
                source_song_id: Some(song_id),
                ..Default::default()
            })
            .await?;
        state.store.link_song_vocab_to_card(vocab.id, card.id).await?;
    }
    if !unlinked.is_empty() {
        tracing::info!(song_id, cards = unlinked.len(), "song vocabulary promoted to cards");
    }
    Ok(unlinked.len())
}

async fn promote_vocab(state: &AppState, song_id: i64) {
    if let Err(e) = ensure_song_vocab_cards(state, song_id).await {
        tracing::warn!(song_id, error = %e, "failed to create cards for song vocabulary");
    }
}

/// Start a song lesson in `mode`, replacing any song lesson the user had.
pub async fn start(state: &AppState, user_id: i64, song_id: i64, mode: SongMode) -> Result<SongLessonView> {
    let details = state
        .store
        .get_song_with_details(song_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Song {}", song_id)))?;

    promote_vocab(state, song_id).await;

    let lesson = SongLesson::build(details, mode, &mut rand::rng());
    let session = state
        .store
        .create_song_session(user_id, song_id, state.clock.today(), mode)
        .await?;

    tracing::info!(
        user_id,
        song_id,
        mode = mode.as_str(),
        vocab = lesson.vocab_cards.len(),
        lines = lesson.details.lines.len(),
        blanks = lesson.blanks.len(),
        "song lesson started"
    );

    let entry = state.songs.insert(
        user_id,
        ActiveSongLesson {
            lesson,
            session_id: session.id,
            writes: CompletionWrites::default(),
            completion: None,
        },
    );
    let mut active = entry.lock().await;
    if active.lesson.is_complete() {
        complete(state, user_id, &mut active).await?;
    }
    Ok(view(&active))
}

/// The user's song lesson as it stands. Retries an interrupted completion.
pub async fn current(state: &AppState, user_id: i64) -> Result<SongLessonView> {
    let entry = state.songs.get(user_id).ok_or_else(stale)?;
    let mut active = entry.lock().await;
    resume_completion(state, user_id, &mut active).await?;
    Ok(view(&active))
}

/// Finish a lesson whose completion failed part way. Returns whether
/// there was one to finish.
async fn resume_completion(state: &AppState, user_id: i64, active: &mut ActiveSongLesson) -> Result<bool> {
    if !active.lesson.is_complete() || active.completion.is_some() {
        return Ok(false);
    }
    tracing::info!(user_id, session_id = active.session_id, "retrying song lesson completion");
    complete(state, user_id, active).await?;
    Ok(true)
}

/// Rate the current vocabulary card.
pub async fn rate_vocab(state: &AppState, user_id: i64, rating: i64) -> Result<SongLessonView> {
    let rating = Rating::try_from(rating)?;
    step(state, user_id, |lesson| lesson.rate_vocab(rating).map_err(ApiError::from)).await
}

/// Finish the current listen phase.
pub async fn next_phase(state: &AppState, user_id: i64) -> Result<SongLessonView> {
    let entry = state.songs.get(user_id).ok_or_else(stale)?;
    let mut active = entry.lock().await;
    if resume_completion(state, user_id, &mut active).await? {
        return Ok(view(&active));
    }

    let counted = active.lesson.next_phase()?;
    if counted {
        let song_id = active.lesson.details.song.id;
        state.store.increment_listen_count(user_id, song_id).await?;
    }
    after_step(state, user_id, &mut active).await?;
    Ok(view(&active))
}

/// Mark the current line studied.
pub async fn next_line(state: &AppState, user_id: i64) -> Result<SongLessonView> {
    step(state, user_id, |lesson| lesson.next_line().map_err(ApiError::from)).await
}

/// Move past the current line without counting it.
pub async fn skip_line(state: &AppState, user_id: i64) -> Result<SongLessonView> {
    step(state, user_id, |lesson| lesson.skip_line().map_err(ApiError::from)).await
}

/// Check an answer for the current blank.
pub async fn submit_blank(state: &AppState, user_id: i64, answer: &str) -> Result<BlankResponse> {
    let entry = state.songs.get(user_id).ok_or_else(stale)?;
    let mut active = entry.lock().await;
    resume_completion(state, user_id, &mut active).await?;

    let outcome = active.lesson.submit_blank(answer)?;
    tracing::debug!(user_id, correct = outcome.correct, "blank answered");
    after_step(state, user_id, &mut active).await?;
    Ok(BlankResponse {
        outcome,
        lesson: view(&active),
    })
}

async fn step<F>(state: &AppState, user_id: i64, apply: F) -> Result<SongLessonView>
where
    F: FnOnce(&mut SongLesson) -> Result<()>,
{
    let entry = state.songs.get(user_id).ok_or_else(stale)?;
    let mut active = entry.lock().await;
    if resume_completion(state, user_id, &mut active).await? {
        return Ok(view(&active));
    }

    apply(&mut active.lesson)?;
    after_step(state, user_id, &mut active).await?;
    Ok(view(&active))
}

/// Persist the running counters and complete the lesson once it reaches
/// its last phase.
async fn after_step(state: &AppState, user_id: i64, active: &mut ActiveSongLesson) -> Result<()> {
    if active.lesson.is_complete() {
        complete(state, user_id, active).await
    } else {
        state
            .store
            .update_song_session(active.session_id, &active.lesson.stats)
            .await
    }
}

/// Close the session, credit XP and update the song's memory state.
///
/// Song progress is written last: it is the one write that cannot be
/// repeated safely, so every earlier step is tracked in `writes` and a
/// failed completion can be retried from where it stopped.
async fn complete(state: &AppState, user_id: i64, active: &mut ActiveSongLesson) -> Result<()> {
    if active.completion.is_some() {
        return Ok(());
    }
    let lesson = &active.lesson;
    let writes = &mut active.writes;
    let song_id = lesson.details.song.id;
    let now = state.clock.now();
    let accuracy = lesson.accuracy();
    let xp = lesson.xp();

    if !writes.session_closed {
        writes.owes_xp = state
            .store
            .complete_song_session(active.session_id, &lesson.stats, xp, now)
            .await?;
        writes.session_closed = true;
    }
    if writes.owes_xp && !writes.xp_added {
        state.store.add_xp(user_id, xp).await?;
        writes.xp_added = true;
    }
    if writes.owes_xp && !writes.daily_logged {
        state
            .store
            .increment_daily(user_id, state.clock.today(), DailyDelta::xp_only(xp))
            .await?;
        writes.daily_logged = true;
    }

    let progress = state.store.get_or_create_song_progress(user_id, song_id).await?;
    let updated = apply_song_result(&progress, lesson.mode, accuracy, now);
    state.store.upsert_song_progress(&updated).await?;

    let percent = lesson.accuracy_percent();
    let stats = lesson.stats;
    tracing::info!(
        user_id,
        song_id,
        mode = lesson.mode.as_str(),
        accuracy = percent,
        xp,
        next_review = ?updated.due,
        "song lesson complete"
    );

    active.completion = Some(SongCompletion {
        xp_earned: xp,
        accuracy: percent,
        message: completion_message(percent).to_string(),
        vocab_correct: stats.vocab_correct,
        vocab_total: stats.vocab_reviewed,
        blanks_correct: stats.blanks_correct,
        blanks_total: stats.blanks_total,
        lines_studied: stats.lines_studied,
        next_review: updated.due,
    });

    promote_vocab(state, song_id).await;
    Ok(())
}

/// Client view of the lesson. Blank answers are withheld.
pub fn view(active: &ActiveSongLesson) -> SongLessonView {
    let lesson = &active.lesson;
    let blank = lesson.current_blank().map(|blank| {
        let line = lesson.details.lines.get(blank.line_index);
        SongBlankView {
            line_id: blank.line_id,
            display: blank.display.clone(),
            english_text: line.and_then(|l| l.english_text.clone()),
            start_time_ms: line.map_or(0, |l| l.start_time_ms),
            end_time_ms: line.map_or(0, |l| l.end_time_ms),
        }
    });
    let lines = if lesson.phase.is_listen() {
        lesson.details.lines.clone()
    } else {
        Vec::new()
    };

    SongLessonView {
        song: lesson.details.song.clone(),
        mode: lesson.mode,
        phase: lesson.phase,
        index: lesson.index,
        phase_len: lesson.phase_len(),
        estimated_minutes: lesson.estimated_minutes,
        stats: lesson.stats,
        vocab: lesson.current_vocab().cloned(),
        line: lesson.current_line().cloned(),
        blank,
        lines,
        completion: active.completion.clone(),
    }
}
