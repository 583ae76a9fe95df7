//! Song lesson endpoints

use axum::{extract::State, Json};

use crate::error::Result;
use crate::models::*;
use crate::services::songs;
use crate::AppState;

/// GET /api/song-lesson
pub async fn current(State(state): State<AppState>) -> Result<Json<SongLessonView>> {
    let view = songs::current(&state, state.user_id()).await?;
    Ok(Json(view))
}

/// POST /api/song-lesson/vocab
pub async fn rate_vocab(
    State(state): State<AppState>,
    Json(payload): Json<VocabRatingRequest>,
) -> Result<Json<SongLessonView>> {
    let view = songs::rate_vocab(&state, state.user_id(), payload.rating).await?;
    Ok(Json(view))
}

/// POST /api/song-lesson/next
pub async fn next_phase(State(state): State<AppState>) -> Result<Json<SongLessonView>> {
    let view = songs::next_phase(&state, state.user_id()).await?;
    Ok(Json(view))
}

/// POST /api/song-lesson/next-line
pub async fn next_line(State(state): State<AppState>) -> Result<Json<SongLessonView>> {
    let view = songs::next_line(&state, state.user_id()).await?;
    Ok(Json(view))
}

/// POST /api/song-lesson/skip-line
pub async fn skip_line(State(state): State<AppState>) -> Result<Json<SongLessonView>> {
    let view = songs::skip_line(&state, state.user_id()).await?;
    Ok(Json(view))
}

/// POST /api/song-lesson/blank
pub async fn submit_blank(
    State(state): State<AppState>,
    Json(payload): Json<BlankAnswerRequest>,
) -> Result<Json<BlankResponse>> {
    let response = songs::submit_blank(&state, state.user_id(), &payload.answer).await?;
    Ok(Json(response))
}
