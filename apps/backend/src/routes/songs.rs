//! Song catalogue endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::services::{lyrics, songs};
use crate::store::SongStore;
use crate::AppState;

/// GET /api/songs
pub async fn list(State(state): State<AppState>) -> Result<Json<SongListResponse>> {
    let user_id = state.user_id();
    let now = state.clock.now();
    let songs = state.store.songs_with_progress(user_id, now).await?;
    let due = state.store.due_songs(user_id, now).await?;
    Ok(Json(SongListResponse { songs, due }))
}

/// POST /api/songs
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewSong>,
) -> Result<(StatusCode, Json<SongDetails>)> {
    if payload.title.trim().is_empty() || payload.artist.trim().is_empty() {
        return Err(ApiError::BadRequest("title and artist are required".to_string()));
    }
    if let Some(vocab) = payload
        .vocabulary
        .iter()
        .find(|v| v.word.trim().is_empty() || v.translation.trim().is_empty())
    {
        return Err(ApiError::BadRequest(format!(
            "vocabulary entry '{}' needs a word and a translation",
            vocab.word
        )));
    }

    let song = state.store.create_song(&payload, state.clock.now()).await?;
    tracing::info!(song_id = song.id, title = %song.title, "song created");
    let details = state
        .store
        .get_song_with_details(song.id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Song {} vanished after insert", song.id)))?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /api/songs/:id
pub async fn get(
    State(state): State<AppState>,
    Path(song_id): Path<i64>,
) -> Result<Json<SongDetails>> {
    let details = state
        .store
        .get_song_with_details(song_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Song {}", song_id)))?;
    Ok(Json(details))
}

/// POST /api/songs/:id/lyrics
pub async fn import_lyrics(
    State(state): State<AppState>,
    Path(song_id): Path<i64>,
) -> Result<Json<Vec<SongLine>>> {
    let lines = lyrics::import_lyrics(&state, song_id).await?;
    Ok(Json(lines))
}

/// POST /api/songs/:id/start
pub async fn start(
    State(state): State<AppState>,
    Path(song_id): Path<i64>,
    Query(query): Query<StartSongQuery>,
) -> Result<Json<SongLessonView>> {
    let mode = match query.mode.as_deref() {
        None | Some("") => SongMode::default(),
        Some(raw) => raw.parse::<SongMode>()?,
    };
    let view = songs::start(&state, state.user_id(), song_id, mode).await?;
    Ok(Json(view))
}
