//! Free practice endpoints

use axum::{extract::State, Json};

use crate::error::Result;
use crate::models::*;
use crate::services::practice;
use crate::AppState;

/// POST /api/practice/start
pub async fn start(
    State(state): State<AppState>,
    payload: Option<Json<StartPracticeRequest>>,
) -> Result<Json<LessonStep>> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let step = practice::start(&state, state.user_id(), request.max_cards).await?;
    Ok(Json(step))
}

/// GET /api/practice/current
pub async fn current(State(state): State<AppState>) -> Result<Json<LessonCardView>> {
    let view = practice::current(&state, state.user_id()).await?;
    Ok(Json(view))
}

/// POST /api/practice/review
pub async fn review(
    State(state): State<AppState>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<LessonStep>> {
    let step = practice::review(&state, state.user_id(), payload).await?;
    Ok(Json(step))
}

/// POST /api/practice/skip
pub async fn skip(State(state): State<AppState>) -> Result<Json<LessonStep>> {
    let step = practice::skip(&state, state.user_id()).await?;
    Ok(Json(step))
}

/// GET /api/practice/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<PracticeStats>> {
    let stats = practice::stats(&state, state.user_id()).await?;
    Ok(Json(stats))
}
