//! Daily lesson endpoints

use axum::{extract::State, Json};

use crate::error::Result;
use crate::models::*;
use crate::services::runner;
use crate::AppState;

/// POST /api/lesson/start
pub async fn start(State(state): State<AppState>) -> Result<Json<LessonStep>> {
    let step = runner::start(&state, state.user_id()).await?;
    Ok(Json(step))
}

/// GET /api/lesson/current
pub async fn current(State(state): State<AppState>) -> Result<Json<LessonCardView>> {
    let view = runner::current(&state, state.user_id()).await?;
    Ok(Json(view))
}

/// POST /api/lesson/review
pub async fn review(
    State(state): State<AppState>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<LessonStep>> {
    let step = runner::review(&state, state.user_id(), payload).await?;
    Ok(Json(step))
}

/// POST /api/lesson/skip
pub async fn skip(State(state): State<AppState>) -> Result<Json<LessonStep>> {
    let step = runner::skip(&state, state.user_id()).await?;
    Ok(Json(step))
}
