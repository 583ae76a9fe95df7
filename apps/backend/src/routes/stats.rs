//! Progress and gamification endpoints

use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::Result;
use crate::models::*;
use crate::services::accountant;
use crate::AppState;

/// GET /api/stats
pub async fn overview(State(state): State<AppState>) -> Result<Json<GamificationStats>> {
    let stats = accountant::stats(&state, state.user_id()).await?;
    Ok(Json(stats))
}

/// GET /api/stats/today
pub async fn today(State(state): State<AppState>) -> Result<Json<TodayStats>> {
    let today = accountant::today(&state, state.user_id()).await?;
    Ok(Json(today))
}

/// GET /api/stats/heatmap
pub async fn heatmap(
    State(state): State<AppState>,
    Query(query): Query<HeatmapQuery>,
) -> Result<Json<Vec<Vec<HeatmapDay>>>> {
    let grid = accountant::heatmap(&state, state.user_id(), query.weeks).await?;
    Ok(Json(grid))
}

/// GET /api/achievements
pub async fn achievements(State(state): State<AppState>) -> Result<Json<Vec<AchievementStatus>>> {
    let achievements = accountant::achievements(&state, state.user_id()).await?;
    Ok(Json(achievements))
}
