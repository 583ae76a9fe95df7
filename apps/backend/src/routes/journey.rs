//! Journey endpoints

use axum::{extract::State, Json};

use crate::error::Result;
use crate::models::*;
use crate::services::composer;
use crate::AppState;

/// GET /api/journey
pub async fn home(State(state): State<AppState>) -> Result<Json<JourneyHome>> {
    let home = composer::journey_home(&state, state.user_id()).await?;
    Ok(Json(home))
}
