//! Settings endpoints

use axum::{extract::State, Json};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::store::SettingsStore;
use crate::AppState;

/// GET /api/settings
pub async fn get(State(state): State<AppState>) -> Result<Json<UserSettings>> {
    let settings = state.store.user_settings(state.user_id()).await?;
    Ok(Json(settings))
}

/// PUT /api/settings
pub async fn update(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<UserSettings>> {
    let user_id = state.user_id();
    let mut current = state.store.user_settings(user_id).await?;

    // Apply updates
    if let Some(daily_goal) = request.daily_goal {
        current.daily_goal = daily_goal;
    }
    if let Some(new_cards_per_day) = request.new_cards_per_day {
        current.new_cards_per_day = new_cards_per_day;
    }
    if let Some(reviews_per_session) = request.reviews_per_session {
        current.reviews_per_session = reviews_per_session;
    }
    if let Some(default_mode) = request.default_mode {
        current.default_mode = default_mode
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("unknown practice mode: {}", default_mode)))?;
    }
    if let Some(target_retention) = request.target_retention {
        current.target_retention = target_retention;
    }
    if let Some(enable_tts) = request.enable_tts {
        current.enable_tts = enable_tts;
    }
    if let Some(show_bridges) = request.show_bridges {
        current.show_bridges = show_bridges;
    }
    current.validate()?;

    // Save
    state.store.save_user_settings(user_id, &current).await?;
    tracing::info!(user_id, daily_goal = current.daily_goal, mode = current.default_mode.as_str(), "settings saved");

    Ok(Json(current))
}
