//! Grammar endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::services::grammar;
use crate::store::CardStore;
use crate::AppState;

/// GET /api/grammar
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<GrammarLevel>>> {
    let levels = grammar::rules_by_difficulty(&state).await?;
    Ok(Json(levels))
}

/// GET /api/grammar/:rule_key
pub async fn get(
    State(state): State<AppState>,
    Path(rule_key): Path<String>,
) -> Result<Json<GrammarRuleDetail>> {
    let detail = grammar::rule_detail(&state, &rule_key).await?;
    Ok(Json(detail))
}

/// GET /api/cards/:id/grammar
pub async fn for_card(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
) -> Result<Json<GrammarTip>> {
    let card = state
        .store
        .get_card(card_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Card {}", card_id)))?;
    let tip = grammar::tip_for_card(&state, &card).await?;
    Ok(Json(tip))
}

/// GET /api/lesson/tips
pub async fn lesson_tips(State(state): State<AppState>) -> Result<Json<Vec<GrammarTip>>> {
    let tips = grammar::lesson_tips(&state, state.user_id()).await?;
    Ok(Json(tips))
}
