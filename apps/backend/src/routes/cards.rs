//! Card management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::services::cards;
use crate::store::{CardStore, ProgressStore};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// GET /api/cards
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<CardListQuery>,
) -> Result<Json<Vec<Card>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let search = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let cards = if search.is_some() || query.island.is_some() {
        state
            .store
            .search_cards(search.unwrap_or(""), query.island, limit)
            .await?
    } else {
        let offset = query.offset.unwrap_or(0).max(0);
        state.store.list_cards(limit, offset).await?
    };
    Ok(Json(cards))
}

/// POST /api/cards
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewCard>,
) -> Result<(StatusCode, Json<Card>)> {
    if payload.term.trim().is_empty() || payload.translation.trim().is_empty() {
        return Err(ApiError::BadRequest("term and translation are required".to_string()));
    }
    let card = state.store.create_card(&payload).await?;
    tracing::info!(card_id = card.id, term = %card.term, "card created");
    Ok((StatusCode::CREATED, Json(card)))
}

/// GET /api/cards/:id
pub async fn get(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
) -> Result<Json<CardDetail>> {
    let card = find(&state, card_id).await?;
    let bridges = state.store.card_bridges(card_id).await?;
    let progress = state.store.get_progress(state.user_id(), card_id).await?;
    Ok(Json(CardDetail {
        card,
        bridges,
        progress,
    }))
}

/// DELETE /api/cards/:id
pub async fn delete(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
) -> Result<StatusCode> {
    if !state.store.delete_card(card_id).await? {
        return Err(ApiError::NotFound(format!("Card {}", card_id)));
    }
    tracing::info!(card_id, "card deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/cards/:id/enrich
pub async fn enrich(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
) -> Result<(StatusCode, Json<EnrichResponse>)> {
    let card = find(&state, card_id).await?;
    let queued = cards::spawn_card_enrichment(&state, card);
    let status = if queued {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(EnrichResponse { queued })))
}

async fn find(state: &AppState, card_id: i64) -> Result<Card> {
    state
        .store
        .get_card(card_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Card {}", card_id)))
}
