//! Card content: practice questions, bridges and examples.
//!
//! Lookups answer from the store or a local fallback straight away. Calls to
//! the enricher run in detached tasks under the configured deadline and only
//! ever write to the store for the next time round.

use std::future::Future;

use palabra_core::questions::PLACEHOLDER_DISTRACTORS;

use crate::error::Result;
use crate::models::*;
use crate::services::enrichment::EnrichmentError;
use crate::store::CardStore;
use crate::AppState;

/// Practice question for a card shown in `mode`, or `None` for flashcard
/// modes. Falls back to a locally built question when nothing is cached.
pub async fn question_for(state: &AppState, card: &Card, mode: PracticeMode) -> Result<Option<Question>> {
    if !mode.needs_question() {
        return Ok(None);
    }
    if let Some(cached) = state.store.cached_question(card.id, mode).await? {
        return Ok(Some(cached));
    }

    let distractors = if mode == PracticeMode::Mcq {
        state
            .store
            .random_translations(card.id, PLACEHOLDER_DISTRACTORS.len())
            .await?
    } else {
        Vec::new()
    };
    let question = Question::fallback(mode, card, &distractors, &mut rand::rng());

    spawn_question_generation(state, card.clone(), mode);
    Ok(question)
}

/// Generate and cache an AI question in the background.
pub fn spawn_question_generation(state: &AppState, card: Card, mode: PracticeMode) {
    let Some(enricher) = state.enricher.clone() else {
        return;
    };
    let store = state.store.clone();
    let timeout = state.enrichment_timeout();

    tokio::spawn(async move {
        let generated = with_deadline(timeout, enricher.generate_question(&card, mode)).await;
        match generated {
            Ok(question) => {
                if let Err(e) = store.save_question(card.id, &question).await {
                    tracing::warn!(card_id = card.id, error = %e, "failed to cache question");
                } else {
                    tracing::debug!(card_id = card.id, mode = mode.as_str(), "question cached");
                }
            }
            Err(e) => {
                tracing::warn!(card_id = card.id, mode = mode.as_str(), error = %e, "question generation failed");
            }
        }
    });
}

/// Fill in missing bridges and example sentence for a card.
///
/// Returns which parts were generated. Enricher failures are logged and
/// leave the card as it was.
pub async fn enrich_card(state: &AppState, card: &Card) -> Result<(bool, bool)> {
    let Some(enricher) = state.enricher.clone() else {
        return Ok((false, false));
    };
    let timeout = state.enrichment_timeout();

    let mut bridged = false;
    if state.store.card_bridges(card.id).await?.is_none() {
        match with_deadline(timeout, enricher.generate_bridges(&card.term, &card.translation)).await {
            Ok(bridges) if !bridges.is_empty() => {
                state.store.save_bridges(card.id, &bridges).await?;
                bridged = true;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(card_id = card.id, error = %e, "bridge generation failed"),
        }
    }

    let mut exemplified = false;
    if card.example.as_deref().map_or(true, |e| e.trim().is_empty()) {
        match with_deadline(timeout, enricher.generate_example(&card.term, &card.translation)).await {
            Ok(example) => {
                state.store.update_card_example(card.id, &example).await?;
                exemplified = true;
            }
            Err(e) => tracing::warn!(card_id = card.id, error = %e, "example generation failed"),
        }
    }

    tracing::info!(card_id = card.id, bridged, exemplified, "card enriched");
    Ok((bridged, exemplified))
}

/// Run [`enrich_card`] in a detached task. Returns `false` when no enricher
/// is configured.
pub fn spawn_card_enrichment(state: &AppState, card: Card) -> bool {
    if state.enricher.is_none() {
        return false;
    }
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = enrich_card(&state, &card).await {
            tracing::warn!(card_id = card.id, error = %e, "card enrichment failed");
        }
    });
    true
}

pub(crate) async fn with_deadline<T, F>(timeout: std::time::Duration, call: F) -> std::result::Result<T, EnrichmentError>
where
    F: Future<Output = std::result::Result<T, EnrichmentError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(EnrichmentError::Timeout))
}
