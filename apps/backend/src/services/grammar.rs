//! Grammar tips for single cards and for the active lesson.

use palabra_core::grammar::{group_by_difficulty, lesson_tips as tips_from_rules, CARD_TIP_MAX_LEN};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::services::cards::with_deadline;
use crate::store::GrammarStore;
use crate::AppState;

/// Tip for a card from its linked rule. Without one, a rule is generated
/// and linked on the spot; the fallback tip covers everything else.
pub async fn tip_for_card(state: &AppState, card: &Card) -> Result<GrammarTip> {
    if let Some(rule) = state.store.grammar_for_card(card.id).await? {
        return Ok(GrammarTip::from_rule(&rule, CARD_TIP_MAX_LEN, usize::MAX));
    }
    Ok(match generate_rule(state, card).await? {
        Some(rule) => GrammarTip::from_rule(&rule, CARD_TIP_MAX_LEN, usize::MAX),
        None => GrammarTip::fallback(),
    })
}

/// Up to two tips for the rules behind the active lesson's cards. When none
/// of its cards has a rule yet, one is generated in the background for the
/// first new card so the next look has something to show.
pub async fn lesson_tips(state: &AppState, user_id: i64) -> Result<Vec<GrammarTip>> {
    let entry = state
        .lessons
        .get(user_id)
        .ok_or_else(|| ApiError::StaleSession("no active lesson, start a new one".to_string()))?;
    let cards: Vec<LessonCard> = entry.lock().await.progress().lesson().cards.clone();

    let ids: Vec<i64> = cards.iter().map(|c| c.card.card.id).collect();
    let linked = state.store.grammar_for_cards(&ids).await?;
    let tips = tips_from_rules(ids.iter().filter_map(|id| linked.get(id)));

    if tips.is_empty() {
        if let Some(first_new) = cards.into_iter().find(|c| c.is_new) {
            spawn_rule_generation(state, first_new.card.card);
        }
    }
    Ok(tips)
}

/// Every rule grouped by difficulty, easiest first.
pub async fn rules_by_difficulty(state: &AppState) -> Result<Vec<GrammarLevel>> {
    let rules = state.store.all_grammar_rules().await?;
    Ok(group_by_difficulty(rules))
}

pub async fn rule_detail(state: &AppState, rule_key: &str) -> Result<GrammarRuleDetail> {
    let rule = state
        .store
        .grammar_rule_by_key(rule_key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Grammar rule {}", rule_key)))?;
    let cards = state.store.cards_for_grammar_rule(rule.id).await?;
    Ok(GrammarRuleDetail { rule, cards })
}

/// Ask the enricher for the card's rule, then store and link it. `None`
/// when no enricher is configured or the call fails.
async fn generate_rule(state: &AppState, card: &Card) -> Result<Option<GrammarRule>> {
    let Some(enricher) = state.enricher.clone() else {
        return Ok(None);
    };
    let generated = with_deadline(state.enrichment_timeout(), enricher.generate_grammar(card)).await;
    let raw = match generated {
        Ok(raw) if raw.is_well_formed() => raw.normalized(),
        Ok(_) => {
            tracing::warn!(card_id = card.id, "generated grammar rule is incomplete");
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!(card_id = card.id, error = %e, "grammar generation failed");
            return Ok(None);
        }
    };

    let rule = state.store.save_grammar_rule(&raw, state.clock.now()).await?;
    state.store.link_card_grammar(card.id, rule.id).await?;
    tracing::info!(card_id = card.id, rule_key = %rule.rule_key, "grammar rule linked");
    Ok(Some(rule))
}

fn spawn_rule_generation(state: &AppState, card: Card) {
    if state.enricher.is_none() {
        return;
    }
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = generate_rule(&state, &card).await {
            tracing::warn!(card_id = card.id, error = %e, "failed to store grammar rule");
        }
    });
}
