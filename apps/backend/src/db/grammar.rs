use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{placeholders, Database, CARD_COLUMNS};
use crate::error::{ApiError, Result};
use crate::models::*;
use crate::store::GrammarStore;

const RULE_COLUMNS: &str = "gr.id, gr.rule_key, gr.title, gr.explanation, gr.examples_json, \
     gr.difficulty, gr.created_at";

#[derive(FromRow)]
struct DbCardGrammar {
    card_id: i64,
    #[sqlx(flatten)]
    rule: DbGrammarRule,
}

#[async_trait]
impl GrammarStore for Database {
    async fn save_grammar_rule(&self, rule: &NewGrammarRule, now: DateTime<Utc>) -> Result<GrammarRule> {
        let examples = serde_json::to_string(&rule.examples)
            .map_err(|e| ApiError::Internal(format!("grammar examples: {}", e)))?;
        let row = sqlx::query_as::<_, DbGrammarRule>(
            r#"
            INSERT INTO grammar_rules (rule_key, title, explanation, examples_json, difficulty, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(rule_key) DO UPDATE SET
                title = excluded.title,
                explanation = excluded.explanation,
                examples_json = excluded.examples_json,
                difficulty = excluded.difficulty
            RETURNING id, rule_key, title, explanation, examples_json, difficulty, created_at
            "#,
        )
        .bind(&rule.rule_key)
        .bind(&rule.title)
        .bind(&rule.explanation)
        .bind(examples)
        .bind(rule.difficulty)
        .bind(format_ts(now))
        .fetch_one(self.pool())
        .await?;
        row.into_rule()
    }

    async fn link_card_grammar(&self, card_id: i64, rule_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO card_grammar (card_id, grammar_rule_id) VALUES (?, ?)")
            .bind(card_id)
            .bind(rule_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn grammar_for_card(&self, card_id: i64) -> Result<Option<GrammarRule>> {
        let sql = format!(
            "SELECT {} FROM grammar_rules gr \
             JOIN card_grammar cg ON cg.grammar_rule_id = gr.id \
             WHERE cg.card_id = ? ORDER BY gr.id LIMIT 1",
            RULE_COLUMNS
        );
        sqlx::query_as::<_, DbGrammarRule>(&sql)
            .bind(card_id)
            .fetch_optional(self.pool())
            .await?
            .map(DbGrammarRule::into_rule)
            .transpose()
    }

    async fn grammar_for_cards(&self, card_ids: &[i64]) -> Result<HashMap<i64, GrammarRule>> {
        if card_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT cg.card_id, {} FROM card_grammar cg \
             JOIN grammar_rules gr ON gr.id = cg.grammar_rule_id \
             WHERE cg.card_id IN ({}) ORDER BY cg.card_id, gr.id",
            RULE_COLUMNS,
            placeholders(card_ids.len())
        );
        let mut query = sqlx::query_as::<_, DbCardGrammar>(&sql);
        for id in card_ids {
            query = query.bind(*id);
        }

        let mut rules = HashMap::new();
        for row in query.fetch_all(self.pool()).await? {
            if !rules.contains_key(&row.card_id) {
                rules.insert(row.card_id, row.rule.into_rule()?);
            }
        }
        Ok(rules)
    }

    async fn grammar_rule_by_key(&self, rule_key: &str) -> Result<Option<GrammarRule>> {
        let sql = format!("SELECT {} FROM grammar_rules gr WHERE gr.rule_key = ?", RULE_COLUMNS);
        sqlx::query_as::<_, DbGrammarRule>(&sql)
            .bind(rule_key)
            .fetch_optional(self.pool())
            .await?
            .map(DbGrammarRule::into_rule)
            .transpose()
    }

    async fn all_grammar_rules(&self) -> Result<Vec<GrammarRule>> {
        let sql = format!(
            "SELECT {} FROM grammar_rules gr ORDER BY gr.difficulty, gr.title",
            RULE_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbGrammarRule>(&sql)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(DbGrammarRule::into_rule).collect()
    }

    async fn cards_for_grammar_rule(&self, rule_id: i64) -> Result<Vec<Card>> {
        let sql = format!(
            "SELECT {} FROM cards c \
             JOIN card_grammar cg ON cg.card_id = c.id \
             WHERE cg.grammar_rule_id = ? \
             ORDER BY c.frequency_rank IS NULL, c.frequency_rank, c.id",
            CARD_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbCard>(&sql)
            .bind(rule_id)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(DbCard::into_card).collect()
    }
}
