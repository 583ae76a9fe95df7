use async_trait::async_trait;
use chrono::Utc;

use super::Database;
use crate::error::{ApiError, Result};
use crate::models::*;
use crate::store::CardStore;

const CARD_SELECT: &str = "SELECT id, term, translation, example, island_id, frequency_rank, \
     source, source_song_id, created_at FROM cards";

#[async_trait]
impl CardStore for Database {
    async fn get_card(&self, id: i64) -> Result<Option<Card>> {
        let sql = format!("{} WHERE id = ?", CARD_SELECT);
        sqlx::query_as::<_, DbCard>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .map(DbCard::into_card)
            .transpose()
    }

    async fn create_card(&self, card: &NewCard) -> Result<Card> {
        let row = sqlx::query_as::<_, DbCard>(
            r#"
            INSERT INTO cards (term, translation, example, island_id, frequency_rank, source,
                               source_song_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, term, translation, example, island_id, frequency_rank, source,
                      source_song_id, created_at
            "#,
        )
        .bind(&card.term)
        .bind(&card.translation)
        .bind(&card.example)
        .bind(card.island_id)
        .bind(card.frequency_rank)
        .bind(card.source.as_str())
        .bind(card.source_song_id)
        .bind(format_ts(Utc::now()))
        .fetch_one(self.pool())
        .await?;
        row.into_card()
    }

    async fn update_card(&self, card: &Card) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cards
            SET term = ?, translation = ?, example = ?, island_id = ?, frequency_rank = ?,
                source = ?, source_song_id = ?
            WHERE id = ?
            "#,
        )
        .bind(&card.term)
        .bind(&card.translation)
        .bind(&card.example)
        .bind(card.island_id)
        .bind(card.frequency_rank)
        .bind(card.source.as_str())
        .bind(card.source_song_id)
        .bind(card.id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Card {}", card.id)));
        }
        Ok(())
    }

    async fn update_card_example(&self, id: i64, example: &str) -> Result<()> {
        sqlx::query("UPDATE cards SET example = ? WHERE id = ?")
            .bind(example)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn delete_card(&self, id: i64) -> Result<bool> {
        // Dependent rows go through ON DELETE CASCADE / SET NULL.
        let result = sqlx::query("DELETE FROM cards WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_cards(&self, query: &str, island: Option<i64>, limit: i64) -> Result<Vec<Card>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let sql = format!(
            "{} WHERE (lower(term) LIKE ? OR lower(translation) LIKE ?) \
             AND (? IS NULL OR island_id = ?) \
             ORDER BY frequency_rank IS NULL, frequency_rank, id LIMIT ?",
            CARD_SELECT
        );
        let rows = sqlx::query_as::<_, DbCard>(&sql)
            .bind(&pattern)
            .bind(&pattern)
            .bind(island)
            .bind(island)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(DbCard::into_card).collect()
    }

    async fn list_cards(&self, limit: i64, offset: i64) -> Result<Vec<Card>> {
        let sql = format!("{} ORDER BY id LIMIT ? OFFSET ?", CARD_SELECT);
        let rows = sqlx::query_as::<_, DbCard>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(DbCard::into_card).collect()
    }

    async fn cards_by_island(&self, island: i64) -> Result<Vec<Card>> {
        let sql = format!(
            "{} WHERE island_id = ? ORDER BY frequency_rank IS NULL, frequency_rank, id",
            CARD_SELECT
        );
        let rows = sqlx::query_as::<_, DbCard>(&sql)
            .bind(island)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(DbCard::into_card).collect()
    }

    async fn count_cards(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cards")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    async fn random_translations(&self, exclude: i64, n: usize) -> Result<Vec<String>> {
        let translations = sqlx::query_scalar::<_, String>(
            "SELECT translation FROM cards WHERE id != ? ORDER BY RANDOM() LIMIT ?",
        )
        .bind(exclude)
        .bind(n as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(translations)
    }

    async fn card_bridges(&self, card_id: i64) -> Result<Option<Bridges>> {
        let row: Option<(Option<String>, Option<String>, Option<String>)> =
            sqlx::query_as("SELECT hindi, dutch, english FROM card_bridges WHERE card_id = ?")
                .bind(card_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|(hindi, dutch, english)| Bridges {
            hindi,
            dutch,
            english,
        }))
    }

    async fn save_bridges(&self, card_id: i64, bridges: &Bridges) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO card_bridges (card_id, hindi, dutch, english)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(card_id) DO UPDATE SET
                hindi = excluded.hindi,
                dutch = excluded.dutch,
                english = excluded.english
            "#,
        )
        .bind(card_id)
        .bind(&bridges.hindi)
        .bind(&bridges.dutch)
        .bind(&bridges.english)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn cached_question(&self, card_id: i64, mode: PracticeMode) -> Result<Option<Question>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT question_json FROM card_questions WHERE card_id = ? AND mode = ?")
                .bind(card_id)
                .bind(mode.as_str())
                .fetch_optional(self.pool())
                .await?;

        match raw {
            None => Ok(None),
            Some(raw) => match serde_json::from_str::<Question>(&raw) {
                Ok(question) => Ok(Some(question)),
                Err(e) => {
                    tracing::warn!(card_id, mode = mode.as_str(), error = %e, "discarding unreadable cached question");
                    Ok(None)
                }
            },
        }
    }

    async fn save_question(&self, card_id: i64, question: &Question) -> Result<()> {
        let raw = serde_json::to_string(question)
            .map_err(|e| ApiError::Internal(format!("encode question: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO card_questions (card_id, mode, question_json, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(card_id, mode) DO UPDATE SET
                question_json = excluded.question_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(card_id)
        .bind(question.mode().as_str())
        .bind(raw)
        .bind(format_ts(Utc::now()))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
