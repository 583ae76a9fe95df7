use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{card_with_progress_select, placeholders, Database};
use crate::error::Result;
use crate::models::*;
use crate::store::ProgressStore;

/// Non-new progress due at the bound time, compared to the whole second.
const DUE_FILTER: &str = "p.state != 'new' AND p.due IS NOT NULL \
     AND substr(p.due, 1, 19) <= substr(?, 1, 19)";

const NEW_FILTER: &str = "(p.card_id IS NULL OR p.state = 'new')";

const BY_FREQUENCY: &str = "ORDER BY c.frequency_rank IS NULL, c.frequency_rank, c.id";

fn into_cards(rows: Vec<DbCardWithProgress>) -> Result<Vec<CardWithProgress>> {
    rows.into_iter()
        .map(DbCardWithProgress::into_card_with_progress)
        .collect()
}

impl Database {
    async fn due_by_source(
        &self,
        user_id: i64,
        source: CardSource,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CardWithProgress>> {
        let sql = format!(
            "{} WHERE c.source = ? AND {} ORDER BY p.due, c.id LIMIT ?",
            card_with_progress_select(),
            DUE_FILTER
        );
        let rows = sqlx::query_as::<_, DbCardWithProgress>(&sql)
            .bind(user_id)
            .bind(source.as_str())
            .bind(format_ts(now))
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        into_cards(rows)
    }
}

#[async_trait]
impl ProgressStore for Database {
    async fn get_progress(&self, user_id: i64, card_id: i64) -> Result<Option<CardProgress>> {
        sqlx::query_as::<_, DbCardProgress>(
            r#"
            SELECT user_id, card_id, stability, difficulty, elapsed_days, scheduled_days,
                   reps, lapses, state, due, last_review
            FROM card_progress
            WHERE user_id = ? AND card_id = ?
            "#,
        )
        .bind(user_id)
        .bind(card_id)
        .fetch_optional(self.pool())
        .await?
        .map(DbCardProgress::into_progress)
        .transpose()
    }

    async fn upsert_progress(&self, progress: &CardProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO card_progress (user_id, card_id, stability, difficulty, elapsed_days,
                                       scheduled_days, reps, lapses, state, due, last_review)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, card_id) DO UPDATE SET
                stability = excluded.stability,
                difficulty = excluded.difficulty,
                elapsed_days = excluded.elapsed_days,
                scheduled_days = excluded.scheduled_days,
                reps = excluded.reps,
                lapses = excluded.lapses,
                state = excluded.state,
                due = excluded.due,
                last_review = excluded.last_review
            "#,
        )
        .bind(progress.user_id)
        .bind(progress.card_id)
        .bind(progress.stability)
        .bind(progress.difficulty)
        .bind(progress.elapsed_days)
        .bind(progress.scheduled_days)
        .bind(progress.reps)
        .bind(progress.lapses)
        .bind(progress.state.as_str())
        .bind(progress.due.map(format_ts))
        .bind(progress.last_review.map(format_ts))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn due_cards(&self, user_id: i64, now: DateTime<Utc>, limit: i64) -> Result<Vec<CardWithProgress>> {
        self.due_by_source(user_id, CardSource::Curriculum, now, limit).await
    }

    async fn count_due(&self, user_id: i64, now: DateTime<Utc>) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM card_progress p JOIN cards c ON c.id = p.card_id \
             WHERE p.user_id = ? AND c.source = 'curriculum' AND {}",
            DUE_FILTER
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(user_id)
            .bind(format_ts(now))
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    async fn new_cards(&self, user_id: i64, limit: i64) -> Result<Vec<CardWithProgress>> {
        let sql = format!(
            "{} WHERE c.source = 'curriculum' AND {} {} LIMIT ?",
            card_with_progress_select(),
            NEW_FILTER,
            BY_FREQUENCY
        );
        let rows = sqlx::query_as::<_, DbCardWithProgress>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        into_cards(rows)
    }

    async fn new_cards_from_islands(
        &self,
        user_id: i64,
        islands: &[i64],
        limit: i64,
    ) -> Result<Vec<CardWithProgress>> {
        if islands.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE c.source = 'curriculum' AND {} AND c.island_id IN ({}) {} LIMIT ?",
            card_with_progress_select(),
            NEW_FILTER,
            placeholders(islands.len()),
            BY_FREQUENCY
        );
        let mut query = sqlx::query_as::<_, DbCardWithProgress>(&sql).bind(user_id);
        for island in islands {
            query = query.bind(*island);
        }
        let rows = query.bind(limit).fetch_all(self.pool()).await?;
        into_cards(rows)
    }

    async fn cards_by_state(&self, user_id: i64, state: CardState, limit: i64) -> Result<Vec<CardWithProgress>> {
        let sql = format!(
            "{} WHERE COALESCE(p.state, 'new') = ? ORDER BY c.id LIMIT ?",
            card_with_progress_select()
        );
        let rows = sqlx::query_as::<_, DbCardWithProgress>(&sql)
            .bind(user_id)
            .bind(state.as_str())
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        into_cards(rows)
    }

    async fn recently_learned(&self, user_id: i64, limit: i64) -> Result<Vec<CardWithProgress>> {
        let sql = format!(
            "{} WHERE p.state IN ('learning', 'review') AND p.last_review IS NOT NULL \
             ORDER BY p.last_review DESC, c.id DESC LIMIT ?",
            card_with_progress_select()
        );
        let rows = sqlx::query_as::<_, DbCardWithProgress>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        into_cards(rows)
    }

    async fn song_vocab_due(&self, user_id: i64, now: DateTime<Utc>, limit: i64) -> Result<Vec<CardWithProgress>> {
        self.due_by_source(user_id, CardSource::Song, now, limit).await
    }

    async fn song_vocab_new(&self, user_id: i64, song_ids: &[i64], limit: i64) -> Result<Vec<CardWithProgress>> {
        if song_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE c.source = 'song' AND {} AND c.source_song_id IN ({}) ORDER BY c.id LIMIT ?",
            card_with_progress_select(),
            NEW_FILTER,
            placeholders(song_ids.len())
        );
        let mut query = sqlx::query_as::<_, DbCardWithProgress>(&sql).bind(user_id);
        for song_id in song_ids {
            query = query.bind(*song_id);
        }
        let rows = query.bind(limit).fetch_all(self.pool()).await?;
        into_cards(rows)
    }

    async fn count_words_learned(&self, user_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM card_progress
            WHERE user_id = ? AND reps > 0 AND state IN ('learning', 'review')
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}
