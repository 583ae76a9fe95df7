use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::Database;
use crate::error::{ApiError, Result};
use crate::models::*;
use crate::store::JourneyStore;

const SESSION_COLUMNS: &str = "id, user_id, date, day_number, phase_id, cards_reviewed, \
     cards_correct, new_cards_learned, xp_earned, completed_at";

#[async_trait]
impl JourneyStore for Database {
    async fn get_or_create_journey(&self, user_id: i64, today: NaiveDate) -> Result<Journey> {
        let existing = sqlx::query_as::<_, DbJourney>(
            "SELECT id, user_id, start_date, is_active FROM journeys WHERE user_id = ? AND is_active = 1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        if let Some(journey) = existing {
            return journey.into_journey();
        }

        let created = sqlx::query_as::<_, DbJourney>(
            r#"
            INSERT INTO journeys (user_id, start_date, is_active)
            VALUES (?, ?, 1)
            RETURNING id, user_id, start_date, is_active
            "#,
        )
        .bind(user_id)
        .bind(format_date(today))
        .fetch_one(self.pool())
        .await?;
        tracing::info!(user_id, start = %today, "started journey");
        created.into_journey()
    }

    async fn today_lesson_session(&self, user_id: i64, date: NaiveDate) -> Result<Option<LessonSession>> {
        let sql = format!(
            "SELECT {} FROM lesson_sessions WHERE user_id = ? AND date = ?",
            SESSION_COLUMNS
        );
        sqlx::query_as::<_, DbLessonSession>(&sql)
            .bind(user_id)
            .bind(format_date(date))
            .fetch_optional(self.pool())
            .await?
            .map(DbLessonSession::into_session)
            .transpose()
    }

    async fn create_lesson_session(
        &self,
        user_id: i64,
        date: NaiveDate,
        day_number: i64,
        phase_id: i64,
    ) -> Result<LessonSession> {
        // An existing row for the date is returned as is.
        let sql = format!(
            "INSERT INTO lesson_sessions (user_id, date, day_number, phase_id) VALUES (?, ?, ?, ?) \
             ON CONFLICT(user_id, date) DO UPDATE SET user_id = user_id \
             RETURNING {}",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, DbLessonSession>(&sql)
            .bind(user_id)
            .bind(format_date(date))
            .bind(day_number)
            .bind(phase_id)
            .fetch_one(self.pool())
            .await?;
        row.into_session()
    }

    async fn update_lesson_session(&self, id: i64, totals: LessonTotals) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE lesson_sessions
            SET cards_reviewed = ?, cards_correct = ?, new_cards_learned = ?, xp_earned = ?
            WHERE id = ?
            "#,
        )
        .bind(totals.cards_reviewed)
        .bind(totals.cards_correct)
        .bind(totals.new_cards_learned)
        .bind(totals.xp_earned)
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Lesson session {}", id)));
        }
        Ok(())
    }

    async fn complete_lesson_session(&self, id: i64, totals: LessonTotals, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE lesson_sessions
            SET cards_reviewed = ?, cards_correct = ?, new_cards_learned = ?, xp_earned = ?,
                completed_at = ?
            WHERE id = ? AND completed_at IS NULL
            "#,
        )
        .bind(totals.cards_reviewed)
        .bind(totals.cards_correct)
        .bind(totals.new_cards_learned)
        .bind(totals.xp_earned)
        .bind(format_ts(now))
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recent_lesson_sessions(&self, user_id: i64, limit: i64) -> Result<Vec<LessonSession>> {
        let sql = format!(
            "SELECT {} FROM lesson_sessions WHERE user_id = ? ORDER BY date DESC LIMIT ?",
            SESSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbLessonSession>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(DbLessonSession::into_session).collect()
    }
}
