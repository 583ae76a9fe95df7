use async_trait::async_trait;
use chrono::NaiveDate;

use super::Database;
use crate::error::{ApiError, Result};
use crate::models::*;
use crate::store::ActivityStore;

#[async_trait]
impl ActivityStore for Database {
    async fn log_review(&self, log: &ReviewLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO review_logs (user_id, card_id, rating, elapsed_days, scheduled_days,
                                     duration_ms, reviewed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.user_id)
        .bind(log.card_id)
        .bind(i64::from(log.rating.to_value()))
        .bind(log.elapsed_days)
        .bind(log.scheduled_days)
        .bind(log.duration_ms)
        .bind(format_ts(log.reviewed_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn count_reviews(&self, user_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_logs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    async fn increment_daily(&self, user_id: i64, date: NaiveDate, delta: DailyDelta) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_logs (user_id, date, xp_earned, cards_reviewed, cards_correct, new_cards_added)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, date) DO UPDATE SET
                xp_earned = xp_earned + excluded.xp_earned,
                cards_reviewed = cards_reviewed + excluded.cards_reviewed,
                cards_correct = cards_correct + excluded.cards_correct,
                new_cards_added = new_cards_added + excluded.new_cards_added
            "#,
        )
        .bind(user_id)
        .bind(format_date(date))
        .bind(delta.xp_earned)
        .bind(delta.cards_reviewed)
        .bind(delta.cards_correct)
        .bind(delta.new_cards_added)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn daily_log(&self, user_id: i64, date: NaiveDate) -> Result<Option<DailyLog>> {
        sqlx::query_as::<_, DbDailyLog>(
            r#"
            SELECT user_id, date, xp_earned, cards_reviewed, cards_correct, new_cards_added
            FROM daily_logs
            WHERE user_id = ? AND date = ?
            "#,
        )
        .bind(user_id)
        .bind(format_date(date))
        .fetch_optional(self.pool())
        .await?
        .map(DbDailyLog::into_daily_log)
        .transpose()
    }

    async fn daily_logs_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<DailyLog>> {
        let rows = sqlx::query_as::<_, DbDailyLog>(
            r#"
            SELECT user_id, date, xp_earned, cards_reviewed, cards_correct, new_cards_added
            FROM daily_logs
            WHERE user_id = ? AND date >= ?
            ORDER BY date
            "#,
        )
        .bind(user_id)
        .bind(format_date(since))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(DbDailyLog::into_daily_log).collect()
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, DbUser>(
            r#"
            SELECT id, name, total_xp, current_streak, longest_streak, last_active_date
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .map(DbUser::into_user)
        .transpose()
    }

    async fn add_xp(&self, user_id: i64, xp: i64) -> Result<()> {
        let result = sqlx::query("UPDATE users SET total_xp = total_xp + ? WHERE id = ?")
            .bind(xp)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }

    async fn update_streak(&self, user_id: i64, streak: StreakInfo) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET current_streak = ?, longest_streak = ?, last_active_date = ?
            WHERE id = ?
            "#,
        )
        .bind(streak.current_streak)
        .bind(streak.longest_streak)
        .bind(streak.last_active_date.map(format_date))
        .bind(user_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }

    async fn streak_info(&self, user_id: i64) -> Result<StreakInfo> {
        self.get_user(user_id)
            .await?
            .map(|user| user.streak_info())
            .ok_or_else(|| ApiError::NotFound(format!("User {}", user_id)))
    }
}
