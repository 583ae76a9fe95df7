use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::Database;
use crate::error::Result;
use crate::models::*;
use crate::store::AchievementStore;

#[derive(FromRow)]
struct DbEarned {
    #[sqlx(flatten)]
    achievement: DbAchievement,
    earned_at: String,
}

#[async_trait]
impl AchievementStore for Database {
    async fn all_achievements(&self) -> Result<Vec<Achievement>> {
        let rows = sqlx::query_as::<_, DbAchievement>(
            r#"
            SELECT id, code, name, description, icon, condition_type, threshold, xp_reward
            FROM achievements
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(DbAchievement::into_achievement).collect()
    }

    async fn user_achievements(&self, user_id: i64) -> Result<Vec<EarnedAchievement>> {
        let rows = sqlx::query_as::<_, DbEarned>(
            r#"
            SELECT a.id, a.code, a.name, a.description, a.icon, a.condition_type, a.threshold,
                   a.xp_reward, ua.earned_at
            FROM user_achievements ua
            JOIN achievements a ON a.id = ua.achievement_id
            WHERE ua.user_id = ?
            ORDER BY ua.earned_at, a.id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(EarnedAchievement {
                    earned_at: parse_ts(&row.earned_at)?,
                    achievement: row.achievement.into_achievement()?,
                })
            })
            .collect()
    }

    async fn award_achievement(&self, user_id: i64, achievement_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_achievements (user_id, achievement_id, earned_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, achievement_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(achievement_id)
        .bind(format_ts(now))
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_earned(&self, user_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_achievements WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}
