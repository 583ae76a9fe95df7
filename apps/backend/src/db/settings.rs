use async_trait::async_trait;

use super::Database;
use crate::error::Result;
use crate::models::*;
use crate::store::SettingsStore;

#[async_trait]
impl SettingsStore for Database {
    async fn user_settings(&self, user_id: i64) -> Result<UserSettings> {
        let row = sqlx::query_as::<_, DbUserSettings>(
            r#"
            SELECT daily_goal, new_cards_per_day, reviews_per_session, default_mode,
                   target_retention, enable_tts, show_bridges
            FROM user_settings
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.into_settings(),
            None => Ok(UserSettings::default()),
        }
    }

    async fn save_user_settings(&self, user_id: i64, settings: &UserSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, daily_goal, new_cards_per_day, reviews_per_session,
                                       default_mode, target_retention, enable_tts, show_bridges)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                daily_goal = excluded.daily_goal,
                new_cards_per_day = excluded.new_cards_per_day,
                reviews_per_session = excluded.reviews_per_session,
                default_mode = excluded.default_mode,
                target_retention = excluded.target_retention,
                enable_tts = excluded.enable_tts,
                show_bridges = excluded.show_bridges
            "#,
        )
        .bind(user_id)
        .bind(settings.daily_goal)
        .bind(settings.new_cards_per_day.map(|n| n as i64))
        .bind(settings.reviews_per_session)
        .bind(settings.default_mode.as_str())
        .bind(settings.target_retention)
        .bind(settings.enable_tts)
        .bind(settings.show_bridges)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
