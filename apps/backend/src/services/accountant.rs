//! XP, streaks, daily counters and achievements.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use palabra_core::xp::{
    daily_goal_percent, heatmap_grid, level_progress, next_streak, AchievementMetrics,
};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::store::{AchievementStore, ActivityStore, ProgressStore, SettingsStore};
use crate::AppState;

pub const DEFAULT_HEATMAP_WEEKS: usize = 12;
const MAX_HEATMAP_WEEKS: usize = 53;

/// Record activity on `today` and return the updated streak.
pub async fn touch_streak(state: &AppState, user_id: i64, today: NaiveDate) -> Result<StreakInfo> {
    let current = state.store.streak_info(user_id).await?;
    let next = next_streak(current, today);
    if next != current {
        state.store.update_streak(user_id, next).await?;
        if next.current_streak != current.current_streak {
            tracing::debug!(user_id, streak = next.current_streak, "streak updated");
        }
    }
    Ok(next)
}

/// Award every achievement whose threshold the user now meets, crediting
/// its XP. Returns the newly earned ones.
pub async fn check_achievements(state: &AppState, user_id: i64) -> Result<Vec<Achievement>> {
    let store = &state.store;
    let metrics = AchievementMetrics {
        cards_reviewed: store.count_reviews(user_id).await?,
        current_streak: store.streak_info(user_id).await?.current_streak,
        words_learned: store.count_words_learned(user_id).await?,
    };
    let held: HashSet<i64> = store
        .user_achievements(user_id)
        .await?
        .into_iter()
        .map(|earned| earned.achievement.id)
        .collect();

    let now = state.clock.now();
    let mut newly = Vec::new();
    for achievement in store.all_achievements().await? {
        if held.contains(&achievement.id) || !metrics.satisfies(&achievement) {
            continue;
        }
        if store.award_achievement(user_id, achievement.id, now).await? {
            if achievement.xp_reward > 0 {
                store.add_xp(user_id, achievement.xp_reward).await?;
            }
            tracing::info!(user_id, code = %achievement.code, xp = achievement.xp_reward, "achievement earned");
            newly.push(achievement);
        }
    }
    Ok(newly)
}

/// Today's counters, zero when nothing happened yet.
pub async fn today(state: &AppState, user_id: i64) -> Result<TodayStats> {
    let date = state.clock.today();
    let log = state.store.daily_log(user_id, date).await?;
    Ok(today_stats(date, log))
}

fn today_stats(date: NaiveDate, log: Option<DailyLog>) -> TodayStats {
    let (xp_earned, cards_reviewed, cards_correct, new_cards_added) = log.map_or((0, 0, 0, 0), |l| {
        (l.xp_earned, l.cards_reviewed, l.cards_correct, l.new_cards_added)
    });
    let accuracy = if cards_reviewed > 0 {
        cards_correct * 100 / cards_reviewed
    } else {
        0
    };
    TodayStats {
        date,
        xp_earned,
        cards_reviewed,
        cards_correct,
        new_cards_added,
        accuracy,
    }
}

pub async fn stats(state: &AppState, user_id: i64) -> Result<GamificationStats> {
    let store = &state.store;
    let user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {}", user_id)))?;
    let date = state.clock.today();
    let today = today_stats(date, store.daily_log(user_id, date).await?);
    let daily_goal = store.user_settings(user_id).await?.daily_goal;

    Ok(GamificationStats {
        total_xp: user.total_xp,
        level: level_progress(user.total_xp),
        current_streak: user.current_streak,
        longest_streak: user.longest_streak,
        is_active_today: user.last_active_date == Some(date),
        daily_goal,
        daily_goal_percent: daily_goal_percent(today.cards_reviewed, daily_goal),
        today,
        achievements_earned: store.count_earned(user_id).await?,
        achievements_total: store.all_achievements().await?.len(),
        words_learned: store.count_words_learned(user_id).await?,
        total_reviews: store.count_reviews(user_id).await?,
    })
}

/// Activity grid of `weeks` columns ending with the current week.
pub async fn heatmap(state: &AppState, user_id: i64, weeks: Option<usize>) -> Result<Vec<Vec<HeatmapDay>>> {
    let weeks = weeks.unwrap_or(DEFAULT_HEATMAP_WEEKS).clamp(1, MAX_HEATMAP_WEEKS);
    let today = state.clock.today();
    let since = today - Duration::days(weeks as i64 * 7);
    let logs = state.store.daily_logs_since(user_id, since).await?;
    Ok(heatmap_grid(&logs, today, weeks))
}

/// The catalogue with the user's earned flags.
pub async fn achievements(state: &AppState, user_id: i64) -> Result<Vec<AchievementStatus>> {
    let earned: HashMap<i64, _> = state
        .store
        .user_achievements(user_id)
        .await?
        .into_iter()
        .map(|e| (e.achievement.id, e.earned_at))
        .collect();

    Ok(state
        .store
        .all_achievements()
        .await?
        .into_iter()
        .map(|achievement| {
            let earned_at = earned.get(&achievement.id).copied();
            AchievementStatus {
                achievement,
                earned: earned_at.is_some(),
                earned_at,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn today_stats_without_activity() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let stats = today_stats(date, None);
        assert_eq!(stats.cards_reviewed, 0);
        assert_eq!(stats.accuracy, 0);
    }

    #[test]
    fn today_stats_accuracy_is_floored() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let log = DailyLog {
            user_id: 1,
            date,
            xp_earned: 20,
            cards_reviewed: 3,
            cards_correct: 2,
            new_cards_added: 1,
        };
        assert_eq!(today_stats(date, Some(log)).accuracy, 66);
    }
}
