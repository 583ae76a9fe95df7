//! XP, streak, level and achievement rules.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::types::{Achievement, AchievementKind, DailyLog, Rating, StreakInfo};

/// Cards per day counted toward the daily goal.
pub const DAILY_GOAL: i64 = 50;

/// XP for a single card review.
///
/// 2 base, +1 when correct, +3 more when a new card is answered correctly,
/// plus one per full week of streak, capped at 5.
pub fn review_xp(rating: Rating, is_new: bool, streak: i64) -> i64 {
    let mut xp = 2;
    if rating.is_correct() {
        xp += 1;
        if is_new {
            xp += 3;
        }
    }
    xp + (streak.max(0) / 7).min(5)
}

/// Streak after activity on `today`.
pub fn next_streak(info: StreakInfo, today: NaiveDate) -> StreakInfo {
    let current_streak = match info.last_active_date {
        Some(last) if last == today => info.current_streak.max(1),
        Some(last) if last + Duration::days(1) == today => info.current_streak + 1,
        _ => 1,
    };
    StreakInfo {
        current_streak,
        longest_streak: info.longest_streak.max(current_streak),
        last_active_date: Some(today),
    }
}

/// Level for a total XP: floor(sqrt(xp / 100)) + 1.
pub fn level_for_xp(xp: i64) -> i64 {
    if xp <= 0 {
        return 1;
    }
    ((xp as f64 / 100.0).sqrt().floor() as i64) + 1
}

/// Total XP at which `level` starts.
pub fn xp_for_level(level: i64) -> i64 {
    if level <= 1 {
        return 0;
    }
    (level - 1) * (level - 1) * 100
}

/// Level standing for a total XP.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelProgress {
    pub level: i64,
    pub current_xp: i64,
    pub level_start_xp: i64,
    pub next_level_xp: i64,
    /// Percent of the way to the next level.
    pub progress: f64,
}

pub fn level_progress(total_xp: i64) -> LevelProgress {
    let level = level_for_xp(total_xp);
    let level_start_xp = xp_for_level(level);
    let next_level_xp = xp_for_level(level + 1);
    let span = (next_level_xp - level_start_xp).max(1);
    LevelProgress {
        level,
        current_xp: total_xp,
        level_start_xp,
        next_level_xp,
        progress: (total_xp.max(0) - level_start_xp) as f64 / span as f64 * 100.0,
    }
}

/// Percent of the daily goal reached, capped at 100.
pub fn daily_goal_percent(cards_reviewed: i64, goal: i64) -> f64 {
    (cards_reviewed as f64 / goal.max(1) as f64 * 100.0).min(100.0)
}

/// The user's current standing on each achievement metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AchievementMetrics {
    pub cards_reviewed: i64,
    pub current_streak: i64,
    pub words_learned: i64,
}

impl AchievementMetrics {
    pub fn value(&self, kind: AchievementKind) -> i64 {
        match kind {
            AchievementKind::CardsReviewed => self.cards_reviewed,
            AchievementKind::Streak => self.current_streak,
            AchievementKind::WordsLearned => self.words_learned,
        }
    }

    pub fn satisfies(&self, achievement: &Achievement) -> bool {
        self.value(achievement.kind) >= achievement.threshold
    }
}

/// One cell of the activity heatmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapDay {
    pub date: NaiveDate,
    pub xp_earned: i64,
    pub cards_reviewed: i64,
    /// 0-4 intensity, -1 for days after today.
    pub level: i8,
}

/// Daily XP to a 0-4 intensity.
pub fn heatmap_intensity(xp: i64) -> i8 {
    match xp {
        i64::MIN..=0 => 0,
        1..=10 => 1,
        11..=30 => 2,
        31..=50 => 3,
        _ => 4,
    }
}

/// Grid of 7 rows (Sunday first) by `weeks` columns whose last column holds today.
pub fn heatmap_grid(logs: &[DailyLog], today: NaiveDate, weeks: usize) -> Vec<Vec<HeatmapDay>> {
    let weeks = weeks.max(1);
    let days_into_week = i64::from(today.weekday().num_days_from_sunday());
    let start = today - Duration::days((weeks as i64 - 1) * 7 + days_into_week);

    let mut grid = vec![Vec::with_capacity(weeks); 7];
    for week in 0..weeks {
        for (weekday, row) in grid.iter_mut().enumerate() {
            let date = start + Duration::days((week * 7 + weekday) as i64);
            let log = logs.iter().find(|l| l.date == date);
            let (xp_earned, cards_reviewed) = log.map_or((0, 0), |l| (l.xp_earned, l.cards_reviewed));
            let level = if date > today { -1 } else { heatmap_intensity(xp_earned) };
            row.push(HeatmapDay {
                date,
                xp_earned,
                cards_reviewed,
                level,
            });
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn review_xp_table() {
        let cases = [
            (Rating::Again, false, 0, 2),
            (Rating::Good, false, 0, 3),
            (Rating::Good, true, 0, 6),
            (Rating::Easy, true, 0, 6),
            (Rating::Good, false, 7, 4),
            (Rating::Good, false, 14, 5),
            (Rating::Good, false, 100, 8),
            (Rating::Hard, false, 0, 2),
            (Rating::Again, true, 0, 2),
            (Rating::Hard, true, 35, 7),
        ];
        for (rating, is_new, streak, expected) in cases {
            assert_eq!(
                review_xp(rating, is_new, streak),
                expected,
                "{:?} new={} streak={}",
                rating,
                is_new,
                streak
            );
        }
    }

    #[test]
    fn review_xp_matches_formula_everywhere() {
        for rating in Rating::ALL {
            for is_new in [false, true] {
                for streak in 0..60 {
                    let correct = i64::from(rating.is_correct());
                    let expected = 2 + correct + 3 * (correct * i64::from(is_new)) + (streak / 7).min(5);
                    assert_eq!(review_xp(rating, is_new, streak), expected);
                }
            }
        }
    }

    #[test]
    fn first_activity_starts_streak() {
        let info = next_streak(StreakInfo::default(), date(2026, 5, 1));
        assert_eq!(info.current_streak, 1);
        assert_eq!(info.longest_streak, 1);
        assert_eq!(info.last_active_date, Some(date(2026, 5, 1)));
    }

    #[test]
    fn consecutive_day_extends_streak() {
        let info = StreakInfo {
            current_streak: 4,
            longest_streak: 4,
            last_active_date: Some(date(2026, 4, 30)),
        };
        let next = next_streak(info, date(2026, 5, 1));
        assert_eq!(next.current_streak, 5);
        assert_eq!(next.longest_streak, 5);
    }

    #[test]
    fn same_day_keeps_streak() {
        let info = StreakInfo {
            current_streak: 4,
            longest_streak: 9,
            last_active_date: Some(date(2026, 5, 1)),
        };
        assert_eq!(next_streak(info, date(2026, 5, 1)), info);
    }

    #[test]
    fn gap_resets_streak_but_keeps_longest() {
        let info = StreakInfo {
            current_streak: 6,
            longest_streak: 6,
            last_active_date: Some(date(2026, 4, 28)),
        };
        let next = next_streak(info, date(2026, 5, 1));
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 6);
    }

    #[test]
    fn levels_follow_square_root() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(399), 2);
        assert_eq!(level_for_xp(400), 3);
        assert_eq!(xp_for_level(1), 0);
        assert_eq!(xp_for_level(3), 400);
    }

    #[test]
    fn level_progress_is_percent_within_level() {
        let progress = level_progress(250);
        assert_eq!(progress.level, 2);
        assert_eq!(progress.level_start_xp, 100);
        assert_eq!(progress.next_level_xp, 400);
        assert!((progress.progress - 50.0).abs() < 1e-9);
    }

    #[test]
    fn daily_goal_caps_at_hundred() {
        assert_eq!(daily_goal_percent(25, DAILY_GOAL), 50.0);
        assert_eq!(daily_goal_percent(80, DAILY_GOAL), 100.0);
        assert_eq!(daily_goal_percent(5, 20), 25.0);
    }

    #[test]
    fn metrics_compare_against_threshold() {
        let metrics = AchievementMetrics {
            cards_reviewed: 100,
            current_streak: 2,
            words_learned: 10,
        };
        let achievement = Achievement {
            id: 1,
            code: "century".into(),
            name: "Century".into(),
            description: "Review 100 cards".into(),
            icon: "💯".into(),
            kind: AchievementKind::CardsReviewed,
            threshold: 100,
            xp_reward: 50,
        };
        assert!(metrics.satisfies(&achievement));
        let streak = Achievement {
            kind: AchievementKind::Streak,
            threshold: 3,
            ..achievement
        };
        assert!(!metrics.satisfies(&streak));
    }

    #[test]
    fn heatmap_intensity_bands() {
        assert_eq!(heatmap_intensity(0), 0);
        assert_eq!(heatmap_intensity(10), 1);
        assert_eq!(heatmap_intensity(30), 2);
        assert_eq!(heatmap_intensity(50), 3);
        assert_eq!(heatmap_intensity(51), 4);
    }

    #[test]
    fn heatmap_grid_ends_in_current_week() {
        // 2026-05-06 is a Wednesday.
        let today = date(2026, 5, 6);
        let logs = vec![DailyLog {
            user_id: 1,
            date: today,
            xp_earned: 42,
            cards_reviewed: 14,
            cards_correct: 10,
            new_cards_added: 3,
        }];
        let grid = heatmap_grid(&logs, today, 2);

        assert_eq!(grid.len(), 7);
        assert!(grid.iter().all(|row| row.len() == 2));
        assert_eq!(grid[0][0].date, date(2026, 4, 26));
        assert_eq!(grid[3][1].date, today);
        assert_eq!(grid[3][1].level, 3);
        assert_eq!(grid[3][1].cards_reviewed, 14);
        assert_eq!(grid[4][1].level, -1);
        assert_eq!(grid[0][1].level, 0);
    }
}
