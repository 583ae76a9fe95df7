//! Database models and API types

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

use crate::error::{ApiError, Result};

// Re-export shared types from palabra-core
pub use palabra_core::compose::{DailyLesson, LessonCard};
pub use palabra_core::grammar::{GrammarExample, GrammarLevel, GrammarRule, GrammarTip, NewGrammarRule};
pub use palabra_core::lesson::LessonSummary;
pub use palabra_core::questions::Question;
pub use palabra_core::song::{
    BlankOutcome, NewSong, NewSongLine, NewSongVocab, Song, SongBlank, SongDetails, SongLine,
    SongMode, SongPhase, SongProgress, SongSession, SongStats, SongVocab, SongVocabCard,
    SongWithProgress,
};
pub use palabra_core::types::{
    Achievement, AchievementKind, Bridges, Card, CardProgress, CardSource, CardState,
    CardWithProgress, DailyDelta, DailyLog, Journey, LessonSession, LessonTotals, NewCard,
    PracticeMode, Rating, ReviewLog, StreakInfo, User, UserSettings,
};
pub use palabra_core::xp::{HeatmapDay, LevelProgress};
pub use palabra_core::RatingPreview;

// === Stored value encoding ===

/// Timestamps are stored as RFC3339 UTC text with millisecond precision.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ApiError::Parse(format!("timestamp '{}': {}", raw, e)))
}

fn parse_opt_ts(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(parse_ts).transpose()
}

/// Dates are stored as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ApiError::Parse(format!("date '{}': {}", raw, e)))
}

// === Database Entity Types ===

/// Card row in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct DbCard {
    pub id: i64,
    pub term: String,
    pub translation: String,
    pub example: Option<String>,
    pub island_id: Option<i64>,
    pub frequency_rank: Option<i64>,
    pub source: String,
    pub source_song_id: Option<i64>,
    pub created_at: String,
}

impl DbCard {
    pub fn into_card(self) -> Result<Card> {
        Ok(Card {
            id: self.id,
            term: self.term,
            translation: self.translation,
            example: self.example,
            island_id: self.island_id,
            frequency_rank: self.frequency_rank,
            source: self.source.parse().unwrap_or_default(),
            source_song_id: self.source_song_id,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

/// Progress row in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct DbCardProgress {
    pub user_id: i64,
    pub card_id: i64,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i64,
    pub scheduled_days: i64,
    pub reps: i64,
    pub lapses: i64,
    pub state: String,
    pub due: Option<String>,
    pub last_review: Option<String>,
}

impl DbCardProgress {
    pub fn into_progress(self) -> Result<CardProgress> {
        Ok(CardProgress {
            user_id: self.user_id,
            card_id: self.card_id,
            stability: self.stability,
            difficulty: self.difficulty,
            elapsed_days: self.elapsed_days,
            scheduled_days: self.scheduled_days,
            reps: self.reps,
            lapses: self.lapses,
            state: self.state.parse()?,
            due: parse_opt_ts(self.due.as_deref())?,
            last_review: parse_opt_ts(self.last_review.as_deref())?,
        })
    }
}

/// Card joined with an optional progress row, progress columns prefixed `p_`.
#[derive(Debug, Clone, FromRow)]
pub struct DbCardWithProgress {
    #[sqlx(flatten)]
    pub card: DbCard,
    pub p_user_id: Option<i64>,
    pub p_stability: Option<f64>,
    pub p_difficulty: Option<f64>,
    pub p_elapsed_days: Option<i64>,
    pub p_scheduled_days: Option<i64>,
    pub p_reps: Option<i64>,
    pub p_lapses: Option<i64>,
    pub p_state: Option<String>,
    pub p_due: Option<String>,
    pub p_last_review: Option<String>,
}

impl DbCardWithProgress {
    pub fn into_card_with_progress(self) -> Result<CardWithProgress> {
        let card = self.card.into_card()?;
        let progress = match (self.p_user_id, self.p_state) {
            (Some(user_id), Some(state)) => Some(
                DbCardProgress {
                    user_id,
                    card_id: card.id,
                    stability: self.p_stability.unwrap_or_default(),
                    difficulty: self.p_difficulty.unwrap_or_default(),
                    elapsed_days: self.p_elapsed_days.unwrap_or_default(),
                    scheduled_days: self.p_scheduled_days.unwrap_or_default(),
                    reps: self.p_reps.unwrap_or_default(),
                    lapses: self.p_lapses.unwrap_or_default(),
                    state,
                    due: self.p_due,
                    last_review: self.p_last_review,
                }
                .into_progress()?,
            ),
            _ => None,
        };
        Ok(CardWithProgress { card, progress })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub name: String,
    pub total_xp: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_active_date: Option<String>,
}

impl DbUser {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            total_xp: self.total_xp,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_active_date: self.last_active_date.as_deref().map(parse_date).transpose()?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDailyLog {
    pub user_id: i64,
    pub date: String,
    pub xp_earned: i64,
    pub cards_reviewed: i64,
    pub cards_correct: i64,
    pub new_cards_added: i64,
}

impl DbDailyLog {
    pub fn into_daily_log(self) -> Result<DailyLog> {
        Ok(DailyLog {
            user_id: self.user_id,
            date: parse_date(&self.date)?,
            xp_earned: self.xp_earned,
            cards_reviewed: self.cards_reviewed,
            cards_correct: self.cards_correct,
            new_cards_added: self.new_cards_added,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbJourney {
    pub id: i64,
    pub user_id: i64,
    pub start_date: String,
    pub is_active: bool,
}

impl DbJourney {
    pub fn into_journey(self) -> Result<Journey> {
        Ok(Journey {
            id: self.id,
            user_id: self.user_id,
            start_date: parse_date(&self.start_date)?,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbLessonSession {
    pub id: i64,
    pub user_id: i64,
    pub date: String,
    pub day_number: i64,
    pub phase_id: i64,
    pub cards_reviewed: i64,
    pub cards_correct: i64,
    pub new_cards_learned: i64,
    pub xp_earned: i64,
    pub completed_at: Option<String>,
}

impl DbLessonSession {
    pub fn into_session(self) -> Result<LessonSession> {
        Ok(LessonSession {
            id: self.id,
            user_id: self.user_id,
            date: parse_date(&self.date)?,
            day_number: self.day_number,
            phase_id: self.phase_id,
            cards_reviewed: self.cards_reviewed,
            cards_correct: self.cards_correct,
            new_cards_learned: self.new_cards_learned,
            xp_earned: self.xp_earned,
            completed_at: parse_opt_ts(self.completed_at.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSong {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_secs: Option<i64>,
    pub audio_path: Option<String>,
    pub created_at: String,
}

impl DbSong {
    pub fn into_song(self) -> Result<Song> {
        Ok(Song {
            id: self.id,
            title: self.title,
            artist: self.artist,
            album: self.album,
            duration_secs: self.duration_secs,
            audio_path: self.audio_path,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSongLine {
    pub id: i64,
    pub song_id: i64,
    pub line_number: i64,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub spanish_text: String,
    pub english_text: Option<String>,
}

impl From<DbSongLine> for SongLine {
    fn from(row: DbSongLine) -> Self {
        SongLine {
            id: row.id,
            song_id: row.song_id,
            line_number: row.line_number,
            start_time_ms: row.start_time_ms,
            end_time_ms: row.end_time_ms,
            spanish_text: row.spanish_text,
            english_text: row.english_text,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSongVocab {
    pub id: i64,
    pub song_id: i64,
    pub word: String,
    pub translation: String,
    pub is_key: bool,
    pub card_id: Option<i64>,
}

impl From<DbSongVocab> for SongVocab {
    fn from(row: DbSongVocab) -> Self {
        SongVocab {
            id: row.id,
            song_id: row.song_id,
            word: row.word,
            translation: row.translation,
            is_key: row.is_key,
            card_id: row.card_id,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSongProgress {
    pub user_id: i64,
    pub song_id: i64,
    pub stability: f64,
    pub difficulty: f64,
    pub reps: i64,
    pub lapses: i64,
    pub state: String,
    pub due: Option<String>,
    pub last_review: Option<String>,
    pub vocab_complete: bool,
    pub lyrics_complete: bool,
    pub listening_complete: bool,
    pub total_listens: i64,
}

impl DbSongProgress {
    pub fn into_progress(self) -> Result<SongProgress> {
        Ok(SongProgress {
            user_id: self.user_id,
            song_id: self.song_id,
            stability: self.stability,
            difficulty: self.difficulty,
            reps: self.reps,
            lapses: self.lapses,
            state: self.state.parse()?,
            due: parse_opt_ts(self.due.as_deref())?,
            last_review: parse_opt_ts(self.last_review.as_deref())?,
            vocab_complete: self.vocab_complete,
            lyrics_complete: self.lyrics_complete,
            listening_complete: self.listening_complete,
            total_listens: self.total_listens,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSongSession {
    pub id: i64,
    pub user_id: i64,
    pub song_id: i64,
    pub date: String,
    pub mode: String,
    pub vocab_reviewed: i64,
    pub vocab_correct: i64,
    pub lines_studied: i64,
    pub blanks_correct: i64,
    pub blanks_total: i64,
    pub xp_earned: i64,
    pub completed_at: Option<String>,
}

impl DbSongSession {
    pub fn into_session(self) -> Result<SongSession> {
        Ok(SongSession {
            id: self.id,
            user_id: self.user_id,
            song_id: self.song_id,
            date: parse_date(&self.date)?,
            mode: self.mode.parse()?,
            vocab_reviewed: self.vocab_reviewed,
            vocab_correct: self.vocab_correct,
            lines_studied: self.lines_studied,
            blanks_correct: self.blanks_correct,
            blanks_total: self.blanks_total,
            xp_earned: self.xp_earned,
            completed_at: parse_opt_ts(self.completed_at.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAchievement {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub condition_type: String,
    pub threshold: i64,
    pub xp_reward: i64,
}

impl DbAchievement {
    pub fn into_achievement(self) -> Result<Achievement> {
        Ok(Achievement {
            id: self.id,
            code: self.code,
            name: self.name,
            description: self.description,
            icon: self.icon,
            kind: self.condition_type.parse()?,
            threshold: self.threshold,
            xp_reward: self.xp_reward,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUserSettings {
    pub daily_goal: i64,
    pub new_cards_per_day: Option<i64>,
    pub reviews_per_session: i64,
    pub default_mode: String,
    pub target_retention: Option<f64>,
    pub enable_tts: bool,
    pub show_bridges: bool,
}

impl DbUserSettings {
    pub fn into_settings(self) -> Result<UserSettings> {
        Ok(UserSettings {
            daily_goal: self.daily_goal,
            new_cards_per_day: self
                .new_cards_per_day
                .map(|n| usize::try_from(n).unwrap_or(0)),
            reviews_per_session: self.reviews_per_session,
            default_mode: self.default_mode.parse()?,
            target_retention: self.target_retention,
            enable_tts: self.enable_tts,
            show_bridges: self.show_bridges,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbGrammarRule {
    pub id: i64,
    pub rule_key: String,
    pub title: String,
    pub explanation: String,
    pub examples_json: String,
    pub difficulty: i64,
    pub created_at: String,
}

impl DbGrammarRule {
    /// Unreadable examples are dropped rather than failing the rule.
    pub fn into_rule(self) -> Result<GrammarRule> {
        Ok(GrammarRule {
            id: self.id,
            rule_key: self.rule_key,
            title: self.title,
            explanation: self.explanation,
            examples: serde_json::from_str(&self.examples_json).unwrap_or_default(),
            difficulty: self.difficulty,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

// === API Types ===

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn explicit_null<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial settings update. Absent fields are left alone; `null` clears an
/// override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub daily_goal: Option<i64>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub new_cards_per_day: Option<Option<usize>>,
    pub reviews_per_session: Option<i64>,
    pub default_mode: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub target_retention: Option<Option<f64>>,
    pub enable_tts: Option<bool>,
    pub show_bridges: Option<bool>,
}

/// An achievement the user has earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarnedAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub earned_at: DateTime<Utc>,
}

/// Catalogue entry with the user's status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AchievementStatus {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub earned: bool,
    pub earned_at: Option<DateTime<Utc>>,
}

/// The current card of a daily lesson as shown to the learner.
#[derive(Debug, Clone, Serialize)]
pub struct LessonCardView {
    pub index: usize,
    pub total: usize,
    #[serde(flatten)]
    pub card: LessonCard,
    pub preview: BTreeMap<Rating, RatingPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrievability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<Question>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridges: Option<Bridges>,
    pub day_number: i64,
    pub estimated_minutes: i64,
}

/// What the client shows next in a daily lesson.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LessonStep {
    Card(LessonCardView),
    Finished(LessonSummary),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub card_id: i64,
    pub rating: i64,
    #[serde(default)]
    pub duration_ms: i64,
}

/// Home screen of the curriculum.
#[derive(Debug, Clone, Serialize)]
pub struct JourneyHome {
    pub day_number: i64,
    pub total_days: i64,
    pub phase_id: i64,
    pub phase_name: String,
    pub phase_description: String,
    pub today_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today_stats: Option<String>,
    pub due_count: i64,
    pub new_count: usize,
    pub estimated_minutes: i64,
    pub current_streak: i64,
    pub total_xp: i64,
}

/// Today's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodayStats {
    pub date: NaiveDate,
    pub xp_earned: i64,
    pub cards_reviewed: i64,
    pub cards_correct: i64,
    pub new_cards_added: i64,
    pub accuracy: i64,
}

/// Level, streak and badge overview.
#[derive(Debug, Clone, Serialize)]
pub struct GamificationStats {
    pub total_xp: i64,
    pub level: LevelProgress,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub is_active_today: bool,
    pub today: TodayStats,
    pub daily_goal: i64,
    pub daily_goal_percent: f64,
    pub achievements_earned: i64,
    pub achievements_total: usize,
    pub words_learned: i64,
    pub total_reviews: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeatmapQuery {
    pub weeks: Option<usize>,
}

/// Where the song lesson stands and what to show.
#[derive(Debug, Clone, Serialize)]
pub struct SongLessonView {
    pub song: Song,
    pub mode: SongMode,
    pub phase: SongPhase,
    pub index: usize,
    pub phase_len: usize,
    pub estimated_minutes: i64,
    pub stats: SongStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab: Option<SongVocabCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<SongLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blank: Option<SongBlankView>,
    /// All lines, for listen phases.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<SongLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<SongCompletion>,
}

/// A blank without its answer.
#[derive(Debug, Clone, Serialize)]
pub struct SongBlankView {
    pub line_id: i64,
    pub display: String,
    pub english_text: Option<String>,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
}

/// Result of a finished song lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongCompletion {
    pub xp_earned: i64,
    pub accuracy: i64,
    pub message: String,
    pub vocab_correct: i64,
    pub vocab_total: i64,
    pub blanks_correct: i64,
    pub blanks_total: i64,
    pub lines_studied: i64,
    pub next_review: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlankResponse {
    pub outcome: BlankOutcome,
    pub lesson: SongLessonView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VocabRatingRequest {
    pub rating: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlankAnswerRequest {
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartSongQuery {
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardListQuery {
    pub q: Option<String>,
    pub island: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A card with its stored bridges.
#[derive(Debug, Clone, Serialize)]
pub struct CardDetail {
    #[serde(flatten)]
    pub card: Card,
    pub bridges: Option<Bridges>,
    pub progress: Option<CardProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichResponse {
    pub queued: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartPracticeRequest {
    pub max_cards: Option<usize>,
}

/// Running counters of a free practice session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PracticeStats {
    pub total_cards: usize,
    pub reviewed: usize,
    pub remaining: usize,
    pub correct: i64,
    /// Percent, unrounded.
    pub accuracy: f64,
    pub xp_earned: i64,
    pub duration_ms: i64,
}

/// A grammar rule with the cards linked to it.
#[derive(Debug, Clone, Serialize)]
pub struct GrammarRuleDetail {
    #[serde(flatten)]
    pub rule: GrammarRule,
    pub cards: Vec<Card>,
}

/// Song catalogue with the user's progress.
#[derive(Debug, Clone, Serialize)]
pub struct SongListResponse {
    pub songs: Vec<SongWithProgress>,
    /// Songs due for another lesson, soonest first.
    pub due: Vec<Song>,
}
