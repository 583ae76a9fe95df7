//! Repository traits consumed by the services.
//!
//! `Database` (SQLite) and `MemoryStore` both implement every trait, so
//! services only ever see `Arc<dyn Store>`.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::*;

pub use memory::MemoryStore;

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn get_card(&self, id: i64) -> Result<Option<Card>>;

    async fn create_card(&self, card: &NewCard) -> Result<Card>;

    async fn update_card(&self, card: &Card) -> Result<()>;

    async fn update_card_example(&self, id: i64, example: &str) -> Result<()>;

    /// Removes the card with its progress, logs, bridges, cached questions
    /// and grammar links. Song vocabulary pointing at it is unlinked.
    async fn delete_card(&self, id: i64) -> Result<bool>;

    /// Case-insensitive match on term or translation.
    async fn search_cards(&self, query: &str, island: Option<i64>, limit: i64) -> Result<Vec<Card>>;

    async fn list_cards(&self, limit: i64, offset: i64) -> Result<Vec<Card>>;

    async fn cards_by_island(&self, island: i64) -> Result<Vec<Card>>;

    async fn count_cards(&self) -> Result<i64>;

    /// Up to `n` translations of other cards, in random order.
    async fn random_translations(&self, exclude: i64, n: usize) -> Result<Vec<String>>;

    async fn card_bridges(&self, card_id: i64) -> Result<Option<Bridges>>;

    async fn save_bridges(&self, card_id: i64, bridges: &Bridges) -> Result<()>;

    async fn cached_question(&self, card_id: i64, mode: PracticeMode) -> Result<Option<Question>>;

    async fn save_question(&self, card_id: i64, question: &Question) -> Result<()>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_progress(&self, user_id: i64, card_id: i64) -> Result<Option<CardProgress>>;

    async fn upsert_progress(&self, progress: &CardProgress) -> Result<()>;

    /// Curriculum cards due at `now`, most overdue first.
    async fn due_cards(&self, user_id: i64, now: DateTime<Utc>, limit: i64) -> Result<Vec<CardWithProgress>>;

    /// Unbounded number of due curriculum cards.
    async fn count_due(&self, user_id: i64, now: DateTime<Utc>) -> Result<i64>;

    /// Curriculum cards never rated, by frequency rank.
    async fn new_cards(&self, user_id: i64, limit: i64) -> Result<Vec<CardWithProgress>>;

    async fn new_cards_from_islands(
        &self,
        user_id: i64,
        islands: &[i64],
        limit: i64,
    ) -> Result<Vec<CardWithProgress>>;

    async fn cards_by_state(&self, user_id: i64, state: CardState, limit: i64) -> Result<Vec<CardWithProgress>>;

    /// Cards whose last review moved them into learning or review, newest first.
    async fn recently_learned(&self, user_id: i64, limit: i64) -> Result<Vec<CardWithProgress>>;

    async fn song_vocab_due(&self, user_id: i64, now: DateTime<Utc>, limit: i64) -> Result<Vec<CardWithProgress>>;

    async fn song_vocab_new(&self, user_id: i64, song_ids: &[i64], limit: i64) -> Result<Vec<CardWithProgress>>;

    async fn count_words_learned(&self, user_id: i64) -> Result<i64>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn log_review(&self, log: &ReviewLog) -> Result<()>;

    async fn count_reviews(&self, user_id: i64) -> Result<i64>;

    /// Adds `delta` to the day's counters, creating the row when missing.
    async fn increment_daily(&self, user_id: i64, date: NaiveDate, delta: DailyDelta) -> Result<()>;

    async fn daily_log(&self, user_id: i64, date: NaiveDate) -> Result<Option<DailyLog>>;

    async fn daily_logs_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<DailyLog>>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    async fn add_xp(&self, user_id: i64, xp: i64) -> Result<()>;

    async fn update_streak(&self, user_id: i64, streak: StreakInfo) -> Result<()>;

    async fn streak_info(&self, user_id: i64) -> Result<StreakInfo>;
}

#[async_trait]
pub trait JourneyStore: Send + Sync {
    /// The active journey, starting one today when there is none.
    async fn get_or_create_journey(&self, user_id: i64, today: NaiveDate) -> Result<Journey>;

    async fn today_lesson_session(&self, user_id: i64, date: NaiveDate) -> Result<Option<LessonSession>>;

    async fn create_lesson_session(
        &self,
        user_id: i64,
        date: NaiveDate,
        day_number: i64,
        phase_id: i64,
    ) -> Result<LessonSession>;

    /// Overwrites the running aggregates.
    async fn update_lesson_session(&self, id: i64, totals: LessonTotals) -> Result<()>;

    /// Writes final aggregates and the completion time. Returns `false` when
    /// the session was already completed, leaving it untouched.
    async fn complete_lesson_session(&self, id: i64, totals: LessonTotals, now: DateTime<Utc>) -> Result<bool>;

    async fn recent_lesson_sessions(&self, user_id: i64, limit: i64) -> Result<Vec<LessonSession>>;
}

#[async_trait]
pub trait SongStore: Send + Sync {
    async fn create_song(&self, song: &NewSong, now: DateTime<Utc>) -> Result<Song>;

    async fn list_songs(&self) -> Result<Vec<Song>>;

    async fn get_song(&self, id: i64) -> Result<Option<Song>>;

    async fn get_song_with_details(&self, id: i64) -> Result<Option<SongDetails>>;

    async fn song_lines(&self, song_id: i64) -> Result<Vec<SongLine>>;

    async fn replace_song_lines(&self, song_id: i64, lines: &[NewSongLine]) -> Result<Vec<SongLine>>;

    async fn song_vocabulary(&self, song_id: i64, key_only: bool) -> Result<Vec<SongVocab>>;

    async fn add_song_vocab(&self, song_id: i64, vocab: &NewSongVocab) -> Result<SongVocab>;

    /// Vocabulary of the song not yet promoted to a card.
    async fn unlinked_song_vocab(&self, song_id: i64) -> Result<Vec<SongVocab>>;

    async fn link_song_vocab_to_card(&self, vocab_id: i64, card_id: i64) -> Result<()>;

    async fn get_or_create_song_progress(&self, user_id: i64, song_id: i64) -> Result<SongProgress>;

    async fn upsert_song_progress(&self, progress: &SongProgress) -> Result<()>;

    async fn increment_listen_count(&self, user_id: i64, song_id: i64) -> Result<()>;

    /// Songs studied at least once and due at `now`, earliest due first.
    async fn due_songs(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Song>>;

    async fn songs_with_progress(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<SongWithProgress>>;

    /// Ids of songs with at least one completed lesson, most recent first.
    async fn songs_in_progress(&self, user_id: i64) -> Result<Vec<i64>>;

    async fn create_song_session(
        &self,
        user_id: i64,
        song_id: i64,
        date: NaiveDate,
        mode: SongMode,
    ) -> Result<SongSession>;

    async fn update_song_session(&self, id: i64, stats: &SongStats) -> Result<()>;

    /// Returns `false` when the session was already completed.
    async fn complete_song_session(
        &self,
        id: i64,
        stats: &SongStats,
        xp: i64,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Song titles by id, for labelling song-sourced cards.
    async fn song_titles(&self, ids: &[i64]) -> Result<HashMap<i64, String>>;
}

#[async_trait]
pub trait AchievementStore: Send + Sync {
    async fn all_achievements(&self) -> Result<Vec<Achievement>>;

    async fn user_achievements(&self, user_id: i64) -> Result<Vec<EarnedAchievement>>;

    /// Returns `false` when the user already held it.
    async fn award_achievement(&self, user_id: i64, achievement_id: i64, now: DateTime<Utc>) -> Result<bool>;

    async fn count_earned(&self, user_id: i64) -> Result<i64>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored preferences, or the defaults when none were saved.
    async fn user_settings(&self, user_id: i64) -> Result<UserSettings>;

    async fn save_user_settings(&self, user_id: i64, settings: &UserSettings) -> Result<()>;
}

#[async_trait]
pub trait GrammarStore: Send + Sync {
    /// Insert or replace the rule with the same key.
    async fn save_grammar_rule(&self, rule: &NewGrammarRule, now: DateTime<Utc>) -> Result<GrammarRule>;

    async fn link_card_grammar(&self, card_id: i64, rule_id: i64) -> Result<()>;

    /// The card's first linked rule.
    async fn grammar_for_card(&self, card_id: i64) -> Result<Option<GrammarRule>>;

    /// First linked rule of each card that has one.
    async fn grammar_for_cards(&self, card_ids: &[i64]) -> Result<HashMap<i64, GrammarRule>>;

    async fn grammar_rule_by_key(&self, rule_key: &str) -> Result<Option<GrammarRule>>;

    /// Every rule, easiest first, then by title.
    async fn all_grammar_rules(&self) -> Result<Vec<GrammarRule>>;

    async fn cards_for_grammar_rule(&self, rule_id: i64) -> Result<Vec<Card>>;
}

/// Everything the services need from persistence.
pub trait Store:
    CardStore + ProgressStore + ActivityStore + JourneyStore + SongStore + AchievementStore + SettingsStore + GrammarStore
{
}

impl<T> Store for T where
    T: CardStore
        + ProgressStore
        + ActivityStore
        + JourneyStore
        + SongStore
        + AchievementStore
        + SettingsStore
        + GrammarStore
{
}
