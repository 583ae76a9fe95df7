//! Core types for the learning-session orchestrator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Memory state of a card for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::Relearning => "relearning",
        }
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "learning" => Ok(Self::Learning),
            "review" => Ok(Self::Review),
            "relearning" => Ok(Self::Relearning),
            other => Err(CoreError::UnknownCardState(other.to_string())),
        }
    }
}

/// Rating for a review, integer-coded 1..=4 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Convert to 4-point numeric value (1-4).
    pub fn to_value(self) -> u8 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    /// Create from 4-point numeric value.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }

    /// Good and Easy count as a correct answer.
    pub fn is_correct(self) -> bool {
        self >= Self::Good
    }
}

impl TryFrom<i64> for Rating {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_value(value).ok_or(CoreError::InvalidRating(value))
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.to_value()
    }
}

/// Where a card came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSource {
    #[default]
    Curriculum,
    Song,
}

impl CardSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Curriculum => "curriculum",
            Self::Song => "song",
        }
    }
}

impl FromStr for CardSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "song" => Ok(Self::Song),
            // Imported rows predate the source column and default to curriculum.
            _ => Ok(Self::Curriculum),
        }
    }
}

/// A learnable vocabulary item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub term: String,
    pub translation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub island_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_rank: Option<i64>,
    pub source: CardSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_song_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Card fields supplied on creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCard {
    pub term: String,
    pub translation: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub island_id: Option<i64>,
    #[serde(default)]
    pub frequency_rank: Option<i64>,
    #[serde(default)]
    pub source: CardSource,
    #[serde(default)]
    pub source_song_id: Option<i64>,
}

/// Per-(user, card) memory state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProgress {
    pub user_id: i64,
    pub card_id: i64,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i64,
    pub scheduled_days: i64,
    pub reps: i64,
    pub lapses: i64,
    pub state: CardState,
    pub due: Option<DateTime<Utc>>,
    pub last_review: Option<DateTime<Utc>>,
}

impl CardProgress {
    /// Fresh progress for a card that has never been rated.
    pub fn new(user_id: i64, card_id: i64) -> Self {
        Self {
            user_id,
            card_id,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            state: CardState::New,
            due: None,
            last_review: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.state == CardState::New
    }
}

/// A card joined with the user's progress row, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardWithProgress {
    #[serde(flatten)]
    pub card: Card,
    pub progress: Option<CardProgress>,
}

impl CardWithProgress {
    pub fn state(&self) -> CardState {
        self.progress
            .as_ref()
            .map(|p| p.state)
            .unwrap_or(CardState::New)
    }

    /// Progress to schedule against, creating a fresh one when absent.
    pub fn progress_or_new(&self, user_id: i64) -> CardProgress {
        self.progress
            .clone()
            .unwrap_or_else(|| CardProgress::new(user_id, self.card.id))
    }
}

/// Append-only record of a rating event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLog {
    pub user_id: i64,
    pub card_id: i64,
    pub rating: Rating,
    /// Elapsed days recorded on the progress before this rating.
    pub elapsed_days: i64,
    /// Scheduled days recorded on the progress before this rating.
    pub scheduled_days: i64,
    pub duration_ms: i64,
    pub reviewed_at: DateTime<Utc>,
}

/// Per-(user, date) activity counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLog {
    pub user_id: i64,
    pub date: NaiveDate,
    pub xp_earned: i64,
    pub cards_reviewed: i64,
    pub cards_correct: i64,
    pub new_cards_added: i64,
}

/// Amounts added to a DailyLog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyDelta {
    pub xp_earned: i64,
    pub cards_reviewed: i64,
    pub cards_correct: i64,
    pub new_cards_added: i64,
}

impl DailyDelta {
    /// Counters contributed by a single card review.
    pub fn for_review(rating: Rating, was_new: bool, xp: i64) -> Self {
        Self {
            xp_earned: xp,
            cards_reviewed: 1,
            cards_correct: i64::from(rating.is_correct()),
            new_cards_added: i64::from(was_new),
        }
    }

    /// Counters contributed by XP alone (song lessons, achievements).
    pub fn xp_only(xp: i64) -> Self {
        Self {
            xp_earned: xp,
            ..Default::default()
        }
    }
}

/// The learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub total_xp: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_active_date: Option<NaiveDate>,
}

impl User {
    pub fn streak_info(&self) -> StreakInfo {
        StreakInfo {
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_active_date: self.last_active_date,
        }
    }
}

/// Streak fields of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakInfo {
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_active_date: Option<NaiveDate>,
}

/// The user's curriculum run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journey {
    pub id: i64,
    pub user_id: i64,
    pub start_date: NaiveDate,
    pub is_active: bool,
}

/// Persisted record of a day's lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonSession {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub day_number: i64,
    pub phase_id: i64,
    pub cards_reviewed: i64,
    pub cards_correct: i64,
    pub new_cards_learned: i64,
    pub xp_earned: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonSession {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn totals(&self) -> LessonTotals {
        LessonTotals {
            cards_reviewed: self.cards_reviewed,
            cards_correct: self.cards_correct,
            new_cards_learned: self.new_cards_learned,
            xp_earned: self.xp_earned,
        }
    }
}

/// Running aggregates of a lesson.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonTotals {
    pub cards_reviewed: i64,
    pub cards_correct: i64,
    pub new_cards_learned: i64,
    pub xp_earned: i64,
}

impl std::ops::Add for LessonTotals {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            cards_reviewed: self.cards_reviewed + other.cards_reviewed,
            cards_correct: self.cards_correct + other.cards_correct,
            new_cards_learned: self.new_cards_learned + other.new_cards_learned,
            xp_earned: self.xp_earned + other.xp_earned,
        }
    }
}

/// Metric an achievement is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    CardsReviewed,
    Streak,
    WordsLearned,
}

impl AchievementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CardsReviewed => "cards_reviewed",
            Self::Streak => "streak",
            Self::WordsLearned => "words_learned",
        }
    }
}

impl FromStr for AchievementKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cards_reviewed" => Ok(Self::CardsReviewed),
            "streak" => Ok(Self::Streak),
            "words_learned" => Ok(Self::WordsLearned),
            other => Err(CoreError::UnknownAchievementKind(other.to_string())),
        }
    }
}

/// A badge from the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub kind: AchievementKind,
    pub threshold: i64,
    pub xp_reward: i64,
}

/// Mnemonic links from a Spanish word to languages the learner knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridges {
    pub hindi: Option<String>,
    pub dutch: Option<String>,
    pub english: Option<String>,
}

impl Bridges {
    pub fn is_empty(&self) -> bool {
        self.hindi.is_none() && self.dutch.is_none() && self.english.is_none()
    }
}

/// How a card is presented in a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeMode {
    Standard,
    Reverse,
    Typing,
    Mcq,
    FillBlank,
    SentenceBuild,
}

impl PracticeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Reverse => "reverse",
            Self::Typing => "typing",
            Self::Mcq => "mcq",
            Self::FillBlank => "fill_blank",
            Self::SentenceBuild => "sentence_build",
        }
    }

    /// Modes that present a generated question rather than the card itself.
    pub fn needs_question(self) -> bool {
        matches!(self, Self::Mcq | Self::FillBlank | Self::SentenceBuild)
    }
}

impl FromStr for PracticeMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "reverse" => Ok(Self::Reverse),
            "typing" => Ok(Self::Typing),
            "mcq" => Ok(Self::Mcq),
            "fill_blank" => Ok(Self::FillBlank),
            "sentence_build" => Ok(Self::SentenceBuild),
            other => Err(CoreError::UnknownPracticeMode(other.to_string())),
        }
    }
}

pub const DEFAULT_REVIEWS_PER_SESSION: i64 = 20;

/// Learner preferences. `None` overrides fall back to the curriculum phase
/// or the server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub daily_goal: i64,
    pub new_cards_per_day: Option<usize>,
    /// Default size of a free practice session.
    pub reviews_per_session: i64,
    /// Mode every card of a free practice session is shown in.
    pub default_mode: PracticeMode,
    pub target_retention: Option<f64>,
    pub enable_tts: bool,
    pub show_bridges: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            daily_goal: crate::xp::DAILY_GOAL,
            new_cards_per_day: None,
            reviews_per_session: DEFAULT_REVIEWS_PER_SESSION,
            default_mode: PracticeMode::Standard,
            target_retention: None,
            enable_tts: true,
            show_bridges: true,
        }
    }
}

impl UserSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.daily_goal < 1 {
            return Err(CoreError::InvalidSetting(format!(
                "daily_goal must be at least 1, got {}",
                self.daily_goal
            )));
        }
        if self.reviews_per_session < 1 {
            return Err(CoreError::InvalidSetting(format!(
                "reviews_per_session must be at least 1, got {}",
                self.reviews_per_session
            )));
        }
        if self.new_cards_per_day == Some(0) {
            return Err(CoreError::InvalidSetting(
                "new_cards_per_day must be at least 1".to_string(),
            ));
        }
        if let Some(retention) = self.target_retention {
            if !(retention > 0.0 && retention < 1.0) {
                return Err(CoreError::InvalidSetting(format!(
                    "target_retention must be between 0 and 1, got {}",
                    retention
                )));
            }
        }
        Ok(())
    }
}

/// Phase weights over the three flashcard modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeWeights {
    pub standard: u32,
    pub reverse: u32,
    pub typing: u32,
}

impl ModeWeights {
    pub fn total(&self) -> u32 {
        self.standard + self.reverse + self.typing
    }

    /// Same weights with one mode zeroed out.
    pub fn excluding(&self, mode: PracticeMode) -> Self {
        let mut weights = *self;
        match mode {
            PracticeMode::Standard => weights.standard = 0,
            PracticeMode::Reverse => weights.reverse = 0,
            PracticeMode::Typing => weights.typing = 0,
            _ => {}
        }
        weights
    }
}
