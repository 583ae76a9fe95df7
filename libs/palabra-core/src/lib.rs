//! Learning-session core shared by the backend service and its tools.
//!
//! Provides:
//! - FSRS scheduler for per-card memory state
//! - Curriculum phases and daily lesson composition policy
//! - Daily lesson progression and summaries
//! - Song lesson phase machine, cloze blanks and answer checking
//! - LRC (timestamped lyrics) parser
//! - XP, streak, level and achievement rules
//! - Local question generators used when enrichment is unavailable
//! - Grammar tips built from stored rules
//! - Shared types (Card, CardProgress, Rating, etc.)

pub mod algorithm;
pub mod compose;
pub mod curriculum;
pub mod error;
pub mod grammar;
pub mod lesson;
pub mod lrc;
pub mod matching;
pub mod questions;
pub mod song;
pub mod types;
pub mod xp;

pub use algorithm::{fsrs::Fsrs, RatingPreview, Scheduler};
pub use compose::{DailyLesson, LessonCard, LessonComposer, LessonPools};
pub use curriculum::{phase_for_day, CurriculumPhase, MAX_DAYS};
pub use error::{CoreError, Result};
pub use lesson::{CardResult, LessonProgress, LessonSummary};
pub use lrc::parse_lrc;
pub use matching::{check_answer, normalize_word, strip_accents};
pub use questions::Question;
pub use song::{SongLesson, SongMode, SongPhase};
pub use types::{
    Achievement, AchievementKind, Card, CardProgress, CardSource, CardState, CardWithProgress,
    DailyDelta, DailyLog, Journey, LessonSession, LessonTotals, ModeWeights, NewCard,
    PracticeMode, Rating, ReviewLog, StreakInfo, User, UserSettings,
};
