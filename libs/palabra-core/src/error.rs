//! Error types for palabra-core.

use thiserror::Error;

/// Result type alias using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised when decoding values that arrive from storage or requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("rating must be between 1 and 4, got {0}")]
    InvalidRating(i64),

    #[error("unknown card state: {0}")]
    UnknownCardState(String),

    #[error("unknown practice mode: {0}")]
    UnknownPracticeMode(String),

    #[error("unknown song mode: {0}")]
    UnknownSongMode(String),

    #[error("unknown song phase: {0}")]
    UnknownSongPhase(String),

    #[error("unknown achievement condition: {0}")]
    UnknownAchievementKind(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("song lesson is in {actual}, not {expected}")]
    WrongSongPhase { expected: String, actual: String },
}
