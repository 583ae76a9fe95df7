//! Songs, their synced lines and vocabulary, and the song lesson engine.

mod lesson;
mod progress;

pub use lesson::{BlankOutcome, SongBlank, SongLesson, SongStats, SongVocabCard, BLANK_COUNT};
pub use progress::{apply_song_result, completion_message, song_xp};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::CardState;

/// Which parts of a song lesson to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongMode {
    Vocab,
    Lyrics,
    Listening,
    #[default]
    Full,
}

impl SongMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vocab => "vocab",
            Self::Lyrics => "lyrics",
            Self::Listening => "listening",
            Self::Full => "full",
        }
    }

    /// XP for finishing a lesson in this mode, before accuracy bonuses.
    pub fn base_xp(self) -> i64 {
        match self {
            Self::Vocab => 10,
            Self::Lyrics => 15,
            Self::Listening => 20,
            Self::Full => 30,
        }
    }

    pub fn first_phase(self) -> SongPhase {
        match self {
            Self::Vocab | Self::Full => SongPhase::VocabPreview,
            Self::Lyrics => SongPhase::LineBreakdown,
            Self::Listening => SongPhase::FillBlanks,
        }
    }

    /// Phase that follows `phase` in this mode.
    pub fn next_phase(self, phase: SongPhase) -> SongPhase {
        use SongPhase::*;
        match (self, phase) {
            (Self::Full, VocabPreview) => FirstListen,
            (Self::Full, FirstListen) => LineBreakdown,
            (Self::Full, LineBreakdown) => FillBlanks,
            (Self::Full, FillBlanks) => FinalListen,
            _ => Complete,
        }
    }
}

impl fmt::Display for SongMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SongMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vocab" => Ok(Self::Vocab),
            "lyrics" => Ok(Self::Lyrics),
            "listening" => Ok(Self::Listening),
            "full" => Ok(Self::Full),
            other => Err(CoreError::UnknownSongMode(other.to_string())),
        }
    }
}

/// Stage of a song lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongPhase {
    VocabPreview,
    FirstListen,
    LineBreakdown,
    FillBlanks,
    FinalListen,
    Complete,
}

impl SongPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VocabPreview => "vocab_preview",
            Self::FirstListen => "first_listen",
            Self::LineBreakdown => "line_breakdown",
            Self::FillBlanks => "fill_blanks",
            Self::FinalListen => "final_listen",
            Self::Complete => "complete",
        }
    }

    /// Listen phases have no work items and wait for the learner to move on.
    pub fn is_listen(self) -> bool {
        matches!(self, Self::FirstListen | Self::FinalListen)
    }
}

impl fmt::Display for SongPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SongPhase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vocab_preview" => Ok(Self::VocabPreview),
            "first_listen" => Ok(Self::FirstListen),
            "line_breakdown" => Ok(Self::LineBreakdown),
            "fill_blanks" => Ok(Self::FillBlanks),
            "final_listen" => Ok(Self::FinalListen),
            "complete" => Ok(Self::Complete),
            other => Err(CoreError::UnknownSongPhase(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_secs: Option<i64>,
    pub audio_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A timed lyric line. Lines of a song are ordered by `line_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongLine {
    pub id: i64,
    pub song_id: i64,
    pub line_number: i64,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub spanish_text: String,
    pub english_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongVocab {
    pub id: i64,
    pub song_id: i64,
    pub word: String,
    pub translation: String,
    pub is_key: bool,
    /// Curriculum card this word was promoted to.
    pub card_id: Option<i64>,
}

/// Input for importing a song.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_secs: Option<i64>,
    pub audio_path: Option<String>,
    #[serde(default)]
    pub vocabulary: Vec<NewSongVocab>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSongVocab {
    pub word: String,
    pub translation: String,
    #[serde(default)]
    pub is_key: bool,
}

/// A lyric line before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSongLine {
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub spanish_text: String,
    pub english_text: Option<String>,
}

/// A song with everything a lesson needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongDetails {
    pub song: Song,
    pub lines: Vec<SongLine>,
    pub vocabulary: Vec<SongVocab>,
}

/// Per-user memory of a whole song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongProgress {
    pub user_id: i64,
    pub song_id: i64,
    pub stability: f64,
    pub difficulty: f64,
    pub reps: i64,
    pub lapses: i64,
    pub state: CardState,
    pub due: Option<DateTime<Utc>>,
    pub last_review: Option<DateTime<Utc>>,
    pub vocab_complete: bool,
    pub lyrics_complete: bool,
    pub listening_complete: bool,
    pub total_listens: i64,
}

impl SongProgress {
    pub fn new(user_id: i64, song_id: i64) -> Self {
        Self {
            user_id,
            song_id,
            stability: 0.0,
            difficulty: 0.0,
            reps: 0,
            lapses: 0,
            state: CardState::New,
            due: None,
            last_review: None,
            vocab_complete: false,
            lyrics_complete: false,
            listening_complete: false,
            total_listens: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state != CardState::New && self.due.is_some_and(|due| due <= now)
    }
}

/// Persisted record of one song lesson on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongSession {
    pub id: i64,
    pub user_id: i64,
    pub song_id: i64,
    pub date: NaiveDate,
    pub mode: SongMode,
    pub vocab_reviewed: i64,
    pub vocab_correct: i64,
    pub lines_studied: i64,
    pub blanks_correct: i64,
    pub blanks_total: i64,
    pub xp_earned: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A song as listed for the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongWithProgress {
    #[serde(flatten)]
    pub song: Song,
    pub progress: Option<SongProgress>,
    pub is_due: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn walk(mode: SongMode) -> Vec<SongPhase> {
        let mut phases = vec![mode.first_phase()];
        while *phases.last().unwrap() != SongPhase::Complete {
            let next = mode.next_phase(*phases.last().unwrap());
            phases.push(next);
        }
        phases
    }

    #[test]
    fn phase_sequences_per_mode() {
        use SongPhase::*;
        assert_eq!(walk(SongMode::Vocab), vec![VocabPreview, Complete]);
        assert_eq!(walk(SongMode::Lyrics), vec![LineBreakdown, Complete]);
        assert_eq!(walk(SongMode::Listening), vec![FillBlanks, Complete]);
        assert_eq!(
            walk(SongMode::Full),
            vec![VocabPreview, FirstListen, LineBreakdown, FillBlanks, FinalListen, Complete]
        );
    }

    #[test]
    fn mode_and_phase_round_trip_through_text() {
        for mode in [SongMode::Vocab, SongMode::Lyrics, SongMode::Listening, SongMode::Full] {
            assert_eq!(mode.as_str().parse::<SongMode>(), Ok(mode));
        }
        assert_eq!("final_listen".parse::<SongPhase>(), Ok(SongPhase::FinalListen));
        assert!("karaoke".parse::<SongMode>().is_err());
    }

    #[test]
    fn base_xp_by_mode() {
        assert_eq!(SongMode::Vocab.base_xp(), 10);
        assert_eq!(SongMode::Lyrics.base_xp(), 15);
        assert_eq!(SongMode::Listening.base_xp(), 20);
        assert_eq!(SongMode::Full.base_xp(), 30);
    }

    #[test]
    fn new_progress_is_never_due() {
        let progress = SongProgress::new(1, 1);
        assert!(!progress.is_due(Utc::now()));
    }
}
