//! Test fixtures and factory functions for creating test data.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use palabra_backend::models::*;
use palabra_backend::services::enrichment::{Enricher, EnrichmentError};
use palabra_backend::services::lyrics::LyricsSource;

/// 09:00 UTC on a Monday; the study day is the UTC date.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// A curriculum card on `island` with frequency `rank`.
pub fn curriculum_card(island: i64, rank: i64) -> NewCard {
    NewCard {
        term: format!("palabra{}", rank),
        translation: format!("word {}", rank),
        example: None,
        island_id: Some(island),
        frequency_rank: Some(rank),
        source: CardSource::Curriculum,
        source_song_id: None,
    }
}

/// Words of [`sample_lines`] that make up the song's vocabulary. Each
/// appears once in the lyrics; the first four are key vocabulary.
pub const SONG_VOCAB: [(&str, &str, bool); 9] = [
    ("bailar", "to dance", true),
    ("corazón", "heart", true),
    ("canción", "song", true),
    ("cantar", "to sing", true),
    ("noche", "night", false),
    ("ciudad", "city", false),
    ("mañana", "tomorrow", false),
    ("amor", "love", false),
    ("luna", "moon", false),
];

pub fn sample_song() -> NewSong {
    NewSong {
        title: "Canción de Prueba".to_string(),
        artist: "Los Ejemplos".to_string(),
        album: Some("Demo".to_string()),
        duration_secs: Some(180),
        audio_path: None,
        vocabulary: SONG_VOCAB
            .iter()
            .map(|(word, translation, is_key)| NewSongVocab {
                word: word.to_string(),
                translation: translation.to_string(),
                is_key: *is_key,
            })
            .collect(),
    }
}

pub const SONG_TEXT: [&str; 6] = [
    "Quiero bailar contigo esta noche",
    "Tu corazón late como el mío",
    "La canción suena en la ciudad",
    "Vamos a cantar hasta mañana",
    "Siempre pienso en tu amor",
    "Bajo la luna y las estrellas",
];

pub fn sample_lines() -> Vec<NewSongLine> {
    SONG_TEXT
        .iter()
        .enumerate()
        .map(|(i, text)| NewSongLine {
            start_time_ms: i as i64 * 4000,
            end_time_ms: (i as i64 + 1) * 4000,
            spanish_text: text.to_string(),
            english_text: None,
        })
        .collect()
}

/// LRC text for the sample song, as a lyrics service returns it.
pub fn sample_lrc() -> String {
    SONG_TEXT
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[00:{:02}.00] {}", i * 4, text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Create a review request body.
pub fn review_request(card_id: i64, rating: i64) -> serde_json::Value {
    json!({ "card_id": card_id, "rating": rating, "duration_ms": 2000 })
}

pub fn review(card_id: i64, rating: i64) -> ReviewRequest {
    ReviewRequest {
        card_id,
        rating,
        duration_ms: 2000,
    }
}

/// Lyrics source answering from memory.
pub struct StubLyrics {
    pub lrc: Option<String>,
}

#[async_trait]
impl LyricsSource for StubLyrics {
    async fn fetch_synced_lyrics(
        &self,
        _artist: &str,
        _title: &str,
        _album: Option<&str>,
        _duration_secs: Option<i64>,
    ) -> Result<Option<String>, EnrichmentError> {
        Ok(self.lrc.clone())
    }
}

/// Enricher with canned answers that records the terms it was asked about.
#[derive(Default)]
pub struct StubEnricher {
    pub calls: Mutex<Vec<String>>,
    pub fail: bool,
}

impl StubEnricher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), EnrichmentError> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            Err(EnrichmentError::Api(503, "unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Enricher for StubEnricher {
    async fn generate_bridges(&self, term: &str, _gloss: &str) -> Result<Bridges, EnrichmentError> {
        self.record(format!("bridges:{}", term))?;
        Ok(Bridges {
            hindi: None,
            dutch: Some(format!("{} sounds like Dutch", term)),
            english: Some(format!("{} sounds like English", term)),
        })
    }

    async fn generate_example(&self, term: &str, _gloss: &str) -> Result<String, EnrichmentError> {
        self.record(format!("example:{}", term))?;
        Ok(format!("Uso {} cada día.", term))
    }

    async fn generate_question(&self, card: &Card, mode: PracticeMode) -> Result<Question, EnrichmentError> {
        self.record(format!("question:{}:{}", card.term, mode.as_str()))?;
        Err(EnrichmentError::Unsupported(mode.as_str()))
    }

    async fn generate_grammar(&self, card: &Card) -> Result<NewGrammarRule, EnrichmentError> {
        self.record(format!("grammar:{}", card.term))?;
        Ok(NewGrammarRule {
            rule_key: format!("Rule {}", card.term),
            title: format!("Grammar of {}", card.term),
            explanation: format!("{} follows a regular pattern.", card.term),
            examples: (1..=3)
                .map(|i| GrammarExample {
                    spanish: format!("{} {}", card.term, i),
                    english: format!("{} {}", card.translation, i),
                })
                .collect(),
            difficulty: 1,
        })
    }

    async fn translate_lines(&self, lines: &[String]) -> Result<Vec<String>, EnrichmentError> {
        self.record(format!("translate:{}", lines.len()))?;
        Ok(lines.iter().map(|l| format!("EN {}", l)).collect())
    }
}
