//! Synced lyrics download and import.

use std::time::Duration;

use async_trait::async_trait;
use palabra_core::lrc::LrcLine;
use palabra_core::parse_lrc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::services::enrichment::EnrichmentError;
use crate::store::SongStore;
use crate::AppState;

/// Source of LRC text for a track.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// `Ok(None)` when the service has no synced lyrics for the track.
    async fn fetch_synced_lyrics(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
        duration_secs: Option<i64>,
    ) -> std::result::Result<Option<String>, EnrichmentError>;
}

/// Client for the LRCLIB `/api/get` endpoint.
#[derive(Clone)]
pub struct LrcLibClient {
    client: Client,
    base_url: String,
}

impl LrcLibClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> std::result::Result<Self, EnrichmentError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("palabra/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LrcLibTrack {
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
}

#[async_trait]
impl LyricsSource for LrcLibClient {
    async fn fetch_synced_lyrics(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
        duration_secs: Option<i64>,
    ) -> std::result::Result<Option<String>, EnrichmentError> {
        let mut query = vec![
            ("artist_name", artist.to_string()),
            ("track_name", title.to_string()),
        ];
        if let Some(album) = album {
            query.push(("album_name", album.to_string()));
        }
        if let Some(duration) = duration_secs {
            query.push(("duration", duration.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/api/get", self.base_url))
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Api(status.as_u16(), body));
        }

        let track: LrcLibTrack = response.json().await?;
        Ok(track.synced_lyrics.filter(|lrc| !lrc.trim().is_empty()))
    }
}

/// Turn parsed LRC lines into stored lines. Zero-length lines get one
/// millisecond so that every line ends after it starts.
pub fn lines_from_lrc(parsed: &[LrcLine], translations: Option<&[String]>) -> Vec<NewSongLine> {
    parsed
        .iter()
        .enumerate()
        .map(|(i, line)| NewSongLine {
            start_time_ms: line.start_time_ms,
            end_time_ms: line.end_time_ms.max(line.start_time_ms + 1),
            spanish_text: line.text.clone(),
            english_text: translations
                .and_then(|t| t.get(i))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        })
        .collect()
}

/// Fetch the song's synced lyrics, translate them when an enricher is
/// configured, and replace the stored lines. Returns the new lines.
pub async fn import_lyrics(state: &AppState, song_id: i64) -> Result<Vec<SongLine>> {
    let source = state
        .lyrics
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("lyrics source is not configured".to_string()))?;
    let song = state
        .store
        .get_song(song_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Song {}", song_id)))?;

    let lrc = source
        .fetch_synced_lyrics(&song.artist, &song.title, song.album.as_deref(), song.duration_secs)
        .await
        .map_err(|e| ApiError::Internal(format!("lyrics fetch failed: {}", e)))?
        .ok_or_else(|| ApiError::NotFound(format!("Synced lyrics for '{}'", song.title)))?;

    let parsed = parse_lrc(&lrc);
    if parsed.is_empty() {
        return Err(ApiError::NotFound(format!("Synced lyrics for '{}'", song.title)));
    }

    let translations = match &state.enricher {
        Some(enricher) => {
            let texts: Vec<String> = parsed.iter().map(|l| l.text.clone()).collect();
            let timeout = state.enrichment_timeout();
            match tokio::time::timeout(timeout, enricher.translate_lines(&texts)).await {
                Ok(Ok(translations)) => Some(translations),
                Ok(Err(e)) => {
                    tracing::warn!(song_id, error = %e, "line translation failed");
                    None
                }
                Err(_) => {
                    tracing::warn!(song_id, "line translation timed out");
                    None
                }
            }
        }
        None => None,
    };

    let lines = lines_from_lrc(&parsed, translations.as_deref());
    let stored = state.store.replace_song_lines(song_id, &lines).await?;
    tracing::info!(song_id, lines = stored.len(), translated = translations.is_some(), "lyrics imported");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lines_keep_translations_by_position() {
        let parsed = parse_lrc("[00:01.00] Hola\n[00:03.50] Adiós");
        let translations = vec!["Hello".to_string(), "  ".to_string()];
        let lines = lines_from_lrc(&parsed, Some(&translations));

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].start_time_ms, 1000);
        assert_eq!(lines[0].end_time_ms, 3500);
        assert_eq!(lines[0].english_text.as_deref(), Some("Hello"));
        assert_eq!(lines[1].end_time_ms, 8500);
        assert_eq!(lines[1].english_text, None);
    }

    #[test]
    fn repeated_timestamps_still_end_after_start() {
        let parsed = parse_lrc("[00:02.00] uno\n[00:02.00] dos");
        let lines = lines_from_lrc(&parsed, None);
        assert_eq!(lines[0].start_time_ms, 2000);
        assert_eq!(lines[0].end_time_ms, 2001);
    }

    #[test]
    fn track_without_synced_lyrics() {
        let track: LrcLibTrack =
            serde_json::from_str(r#"{"id": 1, "plainLyrics": "hola", "syncedLyrics": null}"#).unwrap();
        assert_eq!(track.synced_lyrics, None);
    }
}
