use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{placeholders, Database};
use crate::error::{ApiError, Result};
use crate::models::*;
use crate::store::SongStore;

const SONG_COLUMNS: &str = "id, title, artist, album, duration_secs, audio_path, created_at";

const LINE_COLUMNS: &str = "id, song_id, line_number, start_time_ms, end_time_ms, spanish_text, english_text";

const VOCAB_COLUMNS: &str = "id, song_id, word, translation, is_key, card_id";

const PROGRESS_COLUMNS: &str = "user_id, song_id, stability, difficulty, reps, lapses, state, due, \
     last_review, vocab_complete, lyrics_complete, listening_complete, total_listens";

const SESSION_COLUMNS: &str = "id, user_id, song_id, date, mode, vocab_reviewed, vocab_correct, \
     lines_studied, blanks_correct, blanks_total, xp_earned, completed_at";

impl Database {
    async fn song_progress(&self, user_id: i64, song_id: i64) -> Result<Option<SongProgress>> {
        let sql = format!(
            "SELECT {} FROM song_progress WHERE user_id = ? AND song_id = ?",
            PROGRESS_COLUMNS
        );
        sqlx::query_as::<_, DbSongProgress>(&sql)
            .bind(user_id)
            .bind(song_id)
            .fetch_optional(self.pool())
            .await?
            .map(DbSongProgress::into_progress)
            .transpose()
    }
}

#[async_trait]
impl SongStore for Database {
    async fn create_song(&self, song: &NewSong, now: DateTime<Utc>) -> Result<Song> {
        let mut tx = self.pool().begin().await?;

        let sql = format!(
            "INSERT INTO songs (title, artist, album, duration_secs, audio_path, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
            SONG_COLUMNS
        );
        let row = sqlx::query_as::<_, DbSong>(&sql)
            .bind(&song.title)
            .bind(&song.artist)
            .bind(&song.album)
            .bind(song.duration_secs)
            .bind(&song.audio_path)
            .bind(format_ts(now))
            .fetch_one(&mut *tx)
            .await?;

        for vocab in &song.vocabulary {
            sqlx::query("INSERT INTO song_vocabulary (song_id, word, translation, is_key) VALUES (?, ?, ?, ?)")
                .bind(row.id)
                .bind(&vocab.word)
                .bind(&vocab.translation)
                .bind(vocab.is_key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        row.into_song()
    }

    async fn list_songs(&self) -> Result<Vec<Song>> {
        let sql = format!("SELECT {} FROM songs ORDER BY id", SONG_COLUMNS);
        let rows = sqlx::query_as::<_, DbSong>(&sql)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(DbSong::into_song).collect()
    }

    async fn get_song(&self, id: i64) -> Result<Option<Song>> {
        let sql = format!("SELECT {} FROM songs WHERE id = ?", SONG_COLUMNS);
        sqlx::query_as::<_, DbSong>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .map(DbSong::into_song)
            .transpose()
    }

    async fn get_song_with_details(&self, id: i64) -> Result<Option<SongDetails>> {
        let Some(song) = self.get_song(id).await? else {
            return Ok(None);
        };
        Ok(Some(SongDetails {
            song,
            lines: self.song_lines(id).await?,
            vocabulary: self.song_vocabulary(id, false).await?,
        }))
    }

    async fn song_lines(&self, song_id: i64) -> Result<Vec<SongLine>> {
        let sql = format!(
            "SELECT {} FROM song_lines WHERE song_id = ? ORDER BY line_number",
            LINE_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbSongLine>(&sql)
            .bind(song_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(SongLine::from).collect())
    }

    async fn replace_song_lines(&self, song_id: i64, lines: &[NewSongLine]) -> Result<Vec<SongLine>> {
        if self.get_song(song_id).await?.is_none() {
            return Err(ApiError::NotFound(format!("Song {}", song_id)));
        }

        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM song_lines WHERE song_id = ?")
            .bind(song_id)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO song_lines (song_id, line_number, start_time_ms, end_time_ms, spanish_text, english_text) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
            LINE_COLUMNS
        );
        let mut stored = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            let row = sqlx::query_as::<_, DbSongLine>(&sql)
                .bind(song_id)
                .bind(index as i64 + 1)
                .bind(line.start_time_ms)
                .bind(line.end_time_ms)
                .bind(&line.spanish_text)
                .bind(&line.english_text)
                .fetch_one(&mut *tx)
                .await?;
            stored.push(SongLine::from(row));
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn song_vocabulary(&self, song_id: i64, key_only: bool) -> Result<Vec<SongVocab>> {
        let sql = format!(
            "SELECT {} FROM song_vocabulary WHERE song_id = ? AND (? = 0 OR is_key = 1) ORDER BY id",
            VOCAB_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbSongVocab>(&sql)
            .bind(song_id)
            .bind(key_only)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(SongVocab::from).collect())
    }

    async fn add_song_vocab(&self, song_id: i64, vocab: &NewSongVocab) -> Result<SongVocab> {
        let sql = format!(
            "INSERT INTO song_vocabulary (song_id, word, translation, is_key) VALUES (?, ?, ?, ?) \
             RETURNING {}",
            VOCAB_COLUMNS
        );
        let row = sqlx::query_as::<_, DbSongVocab>(&sql)
            .bind(song_id)
            .bind(&vocab.word)
            .bind(&vocab.translation)
            .bind(vocab.is_key)
            .fetch_one(self.pool())
            .await?;
        Ok(row.into())
    }

    async fn unlinked_song_vocab(&self, song_id: i64) -> Result<Vec<SongVocab>> {
        let sql = format!(
            "SELECT {} FROM song_vocabulary WHERE song_id = ? AND card_id IS NULL ORDER BY id",
            VOCAB_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbSongVocab>(&sql)
            .bind(song_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(SongVocab::from).collect())
    }

    async fn link_song_vocab_to_card(&self, vocab_id: i64, card_id: i64) -> Result<()> {
        sqlx::query("UPDATE song_vocabulary SET card_id = ? WHERE id = ?")
            .bind(card_id)
            .bind(vocab_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn get_or_create_song_progress(&self, user_id: i64, song_id: i64) -> Result<SongProgress> {
        sqlx::query("INSERT INTO song_progress (user_id, song_id) VALUES (?, ?) ON CONFLICT(user_id, song_id) DO NOTHING")
            .bind(user_id)
            .bind(song_id)
            .execute(self.pool())
            .await?;
        self.song_progress(user_id, song_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Song {}", song_id)))
    }

    async fn upsert_song_progress(&self, progress: &SongProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO song_progress (user_id, song_id, stability, difficulty, reps, lapses, state,
                                       due, last_review, vocab_complete, lyrics_complete,
                                       listening_complete, total_listens)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, song_id) DO UPDATE SET
                stability = excluded.stability,
                difficulty = excluded.difficulty,
                reps = excluded.reps,
                lapses = excluded.lapses,
                state = excluded.state,
                due = excluded.due,
                last_review = excluded.last_review,
                vocab_complete = excluded.vocab_complete,
                lyrics_complete = excluded.lyrics_complete,
                listening_complete = excluded.listening_complete,
                total_listens = excluded.total_listens
            "#,
        )
        .bind(progress.user_id)
        .bind(progress.song_id)
        .bind(progress.stability)
        .bind(progress.difficulty)
        .bind(progress.reps)
        .bind(progress.lapses)
        .bind(progress.state.as_str())
        .bind(progress.due.map(format_ts))
        .bind(progress.last_review.map(format_ts))
        .bind(progress.vocab_complete)
        .bind(progress.lyrics_complete)
        .bind(progress.listening_complete)
        .bind(progress.total_listens)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn increment_listen_count(&self, user_id: i64, song_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO song_progress (user_id, song_id, total_listens)
            VALUES (?, ?, 1)
            ON CONFLICT(user_id, song_id) DO UPDATE SET total_listens = total_listens + 1
            "#,
        )
        .bind(user_id)
        .bind(song_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn due_songs(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Song>> {
        let rows = sqlx::query_as::<_, DbSong>(
            r#"
            SELECT s.id, s.title, s.artist, s.album, s.duration_secs, s.audio_path, s.created_at
            FROM songs s
            JOIN song_progress sp ON sp.song_id = s.id AND sp.user_id = ?
            WHERE sp.state != 'new' AND sp.due IS NOT NULL
              AND substr(sp.due, 1, 19) <= substr(?, 1, 19)
            ORDER BY sp.due, s.id
            "#,
        )
        .bind(user_id)
        .bind(format_ts(now))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(DbSong::into_song).collect()
    }

    async fn songs_with_progress(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<SongWithProgress>> {
        let songs = self.list_songs().await?;
        let sql = format!("SELECT {} FROM song_progress WHERE user_id = ?", PROGRESS_COLUMNS);
        let rows = sqlx::query_as::<_, DbSongProgress>(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        let mut by_song = HashMap::with_capacity(rows.len());
        for row in rows {
            let progress = row.into_progress()?;
            by_song.insert(progress.song_id, progress);
        }

        Ok(songs
            .into_iter()
            .map(|song| {
                let progress = by_song.remove(&song.id);
                let is_due = progress.as_ref().is_some_and(|p| p.is_due(now));
                SongWithProgress {
                    song,
                    progress,
                    is_due,
                }
            })
            .collect())
    }

    async fn songs_in_progress(&self, user_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT song_id FROM song_progress
            WHERE user_id = ? AND reps > 0
            ORDER BY last_review DESC, song_id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    async fn create_song_session(
        &self,
        user_id: i64,
        song_id: i64,
        date: NaiveDate,
        mode: SongMode,
    ) -> Result<SongSession> {
        let sql = format!(
            "INSERT INTO song_sessions (user_id, song_id, date, mode) VALUES (?, ?, ?, ?) RETURNING {}",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, DbSongSession>(&sql)
            .bind(user_id)
            .bind(song_id)
            .bind(format_date(date))
            .bind(mode.as_str())
            .fetch_one(self.pool())
            .await?;
        row.into_session()
    }

    async fn update_song_session(&self, id: i64, stats: &SongStats) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE song_sessions
            SET vocab_reviewed = ?, vocab_correct = ?, lines_studied = ?, blanks_correct = ?,
                blanks_total = ?
            WHERE id = ?
            "#,
        )
        .bind(stats.vocab_reviewed)
        .bind(stats.vocab_correct)
        .bind(stats.lines_studied)
        .bind(stats.blanks_correct)
        .bind(stats.blanks_total)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn complete_song_session(
        &self,
        id: i64,
        stats: &SongStats,
        xp: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE song_sessions
            SET vocab_reviewed = ?, vocab_correct = ?, lines_studied = ?, blanks_correct = ?,
                blanks_total = ?, xp_earned = ?, completed_at = ?
            WHERE id = ? AND completed_at IS NULL
            "#,
        )
        .bind(stats.vocab_reviewed)
        .bind(stats.vocab_correct)
        .bind(stats.lines_studied)
        .bind(stats.blanks_correct)
        .bind(stats.blanks_total)
        .bind(xp)
        .bind(format_ts(now))
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn song_titles(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!("SELECT id, title FROM songs WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query_as::<_, (i64, String)>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().collect())
    }
}
