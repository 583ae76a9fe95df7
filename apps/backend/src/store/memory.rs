//! In-memory store used by tests and for running without a database file.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use super::{
    AchievementStore, ActivityStore, CardStore, GrammarStore, JourneyStore, ProgressStore, SettingsStore,
    SongStore,
};
use crate::error::{ApiError, Result};
use crate::models::*;

/// Per-table id sequences, mirroring SQLite AUTOINCREMENT.
#[derive(Debug, Default)]
struct Sequences {
    card: i64,
    journey: i64,
    lesson_session: i64,
    song: i64,
    song_line: i64,
    song_vocab: i64,
    song_session: i64,
    grammar_rule: i64,
}

fn bump(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Default)]
struct Inner {
    seq: Sequences,
    cards: BTreeMap<i64, Card>,
    bridges: HashMap<i64, Bridges>,
    questions: HashMap<(i64, PracticeMode), Question>,
    progress: HashMap<(i64, i64), CardProgress>,
    review_logs: Vec<ReviewLog>,
    daily: BTreeMap<(i64, NaiveDate), DailyLog>,
    users: BTreeMap<i64, User>,
    journeys: Vec<Journey>,
    lesson_sessions: Vec<LessonSession>,
    songs: BTreeMap<i64, Song>,
    song_lines: BTreeMap<i64, Vec<SongLine>>,
    song_vocab: BTreeMap<i64, SongVocab>,
    song_progress: HashMap<(i64, i64), SongProgress>,
    song_sessions: Vec<SongSession>,
    achievements: Vec<Achievement>,
    earned: Vec<(i64, i64, DateTime<Utc>)>,
    settings: HashMap<i64, UserSettings>,
    grammar_rules: BTreeMap<i64, GrammarRule>,
    /// (card id, rule id) links.
    card_grammar: Vec<(i64, i64)>,
}

impl Inner {
    fn with_progress(&self, user_id: i64, card: &Card) -> CardWithProgress {
        CardWithProgress {
            card: card.clone(),
            progress: self.progress.get(&(user_id, card.id)).cloned(),
        }
    }

    fn is_new_for(&self, user_id: i64, card_id: i64) -> bool {
        self.progress
            .get(&(user_id, card_id))
            .map_or(true, CardProgress::is_new)
    }

    /// Non-new cards of `source` due at `now`, most overdue first.
    fn due_of(&self, user_id: i64, source: CardSource, now: DateTime<Utc>) -> Vec<CardWithProgress> {
        let mut due: Vec<CardWithProgress> = self
            .cards
            .values()
            .filter(|card| card.source == source)
            .filter_map(|card| {
                let progress = self.progress.get(&(user_id, card.id))?;
                let at = progress.due?;
                (!progress.is_new() && at.timestamp() <= now.timestamp())
                    .then(|| self.with_progress(user_id, card))
            })
            .collect();
        due.sort_by_key(|c| (c.progress.as_ref().and_then(|p| p.due), c.card.id));
        due
    }

    /// Never-rated cards matching `filter`, by frequency rank then id.
    fn new_matching<F>(&self, user_id: i64, limit: i64, filter: F) -> Vec<CardWithProgress>
    where
        F: Fn(&Card) -> bool,
    {
        let mut fresh: Vec<&Card> = self
            .cards
            .values()
            .filter(|card| filter(card) && self.is_new_for(user_id, card.id))
            .collect();
        fresh.sort_by_key(|card| (card.frequency_rank.is_none(), card.frequency_rank, card.id));
        fresh
            .into_iter()
            .take(clamp_limit(limit))
            .map(|card| self.with_progress(user_id, card))
            .collect()
    }

    fn grammar_of(&self, card_id: i64) -> Option<GrammarRule> {
        self.card_grammar
            .iter()
            .filter(|(card, _)| *card == card_id)
            .filter_map(|(_, rule_id)| self.grammar_rules.get(rule_id))
            .min_by_key(|rule| rule.id)
            .cloned()
    }

    fn user_mut(&mut self, user_id: i64) -> Result<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| ApiError::NotFound(format!("User {}", user_id)))
    }

    fn lesson_session_mut(&mut self, id: i64) -> Result<&mut LessonSession> {
        self.lesson_sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("Lesson session {}", id)))
    }

    fn song_session_mut(&mut self, id: i64) -> Result<&mut SongSession> {
        self.song_sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("Song session {}", id)))
    }
}

fn clamp_limit(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

fn write_stats(session: &mut SongSession, stats: &SongStats) {
    session.vocab_reviewed = stats.vocab_reviewed;
    session.vocab_correct = stats.vocab_correct;
    session.lines_studied = stats.lines_studied;
    session.blanks_correct = stats.blanks_correct;
    session.blanks_total = stats.blanks_total;
}

/// Store over maps guarded by a single lock, so each call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Store seeded like a freshly migrated database: user 1 and the badge catalogue.
    pub fn new() -> Self {
        let inner = Inner {
            users: BTreeMap::from([(
                1,
                User {
                    id: 1,
                    name: "Learner".to_string(),
                    total_xp: 0,
                    current_streak: 0,
                    longest_streak: 0,
                    last_active_date: None,
                },
            )]),
            achievements: default_achievements(),
            ..Default::default()
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Insert a card with an explicit creation time.
    pub async fn insert_card(&self, card: &NewCard, created_at: DateTime<Utc>) -> Card {
        let mut inner = self.inner.write().await;
        let card = Card {
            id: bump(&mut inner.seq.card),
            term: card.term.clone(),
            translation: card.translation.clone(),
            example: card.example.clone(),
            island_id: card.island_id,
            frequency_rank: card.frequency_rank,
            source: card.source,
            source_song_id: card.source_song_id,
            created_at,
        };
        inner.cards.insert(card.id, card.clone());
        card
    }

    pub async fn review_logs(&self) -> Vec<ReviewLog> {
        self.inner.read().await.review_logs.clone()
    }
}

/// The badge catalogue seeded by the initial migration.
pub fn default_achievements() -> Vec<Achievement> {
    let catalogue = [
        (1, "first_review", "First Steps", "Review your first card", "👣", AchievementKind::CardsReviewed, 1, 10),
        (2, "century", "Century", "Review 100 cards", "💯", AchievementKind::CardsReviewed, 100, 50),
        (3, "thousand_reviews", "Review Machine", "Review 1000 cards", "⚙️", AchievementKind::CardsReviewed, 1000, 200),
        (4, "streak_3", "On a Roll", "Keep a 3 day streak", "🔥", AchievementKind::Streak, 3, 30),
        (5, "streak_7", "Week Warrior", "Keep a 7 day streak", "🗓️", AchievementKind::Streak, 7, 100),
        (6, "streak_14", "Sprint Finisher", "Keep a 14 day streak", "🏁", AchievementKind::Streak, 14, 250),
        (7, "words_50", "Word Collector", "Learn 50 words", "📚", AchievementKind::WordsLearned, 50, 50),
        (8, "words_500", "Halfway There", "Learn 500 words", "🧭", AchievementKind::WordsLearned, 500, 200),
        (9, "words_1000", "Mil Palabras", "Learn 1000 words", "🏆", AchievementKind::WordsLearned, 1000, 500),
    ];
    catalogue
        .into_iter()
        .map(|(id, code, name, description, icon, kind, threshold, xp_reward)| Achievement {
            id,
            code: code.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            kind,
            threshold,
            xp_reward,
        })
        .collect()
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn get_card(&self, id: i64) -> Result<Option<Card>> {
        Ok(self.inner.read().await.cards.get(&id).cloned())
    }

    async fn create_card(&self, card: &NewCard) -> Result<Card> {
        Ok(self.insert_card(card, Utc::now()).await)
    }

    async fn update_card(&self, card: &Card) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .cards
            .get_mut(&card.id)
            .ok_or_else(|| ApiError::NotFound(format!("Card {}", card.id)))?;
        *stored = Card {
            created_at: stored.created_at,
            ..card.clone()
        };
        Ok(())
    }

    async fn update_card_example(&self, id: i64, example: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(card) = inner.cards.get_mut(&id) {
            card.example = Some(example.to_string());
        }
        Ok(())
    }

    async fn delete_card(&self, id: i64) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.cards.remove(&id).is_none() {
            return Ok(false);
        }
        inner.progress.retain(|(_, card_id), _| *card_id != id);
        inner.review_logs.retain(|log| log.card_id != id);
        inner.bridges.remove(&id);
        inner.questions.retain(|(card_id, _), _| *card_id != id);
        inner.card_grammar.retain(|(card_id, _)| *card_id != id);
        for vocab in inner.song_vocab.values_mut() {
            if vocab.card_id == Some(id) {
                vocab.card_id = None;
            }
        }
        Ok(true)
    }

    async fn search_cards(&self, query: &str, island: Option<i64>, limit: i64) -> Result<Vec<Card>> {
        let needle = query.to_lowercase();
        let inner = self.inner.read().await;
        let mut found: Vec<Card> = inner
            .cards
            .values()
            .filter(|card| island.map_or(true, |island| card.island_id == Some(island)))
            .filter(|card| {
                card.term.to_lowercase().contains(&needle)
                    || card.translation.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        found.sort_by_key(|card| (card.frequency_rank.is_none(), card.frequency_rank, card.id));
        found.truncate(clamp_limit(limit));
        Ok(found)
    }

    async fn list_cards(&self, limit: i64, offset: i64) -> Result<Vec<Card>> {
        let inner = self.inner.read().await;
        Ok(inner
            .cards
            .values()
            .skip(clamp_limit(offset))
            .take(clamp_limit(limit))
            .cloned()
            .collect())
    }

    async fn cards_by_island(&self, island: i64) -> Result<Vec<Card>> {
        let inner = self.inner.read().await;
        let mut cards: Vec<Card> = inner
            .cards
            .values()
            .filter(|card| card.island_id == Some(island))
            .cloned()
            .collect();
        cards.sort_by_key(|card| (card.frequency_rank.is_none(), card.frequency_rank, card.id));
        Ok(cards)
    }

    async fn count_cards(&self) -> Result<i64> {
        Ok(self.inner.read().await.cards.len() as i64)
    }

    async fn random_translations(&self, exclude: i64, n: usize) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let mut translations: Vec<String> = inner
            .cards
            .values()
            .filter(|card| card.id != exclude)
            .map(|card| card.translation.clone())
            .collect();
        translations.shuffle(&mut rand::rng());
        translations.truncate(n);
        Ok(translations)
    }

    async fn card_bridges(&self, card_id: i64) -> Result<Option<Bridges>> {
        Ok(self.inner.read().await.bridges.get(&card_id).cloned())
    }

    async fn save_bridges(&self, card_id: i64, bridges: &Bridges) -> Result<()> {
        self.inner.write().await.bridges.insert(card_id, bridges.clone());
        Ok(())
    }

    async fn cached_question(&self, card_id: i64, mode: PracticeMode) -> Result<Option<Question>> {
        Ok(self.inner.read().await.questions.get(&(card_id, mode)).cloned())
    }

    async fn save_question(&self, card_id: i64, question: &Question) -> Result<()> {
        self.inner
            .write()
            .await
            .questions
            .insert((card_id, question.mode()), question.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn get_progress(&self, user_id: i64, card_id: i64) -> Result<Option<CardProgress>> {
        Ok(self.inner.read().await.progress.get(&(user_id, card_id)).cloned())
    }

    async fn upsert_progress(&self, progress: &CardProgress) -> Result<()> {
        if progress.is_new() != progress.due.is_none() {
            return Err(ApiError::BadRequest(format!(
                "card {} is {} with due {:?}",
                progress.card_id, progress.state, progress.due
            )));
        }
        self.inner
            .write()
            .await
            .progress
            .insert((progress.user_id, progress.card_id), progress.clone());
        Ok(())
    }

    async fn due_cards(&self, user_id: i64, now: DateTime<Utc>, limit: i64) -> Result<Vec<CardWithProgress>> {
        let mut due = self.inner.read().await.due_of(user_id, CardSource::Curriculum, now);
        due.truncate(clamp_limit(limit));
        Ok(due)
    }

    async fn count_due(&self, user_id: i64, now: DateTime<Utc>) -> Result<i64> {
        Ok(self.inner.read().await.due_of(user_id, CardSource::Curriculum, now).len() as i64)
    }

    async fn new_cards(&self, user_id: i64, limit: i64) -> Result<Vec<CardWithProgress>> {
        let inner = self.inner.read().await;
        Ok(inner.new_matching(user_id, limit, |card| card.source == CardSource::Curriculum))
    }

    async fn new_cards_from_islands(
        &self,
        user_id: i64,
        islands: &[i64],
        limit: i64,
    ) -> Result<Vec<CardWithProgress>> {
        let inner = self.inner.read().await;
        Ok(inner.new_matching(user_id, limit, |card| {
            card.source == CardSource::Curriculum
                && card.island_id.is_some_and(|island| islands.contains(&island))
        }))
    }

    async fn cards_by_state(&self, user_id: i64, state: CardState, limit: i64) -> Result<Vec<CardWithProgress>> {
        let inner = self.inner.read().await;
        Ok(inner
            .cards
            .values()
            .map(|card| inner.with_progress(user_id, card))
            .filter(|card| card.state() == state)
            .take(clamp_limit(limit))
            .collect())
    }

    async fn recently_learned(&self, user_id: i64, limit: i64) -> Result<Vec<CardWithProgress>> {
        let inner = self.inner.read().await;
        let mut learned: Vec<CardWithProgress> = inner
            .cards
            .values()
            .map(|card| inner.with_progress(user_id, card))
            .filter(|card| {
                card.progress.as_ref().is_some_and(|p| {
                    matches!(p.state, CardState::Learning | CardState::Review) && p.last_review.is_some()
                })
            })
            .collect();
        learned.sort_by_key(|card| {
            std::cmp::Reverse((card.progress.as_ref().and_then(|p| p.last_review), card.card.id))
        });
        learned.truncate(clamp_limit(limit));
        Ok(learned)
    }

    async fn song_vocab_due(&self, user_id: i64, now: DateTime<Utc>, limit: i64) -> Result<Vec<CardWithProgress>> {
        let mut due = self.inner.read().await.due_of(user_id, CardSource::Song, now);
        due.truncate(clamp_limit(limit));
        Ok(due)
    }

    async fn song_vocab_new(&self, user_id: i64, song_ids: &[i64], limit: i64) -> Result<Vec<CardWithProgress>> {
        let inner = self.inner.read().await;
        let mut fresh: Vec<CardWithProgress> = inner
            .cards
            .values()
            .filter(|card| {
                card.source == CardSource::Song
                    && card.source_song_id.is_some_and(|song| song_ids.contains(&song))
                    && inner.is_new_for(user_id, card.id)
            })
            .map(|card| inner.with_progress(user_id, card))
            .collect();
        fresh.truncate(clamp_limit(limit));
        Ok(fresh)
    }

    async fn count_words_learned(&self, user_id: i64) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .progress
            .values()
            .filter(|p| {
                p.user_id == user_id
                    && p.reps > 0
                    && matches!(p.state, CardState::Learning | CardState::Review)
            })
            .count() as i64)
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn log_review(&self, log: &ReviewLog) -> Result<()> {
        self.inner.write().await.review_logs.push(log.clone());
        Ok(())
    }

    async fn count_reviews(&self, user_id: i64) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner.review_logs.iter().filter(|log| log.user_id == user_id).count() as i64)
    }

    async fn increment_daily(&self, user_id: i64, date: NaiveDate, delta: DailyDelta) -> Result<()> {
        let mut inner = self.inner.write().await;
        let log = inner.daily.entry((user_id, date)).or_insert_with(|| DailyLog {
            user_id,
            date,
            xp_earned: 0,
            cards_reviewed: 0,
            cards_correct: 0,
            new_cards_added: 0,
        });
        log.xp_earned += delta.xp_earned;
        log.cards_reviewed += delta.cards_reviewed;
        log.cards_correct += delta.cards_correct;
        log.new_cards_added += delta.new_cards_added;
        Ok(())
    }

    async fn daily_log(&self, user_id: i64, date: NaiveDate) -> Result<Option<DailyLog>> {
        Ok(self.inner.read().await.daily.get(&(user_id, date)).cloned())
    }

    async fn daily_logs_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<DailyLog>> {
        let inner = self.inner.read().await;
        Ok(inner
            .daily
            .values()
            .filter(|log| log.user_id == user_id && log.date >= since)
            .cloned()
            .collect())
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn add_xp(&self, user_id: i64, xp: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.user_mut(user_id)?.total_xp += xp;
        Ok(())
    }

    async fn update_streak(&self, user_id: i64, streak: StreakInfo) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner.user_mut(user_id)?;
        user.current_streak = streak.current_streak;
        user.longest_streak = streak.longest_streak;
        user.last_active_date = streak.last_active_date;
        Ok(())
    }

    async fn streak_info(&self, user_id: i64) -> Result<StreakInfo> {
        let inner = self.inner.read().await;
        inner
            .users
            .get(&user_id)
            .map(User::streak_info)
            .ok_or_else(|| ApiError::NotFound(format!("User {}", user_id)))
    }
}

#[async_trait]
impl JourneyStore for MemoryStore {
    async fn get_or_create_journey(&self, user_id: i64, today: NaiveDate) -> Result<Journey> {
        let mut inner = self.inner.write().await;
        if let Some(journey) = inner.journeys.iter().find(|j| j.user_id == user_id && j.is_active) {
            return Ok(journey.clone());
        }
        let journey = Journey {
            id: bump(&mut inner.seq.journey),
            user_id,
            start_date: today,
            is_active: true,
        };
        inner.journeys.push(journey.clone());
        Ok(journey)
    }

    async fn today_lesson_session(&self, user_id: i64, date: NaiveDate) -> Result<Option<LessonSession>> {
        let inner = self.inner.read().await;
        Ok(inner
            .lesson_sessions
            .iter()
            .find(|s| s.user_id == user_id && s.date == date)
            .cloned())
    }

    async fn create_lesson_session(
        &self,
        user_id: i64,
        date: NaiveDate,
        day_number: i64,
        phase_id: i64,
    ) -> Result<LessonSession> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .lesson_sessions
            .iter()
            .find(|s| s.user_id == user_id && s.date == date)
        {
            return Ok(existing.clone());
        }
        let session = LessonSession {
            id: bump(&mut inner.seq.lesson_session),
            user_id,
            date,
            day_number,
            phase_id,
            cards_reviewed: 0,
            cards_correct: 0,
            new_cards_learned: 0,
            xp_earned: 0,
            completed_at: None,
        };
        inner.lesson_sessions.push(session.clone());
        Ok(session)
    }

    async fn update_lesson_session(&self, id: i64, totals: LessonTotals) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner.lesson_session_mut(id)?;
        session.cards_reviewed = totals.cards_reviewed;
        session.cards_correct = totals.cards_correct;
        session.new_cards_learned = totals.new_cards_learned;
        session.xp_earned = totals.xp_earned;
        Ok(())
    }

    async fn complete_lesson_session(&self, id: i64, totals: LessonTotals, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let session = inner.lesson_session_mut(id)?;
        if session.completed_at.is_some() {
            return Ok(false);
        }
        session.cards_reviewed = totals.cards_reviewed;
        session.cards_correct = totals.cards_correct;
        session.new_cards_learned = totals.new_cards_learned;
        session.xp_earned = totals.xp_earned;
        session.completed_at = Some(now);
        Ok(true)
    }

    async fn recent_lesson_sessions(&self, user_id: i64, limit: i64) -> Result<Vec<LessonSession>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<LessonSession> = inner
            .lesson_sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.date));
        sessions.truncate(clamp_limit(limit));
        Ok(sessions)
    }
}

#[async_trait]
impl SongStore for MemoryStore {
    async fn create_song(&self, song: &NewSong, now: DateTime<Utc>) -> Result<Song> {
        let mut inner = self.inner.write().await;
        let created = Song {
            id: bump(&mut inner.seq.song),
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            duration_secs: song.duration_secs,
            audio_path: song.audio_path.clone(),
            created_at: now,
        };
        inner.songs.insert(created.id, created.clone());
        for vocab in &song.vocabulary {
            let id = bump(&mut inner.seq.song_vocab);
            inner.song_vocab.insert(
                id,
                SongVocab {
                    id,
                    song_id: created.id,
                    word: vocab.word.clone(),
                    translation: vocab.translation.clone(),
                    is_key: vocab.is_key,
                    card_id: None,
                },
            );
        }
        Ok(created)
    }

    async fn list_songs(&self) -> Result<Vec<Song>> {
        Ok(self.inner.read().await.songs.values().cloned().collect())
    }

    async fn get_song(&self, id: i64) -> Result<Option<Song>> {
        Ok(self.inner.read().await.songs.get(&id).cloned())
    }

    async fn get_song_with_details(&self, id: i64) -> Result<Option<SongDetails>> {
        let inner = self.inner.read().await;
        let Some(song) = inner.songs.get(&id).cloned() else {
            return Ok(None);
        };
        Ok(Some(SongDetails {
            song,
            lines: inner.song_lines.get(&id).cloned().unwrap_or_default(),
            vocabulary: inner
                .song_vocab
                .values()
                .filter(|v| v.song_id == id)
                .cloned()
                .collect(),
        }))
    }

    async fn song_lines(&self, song_id: i64) -> Result<Vec<SongLine>> {
        Ok(self
            .inner
            .read()
            .await
            .song_lines
            .get(&song_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_song_lines(&self, song_id: i64, lines: &[NewSongLine]) -> Result<Vec<SongLine>> {
        let mut inner = self.inner.write().await;
        if !inner.songs.contains_key(&song_id) {
            return Err(ApiError::NotFound(format!("Song {}", song_id)));
        }
        let mut stored = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            stored.push(SongLine {
                id: bump(&mut inner.seq.song_line),
                song_id,
                line_number: index as i64 + 1,
                start_time_ms: line.start_time_ms,
                end_time_ms: line.end_time_ms,
                spanish_text: line.spanish_text.clone(),
                english_text: line.english_text.clone(),
            });
        }
        inner.song_lines.insert(song_id, stored.clone());
        Ok(stored)
    }

    async fn song_vocabulary(&self, song_id: i64, key_only: bool) -> Result<Vec<SongVocab>> {
        let inner = self.inner.read().await;
        Ok(inner
            .song_vocab
            .values()
            .filter(|v| v.song_id == song_id && (!key_only || v.is_key))
            .cloned()
            .collect())
    }

    async fn add_song_vocab(&self, song_id: i64, vocab: &NewSongVocab) -> Result<SongVocab> {
        let mut inner = self.inner.write().await;
        let created = SongVocab {
            id: bump(&mut inner.seq.song_vocab),
            song_id,
            word: vocab.word.clone(),
            translation: vocab.translation.clone(),
            is_key: vocab.is_key,
            card_id: None,
        };
        inner.song_vocab.insert(created.id, created.clone());
        Ok(created)
    }

    async fn unlinked_song_vocab(&self, song_id: i64) -> Result<Vec<SongVocab>> {
        let inner = self.inner.read().await;
        Ok(inner
            .song_vocab
            .values()
            .filter(|v| v.song_id == song_id && v.card_id.is_none())
            .cloned()
            .collect())
    }

    async fn link_song_vocab_to_card(&self, vocab_id: i64, card_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(vocab) = inner.song_vocab.get_mut(&vocab_id) {
            vocab.card_id = Some(card_id);
        }
        Ok(())
    }

    async fn get_or_create_song_progress(&self, user_id: i64, song_id: i64) -> Result<SongProgress> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .song_progress
            .entry((user_id, song_id))
            .or_insert_with(|| SongProgress::new(user_id, song_id))
            .clone())
    }

    async fn upsert_song_progress(&self, progress: &SongProgress) -> Result<()> {
        self.inner
            .write()
            .await
            .song_progress
            .insert((progress.user_id, progress.song_id), progress.clone());
        Ok(())
    }

    async fn increment_listen_count(&self, user_id: i64, song_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .song_progress
            .entry((user_id, song_id))
            .or_insert_with(|| SongProgress::new(user_id, song_id))
            .total_listens += 1;
        Ok(())
    }

    async fn due_songs(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Song>> {
        let inner = self.inner.read().await;
        let mut due: Vec<(Option<DateTime<Utc>>, Song)> = inner
            .songs
            .values()
            .filter_map(|song| {
                let progress = inner.song_progress.get(&(user_id, song.id))?;
                progress.is_due(now).then(|| (progress.due, song.clone()))
            })
            .collect();
        due.sort_by_key(|(at, song)| (*at, song.id));
        Ok(due.into_iter().map(|(_, song)| song).collect())
    }

    async fn songs_with_progress(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<SongWithProgress>> {
        let inner = self.inner.read().await;
        Ok(inner
            .songs
            .values()
            .map(|song| {
                let progress = inner.song_progress.get(&(user_id, song.id)).cloned();
                let is_due = progress.as_ref().is_some_and(|p| p.is_due(now));
                SongWithProgress {
                    song: song.clone(),
                    progress,
                    is_due,
                }
            })
            .collect())
    }

    async fn songs_in_progress(&self, user_id: i64) -> Result<Vec<i64>> {
        let inner = self.inner.read().await;
        let mut studied: Vec<&SongProgress> = inner
            .song_progress
            .values()
            .filter(|p| p.user_id == user_id && p.reps > 0)
            .collect();
        studied.sort_by_key(|p| std::cmp::Reverse((p.last_review, p.song_id)));
        Ok(studied.into_iter().map(|p| p.song_id).collect())
    }

    async fn create_song_session(
        &self,
        user_id: i64,
        song_id: i64,
        date: NaiveDate,
        mode: SongMode,
    ) -> Result<SongSession> {
        let mut inner = self.inner.write().await;
        let session = SongSession {
            id: bump(&mut inner.seq.song_session),
            user_id,
            song_id,
            date,
            mode,
            vocab_reviewed: 0,
            vocab_correct: 0,
            lines_studied: 0,
            blanks_correct: 0,
            blanks_total: 0,
            xp_earned: 0,
            completed_at: None,
        };
        inner.song_sessions.push(session.clone());
        Ok(session)
    }

    async fn update_song_session(&self, id: i64, stats: &SongStats) -> Result<()> {
        let mut inner = self.inner.write().await;
        write_stats(inner.song_session_mut(id)?, stats);
        Ok(())
    }

    async fn complete_song_session(
        &self,
        id: i64,
        stats: &SongStats,
        xp: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let session = inner.song_session_mut(id)?;
        if session.completed_at.is_some() {
            return Ok(false);
        }
        write_stats(session, stats);
        session.xp_earned = xp;
        session.completed_at = Some(now);
        Ok(true)
    }

    async fn song_titles(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.songs.get(id).map(|song| (*id, song.title.clone())))
            .collect())
    }
}

#[async_trait]
impl AchievementStore for MemoryStore {
    async fn all_achievements(&self) -> Result<Vec<Achievement>> {
        Ok(self.inner.read().await.achievements.clone())
    }

    async fn user_achievements(&self, user_id: i64) -> Result<Vec<EarnedAchievement>> {
        let inner = self.inner.read().await;
        Ok(inner
            .earned
            .iter()
            .filter(|(user, _, _)| *user == user_id)
            .filter_map(|(_, achievement_id, earned_at)| {
                inner
                    .achievements
                    .iter()
                    .find(|a| a.id == *achievement_id)
                    .map(|achievement| EarnedAchievement {
                        achievement: achievement.clone(),
                        earned_at: *earned_at,
                    })
            })
            .collect())
    }

    async fn award_achievement(&self, user_id: i64, achievement_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner
            .earned
            .iter()
            .any(|(user, id, _)| *user == user_id && *id == achievement_id)
        {
            return Ok(false);
        }
        inner.earned.push((user_id, achievement_id, now));
        Ok(true)
    }

    async fn count_earned(&self, user_id: i64) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner.earned.iter().filter(|(user, _, _)| *user == user_id).count() as i64)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn user_settings(&self, user_id: i64) -> Result<UserSettings> {
        let inner = self.inner.read().await;
        Ok(inner.settings.get(&user_id).cloned().unwrap_or_default())
    }

    async fn save_user_settings(&self, user_id: i64, settings: &UserSettings) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.user_mut(user_id)?;
        inner.settings.insert(user_id, settings.clone());
        Ok(())
    }
}

#[async_trait]
impl GrammarStore for MemoryStore {
    async fn save_grammar_rule(&self, rule: &NewGrammarRule, now: DateTime<Utc>) -> Result<GrammarRule> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .grammar_rules
            .values()
            .find(|r| r.rule_key == rule.rule_key)
            .map(|r| (r.id, r.created_at));
        let (id, created_at) = match existing {
            Some(found) => found,
            None => (bump(&mut inner.seq.grammar_rule), now),
        };
        let stored = GrammarRule {
            id,
            rule_key: rule.rule_key.clone(),
            title: rule.title.clone(),
            explanation: rule.explanation.clone(),
            examples: rule.examples.clone(),
            difficulty: rule.difficulty,
            created_at,
        };
        inner.grammar_rules.insert(id, stored.clone());
        Ok(stored)
    }

    async fn link_card_grammar(&self, card_id: i64, rule_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.cards.contains_key(&card_id) {
            return Err(ApiError::NotFound(format!("Card {}", card_id)));
        }
        if !inner.grammar_rules.contains_key(&rule_id) {
            return Err(ApiError::NotFound(format!("Grammar rule {}", rule_id)));
        }
        if !inner.card_grammar.contains(&(card_id, rule_id)) {
            inner.card_grammar.push((card_id, rule_id));
        }
        Ok(())
    }

    async fn grammar_for_card(&self, card_id: i64) -> Result<Option<GrammarRule>> {
        Ok(self.inner.read().await.grammar_of(card_id))
    }

    async fn grammar_for_cards(&self, card_ids: &[i64]) -> Result<HashMap<i64, GrammarRule>> {
        let inner = self.inner.read().await;
        Ok(card_ids
            .iter()
            .filter_map(|id| inner.grammar_of(*id).map(|rule| (*id, rule)))
            .collect())
    }

    async fn grammar_rule_by_key(&self, rule_key: &str) -> Result<Option<GrammarRule>> {
        let inner = self.inner.read().await;
        Ok(inner
            .grammar_rules
            .values()
            .find(|r| r.rule_key == rule_key)
            .cloned())
    }

    async fn all_grammar_rules(&self) -> Result<Vec<GrammarRule>> {
        let inner = self.inner.read().await;
        let mut rules: Vec<GrammarRule> = inner.grammar_rules.values().cloned().collect();
        rules.sort_by(|a, b| a.difficulty.cmp(&b.difficulty).then_with(|| a.title.cmp(&b.title)));
        Ok(rules)
    }

    async fn cards_for_grammar_rule(&self, rule_id: i64) -> Result<Vec<Card>> {
        let inner = self.inner.read().await;
        let mut cards: Vec<Card> = inner
            .card_grammar
            .iter()
            .filter(|(_, rule)| *rule == rule_id)
            .filter_map(|(card_id, _)| inner.cards.get(card_id).cloned())
            .collect();
        cards.sort_by_key(|c| (c.frequency_rank.is_none(), c.frequency_rank, c.id));
        Ok(cards)
    }
}
