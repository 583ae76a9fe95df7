//! SQLite repository tests against an in-memory database.

mod common;

use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use common::fixtures;
use palabra_backend::db::Database;
use palabra_backend::models::*;
use palabra_backend::store::{
    AchievementStore, ActivityStore, CardStore, GrammarStore, JourneyStore, ProgressStore,
    SettingsStore, SongStore,
};

async fn setup_db() -> Database {
    let db = Database::connect_with("sqlite::memory:", 1).await.unwrap();
    db.run_migrations().await.unwrap();
    db
}

async fn seed_cards(db: &Database, island: i64, count: i64, first_rank: i64) -> Vec<Card> {
    let mut cards = Vec::new();
    for rank in first_rank..first_rank + count {
        cards.push(db.create_card(&fixtures::curriculum_card(island, rank)).await.unwrap());
    }
    cards
}

fn reviewed(user_id: i64, card_id: i64, due: chrono::DateTime<chrono::Utc>) -> CardProgress {
    CardProgress {
        stability: 3.0,
        difficulty: 5.0,
        scheduled_days: 3,
        reps: 2,
        state: CardState::Review,
        due: Some(due),
        last_review: Some(due - Duration::days(3)),
        ..CardProgress::new(user_id, card_id)
    }
}

#[tokio::test]
async fn test_migration_seeds_learner_and_badges() {
    let db = setup_db().await;

    let user = db.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.name, "Learner");
    assert_eq!(user.total_xp, 0);
    assert_eq!(user.last_active_date, None);

    let achievements = db.all_achievements().await.unwrap();
    assert_eq!(achievements, palabra_backend::store::memory::default_achievements());
}

#[tokio::test]
async fn test_card_crud_and_search() {
    let db = setup_db().await;
    let cards = seed_cards(&db, 1, 3, 10).await;
    db.create_card(&NewCard {
        term: "corazón".into(),
        translation: "heart".into(),
        island_id: Some(2),
        frequency_rank: Some(1),
        ..Default::default()
    })
    .await
    .unwrap();

    let fetched = db.get_card(cards[0].id).await.unwrap().unwrap();
    assert_eq!(fetched, cards[0]);
    assert_eq!(db.count_cards().await.unwrap(), 4);

    let found = db.search_cards("HEART", None, 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].term, "corazón");

    let island_one = db.search_cards("", Some(1), 10).await.unwrap();
    let ranks: Vec<Option<i64>> = island_one.iter().map(|c| c.frequency_rank).collect();
    assert_eq!(ranks, vec![Some(10), Some(11), Some(12)]);

    let page = db.list_cards(2, 1).await.unwrap();
    assert_eq!(page.iter().map(|c| c.id).collect::<Vec<_>>(), vec![cards[1].id, cards[2].id]);

    db.update_card_example(cards[0].id, "Una palabra10 aquí.").await.unwrap();
    let updated = db.get_card(cards[0].id).await.unwrap().unwrap();
    assert_eq!(updated.example.as_deref(), Some("Una palabra10 aquí."));

    let translations = db.random_translations(cards[0].id, 5).await.unwrap();
    assert_eq!(translations.len(), 3);
    assert!(!translations.contains(&cards[0].translation));
}

#[tokio::test]
async fn test_delete_card_removes_dependents() {
    let db = setup_db().await;
    let card = seed_cards(&db, 1, 1, 1).await.remove(0);
    let now = fixtures::start_time();

    db.upsert_progress(&reviewed(1, card.id, now)).await.unwrap();
    db.log_review(&ReviewLog {
        user_id: 1,
        card_id: card.id,
        rating: Rating::Good,
        elapsed_days: 0,
        scheduled_days: 0,
        duration_ms: 1500,
        reviewed_at: now,
    })
    .await
    .unwrap();
    db.save_bridges(
        card.id,
        &Bridges {
            english: Some("sounds like paleta".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(db.delete_card(card.id).await.unwrap());
    assert!(!db.delete_card(card.id).await.unwrap());
    assert!(db.get_progress(1, card.id).await.unwrap().is_none());
    assert!(db.card_bridges(card.id).await.unwrap().is_none());
    assert_eq!(db.count_reviews(1).await.unwrap(), 0);
}

#[tokio::test]
async fn test_bridges_and_question_cache() {
    let db = setup_db().await;
    let card = seed_cards(&db, 1, 1, 1).await.remove(0);

    let bridges = Bridges {
        hindi: None,
        dutch: Some("lijkt op paleis".into()),
        english: Some("like palace".into()),
    };
    db.save_bridges(card.id, &bridges).await.unwrap();
    assert_eq!(db.card_bridges(card.id).await.unwrap(), Some(bridges));

    assert!(db.cached_question(card.id, PracticeMode::Mcq).await.unwrap().is_none());
    let question = Question::fallback(
        PracticeMode::Mcq,
        &card,
        &["dog".to_string(), "house".to_string()],
        &mut StdRng::seed_from_u64(7),
    )
    .unwrap();
    db.save_question(card.id, &question).await.unwrap();

    assert_eq!(db.cached_question(card.id, PracticeMode::Mcq).await.unwrap(), Some(question));
    assert!(db.cached_question(card.id, PracticeMode::FillBlank).await.unwrap().is_none());
}

#[tokio::test]
async fn test_due_and_new_card_queries() {
    let db = setup_db().await;
    let now = fixtures::start_time();
    let island_one = seed_cards(&db, 1, 4, 1).await;
    seed_cards(&db, 4, 2, 100).await;

    db.upsert_progress(&reviewed(1, island_one[0].id, now - Duration::days(2)))
        .await
        .unwrap();
    db.upsert_progress(&reviewed(1, island_one[1].id, now - Duration::hours(1)))
        .await
        .unwrap();
    db.upsert_progress(&reviewed(1, island_one[2].id, now + Duration::days(1)))
        .await
        .unwrap();

    let due = db.due_cards(1, now, 10).await.unwrap();
    let due_ids: Vec<i64> = due.iter().map(|c| c.card.id).collect();
    assert_eq!(due_ids, vec![island_one[0].id, island_one[1].id]);
    assert!(due.iter().all(|c| c.progress.is_some()));
    assert_eq!(db.count_due(1, now).await.unwrap(), 2);
    assert_eq!(db.due_cards(1, now, 1).await.unwrap().len(), 1);

    let fresh = db.new_cards_from_islands(1, &[1, 2, 3], 10).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].card.id, island_one[3].id);
    assert!(fresh[0].progress.is_none());

    let all_new = db.new_cards(1, 10).await.unwrap();
    let ranks: Vec<Option<i64>> = all_new.iter().map(|c| c.card.frequency_rank).collect();
    assert_eq!(ranks, vec![Some(4), Some(100), Some(101)]);

    assert!(db.new_cards_from_islands(1, &[], 10).await.unwrap().is_empty());
    assert_eq!(db.count_words_learned(1).await.unwrap(), 3);

    let stored = db.get_progress(1, island_one[0].id).await.unwrap().unwrap();
    assert_eq!(stored, reviewed(1, island_one[0].id, now - Duration::days(2)));
}

#[tokio::test]
async fn test_daily_counters_and_streak() {
    let db = setup_db().await;
    let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

    db.increment_daily(1, day, DailyDelta::for_review(Rating::Good, true, 6))
        .await
        .unwrap();
    db.increment_daily(1, day, DailyDelta::for_review(Rating::Again, false, 2))
        .await
        .unwrap();
    db.increment_daily(1, day, DailyDelta::xp_only(30)).await.unwrap();

    let log = db.daily_log(1, day).await.unwrap().unwrap();
    assert_eq!(log.xp_earned, 38);
    assert_eq!(log.cards_reviewed, 2);
    assert_eq!(log.cards_correct, 1);
    assert_eq!(log.new_cards_added, 1);
    assert!(db.daily_log(1, day.succ_opt().unwrap()).await.unwrap().is_none());
    assert_eq!(db.daily_logs_since(1, day).await.unwrap().len(), 1);

    let streak = StreakInfo {
        current_streak: 4,
        longest_streak: 9,
        last_active_date: Some(day),
    };
    db.update_streak(1, streak).await.unwrap();
    assert_eq!(db.streak_info(1).await.unwrap(), streak);

    db.add_xp(1, 38).await.unwrap();
    assert_eq!(db.get_user(1).await.unwrap().unwrap().total_xp, 38);
}

#[tokio::test]
async fn test_journey_and_lesson_session_lifecycle() {
    let db = setup_db().await;
    let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let now = fixtures::start_time();

    let journey = db.get_or_create_journey(1, day).await.unwrap();
    assert_eq!(journey.start_date, day);
    let again = db.get_or_create_journey(1, day + Duration::days(3)).await.unwrap();
    assert_eq!(again, journey);

    assert!(db.today_lesson_session(1, day).await.unwrap().is_none());
    let session = db.create_lesson_session(1, day, 1, 1).await.unwrap();
    assert!(!session.is_completed());

    let running = LessonTotals {
        cards_reviewed: 2,
        cards_correct: 1,
        new_cards_learned: 1,
        xp_earned: 8,
    };
    db.update_lesson_session(session.id, running).await.unwrap();
    assert_eq!(db.today_lesson_session(1, day).await.unwrap().unwrap().totals(), running);

    let done = LessonTotals {
        cards_reviewed: 3,
        ..running
    };
    assert!(db.complete_lesson_session(session.id, done, now).await.unwrap());
    let later = LessonTotals {
        cards_reviewed: 10,
        ..running
    };
    assert!(!db
        .complete_lesson_session(session.id, later, now + Duration::hours(1))
        .await
        .unwrap());

    let stored = db.today_lesson_session(1, day).await.unwrap().unwrap();
    assert_eq!(stored.totals(), done);
    assert_eq!(stored.completed_at, Some(now));
    assert_eq!(db.recent_lesson_sessions(1, 5).await.unwrap(), vec![stored]);
}

#[tokio::test]
async fn test_song_storage_round_trip() {
    let db = setup_db().await;
    let now = fixtures::start_time();

    let song = db.create_song(&fixtures::sample_song(), now).await.unwrap();
    assert_eq!(song.title, "Canción de Prueba");
    let lines = db.replace_song_lines(song.id, &fixtures::sample_lines()).await.unwrap();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[5].line_number, 6);

    // Replacing keeps only the new lines.
    let shorter = db
        .replace_song_lines(song.id, &fixtures::sample_lines()[..2])
        .await
        .unwrap();
    assert_eq!(db.song_lines(song.id).await.unwrap(), shorter);

    let details = db.get_song_with_details(song.id).await.unwrap().unwrap();
    assert_eq!(details.vocabulary.len(), 9);
    assert_eq!(db.song_vocabulary(song.id, true).await.unwrap().len(), 4);

    let unlinked = db.unlinked_song_vocab(song.id).await.unwrap();
    let card = db
        .create_card(&NewCard {
            term: unlinked[0].word.clone(),
            translation: unlinked[0].translation.clone(),
            source: CardSource::Song,
            source_song_id: Some(song.id),
            ..Default::default()
        })
        .await
        .unwrap();
    db.link_song_vocab_to_card(unlinked[0].id, card.id).await.unwrap();
    assert_eq!(db.unlinked_song_vocab(song.id).await.unwrap().len(), 8);

    let titles = db.song_titles(&[song.id, 999]).await.unwrap();
    assert_eq!(titles.get(&song.id).map(String::as_str), Some("Canción de Prueba"));
    assert_eq!(titles.len(), 1);
}

#[tokio::test]
async fn test_song_progress_and_sessions() {
    let db = setup_db().await;
    let now = fixtures::start_time();
    let song = db.create_song(&fixtures::sample_song(), now).await.unwrap();

    let progress = db.get_or_create_song_progress(1, song.id).await.unwrap();
    assert_eq!(progress.reps, 0);
    assert_eq!(progress.state, CardState::New);
    assert!(db.due_songs(1, now).await.unwrap().is_empty());
    assert!(db.songs_in_progress(1).await.unwrap().is_empty());

    db.increment_listen_count(1, song.id).await.unwrap();
    db.increment_listen_count(1, song.id).await.unwrap();
    let listened = db.get_or_create_song_progress(1, song.id).await.unwrap();
    assert_eq!(listened.total_listens, 2);

    let studied = SongProgress {
        stability: 1.0,
        reps: 1,
        state: CardState::Review,
        due: Some(now + Duration::days(1)),
        last_review: Some(now),
        vocab_complete: true,
        ..listened
    };
    db.upsert_song_progress(&studied).await.unwrap();
    assert_eq!(db.get_or_create_song_progress(1, song.id).await.unwrap(), studied);
    assert_eq!(db.songs_in_progress(1).await.unwrap(), vec![song.id]);
    assert!(db.due_songs(1, now).await.unwrap().is_empty());
    let due = db.due_songs(1, now + Duration::days(2)).await.unwrap();
    assert_eq!(due.iter().map(|s| s.id).collect::<Vec<_>>(), vec![song.id]);

    let listing = db.songs_with_progress(1, now + Duration::days(2)).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert!(listing[0].is_due);

    let day = now.date_naive();
    let session = db.create_song_session(1, song.id, day, SongMode::Full).await.unwrap();
    let stats = SongStats {
        vocab_reviewed: 4,
        vocab_correct: 4,
        lines_studied: 6,
        blanks_correct: 7,
        blanks_total: 8,
    };
    db.update_song_session(session.id, &stats).await.unwrap();
    assert!(db.complete_song_session(session.id, &stats, 53, now).await.unwrap());
    assert!(!db.complete_song_session(session.id, &stats, 53, now).await.unwrap());
}

#[tokio::test]
async fn test_achievement_awards_are_unique() {
    let db = setup_db().await;
    let now = fixtures::start_time();

    assert!(db.award_achievement(1, 1, now).await.unwrap());
    assert!(!db.award_achievement(1, 1, now + Duration::hours(1)).await.unwrap());
    assert_eq!(db.count_earned(1).await.unwrap(), 1);

    let earned = db.user_achievements(1).await.unwrap();
    assert_eq!(earned.len(), 1);
    assert_eq!(earned[0].achievement.code, "first_review");
    assert_eq!(earned[0].earned_at, now);
}

#[tokio::test]
async fn test_settings_round_trip() {
    let db = setup_db().await;
    assert_eq!(db.user_settings(1).await.unwrap(), UserSettings::default());

    let settings = UserSettings {
        daily_goal: 80,
        new_cards_per_day: Some(15),
        reviews_per_session: 30,
        default_mode: PracticeMode::FillBlank,
        target_retention: Some(0.85),
        enable_tts: false,
        show_bridges: false,
    };
    db.save_user_settings(1, &settings).await.unwrap();
    assert_eq!(db.user_settings(1).await.unwrap(), settings);

    let cleared = UserSettings {
        new_cards_per_day: None,
        target_retention: None,
        ..settings
    };
    db.save_user_settings(1, &cleared).await.unwrap();
    assert_eq!(db.user_settings(1).await.unwrap(), cleared);
}

#[tokio::test]
async fn test_grammar_rules_link_to_cards() {
    let db = setup_db().await;
    let cards = seed_cards(&db, 1, 3, 1).await;
    let now = fixtures::start_time();
    let rule = NewGrammarRule {
        rule_key: "gender".into(),
        title: "Noun gender".into(),
        explanation: "Nouns are masculine or feminine.".into(),
        examples: vec![GrammarExample {
            spanish: "la casa".into(),
            english: "the house".into(),
        }],
        difficulty: 1,
    };

    let stored = db.save_grammar_rule(&rule, now).await.unwrap();
    assert_eq!(stored.examples, rule.examples);
    let updated = db
        .save_grammar_rule(
            &NewGrammarRule {
                title: "Gender of nouns".into(),
                ..rule.clone()
            },
            now + Duration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(updated.id, stored.id);
    assert_eq!(updated.title, "Gender of nouns");
    assert_eq!(updated.created_at, now);

    db.link_card_grammar(cards[0].id, stored.id).await.unwrap();
    db.link_card_grammar(cards[0].id, stored.id).await.unwrap();
    db.link_card_grammar(cards[2].id, stored.id).await.unwrap();

    let linked = db.grammar_for_card(cards[0].id).await.unwrap().unwrap();
    assert_eq!(linked.rule_key, "gender");
    assert!(db.grammar_for_card(cards[1].id).await.unwrap().is_none());

    let ids: Vec<i64> = cards.iter().map(|c| c.id).collect();
    let by_card = db.grammar_for_cards(&ids).await.unwrap();
    assert_eq!(by_card.len(), 2);
    assert!(by_card.contains_key(&cards[2].id));

    let by_key = db.grammar_rule_by_key("gender").await.unwrap().unwrap();
    assert_eq!(by_key, updated);
    assert_eq!(db.all_grammar_rules().await.unwrap(), vec![updated]);

    assert!(db.delete_card(cards[0].id).await.unwrap());
    let remaining = db.cards_for_grammar_rule(stored.id).await.unwrap();
    assert_eq!(remaining.iter().map(|c| c.id).collect::<Vec<_>>(), vec![cards[2].id]);
}
