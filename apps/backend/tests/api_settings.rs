//! Settings endpoint tests and the places that read the learner's settings.

mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::fixtures;
use common::TestContext;
use palabra_backend::models::*;
use palabra_backend::services::{composer, runner};
use palabra_backend::store::{CardStore, SettingsStore};

#[tokio::test]
async fn test_get_default_settings() {
    let ctx = TestContext::new();
    let body: serde_json::Value = ctx.server().get("/api/settings").await.json();

    assert_eq!(body["daily_goal"], 50);
    assert_eq!(body["new_cards_per_day"], serde_json::Value::Null);
    assert_eq!(body["reviews_per_session"], 20);
    assert_eq!(body["default_mode"], "standard");
    assert_eq!(body["target_retention"], serde_json::Value::Null);
    assert_eq!(body["enable_tts"], true);
    assert_eq!(body["show_bridges"], true);
}

#[tokio::test]
async fn test_update_settings_partially() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .put("/api/settings")
        .json(&json!({ "daily_goal": 20, "default_mode": "typing", "enable_tts": false }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["daily_goal"], 20);
    assert_eq!(body["default_mode"], "typing");

    let stored = ctx.store.user_settings(ctx.user_id()).await.unwrap();
    assert_eq!(
        stored,
        UserSettings {
            daily_goal: 20,
            default_mode: PracticeMode::Typing,
            enable_tts: false,
            ..UserSettings::default()
        }
    );
}

/// An explicit null clears an override; a missing field leaves it alone.
#[tokio::test]
async fn test_null_clears_an_override() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .put("/api/settings")
        .json(&json!({ "new_cards_per_day": 10, "target_retention": 0.85 }))
        .await
        .assert_status_ok();
    let body: serde_json::Value = server
        .put("/api/settings")
        .json(&json!({ "daily_goal": 30 }))
        .await
        .json();
    assert_eq!(body["new_cards_per_day"], 10);
    assert_eq!(body["target_retention"], 0.85);

    let body: serde_json::Value = server
        .put("/api/settings")
        .json(&json!({ "new_cards_per_day": null }))
        .await
        .json();
    assert_eq!(body["new_cards_per_day"], serde_json::Value::Null);
    assert_eq!(body["target_retention"], 0.85);
    assert_eq!(body["daily_goal"], 30);
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for body in [
        json!({ "daily_goal": 0 }),
        json!({ "reviews_per_session": -5 }),
        json!({ "new_cards_per_day": 0 }),
        json!({ "target_retention": 1.5 }),
        json!({ "default_mode": "dance" }),
    ] {
        server
            .put("/api/settings")
            .json(&body)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    let stored = ctx.store.user_settings(ctx.user_id()).await.unwrap();
    assert_eq!(stored, UserSettings::default());
}

#[tokio::test]
async fn test_daily_goal_drives_stats() {
    let ctx = TestContext::new();
    ctx.seed_island(1, 3, 1).await;
    let server = ctx.server();
    server
        .put("/api/settings")
        .json(&json!({ "daily_goal": 10 }))
        .await
        .assert_status_ok();

    let mut step = runner::start(&ctx.state, ctx.user_id()).await.unwrap();
    while let LessonStep::Card(view) = step {
        let card_id = view.card.card.card.id;
        step = runner::review(&ctx.state, ctx.user_id(), fixtures::review(card_id, 3))
            .await
            .unwrap();
    }

    let body: serde_json::Value = server.get("/api/stats").await.json();
    assert_eq!(body["daily_goal"], 10);
    assert_eq!(body["daily_goal_percent"], 30.0);
}

#[tokio::test]
async fn test_new_card_allowance_limits_the_lesson() {
    let ctx = TestContext::new();
    ctx.seed_island(1, 30, 1).await;
    ctx.store
        .save_user_settings(
            ctx.user_id(),
            &UserSettings {
                new_cards_per_day: Some(10),
                ..UserSettings::default()
            },
        )
        .await
        .unwrap();

    let lesson = composer::compose_today(&ctx.state, ctx.user_id()).await.unwrap();
    assert_eq!(lesson.new_card_count, 10);
    assert_eq!(lesson.cards.len(), 10);
}

#[tokio::test]
async fn test_hidden_bridges_stay_out_of_the_card_view() {
    let ctx = TestContext::new();
    let cards = ctx.seed_island(1, 2, 1).await;
    for card in &cards {
        ctx.store
            .save_bridges(
                card.id,
                &Bridges {
                    hindi: None,
                    dutch: Some(format!("{} in Dutch", card.term)),
                    english: None,
                },
            )
            .await
            .unwrap();
    }

    let LessonStep::Card(view) = runner::start(&ctx.state, ctx.user_id()).await.unwrap() else {
        panic!("expected a card");
    };
    assert!(view.bridges.is_some());

    ctx.server()
        .put("/api/settings")
        .json(&json!({ "show_bridges": false }))
        .await
        .assert_status_ok();
    let view = runner::current(&ctx.state, ctx.user_id()).await.unwrap();
    assert!(view.bridges.is_none());
}

/// A lower target retention stretches the intervals offered for a new card.
#[tokio::test]
async fn test_retention_override_reaches_the_scheduler() {
    let ctx = TestContext::new();
    ctx.seed_island(1, 1, 1).await;

    let LessonStep::Card(view) = runner::start(&ctx.state, ctx.user_id()).await.unwrap() else {
        panic!("expected a card");
    };
    let default_easy = view.preview[&Rating::Easy].interval_days;

    ctx.server()
        .put("/api/settings")
        .json(&json!({ "target_retention": 0.8 }))
        .await
        .assert_status_ok();
    let view = runner::current(&ctx.state, ctx.user_id()).await.unwrap();
    assert!(view.preview[&Rating::Easy].interval_days > default_easy);
}
