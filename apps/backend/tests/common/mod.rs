//! Common test utilities and fixtures for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - TestContext over an in-memory store and a settable clock
//! - Helpers for seeding cards and songs
//! - Stub enrichment and lyrics clients

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;

use axum_test::TestServer;
use chrono::{DateTime, Duration, Utc};

use palabra_backend::clock::{Clock, FixedClock};
use palabra_backend::config::Config;
use palabra_backend::models::*;
use palabra_backend::store::{MemoryStore, SongStore};
use palabra_backend::{build_router, AppState};

/// Test context wiring services to a fresh in-memory store.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub state: AppState,
}

impl TestContext {
    /// Fresh store at [`fixtures::start_time`] with no enrichment clients.
    pub fn new() -> Self {
        Self::at(fixtures::start_time())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(now));
        let state = AppState::new(store.clone(), clock.clone(), Config::default());
        Self {
            store,
            clock,
            state,
        }
    }

    /// Replace the state, e.g. to attach stub clients.
    pub fn with_state(mut self, f: impl FnOnce(AppState) -> AppState) -> Self {
        self.state = f(self.state);
        self
    }

    /// HTTP test server over the full router.
    pub fn server(&self) -> TestServer {
        TestServer::new(build_router(self.state.clone())).unwrap()
    }

    pub fn user_id(&self) -> i64 {
        self.state.user_id()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Insert `count` curriculum cards on `island`, ranked after `first_rank`.
    pub async fn seed_island(&self, island: i64, count: usize, first_rank: i64) -> Vec<Card> {
        let mut cards = Vec::with_capacity(count);
        for i in 0..count {
            let rank = first_rank + i as i64;
            let card = self
                .store
                .insert_card(&fixtures::curriculum_card(island, rank), self.clock.now())
                .await;
            cards.push(card);
        }
        cards
    }

    /// Create the sample song with its lines.
    pub async fn seed_song(&self) -> SongDetails {
        let song = self
            .store
            .create_song(&fixtures::sample_song(), self.clock.now())
            .await
            .unwrap();
        self.store
            .replace_song_lines(song.id, &fixtures::sample_lines())
            .await
            .unwrap();
        self.store.get_song_with_details(song.id).await.unwrap().unwrap()
    }
}
