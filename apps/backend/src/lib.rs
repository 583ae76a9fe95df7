pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use palabra_core::{Fsrs, Scheduler};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::Database;
use crate::services::enrichment::{Enricher, GeminiEnricher};
use crate::services::lyrics::{LrcLibClient, LyricsSource};
use crate::services::practice::PracticeRegistry;
use crate::services::runner::LessonRegistry;
use crate::services::songs::SongLessonRegistry;
use crate::models::UserSettings;
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
    pub lessons: Arc<LessonRegistry>,
    pub practice: Arc<PracticeRegistry>,
    pub songs: Arc<SongLessonRegistry>,
    pub enricher: Option<Arc<dyn Enricher>>,
    pub lyrics: Option<Arc<dyn LyricsSource>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// State without enrichment clients.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            store,
            clock,
            scheduler: Arc::new(Fsrs::with_retention(config.target_retention)),
            lessons: Arc::new(LessonRegistry::new()),
            practice: Arc::new(PracticeRegistry::new()),
            songs: Arc::new(SongLessonRegistry::new()),
            enricher: None,
            lyrics: None,
            config: Arc::new(config),
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_lyrics(mut self, lyrics: Arc<dyn LyricsSource>) -> Self {
        self.lyrics = Some(lyrics);
        self
    }

    /// The single learner this instance serves.
    pub fn user_id(&self) -> i64 {
        self.config.user_id
    }

    /// Scheduler honouring the learner's retention override.
    pub fn scheduler_for(&self, settings: &UserSettings) -> Arc<dyn Scheduler> {
        match settings.target_retention {
            Some(retention) if retention != self.config.target_retention => {
                Arc::new(Fsrs::with_retention(retention))
            }
            _ => Arc::clone(&self.scheduler),
        }
    }

    /// Deadline for each call to an enrichment service.
    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.config.enrichment_timeout_secs)
    }
}

/// Connect to the database and build the enrichment clients the
/// configuration enables.
pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    tracing::info!("Running migrations...");
    db.run_migrations().await?;

    let timeout = Duration::from_secs(config.enrichment_timeout_secs);
    let lyrics = LrcLibClient::new(&config.lrclib_url, timeout)?;
    let enricher = match &config.gemini_api_key {
        Some(key) => {
            tracing::info!(model = %config.gemini_model, "Text generation enabled");
            Some(GeminiEnricher::new(key.clone(), config.gemini_model.clone(), timeout)?)
        }
        None => {
            tracing::info!("GEMINI_API_KEY not set, using local question fallbacks");
            None
        }
    };

    let clock = SystemClock::new(config.day_reset_hour);
    let mut state = AppState::new(Arc::new(db), Arc::new(clock), config).with_lyrics(Arc::new(lyrics));
    if let Some(enricher) = enricher {
        state = state.with_enricher(Arc::new(enricher));
    }
    Ok(state)
}

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Journey and daily lesson
        .route("/api/journey", get(routes::journey::home))
        .route("/api/lesson/start", post(routes::lesson::start))
        .route("/api/lesson/current", get(routes::lesson::current))
        .route("/api/lesson/review", post(routes::lesson::review))
        .route("/api/lesson/skip", post(routes::lesson::skip))
        // Free practice
        .route("/api/practice/start", post(routes::practice::start))
        .route("/api/practice/current", get(routes::practice::current))
        .route("/api/practice/review", post(routes::practice::review))
        .route("/api/practice/skip", post(routes::practice::skip))
        .route("/api/practice/stats", get(routes::practice::stats))
        // Settings
        .route("/api/settings", get(routes::settings::get).put(routes::settings::update))
        // Grammar
        .route("/api/grammar", get(routes::grammar::list))
        .route("/api/grammar/:rule_key", get(routes::grammar::get))
        .route("/api/lesson/tips", get(routes::grammar::lesson_tips))
        // Stats
        .route("/api/stats", get(routes::stats::overview))
        .route("/api/stats/today", get(routes::stats::today))
        .route("/api/stats/heatmap", get(routes::stats::heatmap))
        .route("/api/achievements", get(routes::stats::achievements))
        // Songs
        .route("/api/songs", get(routes::songs::list).post(routes::songs::create))
        .route("/api/songs/:id", get(routes::songs::get))
        .route("/api/songs/:id/lyrics", post(routes::songs::import_lyrics))
        .route("/api/songs/:id/start", post(routes::songs::start))
        // Song lesson
        .route("/api/song-lesson", get(routes::song_lesson::current))
        .route("/api/song-lesson/vocab", post(routes::song_lesson::rate_vocab))
        .route("/api/song-lesson/next", post(routes::song_lesson::next_phase))
        .route("/api/song-lesson/next-line", post(routes::song_lesson::next_line))
        .route("/api/song-lesson/skip-line", post(routes::song_lesson::skip_line))
        .route("/api/song-lesson/blank", post(routes::song_lesson::submit_blank))
        // Cards
        .route("/api/cards", get(routes::cards::list).post(routes::cards::create))
        .route("/api/cards/:id", get(routes::cards::get).delete(routes::cards::delete))
        .route("/api/cards/:id/enrich", post(routes::cards::enrich))
        .route("/api/cards/:id/grammar", get(routes::grammar::for_card))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    let addr = config.bind_addr();
    let state = build_state(config).await?;
    let app = build_router(state);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
