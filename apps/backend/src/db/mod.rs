//! SQLite database operations

mod achievements;
mod activity;
mod cards;
mod grammar;
mod journey;
mod progress;
mod settings;
mod songs;

use std::time::Duration;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::Result;

/// Card columns for joins against `cards c`.
const CARD_COLUMNS: &str = "c.id, c.term, c.translation, c.example, c.island_id, \
     c.frequency_rank, c.source, c.source_song_id, c.created_at";

/// Progress columns for `LEFT JOIN card_progress p`, prefixed for `DbCardWithProgress`.
const PROGRESS_COLUMNS: &str = "p.user_id AS p_user_id, p.stability AS p_stability, \
     p.difficulty AS p_difficulty, p.elapsed_days AS p_elapsed_days, \
     p.scheduled_days AS p_scheduled_days, p.reps AS p_reps, p.lapses AS p_lapses, \
     p.state AS p_state, p.due AS p_due, p.last_review AS p_last_review";

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite and create connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, 5).await
    }

    /// Connect with an explicit pool size. In-memory databases need a single
    /// connection so every query sees the same data.
    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// `SELECT` of cards joined with one user's progress. The user id is the
/// first bind parameter.
fn card_with_progress_select() -> String {
    format!(
        "SELECT {}, {} FROM cards c \
         LEFT JOIN card_progress p ON p.card_id = c.id AND p.user_id = ?",
        CARD_COLUMNS, PROGRESS_COLUMNS
    )
}

/// `?, ?, ?` for an `IN (...)` list of `n` items.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
