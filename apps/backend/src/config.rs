//! Environment configuration.

use std::str::FromStr;

use crate::error::{ApiError, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://palabra.db?mode=rwc";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_LRCLIB_URL: &str = "https://lrclib.net";

/// Server settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub songs_path: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub lrclib_url: String,
    pub enrichment_timeout_secs: u64,
    pub day_reset_hour: u32,
    pub target_retention: f64,
    pub user_id: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            songs_path: "./songs".to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            lrclib_url: DEFAULT_LRCLIB_URL.to_string(),
            enrichment_timeout_secs: 20,
            day_reset_hour: 0,
            target_retention: 0.9,
            user_id: 1,
        }
    }
}

impl Config {
    /// Load from process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or empty keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "PORT", defaults.port)?,
            songs_path: get("SONGS_PATH").unwrap_or(defaults.songs_path),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            lrclib_url: get("LRCLIB_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.lrclib_url),
            enrichment_timeout_secs: parse_or(
                &get,
                "ENRICHMENT_TIMEOUT_SECS",
                defaults.enrichment_timeout_secs,
            )?,
            day_reset_hour: parse_or(&get, "DAY_RESET_HOUR", defaults.day_reset_hour)?,
            target_retention: parse_or(&get, "TARGET_RETENTION", defaults.target_retention)?,
            user_id: parse_or(&get, "USER_ID", defaults.user_id)?,
        };

        if config.day_reset_hour > 23 {
            return Err(ApiError::BadRequest(format!(
                "DAY_RESET_HOUR must be 0-23, got {}",
                config.day_reset_hour
            )));
        }
        if config.target_retention <= 0.0 || config.target_retention >= 1.0 {
            return Err(ApiError::BadRequest(format!(
                "TARGET_RETENTION must be between 0 and 1, got {}",
                config.target_retention
            )));
        }
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("{} has an invalid value: {}", key, raw))),
    }
}
