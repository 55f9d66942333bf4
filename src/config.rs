//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default relevance tag: listings start with it.
pub const DEFAULT_FILTER_TAG: &str = "#offro";

/// Default keyword tokens for the relevance filter.
pub const DEFAULT_FILTER_KEYWORDS: &[&str] = &["#offro", "offered", "offro"];

/// Scraper configuration.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Telegram Bot API token.
    pub telegram_bot_token: SecretString,
    /// Channel to read listings from (`@handle`).
    pub channel_name: String,
    /// Extraction service API key.
    pub mistral_api_key: SecretString,
    /// Extraction model identifier.
    pub mistral_model: String,
    /// Path of the libSQL database file.
    pub database_path: PathBuf,
    /// Interval between scrape cycles.
    pub scrape_interval: Duration,
    /// How far back each cycle looks (watermark = now - lookback).
    pub lookback: Duration,
    /// Maximum number of messages per cycle.
    pub max_messages: usize,
    /// Minimum delay between consecutive extraction calls.
    pub extraction_delay: Duration,
    /// Timeout applied to every outbound HTTP request.
    pub request_timeout: Duration,
    /// Relevance filter settings.
    pub filter: FilterConfig,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

/// Relevance filter data. Kept as data so the keyword list can grow without code changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub tag: String,
    pub keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_FILTER_TAG.to_string(),
            keywords: DEFAULT_FILTER_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl ScraperConfig {
    /// Load configuration from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let telegram_bot_token = SecretString::from(required("TELEGRAM_BOT_TOKEN")?);
        let mistral_api_key = SecretString::from(required("MISTRAL_API_KEY")?);

        let channel_name =
            std::env::var("CHANNEL_NAME").unwrap_or_else(|_| "@polihouse".to_string());
        let mistral_model =
            std::env::var("MISTRAL_MODEL").unwrap_or_else(|_| "pixtral-12b-2409".to_string());
        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/rental-scout.db"));

        let interval_minutes: u64 = parsed("SCRAPE_INTERVAL_MINUTES", 60)?;
        let since_minutes: u64 = parsed("SCRAPE_SINCE_MINUTES", 60)?;
        let max_messages: usize = parsed("SCRAPE_MAX_MESSAGES", 100)?;
        let delay_ms: u64 = parsed("EXTRACTION_DELAY_MS", 1500)?;
        let timeout_secs: u64 = parsed("REQUEST_TIMEOUT_SECS", 30)?;

        if interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SCRAPE_INTERVAL_MINUTES".into(),
                message: "must be at least 1".into(),
            });
        }

        let filter = FilterConfig {
            tag: std::env::var("FILTER_TAG").unwrap_or_else(|_| DEFAULT_FILTER_TAG.to_string()),
            keywords: std::env::var("FILTER_KEYWORDS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_else(|_| FilterConfig::default().keywords),
        };

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            telegram_bot_token,
            channel_name,
            mistral_api_key,
            mistral_model,
            database_path,
            scrape_interval: minutes("SCRAPE_INTERVAL_MINUTES", interval_minutes)?,
            lookback: minutes("SCRAPE_SINCE_MINUTES", since_minutes)?,
            max_messages,
            extraction_delay: Duration::from_millis(delay_ms),
            request_timeout: Duration::from_secs(timeout_secs),
            filter,
            log_level,
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Convert a minute count into a `Duration`, rejecting values that overflow.
fn minutes(key: &str, value: u64) -> Result<Duration, ConfigError> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value} minutes is out of range"),
        })
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_matches_listing_tags() {
        let filter = FilterConfig::default();
        assert_eq!(filter.tag, "#offro");
        assert_eq!(filter.keywords, vec!["#offro", "offered", "offro"]);
    }

    #[test]
    fn parse_list_trims_and_drops_blanks() {
        assert_eq!(
            parse_list(" #offro, affitto ,,stanza "),
            vec!["#offro", "affitto", "stanza"]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn parsed_falls_back_to_default_when_unset() {
        let value: u64 = parsed("RENTAL_SCOUT_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn minutes_converts_to_seconds() {
        assert_eq!(
            minutes("SCRAPE_INTERVAL_MINUTES", 60).unwrap(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn minutes_rejects_overflow() {
        let err = minutes("SCRAPE_SINCE_MINUTES", u64::MAX).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "SCRAPE_SINCE_MINUTES"
        ));
    }

    #[test]
    fn required_reports_missing_key() {
        let err = required("RENTAL_SCOUT_TEST_MISSING_KEY").unwrap_err();
        assert!(err.to_string().contains("RENTAL_SCOUT_TEST_MISSING_KEY"));
    }
}
