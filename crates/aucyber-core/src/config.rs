//! Collection configuration and environment handling.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::env;

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Date range for data collection. `end` is inclusive; `None` means "now".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Result<Self, ConfigError> {
        if let Some(end) = end {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "start date {start} is after end date {end}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Covering one calendar month, for month-by-month backfills.
    pub fn for_month(year: i32, month: u32) -> Result<Self, ConfigError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| ConfigError::Invalid(format!("invalid month {year}-{month:02}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let end = next
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| ConfigError::Invalid(format!("invalid month {year}-{month:02}")))?;
        Ok(Self { start, end: Some(end) })
    }

    pub fn end_or_today(&self) -> NaiveDate {
        self.end.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end_or_today()
    }

    /// Same range with the start pushed back by roughly `months` calendar
    /// months, for sources that disclose incidents late.
    pub fn widened_back(&self, months: u32) -> Self {
        let mut year = self.start.year();
        let mut month = self.start.month() as i32 - months as i32;
        while month < 1 {
            month += 12;
            year -= 1;
        }
        let day = self.start.day().min(28);
        let start = NaiveDate::from_ymd_opt(year, month as u32, day).unwrap_or(self.start);
        Self {
            start,
            end: self.end,
        }
    }
}

/// Per-source tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub enabled: bool,
    /// Requests per minute for the source's rate-limit key
    pub rate_limit_per_minute: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub max_records: usize,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit_per_minute: 60,
            timeout_secs: 30,
            retry_attempts: 3,
            max_records: 1000,
        }
    }
}

/// Main collection configuration.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub date_range: DateRange,
    /// Cap on concurrently enriched events
    pub max_workers: usize,
    pub batch_size: usize,
    pub news_events: DataSourceConfig,
    pub llm_search: DataSourceConfig,
    pub web_search: DataSourceConfig,
    pub regulator: DataSourceConfig,
    pub curated_list: DataSourceConfig,
}

impl CollectionConfig {
    pub fn for_range(date_range: DateRange) -> Self {
        Self {
            date_range,
            max_workers: 4,
            batch_size: 20,
            news_events: DataSourceConfig::default(),
            llm_search: DataSourceConfig::default(),
            web_search: DataSourceConfig::default(),
            regulator: DataSourceConfig::default(),
            curated_list: DataSourceConfig::default(),
        }
    }
}

/// Recognised environment variables, read once at startup and passed
/// explicitly to collaborators.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// env: OPENAI_API_KEY
    pub openai_api_key: Option<String>,
    /// env: PERPLEXITY_API_KEY
    pub perplexity_api_key: Option<String>,
    /// env: NEWSEVENTS_PROJECT
    pub news_events_project: Option<String>,
    /// env: NEWSEVENTS_CREDENTIALS (path to credentials file)
    pub news_events_credentials: Option<String>,
    /// env: WEBSEARCH_API_KEY
    pub web_search_api_key: Option<String>,
    /// env: WEBSEARCH_CX
    pub web_search_cx: Option<String>,
    /// env: DATABASE_URL (sqlite path or URL)
    pub database_url: Option<String>,
    /// env: BATCH_SIZE
    pub batch_size: Option<usize>,
    /// env: ENRICHMENT_STRATEGY
    pub enrichment_strategy: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            perplexity_api_key: env::var("PERPLEXITY_API_KEY").ok(),
            news_events_project: env::var("NEWSEVENTS_PROJECT").ok(),
            news_events_credentials: env::var("NEWSEVENTS_CREDENTIALS").ok(),
            web_search_api_key: env::var("WEBSEARCH_API_KEY").ok(),
            web_search_cx: env::var("WEBSEARCH_CX").ok(),
            database_url: env::var("DATABASE_URL").ok(),
            batch_size: env::var("BATCH_SIZE").ok().and_then(|v| v.parse().ok()),
            enrichment_strategy: env::var("ENRICHMENT_STRATEGY").ok(),
        }
    }

    /// SQLite path resolved from `DATABASE_URL`, defaulting to the local
    /// instance database. Accepts bare paths, `sqlite:` and `sqlite://`
    /// forms.
    pub fn database_path(&self) -> String {
        let raw = self
            .database_url
            .clone()
            .unwrap_or_else(|| "instance/cyber_events.db".to_string());
        raw.strip_prefix("sqlite:///")
            .or_else(|| raw.strip_prefix("sqlite://"))
            .or_else(|| raw.strip_prefix("sqlite:"))
            .unwrap_or(&raw)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_rejects_inverted_order() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(DateRange::new(start, Some(end)).is_err());
    }

    #[test]
    fn month_range_covers_whole_month() {
        let range = DateRange::for_month(2024, 2).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(range.end, Some(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    }

    #[test]
    fn widened_back_crosses_year_boundary() {
        let range = DateRange::for_month(2024, 1).unwrap().widened_back(2);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2023, 11, 1).unwrap());
    }

    #[test]
    fn database_path_strips_sqlite_scheme() {
        let cfg = EnvConfig {
            database_url: Some("sqlite:///var/data/events.db".into()),
            ..Default::default()
        };
        assert_eq!(cfg.database_path(), "/var/data/events.db");
    }
}
