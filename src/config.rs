//! Configuration management for the event-processing pipeline.
//!
//! Configuration is environment-driven, following the same
//! `Config::from_env()` convention used throughout this codebase:
//!
//! - `RETENTION_WINDOW_DAYS` - Optional. TTL horizon. Defaults to `180`.
//! - `ANALYSIS_WINDOW_DAYS` - Optional. Default lookback for scheduled sync. Defaults to `7`.
//! - `EXCLUDED_SERVICES` - Optional. Comma-separated list filtered at dispatch.
//! - `EVENT_CATEGORIES` - Optional. Comma-separated subset of `issue,scheduledChange,accountNotification`; empty means all.
//! - `LLM_MODEL_ID` - Optional. Defaults to `us.anthropic.claude-sonnet-4-20250514-v1:0`.
//! - `LLM_TEMPERATURE` - Optional. Defaults to `0.1`.
//! - `LLM_TOP_P` - Optional. Defaults to `0.9`.
//! - `LLM_MAX_TOKENS` - Optional. Defaults to `4000`.
//! - `QUEUE_URL` - Required. The work queue endpoint.
//! - `STORE_TABLE_NAME` - Required. Record store identifier.
//! - `COUNTER_TABLE_NAME` - Required. Counter store identifier.
//! - `FILTERS_TABLE_NAME` - Optional. Saved-filter store identifier (external API only).
//! - `ENABLE_PER_ACCOUNT_FANOUT` - Optional. Defaults to `true`.
//! - `INLINE_DISPATCH_THRESHOLD` - Optional. `events × accounts` size above which the dispatcher queues instead of processing inline. Defaults to `10`.
//! - `BATCH_SIZE` - Optional. Max accounts per work unit (hard upstream cap is 10). Defaults to `10`.
//! - `SQLITE_PATH` - Optional. Local sqlite file backing the record/counter stores.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Event-processing pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// TTL horizon in days.
    pub retention_window_days: i64,

    /// Default lookback for scheduled sync, overridable per invocation.
    pub analysis_window_days: i64,

    /// Services excluded at dispatch time.
    pub excluded_services: Vec<String>,

    /// Event categories to fetch; empty means all three.
    pub event_categories: Vec<crate::types::EventCategory>,

    /// Analyzer (LLM) configuration.
    pub llm: LlmConfig,

    /// Work queue endpoint.
    pub queue_url: String,

    /// Record store table/identifier.
    pub store_table_name: String,

    /// Counter store table/identifier.
    pub counter_table_name: String,

    /// Saved-filter table/identifier (external API only).
    pub filters_table_name: Option<String>,

    /// Disables the per-account mail hand-off without affecting the core
    /// pipeline.
    pub enable_per_account_fanout: bool,

    /// `events × accounts` size above which the dispatcher queues instead
    /// of processing inline.
    pub inline_dispatch_threshold: usize,

    /// Max accounts per work unit.
    pub batch_size: usize,

    /// Local sqlite file backing the record/counter stores.
    pub sqlite_path: PathBuf,
}

/// Analyzer (LLM) configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model_id: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model_id: "us.anthropic.claude-sonnet-4-20250514-v1:0".to_string(),
            temperature: 0.1,
            top_p: 0.9,
            max_tokens: 4000,
            api_key: None,
        }
    }
}

fn parse_categories(raw: &str) -> Vec<crate::types::EventCategory> {
    use crate::types::EventCategory::*;
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s {
            "issue" => Some(Issue),
            "scheduledChange" => Some(ScheduledChange),
            "accountNotification" => Some(AccountNotification),
            _ => None,
        })
        .collect()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let retention_window_days = env_or("RETENTION_WINDOW_DAYS", "180")?;
        let analysis_window_days = env_or("ANALYSIS_WINDOW_DAYS", "7")?;

        let excluded_services = std::env::var("EXCLUDED_SERVICES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let event_categories =
            parse_categories(&std::env::var("EVENT_CATEGORIES").unwrap_or_default());

        let llm = LlmConfig {
            model_id: std::env::var("LLM_MODEL_ID")
                .unwrap_or_else(|_| LlmConfig::default().model_id),
            temperature: env_or("LLM_TEMPERATURE", "0.1")?,
            top_p: env_or("LLM_TOP_P", "0.9")?,
            max_tokens: env_or("LLM_MAX_TOKENS", "4000")?,
            api_key: std::env::var("LLM_API_KEY").ok(),
        };

        let queue_url = std::env::var("QUEUE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("QUEUE_URL".to_string()))?;
        let store_table_name = std::env::var("STORE_TABLE_NAME")
            .map_err(|_| ConfigError::MissingEnvVar("STORE_TABLE_NAME".to_string()))?;
        let counter_table_name = std::env::var("COUNTER_TABLE_NAME")
            .map_err(|_| ConfigError::MissingEnvVar("COUNTER_TABLE_NAME".to_string()))?;
        let filters_table_name = std::env::var("FILTERS_TABLE_NAME").ok();

        let enable_per_account_fanout = env_or("ENABLE_PER_ACCOUNT_FANOUT", "true")?;
        let inline_dispatch_threshold = env_or("INLINE_DISPATCH_THRESHOLD", "10")?;
        let batch_size = env_or("BATCH_SIZE", "10")?;

        let sqlite_path = std::env::var("SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("orgevents-pipeline.sqlite3"));

        Ok(Self {
            retention_window_days,
            analysis_window_days,
            excluded_services,
            event_categories,
            llm,
            queue_url,
            store_table_name,
            counter_table_name,
            filters_table_name,
            enable_per_account_fanout,
            inline_dispatch_threshold,
            batch_size,
            sqlite_path,
        })
    }

    /// Build a config with explicit values, useful for tests.
    pub fn for_tests() -> Self {
        Self {
            retention_window_days: 180,
            analysis_window_days: 7,
            excluded_services: vec![],
            event_categories: vec![],
            llm: LlmConfig::default(),
            queue_url: "memory://queue".to_string(),
            store_table_name: "events".to_string(),
            counter_table_name: "counters".to_string(),
            filters_table_name: None,
            enable_per_account_fanout: true,
            inline_dispatch_threshold: 10,
            batch_size: 10,
            sqlite_path: PathBuf::from(":memory:"),
        }
    }
}

fn env_or<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_categories() {
        let cats = parse_categories("issue, scheduledChange ,bogus");
        assert_eq!(
            cats,
            vec![
                crate::types::EventCategory::Issue,
                crate::types::EventCategory::ScheduledChange
            ]
        );
    }

    #[test]
    fn for_tests_config_is_self_consistent() {
        let cfg = Config::for_tests();
        assert_eq!(cfg.batch_size, 10);
        assert!(cfg.enable_per_account_fanout);
    }
}
