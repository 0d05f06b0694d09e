//! Configuration types for tweet-backfill

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for a backfill runner
///
/// Every field has a default, so `Config::default()` (or deserializing `{}`)
/// gives a usable configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session parameters (dates, windows, worker count, attempt limit)
    #[serde(default)]
    pub session: SessionConfig,

    /// Backoff between attempts on the same target
    #[serde(default)]
    pub retry: RetryConfig,

    /// Relay queue behavior
    #[serde(default)]
    pub relay_pool: RelayPoolConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check the configuration for values a session cannot run with
    pub fn validate(&self) -> Result<()> {
        let session = &self.session;
        if session.worker_count == 0 {
            return Err(Error::config(
                "session.worker_count",
                "worker_count must be at least 1",
            ));
        }
        if session.max_fails == 0 {
            return Err(Error::config(
                "session.max_fails",
                "max_fails must be at least 1",
            ));
        }
        if session.max_window_days == 0 {
            return Err(Error::config(
                "session.max_window_days",
                "max_window_days must be at least 1",
            ));
        }
        if let Some(end) = session.end_date
            && session.begin_date > end
        {
            return Err(Error::config(
                "session.begin_date",
                format!("begin_date {} is after end_date {}", session.begin_date, end),
            ));
        }
        if self.retry.min_backoff > self.retry.max_backoff {
            return Err(Error::config(
                "retry.min_backoff",
                format!(
                    "min_backoff ({}ms) exceeds max_backoff ({}ms)",
                    self.retry.min_backoff.as_millis(),
                    self.retry.max_backoff.as_millis()
                ),
            ));
        }
        Ok(())
    }
}

/// Session parameters, frozen into a [`crate::types::Session`] at run start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of concurrent workers per phase (default: 25)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Attempts per target before it is declared dead (default: 8)
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,

    /// First day to backfill (default: 2006-01-01)
    #[serde(default = "default_begin_date")]
    pub begin_date: NaiveDate,

    /// Last day to backfill (None = today)
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    /// Largest allowed `end - begin` of one tweet period, in days (default: 100)
    #[serde(default = "default_max_window_days")]
    pub max_window_days: u32,

    /// Stored tweets on a day needed for it to count as covered (default: 1)
    #[serde(default = "default_min_tweets_per_day")]
    pub min_tweets_per_day: u32,

    /// Only fetch days that are not yet covered (default: false)
    #[serde(default)]
    pub missing_only: bool,

    /// Join date assumed for accounts with no stored profile (default: 2010-01-01)
    #[serde(default = "default_fallback_join_date")]
    pub fallback_join_date: NaiveDate,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_fails: default_max_fails(),
            begin_date: default_begin_date(),
            end_date: None,
            max_window_days: default_max_window_days(),
            min_tweets_per_day: default_min_tweets_per_day(),
            missing_only: false,
            fallback_join_date: default_fallback_join_date(),
        }
    }
}

/// Backoff between attempts on one target
///
/// Each wait is drawn uniformly from `[min_backoff, max_backoff]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Shortest wait between attempts (default: 0 ms)
    #[serde(default, with = "duration_ms_serde")]
    pub min_backoff: Duration,

    /// Longest wait between attempts (default: 5000 ms)
    #[serde(default = "default_max_backoff", with = "duration_ms_serde")]
    pub max_backoff: Duration,
}

impl RetryConfig {
    /// Backoff disabled, used by tests and dry runs
    pub fn immediate() -> Self {
        Self {
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::ZERO,
            max_backoff: default_max_backoff(),
        }
    }
}

/// Relay queue configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayPoolConfig {
    /// Queue length at or below which the pool repopulates before handing out a relay (default: 1)
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: usize,
}

impl Default for RelayPoolConfig {
    fn default() -> Self {
        Self {
            low_water_mark: default_low_water_mark(),
        }
    }
}

/// Persistence configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "tweet-backfill.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_worker_count() -> usize {
    25
}

fn default_max_fails() -> u32 {
    8
}

fn default_begin_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2006, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_max_window_days() -> u32 {
    100
}

fn default_min_tweets_per_day() -> u32 {
    1
}

fn default_fallback_join_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_max_backoff() -> Duration {
    Duration::from_millis(5000)
}

fn default_low_water_mark() -> usize {
    1
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tweet-backfill.db")
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.session.worker_count, 25);
        assert_eq!(config.session.max_fails, 8);
        assert_eq!(
            config.session.begin_date,
            NaiveDate::from_ymd_opt(2006, 1, 1).unwrap()
        );
        assert_eq!(config.session.end_date, None);
        assert_eq!(config.session.max_window_days, 100);
        assert_eq!(config.session.min_tweets_per_day, 1);
        assert!(!config.session.missing_only);
        assert_eq!(
            config.session.fallback_join_date,
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()
        );
        assert_eq!(config.retry.min_backoff, Duration::ZERO);
        assert_eq!(config.retry.max_backoff, Duration::from_millis(5000));
        assert_eq!(config.relay_pool.low_water_mark, 1);
        assert_eq!(
            config.persistence.database_path,
            PathBuf::from("tweet-backfill.db")
        );
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let json = r#"{
            "session": { "worker_count": 4, "end_date": "2020-12-31", "missing_only": true },
            "retry": { "max_backoff": 250 }
        }"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");
        assert_eq!(config.session.worker_count, 4);
        assert_eq!(
            config.session.end_date,
            Some(NaiveDate::from_ymd_opt(2020, 12, 31).unwrap())
        );
        assert!(config.session.missing_only);
        assert_eq!(config.session.max_fails, 8);
        assert_eq!(config.retry.max_backoff, Duration::from_millis(250));
        assert_eq!(config.retry.min_backoff, Duration::ZERO);
    }

    #[test]
    fn backoff_serializes_as_milliseconds() {
        let retry = RetryConfig {
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1500),
        };
        let value = serde_json::to_value(&retry).unwrap();
        assert_eq!(value["min_backoff"], 100);
        assert_eq!(value["max_backoff"], 1500);
    }

    fn assert_config_error(config: &Config, expected_key: &str) {
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some(expected_key)),
            other => panic!("expected config error for {}, got {:?}", expected_key, other),
        }
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.session.worker_count = 0;
        assert_config_error(&config, "session.worker_count");

        let mut config = Config::default();
        config.session.max_fails = 0;
        assert_config_error(&config, "session.max_fails");

        let mut config = Config::default();
        config.session.max_window_days = 0;
        assert_config_error(&config, "session.max_window_days");
    }

    #[test]
    fn validate_rejects_reversed_dates_and_backoff() {
        let mut config = Config::default();
        config.session.begin_date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        config.session.end_date = Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_config_error(&config, "session.begin_date");

        let mut config = Config::default();
        config.retry.min_backoff = Duration::from_secs(10);
        assert_config_error(&config, "retry.min_backoff");
    }
}
