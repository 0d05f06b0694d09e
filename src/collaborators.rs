//! Interfaces the orchestrator consumes
//!
//! Fetching, storage, relay harvesting and the account directory live outside
//! the orchestrator. Each is reached through one of these traits so a session
//! can run against the SQLite backend in [`crate::db`] or against in-memory
//! doubles in tests.

use crate::error::{FetchError, Result};
use crate::types::{
    DailyCount, DeadPeriod, LogEvent, Period, ProfileRecord, RelayAddr, RelayEndpoint, SessionId,
    TweetRecord,
};
use chrono::NaiveDate;

/// Remote fetch of profiles and tweets through a relay
///
/// Implementations own their timeouts and must map every transport failure
/// into a [`FetchError`] variant.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch an account's profile; `Ok(None)` when the remote side has none
    async fn fetch_profile(
        &self,
        account: &str,
        relay: &RelayAddr,
    ) -> std::result::Result<Option<ProfileRecord>, FetchError>;

    /// Fetch an account's tweets for one period
    ///
    /// Callers pass the planned period; implementations with an exclusive
    /// "until" bound should use [`Period::fetch_bounds`].
    async fn fetch_tweets(
        &self,
        account: &str,
        period: &Period,
        relay: &RelayAddr,
    ) -> std::result::Result<Vec<TweetRecord>, FetchError>;
}

/// Idempotent persistence of fetched records plus the coverage queries planning needs
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Upsert a profile keyed by user id
    async fn save_profile(&self, profile: &ProfileRecord) -> Result<()>;

    /// Upsert tweets keyed by tweet id
    async fn save_tweets(&self, tweets: &[TweetRecord]) -> Result<()>;

    /// Stored join date of an account, if its profile is known
    async fn join_date(&self, account: &str) -> Result<Option<NaiveDate>>;

    /// Stored tweets per day for an account within `[begin, end]`
    ///
    /// Days without tweets are omitted.
    async fn tweets_per_day(
        &self,
        account: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCount>>;
}

/// Source of relay candidates and sink for their health counters
#[async_trait::async_trait]
pub trait RelaySource: Send + Sync {
    /// All known relays, blacklisted ones included
    async fn list_candidate_relays(&self) -> Result<Vec<RelayEndpoint>>;

    /// Record one attempt through `relay`
    ///
    /// Must be atomic with respect to concurrent callers: `used_total` always
    /// increments, `failed_total` increments unless `success`, and `fail_ratio`
    /// is recomputed from the new counters.
    async fn record_relay_outcome(&self, relay: &RelayAddr, success: bool) -> Result<()>;
}

/// Append-only session event log
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    /// Append one event
    async fn append_event(&self, event: &LogEvent) -> Result<()>;

    /// (account, period) pairs logged dead under `session`
    async fn query_dead_periods(&self, session: SessionId) -> Result<Vec<DeadPeriod>>;

    /// Session id with the largest absolute value ever logged
    async fn latest_session_id(&self) -> Result<Option<SessionId>>;
}

/// Known accounts
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    /// All accounts eligible for scraping (blacklisted accounts excluded)
    async fn list_accounts(&self) -> Result<Vec<String>>;

    /// Whether `account` is already known
    async fn account_exists(&self, account: &str) -> Result<bool>;
}
