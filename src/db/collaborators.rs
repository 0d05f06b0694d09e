//! Collaborator trait implementations backed by SQLite.

use crate::collaborators::{Directory, EventLog, RelaySource, Store};
use crate::types::{
    DailyCount, DeadPeriod, LogEvent, ProfileRecord, RelayAddr, RelayEndpoint, SessionId,
    TweetRecord,
};
use crate::Result;
use chrono::NaiveDate;

use super::Database;

#[async_trait::async_trait]
impl Store for Database {
    async fn save_profile(&self, profile: &ProfileRecord) -> Result<()> {
        self.upsert_profile(profile).await
    }

    async fn save_tweets(&self, tweets: &[TweetRecord]) -> Result<()> {
        self.upsert_tweets(tweets).await.map(|_| ())
    }

    async fn join_date(&self, account: &str) -> Result<Option<NaiveDate>> {
        self.profile_join_date(account).await
    }

    async fn tweets_per_day(
        &self,
        account: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCount>> {
        self.daily_tweet_counts(account, begin, end).await
    }
}

#[async_trait::async_trait]
impl RelaySource for Database {
    async fn list_candidate_relays(&self) -> Result<Vec<RelayEndpoint>> {
        self.list_relays().await
    }

    async fn record_relay_outcome(&self, relay: &RelayAddr, success: bool) -> Result<()> {
        self.record_relay_attempt(relay, success).await
    }
}

#[async_trait::async_trait]
impl EventLog for Database {
    async fn append_event(&self, event: &LogEvent) -> Result<()> {
        self.insert_event(event).await.map(|_| ())
    }

    async fn query_dead_periods(&self, session: SessionId) -> Result<Vec<DeadPeriod>> {
        self.dead_periods(session).await
    }

    async fn latest_session_id(&self) -> Result<Option<SessionId>> {
        self.max_session_id().await
    }
}

#[async_trait::async_trait]
impl Directory for Database {
    async fn list_accounts(&self) -> Result<Vec<String>> {
        self.eligible_accounts().await
    }

    async fn account_exists(&self, account: &str) -> Result<bool> {
        self.has_account(account).await
    }
}
