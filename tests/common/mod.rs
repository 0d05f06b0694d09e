//! Common test utilities for tweet-backfill integration tests

#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use tempfile::TempDir;
use tweet_backfill::{
    Config, Database, FetchError, Fetcher, Period, ProfileRecord, RelayAddr, RetryConfig,
    TweetRecord,
};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Fetcher that answers every call, except that tweet fetches for broken
/// accounts always time out
#[derive(Default)]
pub struct FakeFetcher {
    broken: Mutex<HashSet<String>>,
    tweet_calls: Mutex<Vec<(String, Period)>>,
}

impl FakeFetcher {
    pub fn break_account(&self, account: &str) {
        self.broken.lock().unwrap().insert(account.to_string());
    }

    pub fn repair_all(&self) {
        self.broken.lock().unwrap().clear();
    }

    pub fn tweet_calls(&self) -> Vec<(String, Period)> {
        self.tweet_calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.tweet_calls.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_profile(
        &self,
        account: &str,
        _relay: &RelayAddr,
    ) -> Result<Option<ProfileRecord>, FetchError> {
        Ok(Some(ProfileRecord {
            user_id: format!("uid-{account}"),
            username: account.to_string(),
            name: account.to_string(),
            bio: None,
            join_date: day(2020, 1, 1),
            location: None,
            url: None,
            private: false,
            verified: false,
            followers: 1,
            following: 1,
            likes: 0,
            tweets: 0,
            media: 0,
        }))
    }

    async fn fetch_tweets(
        &self,
        account: &str,
        period: &Period,
        relay: &RelayAddr,
    ) -> Result<Vec<TweetRecord>, FetchError> {
        self.tweet_calls
            .lock()
            .unwrap()
            .push((account.to_string(), *period));
        if self.broken.lock().unwrap().contains(account) {
            return Err(FetchError::Timeout(format!("{relay} timed out")));
        }

        // One tweet on each day of the period
        Ok(period
            .days()
            .map(|on| TweetRecord {
                tweet_id: format!("{account}-{on}"),
                conversation_id: format!("{account}-{on}"),
                user_id: format!("uid-{account}"),
                username: account.to_string(),
                created_at: on.and_hms_opt(9, 30, 0).unwrap(),
                text: "hello".to_string(),
                hashtags: vec![],
                likes: 0,
                replies: 0,
                retweets: 0,
            })
            .collect())
    }
}

/// Database in a temp dir seeded with `relays` endpoints, plus a config for
/// January 2020 with zero backoff
pub async fn setup(relays: u16) -> (Arc<Database>, Config, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("backfill.db");
    config.retry = RetryConfig::immediate();
    config.session.worker_count = 3;
    config.session.max_fails = 2;
    config.session.begin_date = day(2020, 1, 1);
    config.session.end_date = Some(day(2020, 1, 31));
    config.session.max_window_days = 10;

    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();
    for port in 0..relays {
        db.upsert_relay(&RelayAddr::new("127.0.0.1", 9000 + port), Some("test"))
            .await
            .unwrap();
    }

    (Arc::new(db), config, temp_dir)
}
