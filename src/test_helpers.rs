//! Shared in-memory doubles for unit tests.

use crate::collaborators::{Directory, EventLog, Fetcher, RelaySource, Store};
use crate::config::{Config, RetryConfig};
use crate::error::{FetchError, Result};
use crate::types::{
    DailyCount, DeadPeriod, EventFlag, EventScope, LogEvent, Period, ProfileRecord, RelayAddr,
    RelayEndpoint, SessionId, TaskKind, TweetRecord,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

pub(crate) fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub(crate) fn period(begin: NaiveDate, end: NaiveDate) -> Period {
    Period::new(begin, end).unwrap()
}

/// Config with zero backoff and a fixed, past date range
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.retry = RetryConfig::immediate();
    config.session.worker_count = 4;
    config.session.begin_date = day(2020, 1, 1);
    config.session.end_date = Some(day(2020, 12, 31));
    config
}

pub(crate) fn sample_profile(account: &str) -> ProfileRecord {
    ProfileRecord {
        user_id: format!("id-{account}"),
        username: account.to_string(),
        name: account.to_uppercase(),
        bio: Some("bio".to_string()),
        join_date: day(2015, 3, 1),
        location: None,
        url: None,
        private: false,
        verified: false,
        followers: 10,
        following: 20,
        likes: 30,
        tweets: 40,
        media: 5,
    }
}

pub(crate) fn sample_tweet(account: &str, on: NaiveDate, n: u32) -> TweetRecord {
    let tweet_id = format!("{account}-{on}-{n}");
    TweetRecord {
        tweet_id: tweet_id.clone(),
        conversation_id: tweet_id,
        user_id: format!("id-{account}"),
        username: account.to_string(),
        created_at: on.and_hms_opt(12, 0, 0).unwrap(),
        text: format!("tweet {n} from {account}"),
        hashtags: vec!["backfill".to_string()],
        likes: 1,
        replies: 0,
        retweets: 0,
    }
}

#[derive(Default)]
struct MemoryState {
    accounts: Vec<String>,
    join_dates: HashMap<String, NaiveDate>,
    coverage: HashMap<String, BTreeMap<NaiveDate, i64>>,
    profiles: HashMap<String, ProfileRecord>,
    tweets: BTreeMap<String, TweetRecord>,
    relays: Vec<RelayEndpoint>,
    events: Vec<LogEvent>,
}

/// In-memory Store, RelaySource, EventLog and Directory
#[derive(Default)]
pub(crate) struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_accounts(self, accounts: &[&str]) -> Self {
        self.state.lock().unwrap().accounts = accounts.iter().map(|a| a.to_string()).collect();
        self
    }

    pub(crate) fn with_relays(self, count: u16) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for i in 0..count {
                state
                    .relays
                    .push(RelayEndpoint::new(RelayAddr::new("10.0.0.1", 8000 + i)));
            }
        }
        self
    }

    pub(crate) fn add_relay(&self, relay: RelayEndpoint) {
        self.state.lock().unwrap().relays.push(relay);
    }

    pub(crate) fn set_join_date(&self, account: &str, date: NaiveDate) {
        self.state
            .lock()
            .unwrap()
            .join_dates
            .insert(account.to_string(), date);
    }

    pub(crate) fn set_coverage(&self, account: &str, date: NaiveDate, count: i64) {
        self.state
            .lock()
            .unwrap()
            .coverage
            .entry(account.to_string())
            .or_default()
            .insert(date, count);
    }

    pub(crate) fn push_event(&self, event: LogEvent) {
        self.state.lock().unwrap().events.push(event);
    }

    pub(crate) fn events(&self) -> Vec<LogEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub(crate) fn relays(&self) -> Vec<RelayEndpoint> {
        self.state.lock().unwrap().relays.clone()
    }

    pub(crate) fn tweet_count(&self) -> usize {
        self.state.lock().unwrap().tweets.len()
    }

    pub(crate) fn profile_count(&self) -> usize {
        self.state.lock().unwrap().profiles.len()
    }

    /// Target-scoped events with the given flag
    pub(crate) fn target_events(&self, flag: EventFlag) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.scope == EventScope::Target && e.flag == flag)
            .collect()
    }
}

#[async_trait::async_trait]
impl Store for MemoryBackend {
    async fn save_profile(&self, profile: &ProfileRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .join_dates
            .insert(profile.username.clone(), profile.join_date);
        state
            .profiles
            .insert(profile.username.clone(), profile.clone());
        Ok(())
    }

    async fn save_tweets(&self, tweets: &[TweetRecord]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for tweet in tweets {
            state.tweets.insert(tweet.tweet_id.clone(), tweet.clone());
        }
        Ok(())
    }

    async fn join_date(&self, account: &str) -> Result<Option<NaiveDate>> {
        Ok(self.state.lock().unwrap().join_dates.get(account).copied())
    }

    async fn tweets_per_day(
        &self,
        account: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCount>> {
        let state = self.state.lock().unwrap();
        let mut counts: BTreeMap<NaiveDate, i64> =
            state.coverage.get(account).cloned().unwrap_or_default();
        for tweet in state.tweets.values().filter(|t| t.username == account) {
            *counts.entry(tweet.date()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter(|(date, _)| *date >= begin && *date <= end)
            .map(|(date, count)| DailyCount { date, count })
            .collect())
    }
}

#[async_trait::async_trait]
impl RelaySource for MemoryBackend {
    async fn list_candidate_relays(&self) -> Result<Vec<RelayEndpoint>> {
        Ok(self.state.lock().unwrap().relays.clone())
    }

    async fn record_relay_outcome(&self, relay: &RelayAddr, success: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(endpoint) = state.relays.iter_mut().find(|r| &r.addr == relay) {
            endpoint.record(success);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventLog for MemoryBackend {
    async fn append_event(&self, event: &LogEvent) -> Result<()> {
        self.state.lock().unwrap().events.push(event.clone());
        Ok(())
    }

    async fn query_dead_periods(&self, session: SessionId) -> Result<Vec<DeadPeriod>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .events
            .iter()
            .filter(|e| {
                e.session_id == session
                    && e.flag == EventFlag::Dead
                    && e.task == TaskKind::Tweets
                    && e.scope == EventScope::Target
            })
            .filter_map(|e| {
                e.period.map(|period| DeadPeriod {
                    account: e.account.clone(),
                    period,
                })
            })
            .collect())
    }

    async fn latest_session_id(&self) -> Result<Option<SessionId>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .events
            .iter()
            .map(|e| e.session_id)
            .max_by_key(|id| id.get().abs()))
    }
}

#[async_trait::async_trait]
impl Directory for MemoryBackend {
    async fn list_accounts(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn account_exists(&self, account: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.accounts.iter().any(|a| a == account) || state.profiles.contains_key(account))
    }
}

/// How the scripted fetcher answers one call
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    /// A profile, or one tweet on each day of the period (capped at three)
    Ok,
    /// No profile, or no tweets
    Empty,
    /// A classified failure
    Fail(FetchError),
}

/// One recorded fetch call
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct FetchCall {
    pub(crate) account: String,
    pub(crate) kind: TaskKind,
    pub(crate) period: Option<Period>,
    pub(crate) relay: RelayAddr,
}

/// Fetcher that replays per-account scripts, then falls back to a default reply
pub(crate) struct ScriptedFetcher {
    default: Reply,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(default: Reply) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies for `account`, consumed in order before the default applies
    pub(crate) fn script(self, account: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(account.to_string(), replies.into());
        self
    }

    pub(crate) fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self, call: FetchCall) -> Reply {
        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&call.account)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.default.clone());
        self.calls.lock().unwrap().push(call);
        reply
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch_profile(
        &self,
        account: &str,
        relay: &RelayAddr,
    ) -> std::result::Result<Option<ProfileRecord>, FetchError> {
        let call = FetchCall {
            account: account.to_string(),
            kind: TaskKind::Profile,
            period: None,
            relay: relay.clone(),
        };
        match self.next_reply(call) {
            Reply::Ok => Ok(Some(sample_profile(account))),
            Reply::Empty => Ok(None),
            Reply::Fail(e) => Err(e),
        }
    }

    async fn fetch_tweets(
        &self,
        account: &str,
        period: &Period,
        relay: &RelayAddr,
    ) -> std::result::Result<Vec<TweetRecord>, FetchError> {
        let call = FetchCall {
            account: account.to_string(),
            kind: TaskKind::Tweets,
            period: Some(*period),
            relay: relay.clone(),
        };
        match self.next_reply(call) {
            Reply::Ok => Ok(period
                .days()
                .take(3)
                .map(|on| sample_tweet(account, on, 0))
                .collect()),
            Reply::Empty => Ok(Vec::new()),
            Reply::Fail(e) => Err(e),
        }
    }
}
