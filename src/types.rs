//! Core types for tweet-backfill

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;

/// Number of recorded uses below which a relay is never penalized
pub const RELAY_MIN_SAMPLES: i64 = 20;

/// Identity of one scrape session
///
/// Positive for normal runs, negative for rescrape runs. The absolute value is
/// unique across all sessions logged in one event log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl SessionId {
    /// Create a new SessionId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Whether this id belongs to a rescrape run
    pub fn is_rescrape(&self) -> bool {
        self.0 < 0
    }

    /// The id a rescrape run records for the freshly allocated `self`
    pub fn as_rescrape(&self) -> Self {
        Self(-self.0.abs())
    }

    /// The next free id after `self`, ignoring the rescrape sign
    pub fn next(&self) -> Self {
        Self(self.0.abs() + 1)
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<SessionId> for i64 {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for SessionId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SessionId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SessionId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Kind of work a target performs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Fetch the account's profile snapshot
    Profile,
    /// Fetch the account's tweets for one period
    Tweets,
}

impl TaskKind {
    /// Stable string form used in the event log
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Profile => "profile",
            TaskKind::Tweets => "tweets",
        }
    }

    /// Parse the event log string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "profile" => Some(TaskKind::Profile),
            "tweets" => Some(TaskKind::Tweets),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date range `[begin, end]`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    /// First day of the period
    pub begin: NaiveDate,
    /// Last day of the period (inclusive)
    pub end: NaiveDate,
}

impl Period {
    /// Create a period, returning `None` when `begin > end`
    pub fn new(begin: NaiveDate, end: NaiveDate) -> Option<Self> {
        (begin <= end).then_some(Self { begin, end })
    }

    /// `end - begin` in days; zero for a single-day period
    pub fn length_days(&self) -> i64 {
        (self.end - self.begin).num_days()
    }

    /// Number of calendar days covered
    pub fn day_count(&self) -> i64 {
        self.length_days() + 1
    }

    /// Whether `day` falls inside the period
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.begin <= day && day <= self.end
    }

    /// Iterate every day of the period in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.begin
            .iter_days()
            .take_while(move |day| *day <= self.end)
    }

    /// Bounds to hand to a remote search whose "until" date is exclusive.
    ///
    /// A single-day period would otherwise produce an empty search window, so
    /// its end is pushed out by one day. Longer periods are returned as-is.
    pub fn fetch_bounds(&self) -> (NaiveDate, NaiveDate) {
        if self.begin == self.end {
            (self.begin, self.end + ChronoDuration::days(1))
        } else {
            (self.begin, self.end)
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}

/// One unit of work: an account plus a task kind plus, for tweets, a period
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Account (lower-cased username)
    pub account: String,
    /// What to fetch
    pub kind: TaskKind,
    /// Period to fetch, set for tweet targets only
    pub period: Option<Period>,
}

impl Target {
    /// Profile target for `account`
    pub fn profile(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            kind: TaskKind::Profile,
            period: None,
        }
    }

    /// Tweet target for `account` over `period`
    pub fn tweets(account: impl Into<String>, period: Period) -> Self {
        Self {
            account: account.into(),
            kind: TaskKind::Tweets,
            period: Some(period),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.period {
            Some(period) => write!(f, "{} {} {}", self.kind, self.account, period),
            None => write!(f, "{} {}", self.kind, self.account),
        }
    }
}

/// Network address of a relay endpoint
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayAddr {
    /// Hostname or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl RelayAddr {
    /// Create a new relay address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// HTTP proxy URL a fetcher configures its client with
    pub fn proxy_url(&self) -> Result<url::Url, url::ParseError> {
        url::Url::parse(&format!("http://{}:{}", self.host, self.port))
    }
}

impl std::fmt::Display for RelayAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Health ratio for a relay with the given counters.
///
/// Relays with fewer than [`RELAY_MIN_SAMPLES`] uses always score `0.0` so new
/// endpoints sort to the front.
pub fn fail_ratio(used_total: i64, failed_total: i64) -> f64 {
    if used_total < RELAY_MIN_SAMPLES {
        0.0
    } else {
        failed_total as f64 / used_total as f64
    }
}

/// A relay endpoint with its cumulative health counters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    /// Address of the relay
    pub addr: RelayAddr,
    /// Number of attempts routed through this relay
    pub used_total: i64,
    /// Number of those attempts that did not succeed
    pub failed_total: i64,
    /// Derived health score, see [`fail_ratio`]
    pub fail_ratio: f64,
    /// Blacklisted relays are never handed out
    pub blacklisted: bool,
}

impl RelayEndpoint {
    /// A fresh, never-used endpoint
    pub fn new(addr: RelayAddr) -> Self {
        Self {
            addr,
            used_total: 0,
            failed_total: 0,
            fail_ratio: 0.0,
            blacklisted: false,
        }
    }

    /// Apply one recorded outcome to the counters
    pub fn record(&mut self, success: bool) {
        self.used_total += 1;
        if !success {
            self.failed_total += 1;
        }
        self.fail_ratio = fail_ratio(self.used_total, self.failed_total);
    }
}

/// Lifecycle transition recorded in the event log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFlag {
    /// Work on the target started
    Begin,
    /// Target fetched and persisted
    Ok,
    /// Target exhausted its attempts
    Dead,
    /// Work on the target finished, whatever the result
    End,
}

impl EventFlag {
    /// Stable string form used in the event log
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFlag::Begin => "begin",
            EventFlag::Ok => "ok",
            EventFlag::Dead => "dead",
            EventFlag::End => "end",
        }
    }

    /// Parse the event log string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "begin" => Some(EventFlag::Begin),
            "ok" => Some(EventFlag::Ok),
            "dead" => Some(EventFlag::Dead),
            "end" => Some(EventFlag::End),
            _ => None,
        }
    }
}

/// What an event is about: a whole account run or one target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventScope {
    /// A run of one account's tweet periods within a worker
    Account,
    /// A single target (profile, or one tweet period)
    Target,
}

impl EventScope {
    /// Stable string form used in the event log
    pub fn as_str(&self) -> &'static str {
        match self {
            EventScope::Account => "account",
            EventScope::Target => "target",
        }
    }

    /// Parse the event log string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "account" => Some(EventScope::Account),
            "target" => Some(EventScope::Target),
            _ => None,
        }
    }
}

/// Append-only fact describing one lifecycle transition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Session that produced the event
    pub session_id: SessionId,
    /// Task kind of the target
    pub task: TaskKind,
    /// Whether the event covers an account run or a single target
    pub scope: EventScope,
    /// Account the event is about
    pub account: String,
    /// Transition being recorded
    pub flag: EventFlag,
    /// Period, for tweet events
    pub period: Option<Period>,
    /// Relay used by the attempt that produced the event
    pub relay: Option<RelayAddr>,
    /// Number of items fetched (ok events)
    pub items: Option<i64>,
    /// When the event happened
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// Event for a single target
    pub fn for_target(session_id: SessionId, target: &Target, flag: EventFlag) -> Self {
        Self {
            session_id,
            task: target.kind,
            scope: EventScope::Target,
            account: target.account.clone(),
            flag,
            period: target.period,
            relay: None,
            items: None,
            timestamp: Utc::now(),
        }
    }

    /// Account-scoped tweet event spanning the session bounds
    pub fn for_account(
        session_id: SessionId,
        account: &str,
        bounds: Option<Period>,
        flag: EventFlag,
    ) -> Self {
        Self {
            session_id,
            task: TaskKind::Tweets,
            scope: EventScope::Account,
            account: account.to_string(),
            flag,
            period: bounds,
            relay: None,
            items: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the relay used
    pub fn with_relay(mut self, relay: &RelayAddr) -> Self {
        self.relay = Some(relay.clone());
        self
    }

    /// Attach the number of items fetched
    pub fn with_items(mut self, items: i64) -> Self {
        self.items = Some(items);
        self
    }
}

/// An (account, period) pair that exhausted its attempts in some session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeadPeriod {
    /// Account
    pub account: String,
    /// Period that was never fetched
    pub period: Period,
}

/// Number of stored tweets for an account on one day
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    /// Day
    pub date: NaiveDate,
    /// Stored tweets on that day
    pub count: i64,
}

/// Profile snapshot as returned by a fetcher
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Stable remote user id (upsert key)
    pub user_id: String,
    /// Username
    pub username: String,
    /// Display name
    pub name: String,
    /// Profile bio
    pub bio: Option<String>,
    /// Day the account was created
    pub join_date: NaiveDate,
    /// Free-form location
    pub location: Option<String>,
    /// Profile URL
    pub url: Option<String>,
    /// Protected account
    pub private: bool,
    /// Verified account
    pub verified: bool,
    /// Follower count
    pub followers: i64,
    /// Following count
    pub following: i64,
    /// Like count
    pub likes: i64,
    /// Tweet count
    pub tweets: i64,
    /// Media count
    pub media: i64,
}

/// Tweet as returned by a fetcher
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TweetRecord {
    /// Stable remote tweet id (upsert key)
    pub tweet_id: String,
    /// Conversation the tweet belongs to
    pub conversation_id: String,
    /// Author user id
    pub user_id: String,
    /// Author username
    pub username: String,
    /// Creation time (UTC)
    pub created_at: NaiveDateTime,
    /// Tweet text
    pub text: String,
    /// Hashtags, without the leading `#`
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Like count
    pub likes: i64,
    /// Reply count
    pub replies: i64,
    /// Retweet count
    pub retweets: i64,
}

impl TweetRecord {
    /// Calendar day the tweet was posted
    pub fn date(&self) -> NaiveDate {
        self.created_at.date()
    }

    /// A tweet is a reply when it does not open its own conversation
    pub fn is_reply(&self) -> bool {
        self.tweet_id != self.conversation_id
    }
}

/// Immutable per-run session parameters
///
/// Built once from [`SessionConfig`] when a run starts, then shared read-only
/// with every worker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Session {
    /// Session identity
    pub id: SessionId,
    /// Requested first day
    pub begin: NaiveDate,
    /// Requested last day (already resolved against today)
    pub end: NaiveDate,
    /// Day the session was created, used to clamp periods
    pub today: NaiveDate,
    /// Maximum `end - begin` of one tweet period, in days
    pub max_window_days: u32,
    /// Maximum attempts per target
    pub max_fails: u32,
    /// Daily tweet count at which a day counts as covered
    pub min_tweets_per_day: u32,
    /// Only fetch days without coverage
    pub missing_only: bool,
    /// Join date assumed for accounts without a stored profile
    pub fallback_join_date: NaiveDate,
}

impl Session {
    /// Freeze a session from configuration
    pub fn new(id: SessionId, config: &SessionConfig, today: NaiveDate) -> Self {
        Self {
            id,
            begin: config.begin_date,
            end: config.end_date.unwrap_or(today),
            today,
            max_window_days: config.max_window_days,
            max_fails: config.max_fails,
            min_tweets_per_day: config.min_tweets_per_day,
            missing_only: config.missing_only,
            fallback_join_date: config.fallback_join_date,
        }
    }

    /// The requested range, if non-empty
    pub fn bounds(&self) -> Option<Period> {
        Period::new(self.begin, self.end)
    }
}
