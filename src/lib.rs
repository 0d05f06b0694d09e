//! # tweet-backfill
//!
//! Resumable, relay-rotating backfill orchestrator for per-account profile and
//! tweet history.
//!
//! ## Design Philosophy
//!
//! tweet-backfill decides *what* to fetch, *in what order*, *through which
//! relay*, and how to retry. It does not fetch anything itself:
//! - **Fetch is pluggable** - implement [`Fetcher`] over any HTTP client
//! - **Resumable** - every lifecycle transition is logged, and dead periods
//!   of a session can be rescraped later
//! - **Gap-aware** - missing-only runs fetch just the days without coverage
//! - **Library-first** - no CLI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tweet_backfill::{
//!     AccountSelection, Config, Database, FetchError, Fetcher, Period, ProfileRecord,
//!     RelayAddr, RunRequest, SessionCoordinator, TaskSet, TweetRecord,
//! };
//!
//! struct MyFetcher;
//!
//! #[async_trait::async_trait]
//! impl Fetcher for MyFetcher {
//!     async fn fetch_profile(
//!         &self,
//!         _account: &str,
//!         _relay: &RelayAddr,
//!     ) -> Result<Option<ProfileRecord>, FetchError> {
//!         Ok(None)
//!     }
//!
//!     async fn fetch_tweets(
//!         &self,
//!         _account: &str,
//!         _period: &Period,
//!         _relay: &RelayAddr,
//!     ) -> Result<Vec<TweetRecord>, FetchError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     db.upsert_relay(&RelayAddr::new("203.0.113.5", 3128), Some("manual")).await?;
//!     db.add_accounts(&["someone".to_string()]).await?;
//!
//!     let coordinator = SessionCoordinator::with_database(config, Arc::new(MyFetcher), db);
//!     let outcome = coordinator
//!         .run(RunRequest::new(TaskSet::all(), AccountSelection::All))
//!         .await?;
//!     println!("{:?}", outcome);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Collaborator interfaces (fetch, store, relay source, event log, directory)
pub mod collaborators;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Period planning
pub mod planner;
/// Relay queue
pub mod relay_pool;
/// Outcome classification and retry policy
pub mod retry;
/// Session orchestration
pub mod session;
/// Core types
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use collaborators::{Directory, EventLog, Fetcher, RelaySource, Store};
pub use config::{Config, PersistenceConfig, RelayPoolConfig, RetryConfig, SessionConfig};
pub use db::Database;
pub use error::{DatabaseError, Error, FetchError, Result};
pub use relay_pool::RelayPool;
pub use retry::{IsRetryable, Outcome, RetryPolicy};
pub use session::{
    AccountSelection, NoOpReason, PhaseReport, RunRequest, SessionCoordinator, SessionOutcome,
    SessionReport, TaskSet,
};
pub use types::{
    DailyCount, DeadPeriod, EventFlag, EventScope, LogEvent, Period, ProfileRecord, RelayAddr,
    RelayEndpoint, Session, SessionId, TaskKind, Target, TweetRecord,
};
