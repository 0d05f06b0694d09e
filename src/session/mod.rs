//! Scrape session orchestration
//!
//! A [`SessionCoordinator`] turns one [`RunRequest`] into a session: it
//! allocates the session id, builds the target list (accounts, sample,
//! explicit list, or a prior session's dead periods), fills the relay pool and
//! drains the targets with a fixed number of workers. Each target runs through
//! a [`TargetExecutor`] until it is `Ok` or `Dead`.
//!
//! Profiles are fetched before tweets so tweet planning sees fresh join dates.

mod executor;
mod targets;

pub use executor::{JobState, TargetExecutor, TargetState};

use crate::collaborators::{Directory, EventLog, Fetcher, RelaySource, Store};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::planner::plan_account;
use crate::relay_pool::RelayPool;
use crate::retry::RetryPolicy;
use crate::types::{EventFlag, Session, SessionId, Target, TaskKind};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Which task kinds a run performs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskSet {
    /// Fetch profile snapshots
    pub profiles: bool,
    /// Fetch tweets
    pub tweets: bool,
}

impl TaskSet {
    /// Profiles and tweets
    pub fn all() -> Self {
        Self {
            profiles: true,
            tweets: true,
        }
    }

    /// Profiles only
    pub fn profiles() -> Self {
        Self {
            profiles: true,
            tweets: false,
        }
    }

    /// Tweets only
    pub fn tweets() -> Self {
        Self {
            profiles: false,
            tweets: true,
        }
    }

    /// Whether no task kind is selected
    pub fn is_empty(&self) -> bool {
        !self.profiles && !self.tweets
    }
}

/// Where a run's accounts come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountSelection {
    /// Every eligible account in the directory
    All,
    /// A uniform random sample of eligible accounts
    Sample(usize),
    /// An explicit list, lower-cased; `only_new` drops accounts already known
    List {
        /// Usernames as given
        accounts: Vec<String>,
        /// Skip accounts the directory already knows
        only_new: bool,
    },
    /// The tweet periods logged dead under a prior session (most recent if `None`)
    DeadPeriods {
        /// Session to rescrape
        session: Option<SessionId>,
    },
}

/// A fully specified run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    /// Task kinds to perform
    pub tasks: TaskSet,
    /// Accounts to work on
    pub selection: AccountSelection,
}

impl RunRequest {
    /// Run `tasks` over `selection`
    pub fn new(tasks: TaskSet, selection: AccountSelection) -> Self {
        Self { tasks, selection }
    }

    /// Rescrape the dead tweet periods of `session` (most recent if `None`)
    pub fn rescrape(session: Option<SessionId>) -> Self {
        Self {
            tasks: TaskSet::tweets(),
            selection: AccountSelection::DeadPeriods { session },
        }
    }

    /// Whether this is a rescrape run
    pub fn is_rescrape(&self) -> bool {
        matches!(self.selection, AccountSelection::DeadPeriods { .. })
    }
}

/// Why a run did nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoOpReason {
    /// No task kind selected
    NoTasks,
    /// The selection produced no targets
    NoTargets,
}

/// OK and DEAD counts of one phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseReport {
    /// Targets that reached `Ok`
    pub ok: usize,
    /// Targets that reached `Dead`
    pub dead: usize,
}

impl PhaseReport {
    fn merge(&mut self, other: PhaseReport) {
        self.ok += other.ok;
        self.dead += other.dead;
    }

    /// Targets run in this phase
    pub fn total(&self) -> usize {
        self.ok + self.dead
    }
}

/// Aggregate result of a completed session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    /// Id the session logged its events under
    pub session_id: SessionId,
    /// Profile phase counts
    pub profiles: PhaseReport,
    /// Tweet phase counts
    pub tweets: PhaseReport,
}

impl SessionReport {
    /// Targets that reached `Ok`
    pub fn ok(&self) -> usize {
        self.profiles.ok + self.tweets.ok
    }

    /// Targets that reached `Dead`
    pub fn dead(&self) -> usize {
        self.profiles.dead + self.tweets.dead
    }
}

/// Result of [`SessionCoordinator::run`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing to do; not a failure
    NoOp(NoOpReason),
    /// Every dispatched target reached `Ok` or `Dead`
    Completed(SessionReport),
}

/// Owns the session lifecycle: identity, target list, relay pool and workers
pub struct SessionCoordinator {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    relays: Arc<dyn RelaySource>,
    events: Arc<dyn EventLog>,
    directory: Arc<dyn Directory>,
    today: Option<NaiveDate>,
}

impl SessionCoordinator {
    /// Create a coordinator over explicit collaborators
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        relays: Arc<dyn RelaySource>,
        events: Arc<dyn EventLog>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
            relays,
            events,
            directory,
            today: None,
        }
    }

    /// Create a coordinator whose store, relay source, event log and directory are one database
    pub fn with_database(config: Config, fetcher: Arc<dyn Fetcher>, db: Arc<Database>) -> Self {
        Self::new(
            config,
            fetcher,
            db.clone(),
            db.clone(),
            db.clone(),
            db,
        )
    }

    /// Pin the date periods are clamped against (defaults to today, UTC)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Run one session to completion
    ///
    /// Fails before dispatch on invalid configuration or when no eligible
    /// relay exists, and mid-run if the relay pool runs dry. Dead targets are
    /// counted, never raised.
    pub async fn run(&self, request: RunRequest) -> Result<SessionOutcome> {
        self.config.validate()?;

        if request.tasks.is_empty() {
            tracing::info!("No task selected, nothing to do");
            return Ok(SessionOutcome::NoOp(NoOpReason::NoTasks));
        }

        let latest = self.events.latest_session_id().await?;
        let fresh = latest.map(|id| id.next()).unwrap_or(SessionId(1));
        let today = self
            .today
            .unwrap_or_else(|| chrono::Utc::now().date_naive());

        if let AccountSelection::DeadPeriods { session } = &request.selection {
            let Some(source) = session.or(latest) else {
                tracing::info!("No prior session to rescrape");
                return Ok(SessionOutcome::NoOp(NoOpReason::NoTargets));
            };
            let session = Arc::new(Session::new(fresh.as_rescrape(), &self.config.session, today));
            return self.run_rescrape(&request, session, source).await;
        }

        let session = Arc::new(Session::new(fresh, &self.config.session, today));
        let accounts = targets::resolve_accounts(self.directory.as_ref(), &request.selection).await?;
        if accounts.is_empty() {
            tracing::info!(session_id = %session.id, "No accounts selected, nothing to do");
            return Ok(SessionOutcome::NoOp(NoOpReason::NoTargets));
        }

        tracing::info!(
            session_id = %session.id,
            accounts = accounts.len(),
            profiles = request.tasks.profiles,
            tweets = request.tasks.tweets,
            begin = %session.begin,
            end = %session.end,
            "Session starting"
        );

        let mut report = SessionReport {
            session_id: session.id,
            profiles: PhaseReport::default(),
            tweets: PhaseReport::default(),
        };
        let mut pool: Option<Arc<RelayPool>> = None;

        if request.tasks.profiles {
            let pool = self.ensure_pool(&mut pool).await?;
            report.profiles = self
                .run_phase(&session, &pool, TaskKind::Profile, targets::profile_targets(&accounts))
                .await?;
        }

        if request.tasks.tweets {
            let plans = self.plan(&session, accounts).await?;
            let tweet_targets = targets::tweet_targets(plans);
            if tweet_targets.is_empty() && !request.tasks.profiles {
                tracing::info!(session_id = %session.id, "No periods to fetch, nothing to do");
                return Ok(SessionOutcome::NoOp(NoOpReason::NoTargets));
            }
            if !tweet_targets.is_empty() {
                let pool = self.ensure_pool(&mut pool).await?;
                report.tweets = self
                    .run_phase(&session, &pool, TaskKind::Tweets, tweet_targets)
                    .await?;
            }
        }

        self.finish(report)
    }

    async fn run_rescrape(
        &self,
        request: &RunRequest,
        session: Arc<Session>,
        source: SessionId,
    ) -> Result<SessionOutcome> {
        if request.tasks.profiles {
            tracing::warn!("Rescrape runs only fetch tweets, ignoring profile task");
        }
        if !request.tasks.tweets {
            return Ok(SessionOutcome::NoOp(NoOpReason::NoTargets));
        }

        let dead = self.events.query_dead_periods(source).await?;
        let mut tweet_targets = targets::dead_period_targets(dead);
        // Group by account so account events wrap each account's periods once
        tweet_targets.sort_by(|a, b| a.account.cmp(&b.account));
        if tweet_targets.is_empty() {
            tracing::info!(source_session = %source, "No dead periods to rescrape");
            return Ok(SessionOutcome::NoOp(NoOpReason::NoTargets));
        }

        tracing::info!(
            session_id = %session.id,
            source_session = %source,
            targets = tweet_targets.len(),
            "Rescrape session starting"
        );

        let mut pool = None;
        let pool = self.ensure_pool(&mut pool).await?;
        let tweets = self
            .run_phase(&session, &pool, TaskKind::Tweets, tweet_targets)
            .await?;

        self.finish(SessionReport {
            session_id: session.id,
            profiles: PhaseReport::default(),
            tweets,
        })
    }

    fn finish(&self, report: SessionReport) -> Result<SessionOutcome> {
        tracing::info!(
            session_id = %report.session_id,
            ok = report.ok(),
            dead = report.dead(),
            "Session complete"
        );
        Ok(SessionOutcome::Completed(report))
    }

    /// Create and fill the relay pool on first use
    ///
    /// No eligible relay at all is fatal.
    async fn ensure_pool(&self, slot: &mut Option<Arc<RelayPool>>) -> Result<Arc<RelayPool>> {
        if let Some(pool) = slot {
            return Ok(pool.clone());
        }

        let pool = Arc::new(RelayPool::new(self.relays.clone(), &self.config.relay_pool));
        let queued = pool.populate().await?;
        if queued == 0 {
            tracing::error!("No eligible relay endpoints, aborting session");
            return Err(Error::RelayPoolExhausted);
        }

        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Plan every account's tweet periods, a bounded number at a time
    async fn plan(
        &self,
        session: &Arc<Session>,
        accounts: Vec<String>,
    ) -> Result<Vec<(String, Vec<crate::types::Period>)>> {
        let concurrency = self.config.session.worker_count.max(1);
        stream::iter(accounts)
            .map(|account| {
                let store = self.store.clone();
                let session = session.clone();
                async move {
                    let periods = plan_account(store.as_ref(), &session, &account).await?;
                    Ok::<_, Error>((account, periods))
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await
    }

    /// Drain `phase_targets` with `min(worker_count, targets)` workers
    async fn run_phase(
        &self,
        session: &Arc<Session>,
        pool: &Arc<RelayPool>,
        kind: TaskKind,
        phase_targets: Vec<Target>,
    ) -> Result<PhaseReport> {
        let total = phase_targets.len();
        let slices = targets::partition(phase_targets, self.config.session.worker_count);
        tracing::info!(
            session_id = %session.id,
            task = %kind,
            targets = total,
            workers = slices.len(),
            "Phase starting"
        );

        let executor = Arc::new(TargetExecutor::new(
            session.clone(),
            pool.clone(),
            RetryPolicy::new(session.max_fails, self.config.retry.clone()),
            self.fetcher.clone(),
            self.store.clone(),
            self.events.clone(),
        ));

        let mut workers = JoinSet::new();
        for (worker_id, slice) in slices.into_iter().enumerate() {
            let executor = executor.clone();
            workers.spawn(async move { drain(worker_id, executor, kind, slice).await });
        }

        let mut report = PhaseReport::default();
        while let Some(joined) = workers.join_next().await {
            let worker_report = match joined {
                Ok(Ok(worker_report)) => worker_report,
                Ok(Err(e)) => {
                    workers.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    workers.abort_all();
                    return Err(Error::Other(format!("worker task failed: {}", e)));
                }
            };
            report.merge(worker_report);
        }

        tracing::info!(
            session_id = %session.id,
            task = %kind,
            ok = report.ok,
            dead = report.dead,
            "Phase complete"
        );
        Ok(report)
    }
}

/// Run one worker's slice in order
///
/// Tweet targets are wrapped in account-scoped `begin`/`end` events around
/// each account's contiguous run of periods. Target failures are logged and
/// counted as dead; only fatal errors and event log failures stop the worker.
async fn drain(
    worker_id: usize,
    executor: Arc<TargetExecutor>,
    kind: TaskKind,
    slice: Vec<Target>,
) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();
    let mut open_account: Option<&str> = None;
    for target in &slice {
        if kind == TaskKind::Tweets && open_account != Some(target.account.as_str()) {
            if let Some(account) = open_account {
                executor.log_account(account, EventFlag::End).await?;
            }
            executor
                .log_account(&target.account, EventFlag::Begin)
                .await?;
            open_account = Some(&target.account);
        }

        match executor.run(target).await {
            Ok(job) if *job.state() == TargetState::Ok => report.ok += 1,
            Ok(_) => report.dead += 1,
            Err(e) if e.is_fatal() => {
                tracing::error!(worker = worker_id, target = %target, error = %e, "Worker stopping");
                return Err(e);
            }
            Err(e) => {
                tracing::error!(
                    worker = worker_id,
                    target = %target,
                    error = %e,
                    error_code = e.error_code(),
                    "Target failed"
                );
                report.dead += 1;
            }
        }
    }

    if let Some(account) = open_account {
        executor.log_account(account, EventFlag::End).await?;
    }
    Ok(report)
}
