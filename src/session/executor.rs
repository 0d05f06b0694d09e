//! Per-target retry state machine

use crate::collaborators::{EventLog, Fetcher, Store};
use crate::error::{Error, Result};
use crate::relay_pool::RelayPool;
use crate::retry::{Outcome, RetryPolicy};
use crate::types::{EventFlag, LogEvent, RelayAddr, Session, TaskKind, Target};
use std::sync::Arc;

/// Lifecycle state of one target
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetState {
    /// Not started
    Pending,
    /// An attempt is running through `relay`
    InProgress {
        /// 1-based attempt number
        attempt: u32,
        /// Relay leased for this attempt
        relay: RelayAddr,
    },
    /// Last attempt failed; another one will follow
    Retry,
    /// Fetched and persisted
    Ok,
    /// Every allowed attempt failed
    Dead,
}

impl TargetState {
    /// Whether the target has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetState::Ok | TargetState::Dead)
    }
}

/// Transient in-memory state of one job
#[derive(Clone, Debug)]
pub struct JobState {
    /// Attempts started so far
    pub attempt_count: u32,
    /// Relay of the current (or last) attempt
    pub relay: Option<RelayAddr>,
    /// Classification of the last finished attempt
    pub last_outcome: Option<Outcome>,
    /// Every state the job went through, in order
    pub transitions: Vec<TargetState>,
}

impl JobState {
    fn new() -> Self {
        Self {
            attempt_count: 0,
            relay: None,
            last_outcome: None,
            transitions: vec![TargetState::Pending],
        }
    }

    /// Current state
    pub fn state(&self) -> &TargetState {
        // transitions always starts with Pending
        self.transitions.last().unwrap_or(&TargetState::Pending)
    }

    fn begin_attempt(&mut self, relay: RelayAddr) {
        self.attempt_count += 1;
        self.relay = Some(relay.clone());
        self.transitions.push(TargetState::InProgress {
            attempt: self.attempt_count,
            relay,
        });
    }

    fn enter(&mut self, state: TargetState) {
        self.transitions.push(state);
    }
}

/// Drives one target through acquire, fetch, classify, then persist, retry or dead
pub struct TargetExecutor {
    session: Arc<Session>,
    pool: Arc<RelayPool>,
    policy: RetryPolicy,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    events: Arc<dyn EventLog>,
}

impl TargetExecutor {
    /// Create an executor bound to one session
    pub fn new(
        session: Arc<Session>,
        pool: Arc<RelayPool>,
        policy: RetryPolicy,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        events: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            session,
            pool,
            policy,
            fetcher,
            store,
            events,
        }
    }

    /// Run `target` to `Ok` or `Dead`
    ///
    /// Fetch failures and store or relay bookkeeping errors count as failed
    /// attempts, so every target that stops short of `Ok` is logged `dead`.
    /// Returns an error only when the event log fails or for fatal errors such
    /// as an exhausted relay pool.
    pub async fn run(&self, target: &Target) -> Result<JobState> {
        let mut job = JobState::new();
        self.log(LogEvent::for_target(self.session.id, target, EventFlag::Begin))
            .await?;

        loop {
            let relay = self.pool.acquire().await?;
            job.begin_attempt(relay.clone());
            tracing::debug!(
                session_id = %self.session.id,
                target = %target,
                attempt = job.attempt_count,
                relay = %relay,
                "Attempt started"
            );

            let (outcome, items) = match self.attempt(target, &relay).await {
                Ok(result) => result,
                Err(e) if e.is_fatal() => {
                    self.pool.discard(&relay).await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.session.id,
                        target = %target,
                        attempt = job.attempt_count,
                        relay = %relay,
                        error = %e,
                        error_code = e.error_code(),
                        "Attempt failed after fetch"
                    );
                    (Outcome::Unknown, 0)
                }
            };
            job.last_outcome = Some(outcome);

            if let Err(e) = self.pool.record_outcome(&relay, outcome).await {
                if e.is_fatal() {
                    self.pool.discard(&relay).await;
                    return Err(e);
                }
                tracing::warn!(
                    relay = %relay,
                    outcome = %outcome,
                    error = %e,
                    "Relay outcome not recorded"
                );
            }

            if outcome.is_success() {
                self.pool.release(relay.clone()).await;
                job.enter(TargetState::Ok);
                self.log(
                    LogEvent::for_target(self.session.id, target, EventFlag::Ok)
                        .with_relay(&relay)
                        .with_items(items),
                )
                .await?;
                tracing::info!(
                    session_id = %self.session.id,
                    target = %target,
                    attempt = job.attempt_count,
                    relay = %relay,
                    items = items,
                    "Target fetched"
                );
                break;
            }

            self.pool.discard(&relay).await;

            if !self.policy.should_retry(job.attempt_count) {
                job.enter(TargetState::Dead);
                self.log(
                    LogEvent::for_target(self.session.id, target, EventFlag::Dead)
                        .with_relay(&relay),
                )
                .await?;
                tracing::error!(
                    session_id = %self.session.id,
                    target = %target,
                    attempts = job.attempt_count,
                    outcome = %outcome,
                    "Target dead after all attempts"
                );
                break;
            }

            job.enter(TargetState::Retry);
            let delay = self.policy.backoff_delay();
            tracing::warn!(
                session_id = %self.session.id,
                target = %target,
                attempt = job.attempt_count,
                max_fails = self.policy.max_fails(),
                relay = %relay,
                outcome = %outcome,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        self.log(LogEvent::for_target(self.session.id, target, EventFlag::End))
            .await?;
        Ok(job)
    }

    /// One fetch through `relay`: classify, then persist on success
    async fn attempt(&self, target: &Target, relay: &RelayAddr) -> Result<(Outcome, i64)> {
        let attempt = match target.kind {
            TaskKind::Profile => {
                let result = self.fetcher.fetch_profile(&target.account, relay).await;
                let outcome = self
                    .policy
                    .classify(&result, |profile| usize::from(profile.is_some()));
                match result {
                    Ok(Some(profile)) => {
                        self.store.save_profile(&profile).await?;
                        (outcome, 1)
                    }
                    Ok(None) => (outcome, 0),
                    Err(e) => {
                        self.log_fetch_error(target, relay, &e);
                        (outcome, 0)
                    }
                }
            }
            TaskKind::Tweets => {
                let period = target.period.ok_or_else(|| {
                    Error::Other(format!("tweet target without a period: {}", target))
                })?;
                let result = self
                    .fetcher
                    .fetch_tweets(&target.account, &period, relay)
                    .await;
                let outcome = self.policy.classify(&result, Vec::len);
                match result {
                    Ok(tweets) if outcome.is_success() => {
                        self.store.save_tweets(&tweets).await?;
                        (outcome, tweets.len() as i64)
                    }
                    Ok(_) => (outcome, 0),
                    Err(e) => {
                        self.log_fetch_error(target, relay, &e);
                        (outcome, 0)
                    }
                }
            }
        };
        Ok(attempt)
    }

    fn log_fetch_error(&self, target: &Target, relay: &RelayAddr, e: &crate::error::FetchError) {
        tracing::debug!(
            session_id = %self.session.id,
            target = %target,
            relay = %relay,
            error = %e,
            "Fetch failed"
        );
    }

    /// Log an account-scoped lifecycle event spanning the session bounds
    pub async fn log_account(&self, account: &str, flag: EventFlag) -> Result<()> {
        self.log(LogEvent::for_account(
            self.session.id,
            account,
            self.session.bounds(),
            flag,
        ))
        .await
    }

    async fn log(&self, event: LogEvent) -> Result<()> {
        self.events.append_event(&event).await
    }
}
