//! Shared queue of relay endpoints
//!
//! Workers lease a relay with [`RelayPool::acquire`], hold it for exactly one
//! attempt, then either hand it back with [`RelayPool::release`] (success) or
//! drop the lease with [`RelayPool::discard`] (failure). Discarded relays come
//! back only through repopulation, which re-reads the ranked candidate list.

use crate::collaborators::RelaySource;
use crate::config::RelayPoolConfig;
use crate::error::{Error, Result};
use crate::retry::Outcome;
use crate::types::{RelayAddr, RelayEndpoint};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// Queue contents plus the relays currently handed out
#[derive(Debug, Default)]
struct PoolState {
    queue: VecDeque<RelayAddr>,
    leased: HashSet<RelayAddr>,
    /// Candidate reads started but not yet merged into the queue
    refills_in_flight: usize,
}

/// Ranked, health-scored relay queue shared by every worker of a session
pub struct RelayPool {
    source: Arc<dyn RelaySource>,
    low_water_mark: usize,
    state: Mutex<PoolState>,
    available: Notify,
}

impl RelayPool {
    /// Create an empty pool backed by `source`
    pub fn new(source: Arc<dyn RelaySource>, config: &RelayPoolConfig) -> Self {
        Self {
            source,
            low_water_mark: config.low_water_mark,
            state: Mutex::new(PoolState::default()),
            available: Notify::new(),
        }
    }

    /// Load eligible relays, best first, into the queue
    ///
    /// Relays already queued or leased are not added twice. Returns the queue
    /// length afterwards.
    pub async fn populate(&self) -> Result<usize> {
        self.state.lock().await.refills_in_flight += 1;
        self.refill().await?;
        Ok(self.queued().await)
    }

    /// Read the candidate list without holding the lock, then merge it in
    ///
    /// The caller must have counted itself in `refills_in_flight`.
    async fn refill(&self) -> Result<()> {
        let candidates = self.source.list_candidate_relays().await;

        let mut state = self.state.lock().await;
        state.refills_in_flight = state.refills_in_flight.saturating_sub(1);
        let merged = candidates.map(|candidates| Self::merge(&mut state, candidates));
        drop(state);

        self.available.notify_waiters();
        merged
    }

    fn merge(state: &mut PoolState, candidates: Vec<RelayEndpoint>) {
        let mut candidates: Vec<_> = candidates
            .into_iter()
            .filter(|relay| !relay.blacklisted)
            .collect();
        // Stable sort keeps source order among equally healthy relays
        candidates.sort_by(|a, b| a.fail_ratio.total_cmp(&b.fail_ratio));

        let mut added = 0usize;
        for relay in candidates {
            if state.leased.contains(&relay.addr) || state.queue.contains(&relay.addr) {
                continue;
            }
            state.queue.push_back(relay.addr);
            added += 1;
        }

        tracing::info!(
            added = added,
            queue_len = state.queue.len(),
            leased = state.leased.len(),
            "Relay pool populated"
        );
    }

    /// Lease the next relay, waiting while every relay is in use
    ///
    /// Repopulates first when the queue is at or below the low-water mark and
    /// no other refill is running. Fails with [`Error::RelayPoolExhausted`]
    /// when no relay is queued, none is leased, and no refill is pending.
    pub async fn acquire(&self) -> Result<RelayAddr> {
        loop {
            // Registered before checking so a release or refill between the
            // check and the wait is not missed
            let notified = self.available.notified();

            let should_refill = {
                let mut state = self.state.lock().await;
                let low = state.queue.len() <= self.low_water_mark;
                if low && state.refills_in_flight == 0 {
                    state.refills_in_flight += 1;
                    true
                } else {
                    false
                }
            };
            if should_refill {
                self.refill().await?;
            }

            {
                let mut state = self.state.lock().await;
                if let Some(addr) = state.queue.pop_front() {
                    state.leased.insert(addr.clone());
                    tracing::debug!(relay = %addr, queue_len = state.queue.len(), "Relay acquired");
                    return Ok(addr);
                }

                if state.leased.is_empty() && state.refills_in_flight == 0 {
                    tracing::error!("Relay pool exhausted with no relay in use");
                    return Err(Error::RelayPoolExhausted);
                }

                tracing::warn!(
                    outcome = %Outcome::QueueExhausted,
                    leased = state.leased.len(),
                    refilling = state.refills_in_flight > 0,
                    "Relay queue empty, waiting for a relay"
                );
            }
            notified.await;
        }
    }

    /// Return a relay to the back of the queue after a successful attempt
    pub async fn release(&self, relay: RelayAddr) {
        let mut state = self.state.lock().await;
        state.leased.remove(&relay);
        if !state.queue.contains(&relay) {
            state.queue.push_back(relay.clone());
        }
        tracing::debug!(relay = %relay, queue_len = state.queue.len(), "Relay released");
        drop(state);
        self.available.notify_waiters();
    }

    /// Drop the lease on a relay after a failed attempt without requeueing it
    pub async fn discard(&self, relay: &RelayAddr) {
        let mut state = self.state.lock().await;
        state.leased.remove(relay);
        tracing::debug!(relay = %relay, queue_len = state.queue.len(), "Relay discarded");
        drop(state);
        self.available.notify_waiters();
    }

    /// Record one attempt's outcome against the relay's counters
    ///
    /// [`Outcome::QueueExhausted`] never reaches a relay and is ignored.
    pub async fn record_outcome(&self, relay: &RelayAddr, outcome: Outcome) -> Result<()> {
        if !outcome.counts_as_attempt() {
            return Ok(());
        }
        self.source
            .record_relay_outcome(relay, outcome.is_success())
            .await
    }

    /// Number of relays waiting in the queue
    pub async fn queued(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Number of relays currently leased
    pub async fn leased(&self) -> usize {
        self.state.lock().await.leased.len()
    }
}
