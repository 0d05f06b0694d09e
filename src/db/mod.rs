//! Database layer for tweet-backfill
//!
//! Handles SQLite persistence for relays, the session event log, accounts,
//! profiles and tweets. [`Database`] implements every collaborator trait except
//! the fetcher, so one handle can back a whole session.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`relays`] - Relay candidates and their health counters
//! - [`events`] - Append-only scrape event log, dead-period and session-id queries
//! - [`accounts`] - Account directory and blacklisting
//! - [`profiles`] - Profile upserts and counter snapshots
//! - [`tweets`] - Tweet upserts and per-day coverage

use crate::error::DatabaseError;
use crate::types::{RelayAddr, RelayEndpoint};
use crate::{Error, Result};
use chrono::NaiveDate;
use sqlx::{FromRow, sqlite::SqlitePool};

mod accounts;
mod collaborators;
mod events;
mod migrations;
mod profiles;
mod relays;
mod tweets;

/// Relay record from database
#[derive(Debug, Clone, FromRow)]
pub struct RelayRow {
    /// Hostname or IP address
    pub host: String,
    /// TCP port
    pub port: i64,
    /// Where the candidate came from (harvester name, manual, ...)
    pub source: Option<String>,
    /// Whether the relay is excluded from the pool
    pub blacklisted: bool,
    /// Attempts routed through this relay
    pub used_total: i64,
    /// Attempts that did not succeed
    pub failed_total: i64,
    /// Derived health score
    pub fail_ratio: f64,
    /// Outcome of the most recent attempt ("success" or "failure")
    pub last_outcome: Option<String>,
    /// Unix timestamp of the last change
    pub updated_at: i64,
}

impl TryFrom<RelayRow> for RelayEndpoint {
    type Error = Error;

    fn try_from(row: RelayRow) -> Result<Self> {
        let port = u16::try_from(row.port).map_err(|_| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Relay {} has invalid port {}",
                row.host, row.port
            )))
        })?;
        Ok(RelayEndpoint {
            addr: RelayAddr::new(row.host, port),
            used_total: row.used_total,
            failed_total: row.failed_total,
            fail_ratio: row.fail_ratio,
            blacklisted: row.blacklisted,
        })
    }
}

/// Scrape event record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    /// Unique database ID
    pub id: i64,
    /// Session that produced the event
    pub session_id: i64,
    /// "profile" or "tweets"
    pub task: String,
    /// "account" or "target"
    pub scope: String,
    /// Account the event is about
    pub account: String,
    /// "begin", "ok", "dead" or "end"
    pub flag: String,
    /// First day of the period (ISO date)
    pub period_begin: Option<String>,
    /// Last day of the period (ISO date)
    pub period_end: Option<String>,
    /// Relay host used by the attempt
    pub relay_host: Option<String>,
    /// Relay port used by the attempt
    pub relay_port: Option<i64>,
    /// Number of items fetched
    pub items: Option<i64>,
    /// Unix timestamp (milliseconds) when the event was recorded
    pub created_at: i64,
}

/// Parse an ISO date column
pub(crate) fn parse_date(column: &str, value: &str) -> Result<NaiveDate> {
    value.parse::<NaiveDate>().map_err(|e| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "Invalid date in {}: {:?}: {}",
            column, value, e
        )))
    })
}

/// Database handle for tweet-backfill
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
