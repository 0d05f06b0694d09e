//! Relay candidates and their health counters.

use crate::error::DatabaseError;
use crate::types::{RELAY_MIN_SAMPLES, RelayAddr, RelayEndpoint};
use crate::{Error, Result};

use super::{Database, RelayRow};

impl Database {
    /// Insert a relay candidate, leaving counters of a known relay untouched
    ///
    /// Returns true if the relay was new. A known relay only has its source
    /// label refreshed.
    pub async fn upsert_relay(&self, relay: &RelayAddr, source: Option<&str>) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO relays (host, port, source, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(host, port) DO NOTHING
            "#,
        )
        .bind(&relay.host)
        .bind(i64::from(relay.port))
        .bind(source)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert relay: {}",
                e
            )))
        })?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        if let Some(source) = source {
            sqlx::query("UPDATE relays SET source = ? WHERE host = ? AND port = ?")
                .bind(source)
                .bind(&relay.host)
                .bind(i64::from(relay.port))
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to update relay source: {}",
                        e
                    )))
                })?;
        }

        Ok(false)
    }

    /// All relays, best first, blacklisted ones included
    pub async fn list_relays(&self) -> Result<Vec<RelayEndpoint>> {
        let rows = sqlx::query_as::<_, RelayRow>(
            r#"
            SELECT host, port, source, blacklisted, used_total, failed_total,
                   fail_ratio, last_outcome, updated_at
            FROM relays
            ORDER BY fail_ratio ASC, host ASC, port ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list relays: {}",
                e
            )))
        })?;

        rows.into_iter().map(RelayEndpoint::try_from).collect()
    }

    /// Get one relay's full record
    pub async fn get_relay(&self, relay: &RelayAddr) -> Result<Option<RelayRow>> {
        sqlx::query_as::<_, RelayRow>(
            r#"
            SELECT host, port, source, blacklisted, used_total, failed_total,
                   fail_ratio, last_outcome, updated_at
            FROM relays
            WHERE host = ? AND port = ?
            "#,
        )
        .bind(&relay.host)
        .bind(i64::from(relay.port))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get relay: {}",
                e
            )))
        })
    }

    /// Record one attempt through `relay`
    ///
    /// A single UPDATE increments the counters and recomputes `fail_ratio` from
    /// the new values, so concurrent callers serialize inside SQLite and no
    /// increment is lost.
    pub async fn record_relay_attempt(&self, relay: &RelayAddr, success: bool) -> Result<()> {
        let failed = i64::from(!success);
        let outcome = if success { "success" } else { "failure" };
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE relays SET
                used_total = used_total + 1,
                failed_total = failed_total + ?,
                fail_ratio = CASE
                    WHEN used_total + 1 < ? THEN 0.0
                    ELSE CAST(failed_total + ? AS REAL) / (used_total + 1)
                END,
                last_outcome = ?,
                updated_at = ?
            WHERE host = ? AND port = ?
            "#,
        )
        .bind(failed)
        .bind(RELAY_MIN_SAMPLES)
        .bind(failed)
        .bind(outcome)
        .bind(now)
        .bind(&relay.host)
        .bind(i64::from(relay.port))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record relay outcome: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "relay {}",
                relay
            ))));
        }

        Ok(())
    }

    /// Exclude (or re-admit) a relay from the pool
    pub async fn set_relay_blacklisted(&self, relay: &RelayAddr, blacklisted: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE relays SET blacklisted = ?, updated_at = ? WHERE host = ? AND port = ?",
        )
        .bind(blacklisted)
        .bind(chrono::Utc::now().timestamp())
        .bind(&relay.host)
        .bind(i64::from(relay.port))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update relay blacklist flag: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "relay {}",
                relay
            ))));
        }

        tracing::info!(relay = %relay, blacklisted = blacklisted, "Relay blacklist flag updated");
        Ok(())
    }

    /// Zero every relay's counters
    ///
    /// Returns the number of relays reset.
    pub async fn reset_relay_stats(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE relays SET
                used_total = 0,
                failed_total = 0,
                fail_ratio = 0.0,
                last_outcome = NULL,
                updated_at = ?
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset relay stats: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
