//! Append-only scrape event log.

use crate::error::DatabaseError;
use crate::types::{
    DeadPeriod, EventFlag, EventScope, LogEvent, Period, RelayAddr, SessionId, TaskKind,
};
use crate::{Error, Result};
use chrono::{TimeZone, Utc};

use super::{Database, EventRow, parse_date};

impl Database {
    /// Append one event
    pub async fn insert_event(&self, event: &LogEvent) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO scrape_events (
                session_id, task, scope, account, flag, period_begin, period_end,
                relay_host, relay_port, items, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.session_id)
        .bind(event.task.as_str())
        .bind(event.scope.as_str())
        .bind(&event.account)
        .bind(event.flag.as_str())
        .bind(event.period.map(|p| p.begin.to_string()))
        .bind(event.period.map(|p| p.end.to_string()))
        .bind(event.relay.as_ref().map(|r| r.host.clone()))
        .bind(event.relay.as_ref().map(|r| i64::from(r.port)))
        .bind(event.items)
        .bind(event.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert scrape event: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Tweet periods logged dead under `session`, ordered by account then date
    pub async fn dead_periods(&self, session: SessionId) -> Result<Vec<DeadPeriod>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT account, period_begin, period_end
            FROM scrape_events
            WHERE session_id = ?
              AND flag = 'dead'
              AND task = 'tweets'
              AND scope = 'target'
              AND period_begin IS NOT NULL
              AND period_end IS NOT NULL
            ORDER BY account ASC, period_begin ASC
            "#,
        )
        .bind(session)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query dead periods: {}",
                e
            )))
        })?;

        rows.into_iter()
            .map(|(account, begin, end)| {
                let begin = parse_date("period_begin", &begin)?;
                let end = parse_date("period_end", &end)?;
                let period = Period::new(begin, end).ok_or_else(|| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Dead period for {} has begin {} after end {}",
                        account, begin, end
                    )))
                })?;
                Ok(DeadPeriod { account, period })
            })
            .collect()
    }

    /// Session id with the largest absolute value, if any event was logged
    pub async fn max_session_id(&self) -> Result<Option<SessionId>> {
        sqlx::query_scalar::<_, SessionId>(
            "SELECT session_id FROM scrape_events ORDER BY ABS(session_id) DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query latest session id: {}",
                e
            )))
        })
    }

    /// Every event of one session, in insertion order
    pub async fn session_events(&self, session: SessionId) -> Result<Vec<LogEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, session_id, task, scope, account, flag, period_begin, period_end,
                   relay_host, relay_port, items, created_at
            FROM scrape_events
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get session events: {}",
                e
            )))
        })?;

        rows.into_iter().map(LogEvent::try_from).collect()
    }
}

impl TryFrom<EventRow> for LogEvent {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let invalid = |column: &str, value: &str| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Event {} has invalid {}: {:?}",
                row.id, column, value
            )))
        };

        let task = TaskKind::parse(&row.task).ok_or_else(|| invalid("task", &row.task))?;
        let scope = EventScope::parse(&row.scope).ok_or_else(|| invalid("scope", &row.scope))?;
        let flag = EventFlag::parse(&row.flag).ok_or_else(|| invalid("flag", &row.flag))?;

        let period = match (&row.period_begin, &row.period_end) {
            (Some(begin), Some(end)) => {
                let begin = parse_date("period_begin", begin)?;
                let end = parse_date("period_end", end)?;
                Some(Period::new(begin, end).ok_or_else(|| invalid("period", "reversed"))?)
            }
            _ => None,
        };

        let relay = match (&row.relay_host, row.relay_port) {
            (Some(host), Some(port)) => {
                let port = u16::try_from(port)
                    .map_err(|_| invalid("relay_port", &port.to_string()))?;
                Some(RelayAddr::new(host.clone(), port))
            }
            _ => None,
        };

        let timestamp = Utc
            .timestamp_millis_opt(row.created_at)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(LogEvent {
            session_id: SessionId(row.session_id),
            task,
            scope,
            account: row.account,
            flag,
            period,
            relay,
            items: row.items,
            timestamp,
        })
    }
}
