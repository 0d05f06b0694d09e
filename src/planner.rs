//! Period planning for one account's tweet backfill
//!
//! [`plan_periods`] is pure: it takes the clamping inputs plus optional daily
//! coverage and returns the ordered windows to fetch. [`plan_account`] gathers
//! those inputs from a [`Store`].

use crate::collaborators::Store;
use crate::error::Result;
use crate::types::{DailyCount, Period, Session};
use chrono::{Duration as ChronoDuration, NaiveDate};

/// Inputs to [`plan_periods`]
#[derive(Clone, Debug, PartialEq)]
pub struct PlanRequest {
    /// Day the account was created
    pub join_date: NaiveDate,
    /// Requested first day
    pub begin: NaiveDate,
    /// Requested last day
    pub end: NaiveDate,
    /// Current day; nothing after it is planned
    pub today: NaiveDate,
    /// Largest allowed `end - begin` of one period, in days (at least 1)
    pub max_window_days: u32,
    /// Only plan days that are not covered yet
    pub missing_only: bool,
    /// Daily tweet count at which a day counts as covered
    pub min_tweets_per_day: u32,
}

impl PlanRequest {
    /// Planning inputs for `session` and an account that joined on `join_date`
    pub fn for_session(session: &Session, join_date: NaiveDate) -> Self {
        Self {
            join_date,
            begin: session.begin,
            end: session.end,
            today: session.today,
            max_window_days: session.max_window_days,
            missing_only: session.missing_only,
            min_tweets_per_day: session.min_tweets_per_day,
        }
    }

    /// Requested range clamped to the join date and today, if non-empty
    pub fn clamped(&self) -> Option<Period> {
        Period::new(self.begin.max(self.join_date), self.end.min(self.today))
    }
}

/// Compute the ordered, non-overlapping periods to fetch
///
/// `coverage` is only consulted when `missing_only` is set. Days whose count is
/// at least `min_tweets_per_day` are skipped; each maximal run of uncovered
/// days becomes a candidate. Candidates longer than the window are split into
/// consecutive pieces with no gaps.
pub fn plan_periods(request: &PlanRequest, coverage: Option<&[DailyCount]>) -> Vec<Period> {
    let Some(range) = request.clamped() else {
        return Vec::new();
    };

    let candidates = if request.missing_only {
        uncovered_runs(range, coverage.unwrap_or_default(), request.min_tweets_per_day)
    } else {
        vec![range]
    };

    let window = i64::from(request.max_window_days.max(1));
    candidates
        .into_iter()
        .flat_map(|candidate| split_period(candidate, window))
        .collect()
}

/// Maximal runs of days in `range` not covered by `coverage`
fn uncovered_runs(range: Period, coverage: &[DailyCount], min_tweets: u32) -> Vec<Period> {
    let mut anchors: Vec<NaiveDate> = coverage
        .iter()
        .filter(|day| day.count >= i64::from(min_tweets) && range.contains(day.date))
        .map(|day| day.date)
        .collect();
    anchors.sort_unstable();
    anchors.dedup();

    let mut runs = Vec::new();
    let mut cursor = Some(range.begin);
    for anchor in anchors {
        let Some(start) = cursor else { break };
        if anchor > start
            && let Some(last) = anchor.pred_opt()
            && let Some(run) = Period::new(start, last)
        {
            runs.push(run);
        }
        cursor = anchor.succ_opt();
    }
    if let Some(start) = cursor
        && let Some(run) = Period::new(start, range.end)
    {
        runs.push(run);
    }
    runs
}

/// Split `period` so every piece has `end - begin <= window`
fn split_period(period: Period, window: i64) -> Vec<Period> {
    if period.length_days() <= window {
        return vec![period];
    }

    let mut pieces = Vec::new();
    let mut cursor = period.begin;
    while (period.end - cursor).num_days() >= window {
        let piece_end = cursor + ChronoDuration::days(window - 1);
        pieces.push(Period {
            begin: cursor,
            end: piece_end,
        });
        cursor = piece_end + ChronoDuration::days(1);
    }
    pieces.push(Period {
        begin: cursor,
        end: period.end,
    });
    pieces
}

/// Plan one account's tweet periods for `session`
///
/// Accounts without a stored profile are clamped against the session's
/// fallback join date.
pub async fn plan_account(
    store: &dyn Store,
    session: &Session,
    account: &str,
) -> Result<Vec<Period>> {
    let join_date = match store.join_date(account).await? {
        Some(date) => date,
        None => {
            tracing::warn!(
                account = %account,
                fallback = %session.fallback_join_date,
                "No stored join date, using fallback"
            );
            session.fallback_join_date
        }
    };

    let request = PlanRequest::for_session(session, join_date);
    let coverage = match (request.missing_only, request.clamped()) {
        (true, Some(range)) => Some(store.tweets_per_day(account, range.begin, range.end).await?),
        _ => None,
    };

    let periods = plan_periods(&request, coverage.as_deref());
    tracing::debug!(
        account = %account,
        join_date = %join_date,
        periods = periods.len(),
        missing_only = request.missing_only,
        "Planned tweet periods"
    );
    Ok(periods)
}
