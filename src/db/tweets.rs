//! Tweet upserts and per-day coverage.

use crate::error::DatabaseError;
use crate::types::{DailyCount, TweetRecord};
use crate::{Error, Result};
use chrono::NaiveDate;

use super::{Database, parse_date};

impl Database {
    /// Upsert tweets keyed by tweet id, latest field values winning
    ///
    /// `date` and `is_reply` are derived here; hashtags are stored as a JSON
    /// array. All tweets of one call are written in a single transaction.
    pub async fn upsert_tweets(&self, tweets: &[TweetRecord]) -> Result<u64> {
        if tweets.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let mut written = 0;
        for tweet in tweets {
            let hashtags = serde_json::to_string(&tweet.hashtags)?;
            let result = sqlx::query(
                r#"
                INSERT INTO tweets (
                    tweet_id, conversation_id, user_id, username, created_at, date, text,
                    hashtags, is_reply, likes, replies, retweets, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tweet_id) DO UPDATE SET
                    conversation_id = excluded.conversation_id,
                    user_id = excluded.user_id,
                    username = excluded.username,
                    created_at = excluded.created_at,
                    date = excluded.date,
                    text = excluded.text,
                    hashtags = excluded.hashtags,
                    is_reply = excluded.is_reply,
                    likes = excluded.likes,
                    replies = excluded.replies,
                    retweets = excluded.retweets,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&tweet.tweet_id)
            .bind(&tweet.conversation_id)
            .bind(&tweet.user_id)
            .bind(tweet.username.to_lowercase())
            .bind(tweet.created_at.and_utc().timestamp())
            .bind(tweet.date().to_string())
            .bind(&tweet.text)
            .bind(hashtags)
            .bind(tweet.is_reply())
            .bind(tweet.likes)
            .bind(tweet.replies)
            .bind(tweet.retweets)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to upsert tweet {}: {}",
                    tweet.tweet_id, e
                )))
            })?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit tweets: {}",
                e
            )))
        })?;

        Ok(written)
    }

    /// Stored tweets per day for an account within `[begin, end]`
    pub async fn daily_tweet_counts(
        &self,
        account: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT date, COUNT(*) FROM tweets
            WHERE username = ? AND date >= ? AND date <= ?
            GROUP BY date
            ORDER BY date ASC
            "#,
        )
        .bind(account.to_lowercase())
        .bind(begin.to_string())
        .bind(end.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count tweets per day: {}",
                e
            )))
        })?;

        rows.into_iter()
            .map(|(date, count)| {
                Ok(DailyCount {
                    date: parse_date("date", &date)?,
                    count,
                })
            })
            .collect()
    }

    /// Number of stored tweets for an account
    pub async fn tweet_count(&self, account: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tweets WHERE username = ?")
            .bind(account.to_lowercase())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count tweets: {}",
                    e
                )))
            })
    }

    /// Stored hashtags and reply flag of one tweet
    pub async fn tweet_tags(&self, tweet_id: &str) -> Result<Option<(Vec<String>, bool)>> {
        let row: Option<(String, bool)> =
            sqlx::query_as("SELECT hashtags, is_reply FROM tweets WHERE tweet_id = ?")
                .bind(tweet_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get tweet: {}",
                        e
                    )))
                })?;

        row.map(|(hashtags, is_reply)| Ok((serde_json::from_str(&hashtags)?, is_reply)))
            .transpose()
    }
}
