//! Profile upserts and counter snapshots.

use crate::error::DatabaseError;
use crate::types::ProfileRecord;
use crate::{Error, Result};
use chrono::NaiveDate;

use super::{Database, parse_date};

impl Database {
    /// Upsert a profile keyed by user id and append a counters snapshot
    ///
    /// The account is registered in the directory if it was not already.
    pub async fn upsert_profile(&self, profile: &ProfileRecord) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let username = profile.username.to_lowercase();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            INSERT INTO profiles (
                user_id, username, name, bio, join_date, location, url, private, verified,
                followers, following, likes, tweets, media, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                name = excluded.name,
                bio = excluded.bio,
                join_date = excluded.join_date,
                location = excluded.location,
                url = excluded.url,
                private = excluded.private,
                verified = excluded.verified,
                followers = excluded.followers,
                following = excluded.following,
                likes = excluded.likes,
                tweets = excluded.tweets,
                media = excluded.media,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&profile.user_id)
        .bind(&username)
        .bind(&profile.name)
        .bind(&profile.bio)
        .bind(profile.join_date.to_string())
        .bind(&profile.location)
        .bind(&profile.url)
        .bind(profile.private)
        .bind(profile.verified)
        .bind(profile.followers)
        .bind(profile.following)
        .bind(profile.likes)
        .bind(profile.tweets)
        .bind(profile.media)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert profile: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            INSERT INTO profile_snapshots (user_id, followers, following, likes, tweets, media, taken_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&profile.user_id)
        .bind(profile.followers)
        .bind(profile.following)
        .bind(profile.likes)
        .bind(profile.tweets)
        .bind(profile.media)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert profile snapshot: {}",
                e
            )))
        })?;

        sqlx::query(
            "INSERT INTO accounts (username, added_at) VALUES (?, ?) ON CONFLICT(username) DO NOTHING",
        )
        .bind(&username)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to register account: {}",
                e
            )))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit profile: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Stored join date of the most recently updated profile with this username
    pub async fn profile_join_date(&self, account: &str) -> Result<Option<NaiveDate>> {
        let join_date: Option<String> = sqlx::query_scalar(
            r#"
            SELECT join_date FROM profiles
            WHERE username = ?
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(account.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get join date: {}",
                e
            )))
        })?;

        join_date
            .map(|date| parse_date("join_date", &date))
            .transpose()
    }

    /// Number of counter snapshots stored for a user id
    pub async fn profile_snapshot_count(&self, user_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM profile_snapshots WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count profile snapshots: {}",
                    e
                )))
            })
    }
}
