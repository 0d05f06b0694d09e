//! Account directory.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Register accounts, lower-casing usernames
    ///
    /// Known accounts are left untouched. Returns the number newly added.
    pub async fn add_accounts(&self, accounts: &[String]) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let mut added = 0;
        for account in accounts {
            let result = sqlx::query(
                "INSERT INTO accounts (username, added_at) VALUES (?, ?) ON CONFLICT(username) DO NOTHING",
            )
            .bind(account.trim().to_lowercase())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to add account: {}",
                    e
                )))
            })?;
            added += result.rows_affected();
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit accounts: {}",
                e
            )))
        })?;

        Ok(added)
    }

    /// Usernames eligible for scraping, blacklisted accounts excluded
    pub async fn eligible_accounts(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT username FROM accounts WHERE blacklisted = 0 ORDER BY username ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list accounts: {}",
                e
            )))
        })
    }

    /// Whether an account is registered, blacklisted or not
    pub async fn has_account(&self, account: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM accounts WHERE username = ? LIMIT 1")
                .bind(account.to_lowercase())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check account: {}",
                        e
                    )))
                })?;

        Ok(found.is_some())
    }

    /// Exclude (or re-admit) an account from "all accounts" and sampling
    pub async fn set_account_blacklisted(&self, account: &str, blacklisted: bool) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET blacklisted = ? WHERE username = ?")
            .bind(blacklisted)
            .bind(account.to_lowercase())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update account blacklist flag: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "account {}",
                account
            ))));
        }

        tracing::info!(account = %account, blacklisted = blacklisted, "Account blacklist flag updated");
        Ok(())
    }
}
