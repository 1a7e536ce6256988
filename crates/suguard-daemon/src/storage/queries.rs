//! Database queries for suguard.

use async_trait::async_trait;
use suguard_core::db::unix_timestamp;
use tracing::debug;

use crate::policy::{Policy, Uid};

use super::db::{Database, DatabaseError};
use super::models::{PolicyRow, TimeoutChoiceRow};
use super::store::{PolicyStore, TimeoutChoiceStore};

impl Database {
    // =========================================================================
    // Policy queries
    // =========================================================================

    /// List all policies, ordered for display.
    ///
    /// Ordering is done in Rust so app names compare with Unicode lowercasing
    /// instead of `SQLite`'s ASCII-only `NOCASE`.
    pub async fn list_policies(&self) -> Result<Vec<Policy>, DatabaseError> {
        let rows = sqlx::query_as::<_, PolicyRow>("SELECT * FROM policies")
            .fetch_all(self.pool())
            .await?;

        let mut policies = rows
            .into_iter()
            .map(Policy::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        policies.sort_by_cached_key(|p| (p.app_name.to_lowercase(), p.package_name.clone()));

        Ok(policies)
    }

    /// Get the policy for a uid.
    pub async fn get_policy(&self, uid: Uid) -> Result<Option<Policy>, DatabaseError> {
        sqlx::query_as::<_, PolicyRow>("SELECT * FROM policies WHERE uid = ?")
            .bind(i64::from(uid))
            .fetch_optional(self.pool())
            .await?
            .map(Policy::try_from)
            .transpose()
    }

    /// Insert or overwrite the policy for `policy.uid`.
    pub async fn upsert_policy(&self, policy: &Policy) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO policies
                (uid, package_name, app_name, decision, logging, notification, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                package_name = excluded.package_name,
                app_name = excluded.app_name,
                decision = excluded.decision,
                logging = excluded.logging,
                notification = excluded.notification,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            ",
        )
        .bind(i64::from(policy.uid))
        .bind(&policy.package_name)
        .bind(&policy.app_name)
        .bind(policy.decision.as_str())
        .bind(policy.logging)
        .bind(policy.notification)
        .bind(policy.expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        debug!(uid = policy.uid, decision = %policy.decision, "Policy stored");
        Ok(())
    }

    /// Delete the policy for a uid. Returns whether a row was removed.
    pub async fn delete_policy(&self, uid: Uid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM policies WHERE uid = ?")
            .bind(i64::from(uid))
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Timeout choice queries
    // =========================================================================

    /// Get the remembered timeout choice index for a uid.
    pub async fn get_timeout_choice(&self, uid: Uid) -> Result<Option<usize>, DatabaseError> {
        let row = sqlx::query_as::<_, TimeoutChoiceRow>(
            "SELECT * FROM timeout_choices WHERE uid = ?",
        )
        .bind(i64::from(uid))
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| {
            usize::try_from(r.choice_index).map_err(|_| {
                DatabaseError::Query(format!("invalid timeout choice: {}", r.choice_index))
            })
        })
        .transpose()
    }

    /// Remember the timeout choice index for a uid.
    pub async fn upsert_timeout_choice(&self, uid: Uid, index: usize) -> Result<(), DatabaseError> {
        let index = i64::try_from(index)
            .map_err(|_| DatabaseError::Query(format!("timeout choice out of range: {index}")))?;
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO timeout_choices (uid, choice_index, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                choice_index = excluded.choice_index,
                updated_at = excluded.updated_at
            ",
        )
        .bind(i64::from(uid))
        .bind(index)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PolicyStore for Database {
    async fn fetch_all(&self) -> Result<Vec<Policy>, DatabaseError> {
        self.list_policies().await
    }

    async fn fetch(&self, uid: Uid) -> Result<Option<Policy>, DatabaseError> {
        self.get_policy(uid).await
    }

    async fn update(&self, policy: &Policy) -> Result<(), DatabaseError> {
        self.upsert_policy(policy).await
    }

    async fn delete(&self, uid: Uid) -> Result<(), DatabaseError> {
        self.delete_policy(uid).await.map(|_| ())
    }
}

#[async_trait]
impl TimeoutChoiceStore for Database {
    async fn timeout_choice(&self, uid: Uid) -> Result<Option<usize>, DatabaseError> {
        self.get_timeout_choice(uid).await
    }

    async fn set_timeout_choice(&self, uid: Uid, index: usize) -> Result<(), DatabaseError> {
        self.upsert_timeout_choice(uid, index).await
    }
}
