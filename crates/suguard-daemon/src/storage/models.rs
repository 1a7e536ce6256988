//! Database models for suguard.

use crate::policy::{Decision, Policy};

use super::db::DatabaseError;

/// Policy record from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PolicyRow {
    pub uid: i64,
    pub package_name: String,
    pub app_name: String,
    pub decision: String,
    pub logging: bool,
    pub notification: bool,
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

impl TryFrom<PolicyRow> for Policy {
    type Error = DatabaseError;

    fn try_from(row: PolicyRow) -> Result<Self, Self::Error> {
        let uid = u32::try_from(row.uid)
            .map_err(|_| DatabaseError::Query(format!("uid out of range: {}", row.uid)))?;
        let decision = Decision::parse(&row.decision).ok_or_else(|| {
            DatabaseError::Query(format!("invalid decision for uid {uid}: {}", row.decision))
        })?;

        Ok(Self {
            uid,
            package_name: row.package_name,
            app_name: row.app_name,
            decision,
            logging: row.logging,
            notification: row.notification,
            expires_at: row.expires_at,
        })
    }
}

/// Remembered timeout choice record from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TimeoutChoiceRow {
    pub uid: i64,
    pub choice_index: i64,
    pub updated_at: i64,
}
