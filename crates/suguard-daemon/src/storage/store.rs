//! Storage seams used by the decision engine.
//!
//! The engine only talks to these traits; [`super::Database`] is the durable
//! implementation.

use async_trait::async_trait;

use crate::policy::{Policy, Uid};

use super::db::DatabaseError;

/// Durable per-caller policy store.
///
/// Writes for the same uid are last-write-wins; different uids never block
/// each other at this layer.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// All policies, ordered by app name (case-insensitive) then package name.
    async fn fetch_all(&self) -> Result<Vec<Policy>, DatabaseError>;

    async fn fetch(&self, uid: Uid) -> Result<Option<Policy>, DatabaseError>;

    /// Idempotent upsert keyed by `policy.uid`. Overwrites every field.
    async fn update(&self, policy: &Policy) -> Result<(), DatabaseError>;

    /// Remove the policy for `uid`. Absent rows are not an error.
    async fn delete(&self, uid: Uid) -> Result<(), DatabaseError>;
}

/// Remembered timeout-choice index per caller.
#[async_trait]
pub trait TimeoutChoiceStore: Send + Sync {
    async fn timeout_choice(&self, uid: Uid) -> Result<Option<usize>, DatabaseError>;

    async fn set_timeout_choice(&self, uid: Uid, index: usize) -> Result<(), DatabaseError>;
}
