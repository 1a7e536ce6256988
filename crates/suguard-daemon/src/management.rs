//! Policy management surface.
//!
//! Direct edits of stored policies: list, flip the decision, revoke, and
//! toggle the logging and notification flags. Flipping a deny into an allow
//! goes through the authentication gate when it is enabled; every other edit
//! only reduces or annotates privilege and is applied directly.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::auth::AuthGate;
use crate::policy::{Decision, Policy, Uid};
use crate::settings::PromptSettings;
use crate::storage::{DatabaseError, PolicyStore};

/// What a management edit changed, phrased for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyChange {
    Decision { app_name: String, decision: Decision },
    Revoked { app_name: String },
    Logging { app_name: String, enabled: bool },
    Notification { app_name: String, enabled: bool },
}

impl fmt::Display for PolicyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision {
                app_name,
                decision: Decision::Allow,
            } => write!(f, "{app_name} was granted superuser rights"),
            Self::Decision {
                app_name,
                decision: Decision::Deny,
            } => write!(f, "{app_name} was denied superuser rights"),
            Self::Revoked { app_name } => write!(f, "{app_name} policy revoked"),
            Self::Logging { app_name, enabled } => {
                let state = if *enabled { "enabled" } else { "disabled" };
                write!(f, "Logging {state} for {app_name}")
            }
            Self::Notification { app_name, enabled } => {
                let state = if *enabled { "enabled" } else { "disabled" };
                write!(f, "Notifications {state} for {app_name}")
            }
        }
    }
}

/// Result of an edit that may require authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Applied(PolicyChange),
    /// The gate refused; nothing was written.
    NotAuthenticated,
}

/// Management errors.
#[derive(Debug, thiserror::Error)]
pub enum ManageError {
    #[error("No policy for uid {uid}")]
    NotFound { uid: Uid },

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

pub struct PolicyManager {
    store: Arc<dyn PolicyStore>,
    gate: Arc<dyn AuthGate>,
    settings: Arc<PromptSettings>,
}

impl PolicyManager {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        gate: Arc<dyn AuthGate>,
        settings: Arc<PromptSettings>,
    ) -> Self {
        Self {
            store,
            gate,
            settings,
        }
    }

    /// All policies in display order.
    pub async fn list(&self) -> Result<Vec<Policy>, ManageError> {
        Ok(self.store.fetch_all().await?)
    }

    /// Set the decision for an existing policy.
    pub async fn set_decision(
        &self,
        uid: Uid,
        decision: Decision,
    ) -> Result<ChangeOutcome, ManageError> {
        let policy = self.existing(uid).await?;

        let escalates = policy.decision == Decision::Deny && decision == Decision::Allow;
        if escalates
            && self.settings.auth_enabled()
            && !self.gate.authenticate().await.passed()
        {
            info!(uid, "Grant toggle refused by secondary authentication");
            return Ok(ChangeOutcome::NotAuthenticated);
        }

        self.store.update(&policy.with_decision(decision)).await?;
        Ok(self.applied(
            uid,
            PolicyChange::Decision {
                app_name: policy.app_name,
                decision,
            },
        ))
    }

    /// Delete the policy so the caller is prompted again.
    pub async fn revoke(&self, uid: Uid) -> Result<ChangeOutcome, ManageError> {
        let policy = self.existing(uid).await?;
        self.store.delete(uid).await?;
        Ok(self.applied(
            uid,
            PolicyChange::Revoked {
                app_name: policy.app_name,
            },
        ))
    }

    pub async fn set_logging(&self, uid: Uid, enabled: bool) -> Result<ChangeOutcome, ManageError> {
        let policy = self.existing(uid).await?;
        self.store
            .update(&Policy {
                logging: enabled,
                ..policy.clone()
            })
            .await?;
        Ok(self.applied(
            uid,
            PolicyChange::Logging {
                app_name: policy.app_name,
                enabled,
            },
        ))
    }

    pub async fn set_notification(
        &self,
        uid: Uid,
        enabled: bool,
    ) -> Result<ChangeOutcome, ManageError> {
        let policy = self.existing(uid).await?;
        self.store
            .update(&Policy {
                notification: enabled,
                ..policy.clone()
            })
            .await?;
        Ok(self.applied(
            uid,
            PolicyChange::Notification {
                app_name: policy.app_name,
                enabled,
            },
        ))
    }

    async fn existing(&self, uid: Uid) -> Result<Policy, ManageError> {
        self.store
            .fetch(uid)
            .await?
            .ok_or(ManageError::NotFound { uid })
    }

    #[allow(clippy::unused_self)]
    fn applied(&self, uid: Uid, change: PolicyChange) -> ChangeOutcome {
        info!(uid, change = %change, "Policy changed");
        ChangeOutcome::Applied(change)
    }
}
