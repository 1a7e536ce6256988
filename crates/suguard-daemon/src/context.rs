//! Request context resolution.
//!
//! Turns an inbound request into the application metadata, existing policy
//! and remembered timeout choice the prompt needs before it can start.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::policy::{Policy, Uid};
use crate::request::{RequestError, SuRequest};
use crate::storage::{PolicyStore, TimeoutChoiceStore};

/// Installed-application metadata for a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub uid: Uid,
    pub package_name: String,
    pub app_name: String,
    /// Opaque icon handle for the presentation layer.
    #[serde(default)]
    pub icon: Option<String>,
}

/// Looks up installed-application metadata by uid.
#[async_trait]
pub trait AppResolver: Send + Sync {
    /// `None` when the uid does not belong to an installed application.
    async fn resolve(&self, uid: Uid) -> Option<AppInfo>;
}

/// Resolves callers through the host's user database.
///
/// The account name doubles as package name; the GECOS full name, when set,
/// is the display name.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAppResolver;

#[cfg(unix)]
#[async_trait]
impl AppResolver for SystemAppResolver {
    async fn resolve(&self, uid: Uid) -> Option<AppInfo> {
        let lookup = tokio::task::spawn_blocking(move || {
            nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
        })
        .await;

        let user = match lookup {
            Ok(Ok(Some(user))) => user,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                warn!(uid, error = %e, "passwd lookup failed");
                return None;
            }
            Err(e) => {
                warn!(uid, error = %e, "passwd lookup task failed");
                return None;
            }
        };

        let gecos = user.gecos.to_string_lossy();
        let full_name = gecos.split(',').next().unwrap_or_default().trim();
        let app_name = if full_name.is_empty() {
            user.name.clone()
        } else {
            full_name.to_string()
        };

        Some(AppInfo {
            uid,
            package_name: user.name,
            app_name,
            icon: None,
        })
    }
}

/// Fixed uid → application table.
#[derive(Debug, Default, Clone)]
pub struct StaticAppResolver {
    apps: HashMap<Uid, AppInfo>,
}

impl StaticAppResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_app(mut self, app: AppInfo) -> Self {
        self.apps.insert(app.uid, app);
        self
    }

    /// Load a JSON array of [`AppInfo`] records.
    pub fn from_json_file(path: &Path) -> suguard_core::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let apps: Vec<AppInfo> = serde_json::from_str(&content)?;
        Ok(apps.into_iter().fold(Self::new(), Self::with_app))
    }
}

#[async_trait]
impl AppResolver for StaticAppResolver {
    async fn resolve(&self, uid: Uid) -> Option<AppInfo> {
        self.apps.get(&uid).cloned()
    }
}

/// Everything known about a request once it has been validated.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub app: AppInfo,
    /// Policy from an earlier decision, if any.
    pub existing: Option<Policy>,
    /// Remembered timeout choice index, already clamped to the offered choices.
    pub timeout_choice: usize,
}

/// Collaborators needed to resolve a [`RequestContext`].
#[derive(Clone)]
pub struct ContextSources {
    pub apps: Arc<dyn AppResolver>,
    pub policies: Arc<dyn PolicyStore>,
    pub choices: Arc<dyn TimeoutChoiceStore>,
}

impl ContextSources {
    /// Resolve a request.
    ///
    /// An unknown caller fails with [`RequestError::MalformedRequest`] before
    /// any store is touched. Store read failures degrade to "nothing stored".
    pub async fn resolve(
        &self,
        request: &SuRequest,
        choice_count: usize,
    ) -> Result<RequestContext, RequestError> {
        let uid = request.uid;
        let app = self
            .apps
            .resolve(uid)
            .await
            .ok_or(RequestError::MalformedRequest { uid })?;

        let (existing, remembered) = tokio::join!(
            self.policies.fetch(uid),
            self.choices.timeout_choice(uid)
        );

        let existing = existing.unwrap_or_else(|e| {
            warn!(uid, error = %e, "Policy lookup failed, prompting without existing policy");
            None
        });

        let timeout_choice = match remembered {
            Ok(Some(index)) if index < choice_count => index,
            Ok(Some(index)) => {
                warn!(uid, index, choice_count, "Remembered timeout choice out of range");
                0
            }
            Ok(None) => 0,
            Err(e) => {
                warn!(uid, error = %e, "Timeout choice lookup failed");
                0
            }
        };

        debug!(
            uid,
            app = %app.app_name,
            has_policy = existing.is_some(),
            timeout_choice,
            "Request context resolved"
        );

        Ok(RequestContext {
            app,
            existing,
            timeout_choice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Decision;
    use crate::testing::{RecordingStore, app};

    fn sources(store: Arc<RecordingStore>, apps: StaticAppResolver) -> ContextSources {
        ContextSources {
            apps: Arc::new(apps),
            policies: store.clone(),
            choices: store,
        }
    }

    #[tokio::test]
    async fn unknown_uid_is_malformed_and_touches_no_store() {
        let store = Arc::new(RecordingStore::new());
        let ctx = sources(store.clone(), StaticAppResolver::new());

        let result = ctx.resolve(&SuRequest { uid: 9999 }, 6).await;

        assert!(matches!(
            result,
            Err(RequestError::MalformedRequest { uid: 9999 })
        ));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn fresh_caller_gets_default_choice() {
        let store = Arc::new(RecordingStore::new());
        let ctx = sources(
            store.clone(),
            StaticAppResolver::new().with_app(app(1000)),
        );

        let resolved = ctx.resolve(&SuRequest { uid: 1000 }, 6).await.unwrap();

        assert_eq!(resolved.app.uid, 1000);
        assert!(resolved.existing.is_none());
        assert_eq!(resolved.timeout_choice, 0);
    }

    #[tokio::test]
    async fn existing_policy_and_choice_are_loaded() {
        let store = Arc::new(RecordingStore::new());
        let existing = Policy {
            uid: 2000,
            package_name: "pkg.2000".to_string(),
            app_name: "App 2000".to_string(),
            decision: Decision::Deny,
            logging: true,
            notification: false,
            expires_at: None,
        };
        store.seed_policy(existing.clone());
        store.seed_choice(2000, 4);
        let ctx = sources(
            store.clone(),
            StaticAppResolver::new().with_app(app(2000)),
        );

        let resolved = ctx.resolve(&SuRequest { uid: 2000 }, 6).await.unwrap();

        assert_eq!(resolved.existing, Some(existing));
        assert_eq!(resolved.timeout_choice, 4);
    }

    #[tokio::test]
    async fn out_of_range_choice_falls_back_to_first() {
        let store = Arc::new(RecordingStore::new());
        store.seed_choice(1000, 9);
        let ctx = sources(
            store.clone(),
            StaticAppResolver::new().with_app(app(1000)),
        );

        let resolved = ctx.resolve(&SuRequest { uid: 1000 }, 6).await.unwrap();

        assert_eq!(resolved.timeout_choice, 0);
    }

    #[tokio::test]
    async fn store_read_failure_still_prompts() {
        let store = Arc::new(RecordingStore::new());
        store.seed_policy(Policy {
            uid: 1000,
            package_name: "pkg.1000".to_string(),
            app_name: "App 1000".to_string(),
            decision: Decision::Allow,
            logging: true,
            notification: true,
            expires_at: None,
        });
        store.fail_reads(true);
        let ctx = sources(
            store.clone(),
            StaticAppResolver::new().with_app(app(1000)),
        );

        let resolved = ctx.resolve(&SuRequest { uid: 1000 }, 6).await.unwrap();

        assert!(resolved.existing.is_none());
        assert_eq!(resolved.timeout_choice, 0);
    }

    #[tokio::test]
    async fn static_resolver_loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        std::fs::write(
            &path,
            r#"[{"uid": 10123, "package_name": "com.termux", "app_name": "Termux"}]"#,
        )
        .unwrap();

        let resolver = StaticAppResolver::from_json_file(&path).unwrap();

        let info = resolver.resolve(10123).await.unwrap();
        assert_eq!(info.app_name, "Termux");
        assert_eq!(info.icon, None);
        assert!(resolver.resolve(1).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_resolver_knows_root() {
        let info = SystemAppResolver.resolve(0).await.unwrap();
        assert_eq!(info.package_name, "root");
    }
}
