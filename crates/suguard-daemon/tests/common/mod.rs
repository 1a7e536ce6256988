//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use suguard_daemon::auth::{AuthGate, AuthOutcome};
use suguard_daemon::context::{AppInfo, StaticAppResolver};
use suguard_daemon::request::{PromptHandle, PromptView, ResponseChannel, SuResponse};

pub fn apps() -> StaticAppResolver {
    [
        (1000, "com.example.shell", "Shell"),
        (2000, "com.termux", "Termux"),
        (3000, "org.fdroid.backup", "Backup"),
    ]
    .into_iter()
    .fold(StaticAppResolver::new(), |resolver, (uid, package, name)| {
        resolver.with_app(AppInfo {
            uid,
            package_name: package.to_string(),
            app_name: name.to_string(),
            icon: None,
        })
    })
}

#[derive(Default)]
pub struct CollectingChannel {
    responses: Mutex<Vec<SuResponse>>,
}

impl CollectingChannel {
    pub fn responses(&self) -> Vec<SuResponse> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseChannel for CollectingChannel {
    async fn emit(&self, response: SuResponse) -> std::io::Result<()> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}

/// Gate answering from a queue, failing once it runs dry.
#[derive(Default)]
pub struct QueueGate {
    outcomes: Mutex<VecDeque<AuthOutcome>>,
    calls: AtomicUsize,
}

impl QueueGate {
    pub fn with(outcomes: &[AuthOutcome]) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthGate for QueueGate {
    async fn authenticate(&self) -> AuthOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AuthOutcome::Failed)
    }
}

/// Poll the prompt view until `pred` holds, failing after two seconds.
pub async fn wait_until(handle: &PromptHandle, pred: impl Fn(&PromptView) -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !pred(&handle.view()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
