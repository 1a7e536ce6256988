//! Test doubles for the engine's collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::auth::{AuthGate, AuthOutcome};
use crate::context::AppInfo;
use crate::policy::{Decision, Policy, Uid};
use crate::request::{ResponseChannel, SuResponse};
use crate::storage::{DatabaseError, PolicyStore, TimeoutChoiceStore};

/// Application metadata for a test uid.
pub fn app(uid: Uid) -> AppInfo {
    AppInfo {
        uid,
        package_name: format!("pkg.{uid}"),
        app_name: format!("App {uid}"),
        icon: None,
    }
}

/// In-memory store that counts every call.
#[derive(Default)]
pub struct RecordingStore {
    policies: Mutex<HashMap<Uid, Policy>>,
    choices: Mutex<HashMap<Uid, usize>>,
    calls: AtomicUsize,
    policy_writes: AtomicUsize,
    allow_writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_policy(&self, policy: Policy) {
        self.policies.lock().unwrap().insert(policy.uid, policy);
    }

    pub fn seed_choice(&self, uid: Uid, index: usize) {
        self.choices.lock().unwrap().insert(uid, index);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn policy(&self, uid: Uid) -> Option<Policy> {
        self.policies.lock().unwrap().get(&uid).cloned()
    }

    pub fn choice(&self, uid: Uid) -> Option<usize> {
        self.choices.lock().unwrap().get(&uid).copied()
    }

    /// Calls on either store trait.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn policy_writes(&self) -> usize {
        self.policy_writes.load(Ordering::SeqCst)
    }

    pub fn allow_writes(&self) -> usize {
        self.allow_writes.load(Ordering::SeqCst)
    }

    fn read_guard(&self) -> Result<(), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("injected read failure".to_string()));
        }
        Ok(())
    }

    fn write_guard(&self) -> Result<(), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for RecordingStore {
    async fn fetch_all(&self) -> Result<Vec<Policy>, DatabaseError> {
        self.read_guard()?;
        let mut all: Vec<Policy> = self.policies.lock().unwrap().values().cloned().collect();
        all.sort_by_cached_key(|p| (p.app_name.to_lowercase(), p.package_name.clone()));
        Ok(all)
    }

    async fn fetch(&self, uid: Uid) -> Result<Option<Policy>, DatabaseError> {
        self.read_guard()?;
        Ok(self.policy(uid))
    }

    async fn update(&self, policy: &Policy) -> Result<(), DatabaseError> {
        self.policy_writes.fetch_add(1, Ordering::SeqCst);
        if policy.decision == Decision::Allow {
            self.allow_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.write_guard()?;
        self.seed_policy(policy.clone());
        Ok(())
    }

    async fn delete(&self, uid: Uid) -> Result<(), DatabaseError> {
        self.write_guard()?;
        self.policies.lock().unwrap().remove(&uid);
        Ok(())
    }
}

#[async_trait]
impl TimeoutChoiceStore for RecordingStore {
    async fn timeout_choice(&self, uid: Uid) -> Result<Option<usize>, DatabaseError> {
        self.read_guard()?;
        Ok(self.choice(uid))
    }

    async fn set_timeout_choice(&self, uid: Uid, index: usize) -> Result<(), DatabaseError> {
        self.write_guard()?;
        self.seed_choice(uid, index);
        Ok(())
    }
}

/// Response channel that keeps every emitted signal.
#[derive(Default)]
pub struct RecordingChannel {
    responses: Mutex<Vec<SuResponse>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> Vec<SuResponse> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseChannel for RecordingChannel {
    async fn emit(&self, response: SuResponse) -> std::io::Result<()> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}

/// Gate that replays queued outcomes, failing once the queue is empty.
#[derive(Default)]
pub struct ScriptedGate {
    outcomes: Mutex<VecDeque<AuthOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: AuthOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthGate for ScriptedGate {
    async fn authenticate(&self) -> AuthOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AuthOutcome::Failed)
    }
}
