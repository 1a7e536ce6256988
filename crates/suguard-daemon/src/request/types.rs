//! Request handling types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use suguard_core::TimeoutChoice;

use crate::auth::AuthOutcome;
use crate::clock::countdown_secs;
use crate::context::AppInfo;
use crate::policy::{Decision, Policy, Uid};
use crate::storage::DatabaseError;

/// Inbound request for elevated privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuRequest {
    /// Caller identity.
    pub uid: Uid,
}

/// Terminal signal sent to the privileged counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuResponse {
    Decided {
        uid: Uid,
        decision: Decision,
        timeout_choice: usize,
    },
    /// The request was never legitimate; drop it without a decision.
    Terminate,
}

/// Transport for the terminal signal. Called at most once per request.
#[async_trait]
pub trait ResponseChannel: Send + Sync {
    async fn emit(&self, response: SuResponse) -> std::io::Result<()>;
}

/// Lifecycle of an accepted prompt.
///
/// Intake happens before a prompt exists; a rejected intake surfaces as
/// [`RequestError::MalformedRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    Prompting,
    AuthPending,
    Finalizing,
    Done,
}

impl PromptState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Inputs accepted by a running prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptEvent {
    Grant,
    Deny,
    /// Interaction with the timeout selector. Stops the countdown.
    TouchSelector,
    /// Pick a timeout choice by index. Counts as selector interaction.
    SelectTimeout(usize),
    Tick {
        remaining: Duration,
    },
    Expired,
    /// The anti-mis-tap delay has passed; GRANT is shown as enabled.
    GraceElapsed,
    AuthResult(AuthOutcome),
}

/// Observable prompt state for a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptView {
    pub request_id: String,
    pub app: AppInfo,
    pub state: PromptState,
    /// Countdown remaining, `None` once the countdown has stopped.
    pub remaining: Option<Duration>,
    pub grant_enabled: bool,
    pub selected_choice: usize,
    pub choices: Vec<TimeoutChoice>,
}

impl PromptView {
    /// Deny button text, e.g. `"Deny (7)"` while counting down.
    pub fn deny_label(&self) -> String {
        match self.remaining {
            Some(remaining) => format!("Deny ({})", countdown_secs(remaining)),
            None => "Deny".to_string(),
        }
    }
}

/// Result of a finished prompt.
#[derive(Debug)]
pub struct PromptOutcome {
    pub request_id: String,
    pub decision: Decision,
    pub timeout_choice: usize,
    /// The record handed to the policy store.
    pub policy: Policy,
    /// Set when the policy could not be persisted. The decision was still sent.
    pub persist_error: Option<DatabaseError>,
}

/// Request handling errors.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Malformed request: no application for uid {uid}")]
    MalformedRequest { uid: Uid },

    #[error("Prompt task aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(remaining: Option<Duration>) -> PromptView {
        PromptView {
            request_id: "req-1".to_string(),
            app: AppInfo {
                uid: 1000,
                package_name: "com.example".to_string(),
                app_name: "Example".to_string(),
                icon: None,
            },
            state: PromptState::Prompting,
            remaining,
            grant_enabled: false,
            selected_choice: 0,
            choices: vec![TimeoutChoice::Once],
        }
    }

    #[test]
    fn deny_label_counts_whole_seconds_up() {
        assert_eq!(view(Some(Duration::from_millis(9_400))).deny_label(), "Deny (10)");
        assert_eq!(view(Some(Duration::from_secs(3))).deny_label(), "Deny (3)");
        assert_eq!(view(None).deny_label(), "Deny");
    }

    #[test]
    fn responses_serialize_tagged() {
        let decided = SuResponse::Decided {
            uid: 1000,
            decision: Decision::Deny,
            timeout_choice: 2,
        };
        assert_eq!(
            serde_json::to_string(&decided).unwrap(),
            r#"{"type":"decided","uid":1000,"decision":"deny","timeout_choice":2}"#
        );
        assert_eq!(
            serde_json::to_string(&SuResponse::Terminate).unwrap(),
            r#"{"type":"terminate"}"#
        );
    }
}
