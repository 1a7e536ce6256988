//! Secondary authentication gate.
//!
//! Consulted only on grant attempts while secondary authentication is
//! enabled. A failed or cancelled check is never a deny.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of a secondary-authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Passed,
    /// Failed or cancelled by the user.
    Failed,
}

impl AuthOutcome {
    pub const fn passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Proof-of-presence check interposed before a grant.
#[async_trait]
pub trait AuthGate: Send + Sync {
    async fn authenticate(&self) -> AuthOutcome;
}

/// Runs an external command; exit status 0 passes.
///
/// Stdio is inherited so interactive checkers (fingerprint readers,
/// password prompts) can talk to the user.
#[derive(Debug, Clone)]
pub struct CommandGate {
    argv: Vec<String>,
}

impl CommandGate {
    pub const fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl AuthGate for CommandGate {
    async fn authenticate(&self) -> AuthOutcome {
        let Some((program, args)) = self.argv.split_first() else {
            warn!("Secondary authentication enabled without a command");
            return AuthOutcome::Failed;
        };

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => AuthOutcome::Passed,
            Ok(status) => {
                debug!(program, code = ?status.code(), "Secondary authentication rejected");
                AuthOutcome::Failed
            }
            Err(e) => {
                warn!(program, error = %e, "Failed to run secondary authentication");
                AuthOutcome::Failed
            }
        }
    }
}
