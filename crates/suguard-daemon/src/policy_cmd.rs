//! `suguard policy` subcommands.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use clap::{Subcommand, ValueEnum};

use suguard_core::db::unix_timestamp;
use suguard_daemon::management::{ChangeOutcome, PolicyManager};
use suguard_daemon::policy::{Decision, Policy, Uid};

/// On/off switch for policy flags.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Policy subcommand actions.
#[derive(Subcommand, Debug)]
pub enum PolicyAction {
    /// List stored policies
    List,
    /// Grant superuser access to a caller with a stored policy
    Allow {
        /// Caller uid
        uid: Uid,
    },
    /// Deny superuser access to a caller with a stored policy
    Deny {
        /// Caller uid
        uid: Uid,
    },
    /// Delete a policy so the caller is prompted again
    Revoke {
        /// Caller uid
        uid: Uid,
    },
    /// Turn request logging on or off
    Logging {
        /// Caller uid
        uid: Uid,
        #[arg(value_enum)]
        state: Switch,
    },
    /// Turn request notifications on or off
    Notify {
        /// Caller uid
        uid: Uid,
        #[arg(value_enum)]
        state: Switch,
    },
}

/// Execute a policy subcommand.
pub async fn run(manager: &PolicyManager, action: PolicyAction) -> anyhow::Result<()> {
    let mut out = io::stdout();
    let outcome = match action {
        PolicyAction::List => {
            let policies = manager.list().await?;
            return write_policies(&mut out, &policies, unix_timestamp());
        }
        PolicyAction::Allow { uid } => manager.set_decision(uid, Decision::Allow).await?,
        PolicyAction::Deny { uid } => manager.set_decision(uid, Decision::Deny).await?,
        PolicyAction::Revoke { uid } => manager.revoke(uid).await?,
        PolicyAction::Logging { uid, state } => manager.set_logging(uid, state.enabled()).await?,
        PolicyAction::Notify { uid, state } => {
            manager.set_notification(uid, state.enabled()).await?
        }
    };

    match outcome {
        ChangeOutcome::Applied(change) => writeln!(out, "{change}")?,
        ChangeOutcome::NotAuthenticated => {
            anyhow::bail!("Authentication failed, policy unchanged")
        }
    }
    Ok(())
}

fn write_policies(out: &mut impl Write, policies: &[Policy], now: i64) -> anyhow::Result<()> {
    if policies.is_empty() {
        writeln!(out, "No policies stored.")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<8}  {:<6}  {:<10}  {:<4}  {:<6}  APP",
        "UID", "POLICY", "EXPIRES", "LOG", "NOTIFY"
    )?;
    for policy in policies {
        writeln!(
            out,
            "{:<8}  {:<6}  {:<10}  {:<4}  {:<6}  {} ({})",
            policy.uid,
            policy.decision.as_str(),
            expiry_str(policy, now),
            on_off(policy.logging),
            on_off(policy.notification),
            policy.app_name,
            policy.package_name,
        )?;
    }
    writeln!(out, "\n{} policy(ies)", policies.len())?;
    Ok(())
}

fn expiry_str(policy: &Policy, now: i64) -> String {
    match policy.expires_at {
        None => "never".to_string(),
        Some(_) if !policy.is_active(now) => "expired".to_string(),
        Some(at) => format!("in {}m", (at - now + 59) / 60),
    }
}

const fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
