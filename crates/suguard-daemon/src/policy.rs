//! Superuser policy model.

use serde::{Deserialize, Serialize};

/// Stable numeric identity of a calling application.
pub type Uid = u32;

/// Terminal outcome of a prompt, and the persisted polarity of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decided authorization policy for one caller.
///
/// `package_name` and `app_name` are informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub uid: Uid,
    pub package_name: String,
    pub app_name: String,
    pub decision: Decision,
    /// Log future uses of this grant.
    pub logging: bool,
    /// Notify the user on future uses of this grant.
    pub notification: bool,
    /// Unix seconds after which the decision no longer applies. `None` never expires.
    pub expires_at: Option<i64>,
}

impl Policy {
    /// Whether the decision still applies at `now` (unix seconds).
    pub fn is_active(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|until| now < until)
    }

    /// Copy of this policy with a different decision.
    #[must_use]
    pub fn with_decision(&self, decision: Decision) -> Self {
        Self {
            decision,
            ..self.clone()
        }
    }
}
