//! Prompt settings injected into the decision engine.
//!
//! The deadline and the secondary-authentication flag are atomics so a
//! change takes effect for the next read: the deadline is read once when a
//! prompt starts, the auth flag at every grant attempt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use suguard_core::TimeoutChoice;
use suguard_core::config::SuperuserConfig;

#[derive(Debug)]
pub struct PromptSettings {
    default_timeout_millis: AtomicU64,
    auth_enabled: AtomicBool,
    choices: Vec<TimeoutChoice>,
    default_logging: bool,
    default_notification: bool,
}

impl PromptSettings {
    pub fn from_config(config: &SuperuserConfig) -> Self {
        let choices = if config.timeout_choices.is_empty() {
            SuperuserConfig::default().timeout_choices
        } else {
            config.timeout_choices.clone()
        };

        Self {
            default_timeout_millis: AtomicU64::new(config.default_timeout_secs.saturating_mul(1000)),
            auth_enabled: AtomicBool::new(config.auth_enabled),
            choices,
            default_logging: config.default_logging,
            default_notification: config.default_notification,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_millis.load(Ordering::Acquire))
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn set_default_timeout(&self, timeout: Duration) {
        self.default_timeout_millis
            .store(timeout.as_millis() as u64, Ordering::Release);
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled.load(Ordering::Acquire)
    }

    pub fn set_auth_enabled(&self, enabled: bool) {
        self.auth_enabled.store(enabled, Ordering::Release);
    }

    /// Offered timeout choices, in display order. Never empty.
    pub fn choices(&self) -> &[TimeoutChoice] {
        &self.choices
    }

    /// Choice at `index`, falling back to the first one.
    pub fn choice(&self, index: usize) -> TimeoutChoice {
        self.choices
            .get(index)
            .or_else(|| self.choices.first())
            .copied()
            .unwrap_or(TimeoutChoice::Once)
    }

    /// Logging and notification flags for a caller with no policy yet.
    pub const fn default_flags(&self) -> (bool, bool) {
        (self.default_logging, self.default_notification)
    }
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self::from_config(&SuperuserConfig::default())
    }
}
