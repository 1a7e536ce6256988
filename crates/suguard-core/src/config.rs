//! Configuration resolution for suguard.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/suguard/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete suguard configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub superuser: SuperuserConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// How long a decision stays valid before the caller is prompted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutChoice {
    /// Valid for the current request only.
    Once,
    /// Valid for the given number of minutes.
    Minutes(u32),
    /// Never expires.
    Forever,
}

impl TimeoutChoice {
    /// Expiry timestamp for a decision taken at `now` (unix seconds).
    ///
    /// `None` means the decision never expires.
    pub fn expires_at(self, now: i64) -> Option<i64> {
        match self {
            Self::Once => Some(now),
            Self::Minutes(m) => Some(now + i64::from(m) * 60),
            Self::Forever => None,
        }
    }

    /// Short human label, e.g. `"10 min"`.
    pub fn label(self) -> String {
        match self {
            Self::Once => "once".to_string(),
            Self::Minutes(m) => format!("{m} min"),
            Self::Forever => "forever".to_string(),
        }
    }
}

/// Superuser prompt configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperuserConfig {
    /// Seconds before an unanswered prompt is automatically denied.
    pub default_timeout_secs: u64,
    /// Require secondary authentication before a grant is finalized.
    pub auth_enabled: bool,
    /// Command run as the secondary-authentication gate (argv).
    pub auth_command: Vec<String>,
    /// Ordered timeout choices offered by the prompt. Index 0 is the default.
    pub timeout_choices: Vec<TimeoutChoice>,
    /// Logging flag for policies created by a prompt.
    pub default_logging: bool,
    /// Notification flag for policies created by a prompt.
    pub default_notification: bool,
}

impl Default for SuperuserConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 10,
            auth_enabled: false,
            auth_command: Vec::new(),
            timeout_choices: vec![
                TimeoutChoice::Once,
                TimeoutChoice::Minutes(10),
                TimeoutChoice::Minutes(20),
                TimeoutChoice::Minutes(30),
                TimeoutChoice::Minutes(60),
                TimeoutChoice::Forever,
            ],
            default_logging: true,
            default_notification: true,
        }
    }
}

impl SuperuserConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_choices.is_empty() {
            return Err(Error::Config(
                "superuser.timeout_choices must not be empty".to_string(),
            ));
        }
        if self.auth_enabled && self.auth_command.is_empty() {
            return Err(Error::Config(
                "superuser.auth_enabled requires superuser.auth_command".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            config = load_config_file(&global_path)?;
        }
    }

    if let Some(path) = explicit {
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config);
    config.superuser.validate()?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Get the default policy database path.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("policies.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/suguard"))
    }
    #[cfg(not(target_os = "macos"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("suguard"))
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("SUGUARD_DEFAULT_TIMEOUT") {
        if let Ok(n) = val.parse() {
            config.superuser.default_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("SUGUARD_AUTH_ENABLED") {
        if let Ok(b) = val.parse() {
            config.superuser.auth_enabled = b;
        }
    }
    if let Ok(val) = std::env::var("SUGUARD_LOG_LEVEL") {
        config.daemon.log_level = val;
    }
}
