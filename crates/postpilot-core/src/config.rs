//! PostPilot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPilotConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for PostPilotConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PostPilotConfig {
    /// Load config from the default path (~/.postpilot/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::PostPilotError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::PostPilotError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::PostPilotError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".postpilot")
            .join("config.toml")
    }

    /// Get the PostPilot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".postpilot")
    }
}

/// Retry/backoff configuration for capability invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Default retry cap when a task does not set its own.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Exponential base — each attempt multiplies the delay by this.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    /// Upper bound on any single backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomize delays by a factor in [0.8, 1.2].
    #[serde(default = "bool_true")]
    pub jitter: bool,
    /// Error history ring size — oldest records are dropped past this.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_delay_ms() -> u64 { 1000 }
fn default_backoff_base() -> f64 { 2.0 }
fn default_max_delay_ms() -> u64 { 60_000 }
fn default_history_cap() -> usize { 256 }
fn bool_true() -> bool { true }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_base: default_backoff_base(),
            max_delay_ms: default_max_delay_ms(),
            jitter: bool_true(),
            history_cap: default_history_cap(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Persistent scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-task polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Path to the scheduler database. Defaults to ~/.postpilot/scheduler.db.
    #[serde(default)]
    pub db_path: Option<String>,
}

fn default_poll_interval_secs() -> u64 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            db_path: None,
        }
    }
}

impl SchedulerConfig {
    /// Resolve the scheduler database path.
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(p) => PathBuf::from(p),
            None => PostPilotConfig::home_dir().join("scheduler.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PostPilotConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff_base, 2.0);
        assert!(config.retry.jitter);
        assert_eq!(config.scheduler.poll_interval_secs, 30);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [retry]
            max_retries = 5
            jitter = false
        "#;
        let config: PostPilotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert!(!config.retry.jitter);
        // Unspecified fields fall back to defaults
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.scheduler.poll_interval_secs, 30);
    }

    #[test]
    fn test_resolved_db_path_override() {
        let sched = SchedulerConfig {
            poll_interval_secs: 30,
            db_path: Some("/tmp/pp-test.db".into()),
        };
        assert_eq!(sched.resolved_db_path(), PathBuf::from("/tmp/pp-test.db"));
    }
}
