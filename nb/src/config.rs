//! Nudgebot configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::events::{DEFAULT_DISPATCH_WORKERS, DEFAULT_QUEUE_CAPACITY};
use crate::scheduler::SchedulerConfig;

/// Main nudgebot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat provider settings
    pub chat: ChatConfig,

    /// Storage settings
    pub storage: StorageConfig,

    /// Reminder scheduler settings
    pub scheduler: SchedulerConfig,

    /// Session eviction settings
    pub session: SessionConfig,

    /// Event bus dispatch settings
    pub bus: BusConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call early in startup to fail fast with a clear message.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.chat.token_env).is_err() {
            return Err(eyre::eyre!(
                "bot token not found. Set the {} environment variable.",
                self.chat.token_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // explicit path: failure to load it is an error, not a fallthrough
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // project-local config
        let local_config = PathBuf::from(".nudgebot.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("nudgebot").join("nudgebot.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Chat provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Environment variable holding the bot token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Bot API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Outbound request timeout in milliseconds
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Unix socket the webhook listener binds
    #[serde(rename = "socket-path")]
    pub socket_path: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let socket_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nudgebot")
            .join("webhook.sock");
        Self {
            token_env: "NUDGEBOT_TOKEN".to_string(),
            base_url: "https://api.telegram.org".to_string(),
            request_timeout_ms: 10_000,
            socket_path,
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nudgebot")
            .join("tasks.db");
        Self { db_path }
    }
}

/// Session eviction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a session may sit idle before the sweep drops it
    #[serde(rename = "max-idle-secs")]
    pub max_idle_secs: u64,

    /// Seconds between eviction sweeps
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: 900,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Idle window as a Duration
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    /// Sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Event bus dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Async dispatch worker count
    #[serde(rename = "dispatch-workers")]
    pub dispatch_workers: usize,

    /// Async dispatch queue capacity
    #[serde(rename = "queue-capacity")]
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dispatch_workers: DEFAULT_DISPATCH_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chat.token_env, "NUDGEBOT_TOKEN");
        assert_eq!(config.chat.base_url, "https://api.telegram.org");
        assert_eq!(config.session.max_idle_secs, 900);
        assert!(config.scheduler.enabled);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
chat:
  token-env: MY_BOT_TOKEN
  base-url: https://bot.example.com
  request-timeout-ms: 5000

scheduler:
  poll-interval-secs: 15
  worker-count: 8

session:
  max-idle-secs: 300

log-level: DEBUG
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.chat.token_env, "MY_BOT_TOKEN");
        assert_eq!(config.chat.base_url, "https://bot.example.com");
        assert_eq!(config.chat.request_timeout_ms, 5000);
        assert_eq!(config.scheduler.poll_interval_secs, 15);
        assert_eq!(config.scheduler.worker_count, 8);
        assert_eq!(config.session.max_idle_secs, 300);
        assert_eq!(config.log_level.as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
scheduler:
  nudge-delay-secs: 120
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.scheduler.nudge_delay_secs, 120);
        // everything else falls back
        assert_eq!(config.scheduler.poll_interval_secs, 30);
        assert_eq!(config.chat.token_env, "NUDGEBOT_TOKEN");
        assert_eq!(config.bus.dispatch_workers, DEFAULT_DISPATCH_WORKERS);
    }

    #[test]
    fn test_validate_missing_token() {
        let mut config = Config::default();
        config.chat.token_env = "NONEXISTENT_NUDGEBOT_TOKEN_98765".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("NONEXISTENT_NUDGEBOT_TOKEN_98765"));
    }
}
