//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reminder scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due-task polls
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,

    /// Seconds past due before a reminded task is escalated to a nudge
    #[serde(rename = "nudge-delay-secs")]
    pub nudge_delay_secs: u64,

    /// Workers per poll cycle
    #[serde(rename = "worker-count")]
    pub worker_count: usize,

    /// Seconds `stop` waits for an in-flight cycle to drain
    #[serde(rename = "shutdown-timeout-secs")]
    pub shutdown_timeout_secs: u64,

    /// Overall on/off switch
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            nudge_delay_secs: 300,
            worker_count: 4,
            shutdown_timeout_secs: 10,
            enabled: true,
        }
    }
}

impl SchedulerConfig {
    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Nudge delay as a chrono Duration (compared against task overdue time)
    pub fn nudge_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.nudge_delay_secs as i64)
    }

    /// Shutdown timeout as a Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.nudge_delay_secs, 300);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.shutdown_timeout_secs, 10);
        assert!(config.enabled);
    }

    #[test]
    fn test_duration_accessors() {
        let config = SchedulerConfig {
            poll_interval_secs: 60,
            nudge_delay_secs: 120,
            shutdown_timeout_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.nudge_delay(), chrono::Duration::seconds(120));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_deserialize_kebab_case() {
        let yaml = r#"
poll-interval-secs: 15
nudge-delay-secs: 60
worker-count: 2
enabled: false
"#;
        let config: SchedulerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.poll_interval_secs, 15);
        assert_eq!(config.nudge_delay_secs, 60);
        assert_eq!(config.worker_count, 2);
        assert!(!config.enabled);
        // unspecified field falls back to the default
        assert_eq!(config.shutdown_timeout_secs, 10);
    }
}
