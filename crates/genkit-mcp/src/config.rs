//! Configuration types for the MCP resource host

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{McpError, McpResult};

/// Main host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host name, used in log output
    pub name: String,

    /// Prefix resource action names with the owning provider's name
    pub namespace_resources: bool,

    /// Timeout configurations
    pub timeouts: TimeoutConfig,

    /// Retry configuration for resource reads
    pub retry: RetryConfig,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for enumerating one provider's resources and templates
    #[serde(with = "millis")]
    pub list: Duration,

    /// Deadline for a single resource read attempt
    #[serde(with = "millis")]
    pub read: Duration,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial retry delay
    #[serde(with = "millis")]
    pub initial_delay: Duration,

    /// Maximum retry delay
    #[serde(with = "millis")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// Whether to enable exponential backoff
    pub exponential_backoff: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: "genkit-mcp".to_string(),
            namespace_resources: true,
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            list: Duration::from_secs(30),
            read: Duration::from_secs(30),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: 0.1,
            exponential_backoff: true,
        }
    }
}

impl HostConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace_resources(mut self, namespace: bool) -> Self {
        self.namespace_resources = namespace;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Reject configurations the host cannot operate with
    pub fn validate(&self) -> McpResult<()> {
        if self.name.trim().is_empty() {
            return Err(McpError::config("host name must not be empty"));
        }
        if self.timeouts.list.is_zero() || self.timeouts.read.is_zero() {
            return Err(McpError::config("timeouts must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(McpError::config("retry.max_attempts must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(McpError::config("retry.jitter must be between 0.0 and 1.0"));
        }
        Ok(())
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry `attempt`; attempt 0 never waits.
    ///
    /// Jitter adds up to `jitter` times the base delay, and the total is
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(retries) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };

        let growth = if self.exponential_backoff {
            self.backoff_multiplier.powi(retries.min(i32::MAX as u32) as i32)
        } else {
            1.0
        };
        let base = self.initial_delay.as_nanos() as f64 * growth;
        let spread = base * self.jitter * rand::random::<f64>();
        let cap = self.max_delay.as_nanos() as f64;

        // `f64::min` discards NaN, so an overflowed backoff lands on the cap
        Duration::from_nanos((base + spread).min(cap) as u64)
    }

    /// Check if an attempt should be retried
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Durations as whole milliseconds on the wire
mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_calculation() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= config.initial_delay);

        let delay3 = config.delay_for_attempt(3);
        assert!(delay3 >= Duration::from_millis(400));

        let large_delay = config.delay_for_attempt(20);
        assert!(large_delay <= config.max_delay);
    }

    #[test]
    fn test_jitter_stays_under_cap() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
            jitter: 1.0,
            ..RetryConfig::default()
        };
        for attempt in 1..10 {
            assert_eq!(config.delay_for_attempt(attempt), Duration::from_millis(50));
        }

        let linear = RetryConfig {
            exponential_backoff: false,
            jitter: 0.0,
            ..RetryConfig::default()
        };
        assert_eq!(linear.delay_for_attempt(5), linear.initial_delay);
        assert_eq!(linear.delay_for_attempt(u32::MAX), linear.initial_delay);

        let default = RetryConfig::default();
        assert_eq!(default.delay_for_attempt(u32::MAX), default.max_delay);
    }

    #[test]
    fn test_retry_attempts() {
        let config = RetryConfig::default();

        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
        assert!(!RetryConfig::disabled().should_retry(1));
    }

    #[test]
    fn test_config_serialization() {
        let config = HostConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["timeouts"]["read"], 30_000);

        let parsed: HostConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.timeouts.read, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: HostConfig = serde_json::from_str(
            r#"{ "name": "assistant", "timeouts": { "read": 500 } }"#,
        )
        .unwrap();

        assert_eq!(parsed.name, "assistant");
        assert!(parsed.namespace_resources);
        assert_eq!(parsed.timeouts.read, Duration::from_millis(500));
        assert_eq!(parsed.timeouts.list, Duration::from_secs(30));
        assert_eq!(parsed.retry.max_attempts, 3);
    }

    #[test]
    fn test_validate() {
        assert!(HostConfig::default().validate().is_ok());
        assert!(HostConfig::new(" ").validate().is_err());

        let mut config = HostConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(McpError::Config(_))));

        let config = HostConfig::default().with_timeouts(TimeoutConfig {
            list: Duration::ZERO,
            read: Duration::from_secs(1),
        });
        assert!(config.validate().is_err());
    }
}
