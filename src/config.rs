//! Engine configuration.
//!
//! [`EngineConfig`] is built once by the provider and passed explicitly to the
//! [`RetryExecutor`](crate::retry::RetryExecutor) and
//! [`Reconciler`](crate::reconciler::Reconciler). Durations are written as
//! whole seconds in configuration documents:
//!
//! ```json
//! {
//!     "read_timeout": 180,
//!     "write_timeout": 300,
//!     "retry_interval": 1,
//!     "poll_interval": 1,
//!     "rate_limit": {
//!         "default_per_second": 20,
//!         "per_action": { "DescribeInstances": 10 }
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default budget for read operations and status polls.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Default budget for create, update and delete operations.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default pause between retry attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default pause between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default outbound calls per second for each API action.
pub const DEFAULT_CALLS_PER_SECOND: u32 = 20;

/// Timeouts, intervals and rate limits for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget for read operations and status polls.
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,

    /// Budget for create, update and delete operations.
    #[serde(with = "duration_secs")]
    pub write_timeout: Duration,

    /// Fixed pause between retry attempts.
    #[serde(with = "duration_secs")]
    pub retry_interval: Duration,

    /// Default pause between status polls.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Outbound call rate limits.
    pub rate_limit: RateLimitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration document, filling in defaults for missing keys.
    pub fn from_value(value: serde_json::Value) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive the engine.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.read_timeout.is_zero() {
            return Err(EngineError::Configuration(
                "read_timeout must be greater than zero".to_string(),
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(EngineError::Configuration(
                "write_timeout must be greater than zero".to_string(),
            ));
        }
        self.rate_limit.validate()
    }

    /// Set the read budget.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write budget.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the pause between retry attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the default pause between status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the rate limits.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

/// Outbound call rate limits, one token bucket per API action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls per second allowed for actions without an override.
    pub default_per_second: u32,

    /// Bucket capacity. Defaults to the per-second rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,

    /// Per-action overrides of the per-second rate.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub per_action: BTreeMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_per_second: DEFAULT_CALLS_PER_SECOND,
            burst: None,
            per_action: BTreeMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Create a rate limit configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default per-second rate.
    pub fn with_default_per_second(mut self, per_second: u32) -> Self {
        self.default_per_second = per_second;
        self
    }

    /// Set the bucket capacity.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Override the rate for one action.
    pub fn with_action(mut self, action: impl Into<String>, per_second: u32) -> Self {
        self.per_action.insert(action.into(), per_second);
        self
    }

    /// The per-second rate for `action`.
    pub fn rate_for(&self, action: &str) -> u32 {
        self.per_action
            .get(action)
            .copied()
            .unwrap_or(self.default_per_second)
    }

    /// The bucket capacity for `action`.
    pub fn capacity_for(&self, action: &str) -> u32 {
        self.burst.unwrap_or_else(|| self.rate_for(action)).max(1)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.default_per_second == 0 {
            return Err(EngineError::Configuration(
                "rate_limit.default_per_second must be greater than zero".to_string(),
            ));
        }
        if let Some((action, _)) = self.per_action.iter().find(|(_, rate)| **rate == 0) {
            return Err(EngineError::Configuration(format!(
                "rate_limit.per_action.{} must be greater than zero",
                action
            )));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(180));
        assert_eq!(config.write_timeout, Duration::from_secs(300));
        assert_eq!(config.retry_interval, Duration::from_secs(1));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.rate_limit.default_per_second, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_read_timeout(Duration::from_secs(10))
            .with_write_timeout(Duration::from_secs(20))
            .with_retry_interval(Duration::from_secs(2))
            .with_poll_interval(Duration::from_secs(5))
            .with_rate_limit(RateLimitConfig::new().with_action("DescribeInstances", 5));

        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(20));
        assert_eq!(config.retry_interval, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.rate_limit.rate_for("DescribeInstances"), 5);
        assert_eq!(config.rate_limit.rate_for("RunInstances"), 20);
    }

    #[test]
    fn test_from_value_partial_document() {
        let config = EngineConfig::from_value(json!({
            "write_timeout": 600,
            "rate_limit": { "per_action": { "CreateVpc": 2 } }
        }))
        .unwrap();

        assert_eq!(config.write_timeout, Duration::from_secs(600));
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.rate_limit.default_per_second, 20);
        assert_eq!(config.rate_limit.rate_for("CreateVpc"), 2);
        assert_eq!(config.rate_limit.capacity_for("CreateVpc"), 2);
    }

    #[test]
    fn test_from_value_rejects_bad_documents() {
        let err = EngineConfig::from_value(json!({ "read_timeout": "soon" })).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));

        let err = EngineConfig::from_value(json!({ "read_timeout": 0 })).unwrap_err();
        assert!(err.to_string().contains("read_timeout"));

        let err = EngineConfig::from_value(json!({
            "rate_limit": { "per_action": { "CreateVpc": 0 } }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("rate_limit.per_action.CreateVpc"));
    }

    #[test]
    fn test_serializes_seconds() {
        let value = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "read_timeout": 180,
                "write_timeout": 300,
                "retry_interval": 1,
                "poll_interval": 1,
                "rate_limit": { "default_per_second": 20 }
            })
        );
    }

    #[test]
    fn test_burst_overrides_capacity() {
        let limits = RateLimitConfig::new().with_default_per_second(5).with_burst(1);
        assert_eq!(limits.capacity_for("Anything"), 1);
        assert_eq!(limits.rate_for("Anything"), 5);
    }
}
