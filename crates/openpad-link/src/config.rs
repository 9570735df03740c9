//! Link configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for either teardown wait.
pub const MAX_GRACE_MS: u64 = 10_000;

/// Tunables for one link.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// How long teardown waits for in-flight transfers to complete on their
    /// own after cancellation was requested.
    ///
    /// Default: 200ms.
    pub teardown_grace_ms: u64,

    /// Log the heartbeat chord (start + select + both bumpers) when it is
    /// first pressed.
    pub heartbeat_logging: bool,

    /// How long teardown waits after a forced kill before it gives up on the
    /// transport and synthesizes the missing completions.
    ///
    /// Default: 50ms.
    pub kill_grace_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            teardown_grace_ms: 200,
            heartbeat_logging: true,
            kill_grace_ms: 50,
        }
    }
}

impl LinkConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::default()
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a grace period is zero or above [`MAX_GRACE_MS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("teardown_grace_ms", self.teardown_grace_ms),
            ("kill_grace_ms", self.kill_grace_ms),
        ] {
            if !(1..=MAX_GRACE_MS).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    max: MAX_GRACE_MS,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }

    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Builder for [`LinkConfig`].
#[derive(Debug, Default)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    #[must_use]
    pub fn teardown_grace_ms(mut self, ms: u64) -> Self {
        self.config.teardown_grace_ms = ms;
        self
    }

    #[must_use]
    pub fn heartbeat_logging(mut self, enabled: bool) -> Self {
        self.config.heartbeat_logging = enabled;
        self
    }

    #[must_use]
    pub fn kill_grace_ms(mut self, ms: u64) -> Self {
        self.config.kill_grace_ms = ms;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<LinkConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.teardown_grace_ms, 200);
        assert_eq!(config.kill_grace_ms, 50);
        assert!(config.heartbeat_logging);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = LinkConfig::builder()
            .teardown_grace_ms(20)
            .kill_grace_ms(5)
            .heartbeat_logging(false)
            .build();
        assert_eq!(
            config.ok(),
            Some(LinkConfig {
                teardown_grace_ms: 20,
                heartbeat_logging: false,
                kill_grace_ms: 5,
            })
        );
    }

    #[test]
    fn test_zero_grace_rejected() {
        let result = LinkConfig::builder().teardown_grace_ms(0).build();
        assert!(matches!(
            result,
            Err(ConfigError::OutOfRange {
                field: "teardown_grace_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_from_json_partial() {
        let config = LinkConfig::from_json_str(r#"{"kill_grace_ms": 10}"#);
        assert_eq!(config.map(|c| (c.teardown_grace_ms, c.kill_grace_ms)).ok(), Some((200, 10)));
    }

    #[test]
    fn test_from_json_rejects_out_of_range() {
        let result = LinkConfig::from_json_str(r#"{"teardown_grace_ms": 60000}"#);
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_from_json_malformed() {
        let result = LinkConfig::from_json_str("{teardown");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
