//! Harness Configuration
//!
//! Suite-wide settings: resource policy, test-name patterns, supervision
//! timeouts and the optional memory watchdog.

use super::resources::ResourcePolicy;
use crate::error::{HarnessError, HarnessResult};
use crate::gating::PatternMatcher;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default wait for a supervised process that should finish quickly
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for long-running supervised processes
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default bound on the reap attempt after a forced kill
pub const KILL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub resources: ResourcePolicy,
    pub accept_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
    #[serde(rename = "short_timeout_ms", with = "millis")]
    pub short_timeout: Duration,
    #[serde(rename = "long_timeout_ms", with = "millis")]
    pub long_timeout: Duration,
    #[serde(rename = "kill_grace_ms", with = "millis")]
    pub kill_grace: Duration,
    #[serde(rename = "watchdog_interval_ms", with = "opt_millis")]
    pub watchdog_interval: Option<Duration>,
    /// Snapshot and restore signal dispositions around every test
    pub isolate_signals: bool,
    pub log_level: String,
    pub fail_fast: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            resources: ResourcePolicy::default(),
            accept_patterns: Vec::new(),
            ignore_patterns: Vec::new(),
            short_timeout: SHORT_TIMEOUT,
            long_timeout: LONG_TIMEOUT,
            kill_grace: KILL_GRACE,
            watchdog_interval: None,
            isolate_signals: true,
            log_level: "info".to_string(),
            fail_fast: false,
        }
    }
}

impl HarnessConfig {
    /// Create a new builder
    pub fn builder() -> crate::config::builder::HarnessConfigBuilder {
        crate::config::builder::HarnessConfigBuilder::new()
    }

    /// Load a configuration from a JSON document; missing fields take defaults
    pub fn from_json_str(json: &str) -> HarnessResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> HarnessResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Check the configuration before any test runs
    ///
    /// Patterns are compiled here so a malformed one fails the suite up front.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.short_timeout.is_zero() {
            return Err(HarnessError::config("short_timeout", "must be greater than zero"));
        }
        if self.long_timeout < self.short_timeout {
            return Err(HarnessError::config(
                "long_timeout",
                format!(
                    "{:?} is shorter than short_timeout {:?}",
                    self.long_timeout, self.short_timeout
                ),
            ));
        }
        if matches!(self.watchdog_interval, Some(interval) if interval.is_zero()) {
            return Err(HarnessError::config("watchdog_interval", "must be greater than zero"));
        }

        PatternMatcher::new(&self.accept_patterns, &self.ignore_patterns)?;
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
