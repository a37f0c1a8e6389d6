//! Harness Configuration Builder
//!
//! Provides a flexible builder pattern for constructing harness configurations

use super::resources::{ResourcePolicy, ResourceSet};
use super::HarnessConfig;
use std::time::Duration;

pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HarnessConfig::default(),
        }
    }

    /// Set the resource policy directly
    pub fn resources(mut self, policy: ResourcePolicy) -> Self {
        self.config.resources = policy;
        self
    }

    /// Orchestrated mode: only the given resources are enabled
    pub fn use_resources(mut self, enabled: ResourceSet) -> Self {
        self.config.resources = ResourcePolicy::Orchestrated { enabled };
        self
    }

    /// Standalone mode: everything except the deny-list is enabled
    pub fn deny_resources(mut self, deny: ResourceSet) -> Self {
        self.config.resources = ResourcePolicy::Standalone { deny };
        self
    }

    /// Add an accept pattern
    pub fn accept<S: Into<String>>(mut self, pattern: S) -> Self {
        self.config.accept_patterns.push(pattern.into());
        self
    }

    /// Add an ignore pattern
    pub fn ignore<S: Into<String>>(mut self, pattern: S) -> Self {
        self.config.ignore_patterns.push(pattern.into());
        self
    }

    /// Replace the accept patterns
    pub fn accept_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.accept_patterns = patterns;
        self
    }

    /// Replace the ignore patterns
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.ignore_patterns = patterns;
        self
    }

    pub fn short_timeout(mut self, timeout: Duration) -> Self {
        self.config.short_timeout = timeout;
        self
    }

    pub fn long_timeout(mut self, timeout: Duration) -> Self {
        self.config.long_timeout = timeout;
        self
    }

    /// Bound on the reap attempt after a timed-out process is killed
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.config.kill_grace = grace;
        self
    }

    /// Sample process memory at this interval while the suite runs (None disables)
    pub fn watchdog_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.watchdog_interval = interval;
        self
    }

    pub fn isolate_signals(mut self, enabled: bool) -> Self {
        self.config.isolate_signals = enabled;
        self
    }

    /// Set log level (trace, debug, info, warn, error)
    pub fn log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Stop the suite at the first failing test
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.config.fail_fast = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> HarnessConfig {
        self.config
    }
}

impl Default for HarnessConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
