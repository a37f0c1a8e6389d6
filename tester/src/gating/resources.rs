//! Resource Gate
//!
//! Holds the resource policy for a suite and turns "resource not enabled"
//! into a skip. The policy is set before the suite starts and only read
//! while tests execute.

use crate::config::{ResourcePolicy, ResourceSet};
use crate::error::{HarnessError, HarnessResult};
use shared::ResourceName;
use tracing::{debug, info};

/// Resource that additionally needs a usable display
const GUI: &str = "gui";

/// Reports whether a graphical display can be used by tests
pub type DisplayProbe = fn() -> bool;

/// Default display check: an X11 or Wayland display must be advertised
pub fn display_available() -> bool {
    if cfg!(target_os = "linux") {
        ["DISPLAY", "WAYLAND_DISPLAY"]
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
    } else {
        true
    }
}

#[derive(Debug, Clone)]
pub struct ResourceGate {
    policy: ResourcePolicy,
    display_probe: DisplayProbe,
}

impl ResourceGate {
    pub fn new(policy: ResourcePolicy) -> Self {
        Self {
            policy,
            display_probe: display_available,
        }
    }

    /// Replace the display check used for the `gui` resource
    pub fn with_display_probe(mut self, probe: DisplayProbe) -> Self {
        self.display_probe = probe;
        self
    }

    /// Install a new policy; single-writer, before the suite runs
    pub fn configure(&mut self, policy: ResourcePolicy) {
        info!("🔐 Resource policy: {}", policy);
        self.policy = policy;
    }

    /// Back to the direct-invocation default
    pub fn reset(&mut self) {
        self.policy = ResourcePolicy::default();
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    pub fn is_enabled(&self, resource: &str) -> bool {
        self.policy.is_enabled(resource)
    }

    /// Known resources the current policy enables
    pub fn enabled_resources(&self) -> ResourceSet {
        ResourceSet::from_names(
            ResourceName::KNOWN
                .iter()
                .filter(|name| self.is_enabled(name))
                .filter_map(|name| ResourceName::new(*name).ok()),
        )
    }

    /// Deny with [`HarnessError::ResourceDenied`] unless `resource` is enabled
    pub fn require(&self, resource: &str, reason: Option<&str>) -> HarnessResult<()> {
        if !self.is_enabled(resource) {
            let reason = reason
                .map(ToString::to_string)
                .unwrap_or_else(|| self.default_reason(resource));
            debug!("⏭️ Resource '{}' denied: {}", resource, reason);
            return Err(HarnessError::denied(resource, reason));
        }

        if resource == GUI && !(self.display_probe)() {
            return Err(HarnessError::denied(resource, "no display available"));
        }

        Ok(())
    }

    fn default_reason(&self, resource: &str) -> String {
        match &self.policy {
            ResourcePolicy::Orchestrated { .. } => format!("enable it with --use {resource}"),
            ResourcePolicy::Standalone { .. } => format!("'{resource}' is on the deny list"),
        }
    }
}

impl Default for ResourceGate {
    fn default() -> Self {
        Self::new(ResourcePolicy::default())
    }
}
