//! Platform Capabilities
//!
//! Resolved once at startup and handed to the signal guard, the process
//! supervisor and the memory watchdog, which degrade instead of failing when
//! a capability is missing.

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// Runaway children can be killed with SIGKILL
    pub forced_termination: bool,
    /// Signal dispositions can be read and reinstalled
    pub signal_introspection: bool,
    /// Exited children can be collected with a non-blocking wait
    pub child_reaping: bool,
    /// Resident memory of this process can be sampled
    pub memory_sampling: bool,
}

impl PlatformCapabilities {
    pub fn detect() -> Self {
        let caps = Self {
            forced_termination: cfg!(unix),
            signal_introspection: cfg!(unix),
            child_reaping: cfg!(unix),
            memory_sampling: sysinfo::IS_SUPPORTED_SYSTEM,
        };
        info!(
            "🖥️ Platform capabilities: kill={} signals={} reap={} memory={}",
            caps.forced_termination, caps.signal_introspection, caps.child_reaping, caps.memory_sampling
        );
        caps
    }

    /// A platform where every capability is missing
    pub fn none() -> Self {
        Self {
            forced_termination: false,
            signal_introspection: false,
            child_reaping: false,
            memory_sampling: false,
        }
    }
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}
