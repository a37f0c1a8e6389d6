//! Configuration Management
//!
//! This module provides configuration structures and builders for harness setup.

pub mod builder;
pub mod harness;
pub mod resources;

// Re-export main types
pub use builder::HarnessConfigBuilder;
pub use harness::{HarnessConfig, KILL_GRACE, LONG_TIMEOUT, SHORT_TIMEOUT};
pub use resources::{ResourcePolicy, ResourceSet};
