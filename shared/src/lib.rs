//! Shared types for the test harness
//!
//! Identifiers and value types used by every harness component, the shared
//! error type, and tracing initialisation.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
