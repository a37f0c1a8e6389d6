//! Harness error types
//!
//! Skips, failures and configuration problems all travel through
//! [`HarnessError`]; [`HarnessError::is_skip`] separates the non-failure
//! outcomes from the real ones.

use shared::SharedError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What happened when a timed-out process was asked to die
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillAttempt {
    /// SIGKILL was delivered
    Killed,
    /// Delivering the kill signal failed
    KillFailed(String),
    /// The platform cannot forcibly terminate processes; the child may leak
    Unsupported,
}

impl fmt::Display for KillAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillAttempt::Killed => write!(f, "killed"),
            KillAttempt::KillFailed(reason) => write!(f, "kill failed: {reason}"),
            KillAttempt::Unsupported => write!(f, "could not kill: forced termination unsupported on this platform"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("Use of the '{resource}' resource not enabled: {reason}")]
    ResourceDenied { resource: String, reason: String },

    #[error("process {pid} exited with code {actual}, but exit code {expected} is expected")]
    ExitCodeMismatch { pid: i32, expected: i32, actual: i32 },

    #[error("process {pid} is still running after {:.1} seconds ({kill})", .elapsed.as_secs_f64())]
    Timeout {
        pid: i32,
        elapsed: Duration,
        kill: KillAttempt,
    },

    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process control failed for pid {pid}: {message}")]
    ProcessControl { pid: i32, message: String },

    #[error("Signal disposition error for signal {signal}: {message}")]
    Signal { signal: i32, message: String },

    #[error("Assertion failed: {message}")]
    Assertion { message: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn config<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        HarnessError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn denied<N: Into<String>, R: Into<String>>(resource: N, reason: R) -> Self {
        HarnessError::ResourceDenied {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn assertion<M: Into<String>>(message: M) -> Self {
        HarnessError::Assertion {
            message: message.into(),
        }
    }

    pub fn process<M: Into<String>>(pid: i32, message: M) -> Self {
        HarnessError::ProcessControl {
            pid,
            message: message.into(),
        }
    }

    /// Skip conditions are reported as "skipped", never as failures
    pub fn is_skip(&self) -> bool {
        matches!(self, HarnessError::ResourceDenied { .. })
    }

    /// Kill detail of a timeout failure
    pub fn kill_attempt(&self) -> Option<&KillAttempt> {
        match self {
            HarnessError::Timeout { kill, .. } => Some(kill),
            _ => None,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Return an [`HarnessError::Assertion`] from the enclosing function when the
/// condition does not hold
#[macro_export]
macro_rules! harness_ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err($crate::HarnessError::assertion(format!($($arg)*)));
        }
    };
}
