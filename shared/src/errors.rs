//! Shared error types for the test harness

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid resource name '{name}': {reason}")]
    InvalidResourceName { name: String, reason: String },

    #[error("Invalid test identifier: '{input}'")]
    InvalidTestId { input: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
