//! Shared logging utilities for consistent tracing across the harness

use chrono::{DateTime, Utc};
use tracing_subscriber::{EnvFilter, fmt};

/// Build the filter directive for the harness crates at the given level
pub fn filter_directive(level: &str) -> String {
    format!("tester={level},shared={level}")
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` takes precedence over `level` when it is set. Calling this more
/// than once is harmless: later calls leave the first subscriber in place.
pub fn init_tracing(level: &str, verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let result = fmt()
        .with_env_filter(env_filter)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed, keeping existing one");
    }
}

/// Format a timestamp for diagnostic lines
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%H:%M:%S%.3f").to_string()
}
