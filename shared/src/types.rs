//! Core shared types and identifiers

use crate::errors::{SharedError, SharedResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Fully-qualified dotted identifier of a test case, e.g. `net.http.Client.test_get`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestId(String);

impl TestId {
    pub fn new<S: Into<String>>(id: S) -> SharedResult<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && !id.chars().any(char::is_whitespace)
            && id.split('.').all(|part| !part.is_empty());

        if valid {
            Ok(Self(id))
        } else {
            Err(SharedError::InvalidTestId { input: id })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dotted components of the identifier, outermost first
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Last dotted component (the test function name)
    pub fn leaf(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TestId {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TestId {
    type Error = SharedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TestId> for String {
    fn from(id: TestId) -> Self {
        id.0
    }
}

/// Name of an external capability a test may require (network, gui, ...)
///
/// Names are case-sensitive and restricted to `[A-Za-z0-9_-]+`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceName(String);

impl ResourceName {
    /// Sentinel enabling every resource, including ones not yet named
    pub const ALL: &'static str = "all";

    /// Resources the harness knows about; `all` expands to these
    pub const KNOWN: [&'static str; 12] = [
        "audio",
        "curses",
        "largefile",
        "network",
        "decimal",
        "cpu",
        "subprocess",
        "urlfetch",
        "gui",
        "walltime",
        "extralargefile",
        "tzdata",
    ];

    pub fn new<S: Into<String>>(name: S) -> SharedResult<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(SharedError::InvalidResourceName {
                name,
                reason: "name is empty".to_string(),
            });
        }

        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(SharedError::InvalidResourceName {
                reason: format!("unexpected character '{bad}'"),
                name,
            });
        }

        Ok(Self(name))
    }

    pub fn all() -> Self {
        Self(Self::ALL.to_string())
    }

    pub fn is_all(&self) -> bool {
        self.0 == Self::ALL
    }

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(&self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ResourceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourceName {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceName {
    type Error = SharedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceName> for String {
    fn from(name: ResourceName) -> Self {
        name.0
    }
}

/// How a child process finished
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitOutcome {
    /// Normal exit with the given status code
    Exited(i32),
    /// Terminated by the given signal number
    Signaled(i32),
}

impl ExitOutcome {
    /// Exit code with signal terminations reported as `-signo`
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => *code,
            ExitOutcome::Signaled(signo) => -signo,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exit code {code}"),
            ExitOutcome::Signaled(signo) => write!(f, "signal {signo}"),
        }
    }
}

/// A single resident-memory reading taken by the memory watchdog
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub timestamp: DateTime<Utc>,
    pub resident_bytes: u64,
}

impl MemorySample {
    pub fn now(resident_bytes: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            resident_bytes,
        }
    }
}

impl fmt::Display for MemorySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -- process resident size: {}",
            crate::logging::format_timestamp(&self.timestamp),
            format_bytes(self.resident_bytes)
        )
    }
}

/// Render a byte count in binary units, e.g. `1.5 GiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
