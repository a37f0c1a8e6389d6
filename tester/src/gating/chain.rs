//! Gate Chain
//!
//! Every test passes through an ordered list of gates before its body runs.
//! The first gate that does not pass decides the outcome, so a denial never
//! leaves partial state behind.

use super::patterns::PatternMatcher;
use super::resources::ResourceGate;
use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use shared::{ResourceName, TestId};
use std::fmt;

/// Platforms a test can be restricted to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformRequirement {
    #[default]
    Any,
    Unix,
    Linux,
}

impl PlatformRequirement {
    pub fn is_satisfied(&self) -> bool {
        match self {
            PlatformRequirement::Any => true,
            PlatformRequirement::Unix => cfg!(unix),
            PlatformRequirement::Linux => cfg!(target_os = "linux"),
        }
    }
}

impl fmt::Display for PlatformRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformRequirement::Any => write!(f, "any"),
            PlatformRequirement::Unix => write!(f, "unix"),
            PlatformRequirement::Linux => write!(f, "linux"),
        }
    }
}

/// What a gate sees of a test
#[derive(Debug, Clone, Copy)]
pub struct TestMetadata<'a> {
    pub id: &'a TestId,
    pub requires: &'a [ResourceName],
    pub platform: PlatformRequirement,
}

#[derive(Debug)]
pub enum GateResult {
    Pass,
    /// Precondition unmet; reported as skipped
    Skip(String),
    /// Excluded by selection; not reported as run at all
    Deselect(String),
    Error(HarnessError),
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateResult::Pass)
    }
}

impl From<HarnessError> for GateResult {
    fn from(err: HarnessError) -> Self {
        if err.is_skip() {
            GateResult::Skip(err.to_string())
        } else {
            GateResult::Error(err)
        }
    }
}

/// A predicate evaluated before a test body runs
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, test: &TestMetadata<'_>) -> GateResult;
}

impl Gate for PatternMatcher {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn evaluate(&self, test: &TestMetadata<'_>) -> GateResult {
        if self.matches(test.id.as_str()) {
            GateResult::Pass
        } else {
            GateResult::Deselect("excluded by test pattern".to_string())
        }
    }
}

impl Gate for ResourceGate {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn evaluate(&self, test: &TestMetadata<'_>) -> GateResult {
        for resource in test.requires {
            if let Err(err) = self.require(resource.as_str(), None) {
                return err.into();
            }
        }
        GateResult::Pass
    }
}

/// Skips tests whose platform requirement the host does not meet
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformGate;

impl Gate for PlatformGate {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn evaluate(&self, test: &TestMetadata<'_>) -> GateResult {
        if test.platform.is_satisfied() {
            GateResult::Pass
        } else {
            GateResult::Skip(format!("requires {} platform", test.platform))
        }
    }
}

type Predicate = Box<dyn Fn(&TestMetadata<'_>) -> GateResult + Send + Sync>;

/// Ad hoc gate built from a closure
pub struct PredicateGate {
    name: &'static str,
    predicate: Predicate,
}

impl PredicateGate {
    pub fn new<F>(name: &'static str, predicate: F) -> Self
    where
        F: Fn(&TestMetadata<'_>) -> GateResult + Send + Sync + 'static,
    {
        Self {
            name,
            predicate: Box::new(predicate),
        }
    }
}

impl fmt::Debug for PredicateGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateGate").field("name", &self.name).finish()
    }
}

impl Gate for PredicateGate {
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&self, test: &TestMetadata<'_>) -> GateResult {
        (self.predicate)(test)
    }
}

/// Ordered gates; the first non-pass result wins
#[derive(Default)]
pub struct GateChain<'a> {
    gates: Vec<&'a dyn Gate>,
}

impl<'a> GateChain<'a> {
    pub fn new() -> Self {
        Self { gates: Vec::new() }
    }

    pub fn with(mut self, gate: &'a dyn Gate) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn push(&mut self, gate: &'a dyn Gate) {
        self.gates.push(gate);
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn evaluate(&self, test: &TestMetadata<'_>) -> GateResult {
        for gate in &self.gates {
            let result = gate.evaluate(test);
            if !result.is_pass() {
                tracing::debug!("🚧 Gate '{}' stopped {}: {:?}", gate.name(), test.id, result);
                return result;
            }
        }
        GateResult::Pass
    }
}
