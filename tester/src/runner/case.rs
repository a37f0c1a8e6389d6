//! Test Cases and Outcomes

use crate::error::HarnessResult;
use crate::gating::{PlatformRequirement, ResourceGate, TestMetadata};
use crate::runtime::{PlatformCapabilities, ProcessSupervisor};
use serde::Serialize;
use shared::{ResourceName, TestId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type TestFuture = Pin<Box<dyn Future<Output = HarnessResult<()>> + Send>>;

/// A test body; called once per run with a fresh context
pub type TestBody = Arc<dyn Fn(TestContext) -> TestFuture + Send + Sync>;

/// Everything a test body may use from the harness
#[derive(Clone)]
pub struct TestContext {
    pub supervisor: Arc<ProcessSupervisor>,
    pub resources: Arc<ResourceGate>,
    pub capabilities: PlatformCapabilities,
    pub short_timeout: Duration,
    pub long_timeout: Duration,
}

impl TestContext {
    /// Skip the calling test unless `resource` is enabled
    pub fn require(&self, resource: &str, reason: &str) -> HarnessResult<()> {
        self.resources.require(resource, Some(reason))
    }
}

#[derive(Clone)]
pub struct TestCase {
    id: TestId,
    requires: Vec<ResourceName>,
    platform: PlatformRequirement,
    body: TestBody,
}

impl TestCase {
    pub fn new<F, Fut>(id: TestId, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        Self::from_body(id, Arc::new(move |ctx: TestContext| -> TestFuture { Box::pin(body(ctx)) }))
    }

    pub fn from_body(id: TestId, body: TestBody) -> Self {
        Self {
            id,
            requires: Vec::new(),
            platform: PlatformRequirement::Any,
            body,
        }
    }

    /// Declare a resource the test needs; checked before the body runs
    pub fn requires(mut self, resource: ResourceName) -> Self {
        if !self.requires.contains(&resource) {
            self.requires.push(resource);
        }
        self
    }

    pub fn platform(mut self, platform: PlatformRequirement) -> Self {
        self.platform = platform;
        self
    }

    pub fn unix_only(self) -> Self {
        self.platform(PlatformRequirement::Unix)
    }

    pub fn id(&self) -> &TestId {
        &self.id
    }

    pub fn required_resources(&self) -> &[ResourceName] {
        &self.requires
    }

    pub fn metadata(&self) -> TestMetadata<'_> {
        TestMetadata {
            id: &self.id,
            requires: &self.requires,
            platform: self.platform,
        }
    }

    pub(crate) fn invoke(&self, ctx: TestContext) -> TestFuture {
        (self.body)(ctx)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("requires", &self.requires)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed(String),
    /// Not run because a precondition was unmet; never counted as a failure
    Skipped(String),
    /// Filtered out by the name patterns
    Deselected(String),
}

impl TestOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TestOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TestOutcome::Passed => "ok",
            TestOutcome::Failed(_) => "FAILED",
            TestOutcome::Skipped(_) => "skipped",
            TestOutcome::Deselected(_) => "deselected",
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Passed => write!(f, "ok"),
            TestOutcome::Failed(reason) => write!(f, "FAILED: {reason}"),
            TestOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            TestOutcome::Deselected(reason) => write!(f, "deselected: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub id: TestId,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
    /// The test left child processes behind that teardown had to reap
    pub environment_altered: bool,
}

impl TestRecord {
    pub fn new(id: TestId, outcome: TestOutcome, duration: Duration, environment_altered: bool) -> Self {
        Self {
            id,
            outcome,
            duration_ms: duration.as_millis() as u64,
            environment_altered,
        }
    }
}
