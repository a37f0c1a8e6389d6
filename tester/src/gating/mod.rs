//! Test Gating
//!
//! Decides whether a test may run: name patterns select it, the resource
//! policy permits it, and the platform supports it.

pub mod chain;
pub mod patterns;
pub mod resources;

pub use chain::{Gate, GateChain, GateResult, PlatformGate, PlatformRequirement, PredicateGate, TestMetadata};
pub use patterns::{load_patterns_file, CompiledPattern, PatternMatcher, PatternSet};
pub use resources::{display_available, DisplayProbe, ResourceGate};

use crate::runner::{TestBody, TestContext, TestFuture};
use shared::ResourceName;
use std::sync::Arc;

/// Wrap a test body so `resource` is checked immediately before it runs
///
/// A denied resource surfaces as [`crate::HarnessError::ResourceDenied`],
/// which the runner records as a skip rather than a failure.
pub fn requires_resource<R: Into<String>>(resource: ResourceName, reason: R, body: TestBody) -> TestBody {
    let reason = reason.into();
    Arc::new(move |ctx: TestContext| -> TestFuture {
        let body = body.clone();
        let resource = resource.clone();
        let reason = reason.clone();
        Box::pin(async move {
            ctx.resources.require(resource.as_str(), Some(&reason))?;
            body(ctx).await
        })
    })
}
