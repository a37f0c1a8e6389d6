//! Test Harness Engine
//!
//! Resource gating and process supervision for long-running test suites.
//!
//! ## Main Interface
//!
//! A [`TestRunner`] takes a [`HarnessConfig`] and runs [`TestCase`]s one at a
//! time. Before a body runs, its name is matched against the accept/ignore
//! patterns and its declared resources against the resource policy; a denied
//! resource is a skip, never a failure. While it runs, the body can supervise
//! child processes through the [`ProcessSupervisor`] in its [`TestContext`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tester::*;
//!
//! async fn exit_zero(ctx: TestContext) -> HarnessResult<()> {
//!     let pid = ctx.supervisor.spawn("/bin/sh", &["-c", "exit 0"]).await?;
//!     ctx.supervisor.wait(pid, 0, ctx.short_timeout).await?;
//!     Ok(())
//! }
//!
//! # async fn demo() -> HarnessResult<()> {
//! let config = HarnessConfig::builder()
//!     .use_resources(ResourceSet::parse("subprocess,network")?)
//!     .accept("test_exit*")
//!     .build();
//!
//! let case = TestCase::new(TestId::new("demo.test_exit_zero")?, exit_zero)
//!     .requires(ResourceName::new("subprocess")?);
//!
//! let mut runner = TestRunner::new(config)?;
//! let report = runner.run(&[case]).await;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod gating;
pub mod runner;
pub mod runtime;
pub mod scenarios;

// Main interfaces - re-exported at crate root for convenience
pub use config::{HarnessConfig, HarnessConfigBuilder, ResourcePolicy, ResourceSet};
pub use error::{HarnessError, HarnessResult, KillAttempt};
pub use runner::{SuiteReport, TestCase, TestContext, TestOutcome, TestRunner};

// Supporting types
pub use gating::{requires_resource, Gate, GateChain, GateResult, PatternMatcher, ResourceGate};
pub use runtime::{MemoryWatchdog, PlatformCapabilities, ProcessSupervisor, SignalGuard, SignalSnapshot};
pub use shared::{ExitOutcome, MemorySample, ResourceName, TestId};
