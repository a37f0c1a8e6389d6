//! Test Runner
//!
//! Sequential execution of gated test cases with per-test isolation and a
//! suite-level report.

pub mod case;
pub mod suite;

pub use case::{TestBody, TestCase, TestContext, TestFuture, TestOutcome, TestRecord};
pub use suite::{SuiteReport, TestRunner};
