//! Built-in Scenarios
//!
//! Self-check suite that drives every harness component against the real
//! host. Run it through the CLI to verify a platform before trusting the
//! harness with a larger suite.

pub mod isolation;
pub mod process;

use crate::error::{HarnessError, HarnessResult};
use crate::runner::TestCase;

/// Scenario groups accepted by [`scenario_group`]
pub const GROUPS: [&str; 3] = ["all", "process", "isolation"];

/// Test cases of a named scenario group
pub fn scenario_group(name: &str) -> HarnessResult<Vec<TestCase>> {
    match name {
        "process" => process::cases(),
        "isolation" => isolation::cases(),
        "all" => {
            let mut cases = process::cases()?;
            cases.extend(isolation::cases()?);
            Ok(cases)
        }
        other => Err(HarnessError::config(
            "scenario",
            format!("unknown scenario group '{other}' (expected one of {})", GROUPS.join(", ")),
        )),
    }
}
