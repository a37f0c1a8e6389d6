//! Process Supervision Checks
//!
//! Real child processes driven through the supervisor: exit-code contract,
//! runaway termination and teardown reaping.

use crate::error::{HarnessError, HarnessResult, KillAttempt};
use crate::harness_ensure;
use crate::runner::{TestCase, TestContext};
use shared::{ResourceName, TestId};
use std::time::Duration;

const SHELL: &str = "/bin/sh";

pub fn cases() -> HarnessResult<Vec<TestCase>> {
    let subprocess = ResourceName::new("subprocess")?;
    let walltime = ResourceName::new("walltime")?;

    Ok(vec![
        TestCase::new(TestId::new("harness.process.test_exit_code_match")?, exit_code_match)
            .requires(subprocess.clone())
            .unix_only(),
        TestCase::new(TestId::new("harness.process.test_exit_code_mismatch")?, exit_code_mismatch)
            .requires(subprocess.clone())
            .unix_only(),
        TestCase::new(TestId::new("harness.process.test_timeout_kills_runaway")?, timeout_kills_runaway)
            .requires(subprocess)
            .requires(walltime)
            .unix_only(),
        TestCase::new(TestId::new("harness.process.test_reap_children_idempotent")?, reap_children_idempotent),
    ])
}

async fn exit_code_match(ctx: TestContext) -> HarnessResult<()> {
    let pid = ctx.supervisor.spawn(SHELL, &["-c", "exit 0"]).await?;
    ctx.supervisor.wait(pid, 0, ctx.short_timeout).await?;

    let pid = ctx.supervisor.spawn(SHELL, &["-c", "exit 7"]).await?;
    ctx.supervisor.wait(pid, 7, ctx.short_timeout).await?;
    Ok(())
}

async fn exit_code_mismatch(ctx: TestContext) -> HarnessResult<()> {
    let pid = ctx.supervisor.spawn(SHELL, &["-c", "exit 1"]).await?;

    match ctx.supervisor.wait(pid, 0, ctx.short_timeout).await {
        Err(HarnessError::ExitCodeMismatch { expected, actual, .. }) => {
            harness_ensure!(
                expected == 0 && actual == 1,
                "mismatch reported {} expected / {} actual",
                expected,
                actual
            );
            Ok(())
        }
        Ok(outcome) => Err(HarnessError::assertion(format!("wrong exit code accepted: {outcome}"))),
        Err(e) => Err(e),
    }
}

async fn timeout_kills_runaway(ctx: TestContext) -> HarnessResult<()> {
    let pid = ctx.supervisor.spawn("sleep", &["60"]).await?;

    let err = match ctx.supervisor.wait(pid, 0, Duration::from_secs(1)).await {
        Ok(outcome) => return Err(HarnessError::assertion(format!("runaway finished early: {outcome}"))),
        Err(e) => e,
    };

    let kill = err
        .kill_attempt()
        .ok_or_else(|| HarnessError::assertion(format!("expected a timeout, got: {err}")))?;

    if ctx.capabilities.forced_termination {
        harness_ensure!(*kill == KillAttempt::Killed, "kill attempt reported: {}", kill);
        harness_ensure!(!ctx.supervisor.is_alive(pid), "process {} survived the kill", pid);
    } else {
        harness_ensure!(*kill == KillAttempt::Unsupported, "kill attempt reported: {}", kill);
    }
    Ok(())
}

async fn reap_children_idempotent(ctx: TestContext) -> HarnessResult<()> {
    let first = ctx.supervisor.reap_children().await;
    let second = ctx.supervisor.reap_children().await;
    harness_ensure!(second.is_clean(), "second reap pass found {:?}", second);
    tracing::debug!("🧹 First reap pass: {:?}", first);
    Ok(())
}
