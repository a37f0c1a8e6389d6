//! Process Supervision
//!
//! Waits for child processes under a deadline, kills runaways and reaps
//! whatever is left over at teardown so zombies never accumulate in a
//! long-running suite.
//!
//! A supervised process moves through
//! `Spawned -> Running -> {ExitedMatch, ExitedMismatch, TimedOutKilled, TimedOutUnkillable}`.
//! Handles are dropped once a wait has confirmed the exit; a child that
//! could not be confirmed stays tracked until `reap_children` collects it.

use super::platform::PlatformCapabilities;
use crate::error::{HarnessError, HarnessResult, KillAttempt};
use serde::Serialize;
use shared::ExitOutcome;
use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// First poll interval while waiting for a child
pub const INITIAL_POLL: Duration = Duration::from_millis(10);

/// Poll interval ceiling; the interval doubles up to this value
pub const MAX_POLL: Duration = Duration::from_secs(1);

/// Next pause before polling again, or `None` once `deadline` has passed
fn poll_delay(delay: Duration, deadline: Option<Instant>) -> Option<Duration> {
    let Some(deadline) = deadline else {
        return Some(delay);
    };
    let now = Instant::now();
    (now < deadline).then(|| delay.min(deadline - now))
}

/// OS operations the supervisor depends on
#[mockall::automock]
pub trait ProcessControl: Send + Sync {
    /// Non-blocking wait for one child; `None` while it is still running
    fn try_wait(&self, pid: i32) -> HarnessResult<Option<ExitOutcome>>;

    /// Non-blocking wait for any child; `None` when nothing is left to collect
    fn try_wait_any(&self) -> HarnessResult<Option<(i32, ExitOutcome)>>;

    /// Deliver SIGKILL; an already-gone process is not an error
    fn kill(&self, pid: i32) -> HarnessResult<()>;

    fn is_alive(&self, pid: i32) -> bool;
}

#[cfg(unix)]
mod os {
    use super::ProcessControl;
    use crate::error::{HarnessError, HarnessResult};
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;
    use shared::ExitOutcome;

    /// `waitpid`/`kill` backed process control
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemProcessControl;

    fn outcome_of(status: WaitStatus) -> Option<(i32, ExitOutcome)> {
        match status {
            WaitStatus::Exited(pid, code) => Some((pid.as_raw(), ExitOutcome::Exited(code))),
            WaitStatus::Signaled(pid, signal, _) => Some((pid.as_raw(), ExitOutcome::Signaled(signal as i32))),
            _ => None,
        }
    }

    impl ProcessControl for SystemProcessControl {
        fn try_wait(&self, pid: i32) -> HarnessResult<Option<ExitOutcome>> {
            waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG))
                .map(|status| outcome_of(status).map(|(_, outcome)| outcome))
                .map_err(|e| HarnessError::process(pid, format!("waitpid failed: {e}")))
        }

        fn try_wait_any(&self) -> HarnessResult<Option<(i32, ExitOutcome)>> {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => Ok(outcome_of(status)),
                Err(Errno::ECHILD) => Ok(None),
                Err(e) => Err(HarnessError::process(-1, format!("waitpid failed: {e}"))),
            }
        }

        fn kill(&self, pid: i32) -> HarnessResult<()> {
            match kill(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(HarnessError::process(pid, format!("SIGKILL failed: {e}"))),
            }
        }

        fn is_alive(&self, pid: i32) -> bool {
            // Signal 0 probes for existence; EPERM still means the pid exists
            matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
        }
    }
}

#[cfg(not(unix))]
mod os {
    use super::ProcessControl;
    use crate::error::{HarnessError, HarnessResult};
    use shared::ExitOutcome;

    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemProcessControl;

    impl ProcessControl for SystemProcessControl {
        fn try_wait(&self, pid: i32) -> HarnessResult<Option<ExitOutcome>> {
            Err(HarnessError::process(pid, "waiting on children is unsupported on this platform"))
        }

        fn try_wait_any(&self) -> HarnessResult<Option<(i32, ExitOutcome)>> {
            Ok(None)
        }

        fn kill(&self, pid: i32) -> HarnessResult<()> {
            Err(HarnessError::process(pid, "forced termination is unsupported on this platform"))
        }

        fn is_alive(&self, _pid: i32) -> bool {
            false
        }
    }
}

pub use os::SystemProcessControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Spawned,
    Running,
    ExitedMatch,
    ExitedMismatch,
    TimedOutKilled,
    TimedOutUnkillable,
}

/// A child the supervisor knows about
#[derive(Debug, Clone)]
pub struct ChildProcessHandle {
    pub pid: i32,
    pub program: Option<String>,
    pub expected_exit_code: i32,
    pub deadline: Option<Instant>,
    pub state: ProcessState,
}

impl ChildProcessHandle {
    fn new(pid: i32, program: Option<String>) -> Self {
        Self {
            pid,
            program,
            expected_exit_code: 0,
            deadline: None,
            state: ProcessState::Spawned,
        }
    }
}

/// Result of a teardown reap pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub reaped: Vec<i32>,
    pub still_running: Vec<i32>,
}

impl ReapReport {
    pub fn is_clean(&self) -> bool {
        self.reaped.is_empty() && self.still_running.is_empty()
    }
}

pub struct ProcessSupervisor {
    control: Box<dyn ProcessControl>,
    capabilities: PlatformCapabilities,
    kill_grace: Duration,
    handles: Mutex<HashMap<i32, ChildProcessHandle>>,
}

impl ProcessSupervisor {
    pub fn new(capabilities: PlatformCapabilities, kill_grace: Duration) -> Self {
        Self::with_control(Box::new(SystemProcessControl), capabilities, kill_grace)
    }

    pub fn with_control(
        control: Box<dyn ProcessControl>,
        capabilities: PlatformCapabilities,
        kill_grace: Duration,
    ) -> Self {
        Self {
            control,
            capabilities,
            kill_grace,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.capabilities
    }

    /// Start `program` and track it; stdin is closed and output inherited
    pub async fn spawn<S: AsRef<str>>(&self, program: &str, args: &[S]) -> HarnessResult<i32> {
        let child = Command::new(program)
            .args(args.iter().map(|arg| arg.as_ref()))
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| HarnessError::SpawnFailed {
                program: program.to_string(),
                source,
            })?;

        let pid = child.id() as i32;
        // The std handle is dropped; waiting goes through the supervisor
        drop(child);

        debug!("🚀 Spawned '{}' as pid {}", program, pid);
        self.handles
            .lock()
            .await
            .insert(pid, ChildProcessHandle::new(pid, Some(program.to_string())));
        Ok(pid)
    }

    /// Register a child spawned elsewhere so teardown knows about it
    pub async fn track(&self, pid: i32) {
        self.handles
            .lock()
            .await
            .entry(pid)
            .or_insert_with(|| ChildProcessHandle::new(pid, None));
    }

    pub async fn tracked(&self) -> Vec<ChildProcessHandle> {
        let mut handles: Vec<_> = self.handles.lock().await.values().cloned().collect();
        handles.sort_by_key(|h| h.pid);
        handles
    }

    pub async fn state(&self, pid: i32) -> Option<ProcessState> {
        self.handles.lock().await.get(&pid).map(|h| h.state)
    }

    pub fn is_alive(&self, pid: i32) -> bool {
        self.control.is_alive(pid)
    }

    /// Wait for `pid` to exit with `expected` within `timeout`
    ///
    /// A wrong exit code is an [`HarnessError::ExitCodeMismatch`]. On timeout
    /// the process is killed where the platform allows it and the error
    /// carries what the kill attempt achieved.
    pub async fn wait(&self, pid: i32, expected: i32, timeout: Duration) -> HarnessResult<ExitOutcome> {
        let started = Instant::now();
        // A timeout past the representable range waits without a deadline
        let deadline = started.checked_add(timeout);
        self.mark_running(pid, expected, deadline).await;

        let mut delay = INITIAL_POLL;
        loop {
            match self.control.try_wait(pid) {
                Ok(Some(outcome)) => return self.settle(pid, expected, outcome).await,
                Ok(None) => {}
                Err(e) => {
                    self.forget(pid).await;
                    return Err(e);
                }
            }

            match poll_delay(delay, deadline) {
                Some(pause) => sleep(pause).await,
                None => break,
            }
            delay = (delay * 2).min(MAX_POLL);
        }

        let kill = self.terminate(pid).await;
        let elapsed = started.elapsed();
        warn!(
            "⏰ Process {} still running after {:.1}s ({})",
            pid,
            elapsed.as_secs_f64(),
            kill
        );
        Err(HarnessError::Timeout { pid, elapsed, kill })
    }

    async fn mark_running(&self, pid: i32, expected: i32, deadline: Option<Instant>) {
        let mut handles = self.handles.lock().await;
        let handle = handles
            .entry(pid)
            .or_insert_with(|| ChildProcessHandle::new(pid, None));
        handle.expected_exit_code = expected;
        handle.deadline = deadline;
        handle.state = ProcessState::Running;
    }

    async fn settle(&self, pid: i32, expected: i32, outcome: ExitOutcome) -> HarnessResult<ExitOutcome> {
        self.forget(pid).await;

        let state = if outcome.code() == expected {
            ProcessState::ExitedMatch
        } else {
            ProcessState::ExitedMismatch
        };
        debug!("🏁 Process {} finished with {} ({:?})", pid, outcome, state);

        if state == ProcessState::ExitedMatch {
            return Ok(outcome);
        }
        Err(HarnessError::ExitCodeMismatch {
            pid,
            expected,
            actual: outcome.code(),
        })
    }

    /// Kill a timed-out child and try briefly to confirm it is gone
    async fn terminate(&self, pid: i32) -> KillAttempt {
        if !self.capabilities.forced_termination {
            self.set_state(pid, ProcessState::TimedOutUnkillable).await;
            warn!("⚠️ Cannot kill process {} on this platform, it may leak", pid);
            return KillAttempt::Unsupported;
        }

        if let Err(e) = self.control.kill(pid) {
            self.set_state(pid, ProcessState::TimedOutUnkillable).await;
            return KillAttempt::KillFailed(e.to_string());
        }

        if self.reap_within(pid, self.kill_grace).await {
            self.forget(pid).await;
        } else {
            // Left for reap_children
            self.set_state(pid, ProcessState::TimedOutKilled).await;
            debug!("🔪 Killed process {} not yet reaped", pid);
        }
        KillAttempt::Killed
    }

    async fn reap_within(&self, pid: i32, grace: Duration) -> bool {
        let deadline = Instant::now().checked_add(grace);
        let mut delay = INITIAL_POLL;
        loop {
            match self.control.try_wait(pid) {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(_) => return false,
            }
            match poll_delay(delay, deadline) {
                Some(pause) => sleep(pause).await,
                None => return false,
            }
            delay = (delay * 2).min(MAX_POLL);
        }
    }

    async fn set_state(&self, pid: i32, state: ProcessState) {
        if let Some(handle) = self.handles.lock().await.get_mut(&pid) {
            handle.state = state;
        }
    }

    async fn forget(&self, pid: i32) {
        self.handles.lock().await.remove(&pid);
    }

    /// Collect every finished child without blocking
    ///
    /// Tracked pids are checked first, then any other child of this process
    /// is swept up. Children still running are logged and left tracked.
    /// Never fails: teardown must not mask a test's own outcome.
    pub async fn reap_children(&self) -> ReapReport {
        let mut report = ReapReport::default();
        if !self.capabilities.child_reaping {
            return report;
        }

        let pids: Vec<i32> = {
            let handles = self.handles.lock().await;
            let mut pids: Vec<_> = handles.keys().copied().collect();
            pids.sort_unstable();
            pids
        };

        for pid in pids {
            match self.control.try_wait(pid) {
                Ok(Some(outcome)) => {
                    info!("🧹 Reaped child process {} ({})", pid, outcome);
                    report.reaped.push(pid);
                    self.forget(pid).await;
                }
                Ok(None) => {
                    warn!("⚠️ Child process {} is still running at teardown", pid);
                    report.still_running.push(pid);
                }
                Err(e) => {
                    debug!("Dropping handle for pid {}: {}", pid, e);
                    self.forget(pid).await;
                }
            }
        }

        loop {
            match self.control.try_wait_any() {
                Ok(Some((pid, outcome))) => {
                    if let Some(pos) = report.still_running.iter().position(|&p| p == pid) {
                        // Exited between the tracked pass and the sweep
                        report.still_running.remove(pos);
                        info!("🧹 Reaped child process {} ({})", pid, outcome);
                    } else {
                        info!("🧹 Reaped untracked child process {} ({})", pid, outcome);
                    }
                    report.reaped.push(pid);
                    self.forget(pid).await;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("⚠️ Child sweep stopped: {}", e);
                    break;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const GRACE: Duration = Duration::from_millis(50);

    fn capable() -> PlatformCapabilities {
        PlatformCapabilities {
            forced_termination: true,
            signal_introspection: true,
            child_reaping: true,
            memory_sampling: true,
        }
    }

    fn supervisor(mock: MockProcessControl, caps: PlatformCapabilities) -> ProcessSupervisor {
        ProcessSupervisor::with_control(Box::new(mock), caps, GRACE)
    }

    #[tokio::test]
    async fn test_wait_returns_on_matching_exit() {
        let mut mock = MockProcessControl::new();
        let mut seq = Sequence::new();
        mock.expect_try_wait()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        mock.expect_try_wait()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(ExitOutcome::Exited(0))));

        let sup = supervisor(mock, capable());
        let outcome = sup.wait(100, 0, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, ExitOutcome::Exited(0));
        assert!(sup.tracked().await.is_empty());
    }

    #[tokio::test]
    async fn test_wait_reports_mismatch() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait()
            .returning(|_| Ok(Some(ExitOutcome::Exited(1))));

        let sup = supervisor(mock, capable());
        match sup.wait(100, 0, Duration::from_secs(5)).await {
            Err(HarnessError::ExitCodeMismatch { pid, expected, actual }) => {
                assert_eq!((pid, expected, actual), (100, 0, 1));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signal_exit_reports_negative_code() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait()
            .returning(|_| Ok(Some(ExitOutcome::Signaled(9))));

        let sup = supervisor(mock, capable());
        let err = sup.wait(7, 0, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.to_string(), "process 7 exited with code -9, but exit code 0 is expected");
    }

    #[tokio::test]
    async fn test_wait_with_unrepresentable_timeout_does_not_panic() {
        let mut mock = MockProcessControl::new();
        let mut seq = Sequence::new();
        mock.expect_try_wait()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        mock.expect_try_wait()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(ExitOutcome::Exited(0))));

        let sup = supervisor(mock, capable());
        let outcome = sup.wait(100, 0, Duration::from_secs(u64::MAX)).await.unwrap();
        assert_eq!(outcome, ExitOutcome::Exited(0));
    }

    #[tokio::test]
    async fn test_unrepresentable_kill_grace_does_not_panic() {
        let killed = Arc::new(AtomicBool::new(false));
        let mut mock = MockProcessControl::new();
        let observed = killed.clone();
        mock.expect_try_wait().returning(move |_| {
            if observed.load(Ordering::SeqCst) {
                Ok(Some(ExitOutcome::Signaled(9)))
            } else {
                Ok(None)
            }
        });
        let trigger = killed.clone();
        mock.expect_kill().times(1).returning(move |_| {
            trigger.store(true, Ordering::SeqCst);
            Ok(())
        });

        let sup = ProcessSupervisor::with_control(Box::new(mock), capable(), Duration::MAX);
        let err = sup.wait(55, 0, Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.kill_attempt(), Some(&KillAttempt::Killed));
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reaps() {
        let killed = Arc::new(AtomicBool::new(false));
        let mut mock = MockProcessControl::new();
        let observed = killed.clone();
        mock.expect_try_wait().returning(move |_| {
            if observed.load(Ordering::SeqCst) {
                Ok(Some(ExitOutcome::Signaled(9)))
            } else {
                Ok(None)
            }
        });
        let trigger = killed.clone();
        mock.expect_kill().times(1).returning(move |_| {
            trigger.store(true, Ordering::SeqCst);
            Ok(())
        });

        let sup = supervisor(mock, capable());
        let err = sup.wait(55, 0, Duration::from_millis(40)).await.unwrap_err();
        assert_eq!(err.kill_attempt(), Some(&KillAttempt::Killed));
        assert!(sup.tracked().await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_without_forced_termination_leaves_process_tracked() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait().returning(|_| Ok(None));
        mock.expect_kill().never();

        let caps = PlatformCapabilities {
            forced_termination: false,
            ..capable()
        };
        let sup = supervisor(mock, caps);
        let err = sup.wait(55, 0, Duration::from_millis(20)).await.unwrap_err();

        assert_eq!(err.kill_attempt(), Some(&KillAttempt::Unsupported));
        assert_eq!(sup.state(55).await, Some(ProcessState::TimedOutUnkillable));
    }

    #[tokio::test]
    async fn test_failed_kill_is_reported() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait().returning(|_| Ok(None));
        mock.expect_kill()
            .returning(|pid| Err(HarnessError::process(pid, "EPERM")));

        let sup = supervisor(mock, capable());
        let err = sup.wait(55, 0, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err.kill_attempt(), Some(KillAttempt::KillFailed(_))));
    }

    #[tokio::test]
    async fn test_reap_children_is_idempotent_without_children() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait().never();
        mock.expect_try_wait_any().times(2).returning(|| Ok(None));

        let sup = supervisor(mock, capable());
        assert!(sup.reap_children().await.is_clean());
        assert!(sup.reap_children().await.is_clean());
    }

    #[tokio::test]
    async fn test_reap_children_collects_tracked_and_untracked() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait().returning(|pid| match pid {
            10 => Ok(Some(ExitOutcome::Exited(0))),
            _ => Ok(None),
        });
        let mut seq = Sequence::new();
        mock.expect_try_wait_any()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some((30, ExitOutcome::Exited(3)))));
        mock.expect_try_wait_any()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(None));

        let sup = supervisor(mock, capable());
        sup.track(10).await;
        sup.track(20).await;

        let report = sup.reap_children().await;
        assert_eq!(report.reaped, vec![10, 30]);
        assert_eq!(report.still_running, vec![20]);
        assert_eq!(sup.state(20).await, Some(ProcessState::Spawned));
        assert_eq!(sup.state(10).await, None);
    }

    #[tokio::test]
    async fn test_reap_children_forgets_child_exiting_before_sweep() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait().returning(|_| Ok(None));
        let mut seq = Sequence::new();
        mock.expect_try_wait_any()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some((20, ExitOutcome::Exited(0)))));
        mock.expect_try_wait_any()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(None));

        let sup = supervisor(mock, capable());
        sup.track(20).await;

        let report = sup.reap_children().await;
        assert_eq!(report.reaped, vec![20]);
        assert!(report.still_running.is_empty());
        assert!(sup.tracked().await.is_empty());
    }

    #[tokio::test]
    async fn test_reap_children_never_fails() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait()
            .returning(|pid| Err(HarnessError::process(pid, "ECHILD")));
        mock.expect_try_wait_any()
            .returning(|| Err(HarnessError::process(-1, "EINTR")));

        let sup = supervisor(mock, capable());
        sup.track(10).await;
        let report = sup.reap_children().await;
        assert!(report.is_clean());
        assert!(sup.tracked().await.is_empty());
    }

    #[tokio::test]
    async fn test_reap_children_without_capability_is_noop() {
        let mut mock = MockProcessControl::new();
        mock.expect_try_wait_any().never();
        let sup = supervisor(mock, PlatformCapabilities::none());
        assert!(sup.reap_children().await.is_clean());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let sup = supervisor(MockProcessControl::new(), capable());
        let err = sup
            .spawn("/nonexistent/definitely-not-a-program", &[] as &[&str])
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::SpawnFailed { .. }));
    }
}
