//! Suite Runner
//!
//! Runs test cases one after another. Each case is gated first; only a case
//! that passes every gate has its body executed, optionally under a signal
//! guard. Children left behind are reaped after every case and once more at
//! teardown, and the memory watchdog runs for the length of the suite.

use super::case::{TestCase, TestContext, TestOutcome, TestRecord};
use crate::config::{HarnessConfig, ResourcePolicy};
use crate::error::HarnessResult;
use crate::gating::{Gate, GateChain, GateResult, PatternMatcher, PlatformGate, ResourceGate};
use crate::runtime::{
    MemoryProbe, MemoryWatchdog, PlatformCapabilities, ProcessControl, ProcessSupervisor, ReapReport, SampleSink,
    SignalGuard, SysinfoProbe, SystemProcessControl, TracingSink,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub records: Vec<TestRecord>,
    /// Children collected by the final reap pass
    pub teardown: ReapReport,
    /// Set when fail-fast ended the run before every case was attempted
    pub stopped_early: bool,
}

impl SuiteReport {
    fn count(&self, pred: impl Fn(&TestOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, TestOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(TestOutcome::is_failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TestOutcome::Skipped(_)))
    }

    pub fn deselected(&self) -> usize {
        self.count(|o| matches!(o, TestOutcome::Deselected(_)))
    }

    pub fn environment_altered(&self) -> usize {
        self.records.iter().filter(|r| r.environment_altered).count()
    }

    /// Skips and deselections never make a suite fail
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} passed, {} failed, {} skipped, {} deselected in {:.2}s",
            self.passed(),
            self.failed(),
            self.skipped(),
            self.deselected(),
            self.duration_ms as f64 / 1000.0
        );
        let altered = self.environment_altered();
        if altered > 0 {
            summary.push_str(&format!(" ({altered} altered the environment)"));
        }
        if self.stopped_early {
            summary.push_str(" [stopped early]");
        }
        summary
    }
}

pub struct TestRunner {
    config: HarnessConfig,
    capabilities: PlatformCapabilities,
    patterns: PatternMatcher,
    resources: Arc<ResourceGate>,
    supervisor: Arc<ProcessSupervisor>,
    watchdog: MemoryWatchdog,
    extra_gates: Vec<Box<dyn Gate>>,
}

impl TestRunner {
    /// Runner backed by the real OS, with capabilities detected now
    pub fn new(config: HarnessConfig) -> HarnessResult<Self> {
        Self::with_parts(
            config,
            PlatformCapabilities::detect(),
            Box::new(SystemProcessControl),
            Box::new(SysinfoProbe::new()),
            Arc::new(TracingSink),
        )
    }

    pub fn with_parts(
        config: HarnessConfig,
        capabilities: PlatformCapabilities,
        control: Box<dyn ProcessControl>,
        probe: Box<dyn MemoryProbe>,
        sink: Arc<dyn SampleSink>,
    ) -> HarnessResult<Self> {
        config.validate()?;

        let patterns = PatternMatcher::new(&config.accept_patterns, &config.ignore_patterns)?;
        let resources = Arc::new(ResourceGate::new(config.resources.clone()));
        let supervisor = Arc::new(ProcessSupervisor::with_control(control, capabilities, config.kill_grace));
        let watchdog = MemoryWatchdog::with_parts(probe, sink, capabilities);

        Ok(Self {
            config,
            capabilities,
            patterns,
            resources,
            supervisor,
            watchdog,
            extra_gates: Vec::new(),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.capabilities
    }

    pub fn supervisor(&self) -> Arc<ProcessSupervisor> {
        self.supervisor.clone()
    }

    /// Replace the name patterns; a malformed pattern leaves the old ones active
    pub fn configure_patterns<A: AsRef<str>, I: AsRef<str>>(&mut self, accept: &[A], ignore: &[I]) -> HarnessResult<()> {
        self.patterns.configure(accept, ignore)
    }

    pub fn configure_resources(&mut self, policy: ResourcePolicy) {
        Arc::make_mut(&mut self.resources).configure(policy);
    }

    /// Swap in a preconfigured resource gate, e.g. with a custom display probe
    pub fn set_resource_gate(&mut self, gate: ResourceGate) {
        self.resources = Arc::new(gate);
    }

    /// Append a gate evaluated after the pattern, platform and resource gates
    pub fn add_gate(&mut self, gate: Box<dyn Gate>) {
        self.extra_gates.push(gate);
    }

    pub fn context(&self) -> TestContext {
        TestContext {
            supervisor: self.supervisor.clone(),
            resources: self.resources.clone(),
            capabilities: self.capabilities,
            short_timeout: self.config.short_timeout,
            long_timeout: self.config.long_timeout,
        }
    }

    /// Cases the name patterns select, in order
    pub fn select<'c>(&self, cases: &'c [TestCase]) -> Vec<&'c TestCase> {
        cases.iter().filter(|c| self.patterns.matches(c.id().as_str())).collect()
    }

    fn evaluate_gates(&self, case: &TestCase) -> GateResult {
        let platform = PlatformGate;
        let mut chain = GateChain::new()
            .with(&self.patterns)
            .with(&platform)
            .with(self.resources.as_ref());
        for gate in &self.extra_gates {
            chain.push(gate.as_ref());
        }
        chain.evaluate(&case.metadata())
    }

    /// Run every case and report; never fails, problems become outcomes
    pub async fn run(&mut self, cases: &[TestCase]) -> SuiteReport {
        let started_at = Utc::now();
        let started = Instant::now();
        info!("🧪 Running {} tests ({})", cases.len(), self.resources.policy());

        if let Some(interval) = self.config.watchdog_interval {
            if let Err(e) = self.watchdog.start(interval) {
                warn!("⚠️ Memory watchdog not started: {}", e);
            }
        }

        let mut records = Vec::with_capacity(cases.len());
        let mut stopped_early = false;
        for case in cases {
            let record = self.run_case(case).await;
            let failed = record.outcome.is_failure();
            records.push(record);

            if failed && self.config.fail_fast {
                warn!("🛑 Stopping after first failure (fail-fast)");
                stopped_early = true;
                break;
            }
        }

        self.watchdog.stop().await;
        let teardown = self.supervisor.reap_children().await;

        let report = SuiteReport {
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            records,
            teardown,
            stopped_early,
        };
        if report.is_success() {
            info!("✅ {}", report.summary());
        } else {
            error!("❌ {}", report.summary());
        }
        report
    }

    async fn run_case(&self, case: &TestCase) -> TestRecord {
        let started = Instant::now();
        let id = case.id().clone();

        let gated = match self.evaluate_gates(case) {
            GateResult::Pass => None,
            GateResult::Skip(reason) => Some(TestOutcome::Skipped(reason)),
            GateResult::Deselect(reason) => Some(TestOutcome::Deselected(reason)),
            GateResult::Error(e) => Some(TestOutcome::Failed(e.to_string())),
        };
        if let Some(outcome) = gated {
            debug!("{} ... {}", id, outcome);
            return TestRecord::new(id, outcome, started.elapsed(), false);
        }

        debug!("▶️ {}", id);
        let running_before: Vec<i32> = self.supervisor.tracked().await.iter().map(|h| h.pid).collect();
        let guard = self
            .config
            .isolate_signals
            .then(|| SignalGuard::save(&self.capabilities));

        let result = tokio::spawn(case.invoke(self.context())).await;

        if let Some(guard) = guard {
            guard.restore();
        }

        let outcome = match result {
            Ok(Ok(())) => TestOutcome::Passed,
            Ok(Err(e)) if e.is_skip() => TestOutcome::Skipped(e.to_string()),
            Ok(Err(e)) => TestOutcome::Failed(e.to_string()),
            Err(e) if e.is_panic() => TestOutcome::Failed(format!("test panicked: {}", panic_message(e.into_panic()))),
            Err(e) => TestOutcome::Failed(format!("test task cancelled: {e}")),
        };

        let reaped = self.supervisor.reap_children().await;
        let left_running = reaped
            .still_running
            .iter()
            .filter(|pid| !running_before.contains(*pid))
            .count();
        let environment_altered = !reaped.reaped.is_empty() || left_running > 0;
        if environment_altered {
            warn!(
                "⚠️ {} altered the environment: {} child process(es) reaped, {} left running",
                id,
                reaped.reaped.len(),
                left_running
            );
        }

        match &outcome {
            TestOutcome::Failed(_) => error!("❌ {} ... {}", id, outcome),
            _ => info!("{} ... {}", id, outcome),
        }
        TestRecord::new(id, outcome, started.elapsed(), environment_altered)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceSet;
    use crate::error::HarnessError;
    use crate::gating::PredicateGate;
    use crate::runtime::{MockMemoryProbe, MockProcessControl};
    use shared::{ResourceName, TestId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quiet_control() -> Box<dyn ProcessControl> {
        let mut control = MockProcessControl::new();
        control.expect_try_wait().returning(|_| Ok(None));
        control.expect_try_wait_any().returning(|| Ok(None));
        Box::new(control)
    }

    fn runner(config: HarnessConfig) -> TestRunner {
        let caps = PlatformCapabilities {
            child_reaping: true,
            ..PlatformCapabilities::none()
        };
        TestRunner::with_parts(
            config,
            caps,
            quiet_control(),
            Box::new(MockMemoryProbe::new()),
            Arc::new(TracingSink),
        )
        .unwrap()
    }

    fn case<F, Fut>(id: &str, body: F) -> TestCase
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HarnessResult<()>> + Send + 'static,
    {
        TestCase::new(TestId::new(id).unwrap(), body)
    }

    fn network() -> ResourceName {
        ResourceName::new("network").unwrap()
    }

    #[tokio::test]
    async fn test_outcomes_are_classified() {
        let config = HarnessConfig::builder()
            .use_resources(ResourceSet::parse("cpu").unwrap())
            .build();
        let mut runner = runner(config);

        let cases = vec![
            case("suite.test_pass", |_| async { Ok(()) }),
            case("suite.test_fail", |_| async { Err(HarnessError::assertion("wrong answer")) }),
            case("suite.test_net", |_| async { Ok(()) }).requires(network()),
            case("suite.test_runtime_skip", |ctx| async move { ctx.require("network", "needs sockets") }),
        ];

        let report = runner.run(&cases).await;
        let outcomes: Vec<_> = report.records.iter().map(|r| r.outcome.label()).collect();
        assert_eq!(outcomes, vec!["ok", "FAILED", "skipped", "skipped"]);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_gated_case_body_never_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut runner = runner(HarnessConfig::builder().use_resources(ResourceSet::new()).build());

        let cases = vec![case("suite.test_net", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .requires(network())];

        let report = runner.run(&cases).await;
        assert_eq!(report.skipped(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_patterns_deselect() {
        let config = HarnessConfig::builder()
            .accept("test_foo*")
            .ignore("test_foo_slow")
            .build();
        let mut runner = runner(config);

        let cases = vec![
            case("pkg.test_foo_bar", |_| async { Ok(()) }),
            case("pkg.test_foo_slow", |_| async { Ok(()) }),
            case("pkg.test_baz", |_| async { Ok(()) }),
        ];
        assert_eq!(runner.select(&cases).len(), 1);

        let report = runner.run(&cases).await;
        assert_eq!(report.passed(), 1);
        assert_eq!(report.deselected(), 2);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_panicking_body_is_a_failure() {
        let mut runner = runner(HarnessConfig::default());
        let cases = vec![
            case("suite.test_panics", |_| async { panic!("kaboom") }),
            case("suite.test_after", |_| async { Ok(()) }),
        ];

        let report = runner.run(&cases).await;
        match &report.records[0].outcome {
            TestOutcome::Failed(reason) => assert!(reason.contains("kaboom")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(report.records[1].outcome, TestOutcome::Passed);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_the_suite() {
        let mut runner = runner(HarnessConfig::builder().fail_fast(true).build());
        let cases = vec![
            case("suite.test_a", |_| async { Err(HarnessError::assertion("first")) }),
            case("suite.test_b", |_| async { Ok(()) }),
        ];

        let report = runner.run(&cases).await;
        assert_eq!(report.records.len(), 1);
        assert!(report.stopped_early);
        assert!(report.summary().contains("[stopped early]"));
    }

    #[tokio::test]
    async fn test_extra_gates_run_after_builtin_ones() {
        let mut runner = runner(HarnessConfig::default());
        runner.add_gate(Box::new(PredicateGate::new("no-slow", |meta| {
            if meta.id.leaf().ends_with("_slow") {
                GateResult::Skip("slow tests disabled".to_string())
            } else {
                GateResult::Pass
            }
        })));

        let cases = vec![case("suite.test_slow", |_| async { Ok(()) })];
        let report = runner.run(&cases).await;
        assert_eq!(
            report.records[0].outcome,
            TestOutcome::Skipped("slow tests disabled".to_string())
        );
    }

    #[tokio::test]
    async fn test_leaked_children_mark_environment_altered() {
        let mut control = MockProcessControl::new();
        let sweeps = Arc::new(AtomicUsize::new(0));
        let seen = sweeps.clone();
        control.expect_try_wait().returning(|_| Ok(None));
        // The first sweep (after the test) finds a leaked child
        control.expect_try_wait_any().returning(move || {
            match seen.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(Some((4242, shared::ExitOutcome::Exited(0)))),
                _ => Ok(None),
            }
        });

        let caps = PlatformCapabilities {
            child_reaping: true,
            ..PlatformCapabilities::none()
        };
        let mut runner = TestRunner::with_parts(
            HarnessConfig::default(),
            caps,
            Box::new(control),
            Box::new(MockMemoryProbe::new()),
            Arc::new(TracingSink),
        )
        .unwrap();

        let report = runner.run(&[case("suite.test_leaky", |_| async { Ok(()) })]).await;
        assert!(report.records[0].environment_altered);
        assert_eq!(report.environment_altered(), 1);
        assert!(report.teardown.is_clean());
    }

    #[tokio::test]
    async fn test_child_left_running_marks_environment_altered() {
        let mut control = MockProcessControl::new();
        control.expect_try_wait().returning(|_| Ok(None));
        control.expect_try_wait_any().returning(|| Ok(None));

        let caps = PlatformCapabilities {
            child_reaping: true,
            ..PlatformCapabilities::none()
        };
        let mut runner = TestRunner::with_parts(
            HarnessConfig::default(),
            caps,
            Box::new(control),
            Box::new(MockMemoryProbe::new()),
            Arc::new(TracingSink),
        )
        .unwrap();

        let cases = vec![
            case("suite.test_starts_daemon", |ctx| async move {
                ctx.supervisor.track(5151).await;
                Ok(())
            }),
            case("suite.test_after_daemon", |_| async { Ok(()) }),
        ];
        let report = runner.run(&cases).await;

        assert!(report.records[0].environment_altered);
        // Only the test that started the child is blamed for it
        assert!(!report.records[1].environment_altered);
        assert_eq!(report.teardown.still_running, vec![5151]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_up_front() {
        let config = HarnessConfig::builder().accept("bad[").build();
        let result = TestRunner::with_parts(
            config,
            PlatformCapabilities::none(),
            quiet_control(),
            Box::new(MockMemoryProbe::new()),
            Arc::new(TracingSink),
        );
        assert!(result.is_err());
    }
}
