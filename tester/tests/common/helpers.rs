//! Test helpers for building harness components against the real host

use super::fixtures::TestFixtures;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tester::runtime::SampleSink;
use tester::*;

/// Serializes tests that spawn or reap children, or touch signal dispositions
///
/// Both are process-wide: a wait-any sweep in one test would steal the
/// children of another running in parallel.
pub fn process_lock() -> &'static tokio::sync::Mutex<()> {
    static LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());
    &LOCK
}

/// Sink that keeps every sample it receives
#[derive(Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<MemorySample>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl SampleSink for RecordingSink {
    fn emit(&self, sample: &MemorySample) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(sample.clone());
        }
    }
}

pub struct TestHelpers;

impl TestHelpers {
    pub fn id(raw: &str) -> TestId {
        TestId::new(raw).unwrap()
    }

    pub fn resource(name: &str) -> ResourceName {
        ResourceName::new(name).unwrap()
    }

    /// Supervisor backed by the real OS
    pub fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(PlatformCapabilities::detect(), TestFixtures::KILL_GRACE)
    }

    /// Config granting exactly the given resources
    pub fn orchestrated(spec: &str) -> HarnessConfig {
        HarnessConfig::builder()
            .use_resources(ResourceSet::parse(spec).unwrap())
            .build()
    }

    pub fn runner(config: HarnessConfig) -> TestRunner {
        TestRunner::new(config).unwrap()
    }

    pub fn case<F, Fut>(id: &str, body: F) -> TestCase
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        TestCase::new(Self::id(id), body)
    }

    /// Reap repeatedly until `pid` shows up or the attempts run out
    pub async fn reap_until(supervisor: &ProcessSupervisor, pid: i32) -> bool {
        for _ in 0..100 {
            if supervisor.reap_children().await.reaped.contains(&pid) {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        false
    }

    pub fn shared_sink() -> Arc<RecordingSink> {
        Arc::new(RecordingSink::default())
    }
}
