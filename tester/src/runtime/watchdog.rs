//! Memory Watchdog
//!
//! Background task that samples this process's resident memory at a fixed
//! interval and reports each reading. Purely observational: a failed reading
//! is skipped and nothing is ever raised into the foreground.

use super::platform::PlatformCapabilities;
use crate::error::{HarnessError, HarnessResult};
use shared::MemorySample;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Source of resident-memory readings, in bytes
#[mockall::automock]
pub trait MemoryProbe: Send {
    fn sample(&mut self) -> Option<u64>;
}

/// Destination for watchdog readings
pub trait SampleSink: Send + Sync {
    fn emit(&self, sample: &MemorySample);
}

/// Reads the resident set size of the current process through sysinfo
pub struct SysinfoProbe {
    system: System,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| debug!("Current pid unavailable for memory sampling: {}", e))
            .ok();
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn sample(&mut self) -> Option<u64> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system.process(pid).map(|process| process.memory())
    }
}

/// Writes each reading as an info line on the `tester::watchdog` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SampleSink for TracingSink {
    fn emit(&self, sample: &MemorySample) {
        info!(target: "tester::watchdog", "📈 {}", sample);
    }
}

pub struct MemoryWatchdog {
    probe: Option<Box<dyn MemoryProbe>>,
    sink: Arc<dyn SampleSink>,
    capabilities: PlatformCapabilities,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<Box<dyn MemoryProbe>>>,
}

impl MemoryWatchdog {
    pub fn new(capabilities: PlatformCapabilities) -> Self {
        Self::with_parts(Box::new(SysinfoProbe::new()), Arc::new(TracingSink), capabilities)
    }

    pub fn with_parts(
        probe: Box<dyn MemoryProbe>,
        sink: Arc<dyn SampleSink>,
        capabilities: PlatformCapabilities,
    ) -> Self {
        Self {
            probe: Some(probe),
            sink,
            capabilities,
            stop: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Begin sampling every `interval` on the current tokio runtime
    ///
    /// Starting a running watchdog, or one on a platform without memory
    /// sampling, does nothing.
    pub fn start(&mut self, interval: Duration) -> HarnessResult<()> {
        if interval.is_zero() {
            return Err(HarnessError::config("watchdog_interval", "must be greater than zero"));
        }
        if self.task.is_some() {
            debug!("Memory watchdog already running");
            return Ok(());
        }
        if !self.capabilities.memory_sampling {
            debug!("📉 Memory sampling unsupported, watchdog not started");
            return Ok(());
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| HarnessError::config("watchdog", "must be started inside a tokio runtime"))?;
        let Some(probe) = self.probe.take() else {
            warn!("⚠️ Memory probe was lost, watchdog not started");
            return Ok(());
        };

        self.stop = Arc::new(AtomicBool::new(false));
        self.wake = Arc::new(Notify::new());

        info!("📈 Memory watchdog started (every {:?})", interval);
        self.task = Some(handle.spawn(sample_loop(
            probe,
            self.sink.clone(),
            interval,
            self.stop.clone(),
            self.wake.clone(),
        )));
        Ok(())
    }

    /// Stop sampling and wait for the task to finish
    ///
    /// No sample is emitted after this returns. Safe to call at any time.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();

        match task.await {
            Ok(probe) => {
                self.probe = Some(probe);
                info!("📉 Memory watchdog stopped");
            }
            Err(e) => warn!("⚠️ Memory watchdog task ended abnormally: {}", e),
        }
    }
}

impl Drop for MemoryWatchdog {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.stop.store(true, Ordering::Release);
            self.wake.notify_one();
        }
    }
}

async fn sample_loop(
    mut probe: Box<dyn MemoryProbe>,
    sink: Arc<dyn SampleSink>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
) -> Box<dyn MemoryProbe> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }
        if stop.load(Ordering::Acquire) {
            break;
        }

        match probe.sample() {
            Some(bytes) => sink.emit(&MemorySample::now(bytes)),
            None => debug!("Memory probe returned no reading"),
        }
    }

    probe
}
