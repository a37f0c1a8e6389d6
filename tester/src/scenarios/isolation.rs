//! Isolation Checks
//!
//! Signal table restoration, watchdog shutdown latency and resource-gated
//! access to the host.

use crate::error::{HarnessError, HarnessResult};
use crate::gating::display_available;
use crate::harness_ensure;
use crate::runner::{TestCase, TestContext};
use crate::runtime::{MemoryWatchdog, SampleSink, SignalGuard, SignalSnapshot, SysinfoProbe};
use shared::{MemorySample, ResourceName, TestId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn cases() -> HarnessResult<Vec<TestCase>> {
    Ok(vec![
        TestCase::new(TestId::new("harness.isolation.test_signal_guard_restores")?, signal_guard_restores)
            .unix_only(),
        TestCase::new(TestId::new("harness.isolation.test_watchdog_stops_promptly")?, watchdog_stops_promptly)
            .requires(ResourceName::new("cpu")?),
        TestCase::new(TestId::new("harness.isolation.test_loopback_echo")?, loopback_echo)
            .requires(ResourceName::new("network")?),
        TestCase::new(TestId::new("harness.isolation.test_display_reachable")?, display_reachable)
            .requires(ResourceName::new("gui")?),
    ])
}

#[cfg(unix)]
fn replace_sigusr1() -> HarnessResult<()> {
    use nix::sys::signal::{signal, SigHandler, Signal};

    // SAFETY: SIG_IGN installs no Rust code as a handler
    unsafe { signal(Signal::SIGUSR1, SigHandler::SigIgn) }
        .map(|_| ())
        .map_err(|e| HarnessError::Signal {
            signal: Signal::SIGUSR1 as i32,
            message: e.to_string(),
        })
}

#[cfg(not(unix))]
fn replace_sigusr1() -> HarnessResult<()> {
    Ok(())
}

async fn signal_guard_restores(ctx: TestContext) -> HarnessResult<()> {
    let before = SignalSnapshot::capture();

    let changed = SignalGuard::run(&ctx.capabilities, || -> HarnessResult<bool> {
        replace_sigusr1()?;
        Ok(!before.same_dispositions(&SignalSnapshot::capture()))
    })?;

    harness_ensure!(changed, "replacing SIGUSR1 was not visible inside the guard");
    harness_ensure!(
        before.same_dispositions(&SignalSnapshot::capture()),
        "signal table differs after the guard was released"
    );
    Ok(())
}

#[derive(Default)]
struct CountingSink {
    samples: AtomicUsize,
}

impl SampleSink for CountingSink {
    fn emit(&self, sample: &MemorySample) {
        self.samples.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("📈 {}", sample);
    }
}

async fn watchdog_stops_promptly(ctx: TestContext) -> HarnessResult<()> {
    let sink = Arc::new(CountingSink::default());
    let mut watchdog = MemoryWatchdog::with_parts(Box::new(SysinfoProbe::new()), sink.clone(), ctx.capabilities);

    watchdog.start(Duration::from_millis(10))?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    watchdog.stop().await;

    let emitted = sink.samples.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = sink.samples.load(Ordering::SeqCst);
    harness_ensure!(later == emitted, "{} samples emitted after stop", later - emitted);
    Ok(())
}

async fn loopback_echo(_ctx: TestContext) -> HarnessResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await?;
        let mut buf = [0u8; 4];
        socket.read_exact(&mut buf).await?;
        socket.write_all(&buf).await?;
        Ok::<_, std::io::Error>(())
    });

    let mut client = TcpStream::connect(addr).await?;
    client.write_all(b"ping").await?;
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).await?;

    server
        .await
        .map_err(|e| HarnessError::assertion(format!("echo server task failed: {e}")))??;
    harness_ensure!(&reply == b"ping", "echo returned {:?}", reply);
    Ok(())
}

async fn display_reachable(_ctx: TestContext) -> HarnessResult<()> {
    harness_ensure!(display_available(), "gui enabled but no display is advertised");
    Ok(())
}
