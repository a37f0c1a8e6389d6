//! Runtime Supervision
//!
//! This module isolates tests from each other at the process level: child
//! supervision, signal table isolation, memory sampling and the platform
//! capability query that all three consult.

pub mod platform;
pub mod signals;
pub mod supervisor;
pub mod watchdog;

// Re-export main types
pub use platform::PlatformCapabilities;
pub use signals::{SignalGuard, SignalSnapshot};
pub use supervisor::{
    ChildProcessHandle, MockProcessControl, ProcessControl, ProcessState, ProcessSupervisor, ReapReport,
    SystemProcessControl,
};
pub use watchdog::{MemoryProbe, MemoryWatchdog, MockMemoryProbe, SampleSink, SysinfoProbe, TracingSink};
