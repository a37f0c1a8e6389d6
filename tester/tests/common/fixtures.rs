//! Test fixtures and constants

use std::time::Duration;

pub struct TestFixtures;

impl TestFixtures {
    /// Generous wait for processes that exit straight away
    pub const QUICK_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Deadline given to a deliberately hanging process
    pub const RUNAWAY_TIMEOUT: Duration = Duration::from_secs(1);

    pub const KILL_GRACE: Duration = Duration::from_secs(1);

    pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(10);

    /// Time allowed for stray watchdog samples to show up after stop
    pub const WATCHDOG_GRACE: Duration = Duration::from_millis(100);

    pub const SHELL: &'static str = "/bin/sh";

    /// Identifiers with different depths and component shapes
    pub const SAMPLE_IDS: [&'static str; 6] = [
        "test_a",
        "pkg.test_b",
        "pkg.module.Case.test_c",
        "net.http.Client.test_get_1",
        "x",
        "deeply.nested.package.with.many.parts.test_z",
    ];
}
