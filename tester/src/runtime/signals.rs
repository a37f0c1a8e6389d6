//! Signal Disposition Isolation
//!
//! [`SignalGuard`] captures the disposition of every signal the platform can
//! report and reinstalls the captured set when it is released, including on
//! panic unwind. SIGKILL and SIGSTOP cannot be caught and are never captured.
//! Without signal introspection the guard holds an empty snapshot and
//! restoring it does nothing.

use super::platform::PlatformCapabilities;
use std::fmt;
use tracing::{debug, warn};

#[cfg(unix)]
mod os {
    use nix::sys::signal::Signal;

    pub type RawAction = libc::sigaction;
    pub type RawHandler = libc::sighandler_t;

    /// Every signal number up to SIGRTMAX, real-time signals included
    ///
    /// Numbers reserved by the C library fail `query` and drop out there.
    #[cfg(target_os = "linux")]
    pub fn catchable_signals() -> impl Iterator<Item = i32> {
        (1..=libc::SIGRTMAX()).filter(|&signo| signo != libc::SIGKILL && signo != libc::SIGSTOP)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn catchable_signals() -> impl Iterator<Item = i32> {
        Signal::iterator()
            .filter(|sig| !matches!(sig, Signal::SIGKILL | Signal::SIGSTOP))
            .map(|sig| sig as i32)
    }

    pub fn query(signo: i32) -> Option<RawAction> {
        // SAFETY: sigaction is plain old data, all-zero is a valid value
        let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
        // SAFETY: a null new action only reads the installed disposition
        let rc = unsafe { libc::sigaction(signo, std::ptr::null(), &mut current) };
        (rc == 0).then_some(current)
    }

    pub fn install(signo: i32, action: &RawAction) -> std::io::Result<()> {
        // SAFETY: action was produced by `query` for this same signal
        let rc = unsafe { libc::sigaction(signo, action, std::ptr::null_mut()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    pub fn handler(action: &RawAction) -> RawHandler {
        action.sa_sigaction
    }

    pub fn same(a: &RawAction, b: &RawAction) -> bool {
        a.sa_sigaction == b.sa_sigaction && a.sa_flags == b.sa_flags
    }

    pub fn name(signo: i32) -> String {
        if let Ok(sig) = Signal::try_from(signo) {
            return sig.as_str().to_string();
        }
        #[cfg(target_os = "linux")]
        if (libc::SIGRTMIN()..=libc::SIGRTMAX()).contains(&signo) {
            return format!("SIGRTMIN+{}", signo - libc::SIGRTMIN());
        }
        signo.to_string()
    }
}

#[cfg(not(unix))]
mod os {
    pub type RawAction = ();
    pub type RawHandler = usize;

    pub fn catchable_signals() -> impl Iterator<Item = i32> {
        std::iter::empty()
    }

    pub fn query(_signo: i32) -> Option<RawAction> {
        None
    }

    pub fn install(_signo: i32, _action: &RawAction) -> std::io::Result<()> {
        Ok(())
    }

    pub fn handler(_action: &RawAction) -> RawHandler {
        0
    }

    pub fn same(_a: &RawAction, _b: &RawAction) -> bool {
        true
    }

    pub fn name(signo: i32) -> String {
        signo.to_string()
    }
}

pub use os::RawHandler;

/// Signal number to installed disposition, captured at one instant
#[derive(Clone, Default)]
pub struct SignalSnapshot {
    actions: Vec<(i32, os::RawAction)>,
}

impl SignalSnapshot {
    /// Capture every disposition that can be read; unreadable signals are omitted
    pub fn capture() -> Self {
        let actions: Vec<_> = os::catchable_signals()
            .filter_map(|signo| os::query(signo).map(|action| (signo, action)))
            .collect();
        debug!("📡 Captured {} signal dispositions", actions.len());
        Self { actions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn contains(&self, signo: i32) -> bool {
        self.actions.iter().any(|(s, _)| *s == signo)
    }

    /// Handler address (or `SIG_DFL`/`SIG_IGN`) captured for `signo`
    pub fn handler(&self, signo: i32) -> Option<RawHandler> {
        self.actions
            .iter()
            .find(|(s, _)| *s == signo)
            .map(|(_, action)| os::handler(action))
    }

    /// Whether both snapshots record the same handler and flags for every signal
    pub fn same_dispositions(&self, other: &SignalSnapshot) -> bool {
        self.actions.len() == other.actions.len()
            && self
                .actions
                .iter()
                .zip(&other.actions)
                .all(|((sa, a), (sb, b))| sa == sb && os::same(a, b))
    }

    /// Reinstall every captured disposition; returns how many were restored
    ///
    /// Failures are logged and skipped so the remaining signals still get
    /// restored.
    pub fn restore(&self) -> usize {
        let mut restored = 0;
        for (signo, action) in &self.actions {
            match os::install(*signo, action) {
                Ok(()) => restored += 1,
                Err(e) => warn!("⚠️ Could not restore handler for {}: {}", os::name(*signo), e),
            }
        }
        debug!("📡 Restored {}/{} signal dispositions", restored, self.actions.len());
        restored
    }
}

impl fmt::Debug for SignalSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSnapshot")
            .field("signals", &self.actions.iter().map(|(s, _)| os::name(*s)).collect::<Vec<_>>())
            .finish()
    }
}

/// Scoped save/restore of the process signal table
#[derive(Debug)]
pub struct SignalGuard {
    snapshot: Option<SignalSnapshot>,
}

impl SignalGuard {
    pub fn save(caps: &PlatformCapabilities) -> Self {
        let snapshot = if caps.signal_introspection {
            SignalSnapshot::capture()
        } else {
            debug!("📡 Signal introspection unavailable, guard is a no-op");
            SignalSnapshot::empty()
        };
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub fn snapshot(&self) -> Option<&SignalSnapshot> {
        self.snapshot.as_ref()
    }

    /// Release the guard now instead of at drop
    pub fn restore(mut self) -> usize {
        self.snapshot.take().map(|snapshot| snapshot.restore()).unwrap_or(0)
    }

    /// Run `f` with the signal table restored afterwards, whatever `f` does
    pub fn run<T, F: FnOnce() -> T>(caps: &PlatformCapabilities, f: F) -> T {
        let guard = Self::save(caps);
        let result = f();
        guard.restore();
        result
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::{self, SigHandler, Signal};
    use std::sync::Mutex;

    // Signal dispositions are process-wide; tests touching them run one at a time
    static SIGNAL_LOCK: Mutex<()> = Mutex::new(());

    extern "C" fn noop_handler(_: libc::c_int) {}

    fn set(sig: Signal, handler: SigHandler) {
        unsafe {
            signal::signal(sig, handler).unwrap();
        }
    }

    #[test]
    fn test_restore_without_mutation_is_identical() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let before = SignalSnapshot::capture();
        assert!(!before.is_empty());
        assert!(!before.contains(Signal::SIGKILL as i32));
        assert!(!before.contains(Signal::SIGSTOP as i32));

        before.restore();
        let after = SignalSnapshot::capture();
        assert!(before.same_dispositions(&after));
    }

    #[test]
    fn test_guard_reverts_handler_change() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let caps = PlatformCapabilities::detect();
        let before = SignalSnapshot::capture();

        let guard = SignalGuard::save(&caps);
        set(Signal::SIGUSR1, SigHandler::Handler(noop_handler));
        assert_ne!(
            SignalSnapshot::capture().handler(Signal::SIGUSR1 as i32),
            before.handler(Signal::SIGUSR1 as i32)
        );

        assert!(guard.restore() > 0);
        assert!(before.same_dispositions(&SignalSnapshot::capture()));
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let caps = PlatformCapabilities::detect();
        let before = SignalSnapshot::capture();

        let result = std::panic::catch_unwind(|| {
            let _guard = SignalGuard::save(&caps);
            set(Signal::SIGUSR2, SigHandler::SigIgn);
            panic!("test body failed");
        });
        assert!(result.is_err());
        assert!(before.same_dispositions(&SignalSnapshot::capture()));
    }

    #[test]
    fn test_run_returns_closure_result() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let caps = PlatformCapabilities::detect();
        let before = SignalSnapshot::capture();

        let value = SignalGuard::run(&caps, || {
            set(Signal::SIGUSR1, SigHandler::SigIgn);
            42
        });
        assert_eq!(value, 42);
        assert_eq!(
            SignalSnapshot::capture().handler(Signal::SIGUSR1 as i32),
            before.handler(Signal::SIGUSR1 as i32)
        );
    }

    #[test]
    fn test_guard_reverts_pipe_disposition() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let caps = PlatformCapabilities::detect();
        let before = SignalSnapshot::capture();
        assert!(before.contains(Signal::SIGPIPE as i32));

        SignalGuard::run(&caps, || set(Signal::SIGPIPE, SigHandler::SigIgn));
        assert_eq!(
            SignalSnapshot::capture().handler(Signal::SIGPIPE as i32),
            before.handler(Signal::SIGPIPE as i32)
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_guard_reverts_realtime_handler() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let caps = PlatformCapabilities::detect();
        let rt = libc::SIGRTMIN() + 1;
        let before = SignalSnapshot::capture();
        assert!(before.contains(rt));
        assert!(before.contains(libc::SIGRTMAX()));
        assert_eq!(os::name(rt), "SIGRTMIN+1");

        let guard = SignalGuard::save(&caps);
        let handler = noop_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
        unsafe {
            libc::signal(rt, handler);
        }
        assert_eq!(SignalSnapshot::capture().handler(rt), Some(handler));

        guard.restore();
        assert_eq!(SignalSnapshot::capture().handler(rt), before.handler(rt));
        assert!(before.same_dispositions(&SignalSnapshot::capture()));
    }

    #[test]
    fn test_without_introspection_guard_is_empty() {
        let guard = SignalGuard::save(&PlatformCapabilities::none());
        assert_eq!(guard.snapshot().map(SignalSnapshot::len), Some(0));
        assert_eq!(guard.restore(), 0);
    }
}
