//! Runaway-script watchdog.
//!
//! The watchdog gives each top-level script invocation a wall-clock budget.
//! It has no thread of its own: the engine restarts the timer whenever it
//! enters the VM, and the native hook compares elapsed time against the
//! budget while the script runs. The check is skipped entirely while
//! interactive debugging is enabled; a session parked at a breakpoint can
//! legitimately sit for minutes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default budget applied by hosts that do not configure their own.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(5);

/// Elapsed-time budget for a single script invocation.
///
/// All state is shared-mutable so the VM hook can consult the timer while a
/// host thread reconfigures it between frames.
#[derive(Debug)]
pub struct WatchdogTimer {
    enabled: AtomicBool,
    budget_ms: AtomicU64,
    tripped: AtomicBool,
    started: Mutex<Instant>,
}

impl Default for WatchdogTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchdogTimer {
    /// Creates a disabled timer with the default budget.
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            budget_ms: AtomicU64::new(DEFAULT_BUDGET.as_millis() as u64),
            tripped: AtomicBool::new(false),
            started: Mutex::new(Instant::now()),
        }
    }

    /// Enables or disables the watchdog and sets its budget.
    pub fn configure(&self, enabled: bool, budget: Duration) {
        self.budget_ms
            .store(budget.as_millis() as u64, Ordering::SeqCst);
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether the watchdog is armed.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// The configured budget.
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms.load(Ordering::SeqCst))
    }

    /// Restarts the budget clock. Called on every top-level VM entry.
    pub fn restart(&self) {
        *self.started.lock().unwrap() = Instant::now();
        self.tripped.store(false, Ordering::SeqCst);
    }

    /// Whether the current invocation has exceeded its budget.
    pub fn expired(&self) -> bool {
        self.is_enabled() && self.started.lock().unwrap().elapsed() >= self.budget()
    }

    /// Records that the hook aborted the VM because of this timer.
    pub(crate) fn mark_tripped(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    /// Consumes the tripped marker, so the engine can classify the error
    /// that came back out of the VM.
    pub(crate) fn take_tripped(&self) -> bool {
        self.tripped.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_timer_never_expires() {
        let timer = WatchdogTimer::new();
        timer.configure(false, Duration::from_millis(0));
        timer.restart();
        assert!(!timer.expired());
    }

    #[test]
    fn expires_after_budget() {
        let timer = WatchdogTimer::new();
        timer.configure(true, Duration::from_millis(5));
        timer.restart();
        assert!(!timer.expired());
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.expired());
        // Restarting gives the next invocation a fresh budget.
        timer.restart();
        assert!(!timer.expired());
    }

    #[test]
    fn tripped_marker_is_consumed_once() {
        let timer = WatchdogTimer::new();
        timer.mark_tripped();
        assert!(timer.take_tripped());
        assert!(!timer.take_tripped());
    }
}
