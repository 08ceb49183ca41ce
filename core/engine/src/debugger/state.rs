//! Debugger state and the controller-facing handle.
//!
//! There is exactly one thread of script execution, and "pausing" it means
//! the native hook spins on that very thread. Everything a controller may
//! touch while the VM is parked therefore lives behind atomics: the pause
//! flag, the pending action, and the depth counters are plain
//! atomically-visible cells, and the breakpoint store sits behind a mutex
//! that is only ever held for the duration of a single lookup or edit,
//! never across the pause loop.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::breakpoint::{BreakpointStore, DebugBreakpoint};

/// What the debugger should do when the next line event arrives.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum DebugAction {
    /// No pending request; run normally (breakpoints still apply).
    #[default]
    None = 0,
    /// Stop at the next line reached, entering calls.
    StepIn,
    /// Stop at the next line reached at or above the current frame.
    StepOver,
    /// Stop once the current frame has returned.
    StepOut,
    /// Run until a breakpoint (or an explicit pause request).
    Continue,
    /// Stop at the next line event, wherever it is.
    Pause,
}

impl DebugAction {
    /// Whether this action is one of the stepping kinds.
    pub fn is_step(self) -> bool {
        matches!(self, Self::StepIn | Self::StepOver | Self::StepOut)
    }
}

/// State shared between the hook closure and controller handles.
#[derive(Debug)]
pub(crate) struct DebugShared {
    enabled: AtomicBool,
    paused: AtomicBool,
    /// Set while the pause loop is on the stack; the hook refuses to nest.
    in_pause: AtomicBool,
    action: AtomicU8,
    armed: AtomicBool,
    step_depth: AtomicU32,
    current_depth: AtomicU32,
    breakpoints: Mutex<BreakpointStore>,
}

impl DebugShared {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            in_pause: AtomicBool::new(false),
            action: AtomicU8::new(DebugAction::None.into()),
            armed: AtomicBool::new(false),
            step_depth: AtomicU32::new(0),
            current_depth: AtomicU32::new(0),
            breakpoints: Mutex::new(BreakpointStore::new()),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub(crate) fn in_pause(&self) -> bool {
        self.in_pause.load(Ordering::SeqCst)
    }

    pub(crate) fn set_in_pause(&self, value: bool) {
        self.in_pause.store(value, Ordering::SeqCst);
    }

    pub(crate) fn action(&self) -> DebugAction {
        DebugAction::try_from(self.action.load(Ordering::SeqCst))
            .unwrap_or(DebugAction::None)
    }

    pub(crate) fn set_action_raw(&self, action: DebugAction) {
        self.action.store(action.into(), Ordering::SeqCst);
    }

    /// Clears any pending step request, including its arming flag.
    pub(crate) fn clear_step(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.set_action_raw(DebugAction::None);
    }

    /// Consumes the one-shot arming flag.
    pub(crate) fn take_armed(&self) -> bool {
        self.armed.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn step_depth(&self) -> u32 {
        self.step_depth.load(Ordering::SeqCst)
    }

    pub(crate) fn current_depth(&self) -> u32 {
        self.current_depth.load(Ordering::SeqCst)
    }

    pub(crate) fn depth_increment(&self) {
        self.current_depth.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrements the call depth, clamping at zero. A clamp means the VM
    /// delivered an unbalanced return event; worth a warning, not a crash.
    pub(crate) fn depth_decrement(&self) {
        let previous = self.current_depth.load(Ordering::SeqCst);
        if previous == 0 {
            log::warn!("debug hook saw a return event at depth 0; event stream is unbalanced");
            return;
        }
        self.current_depth.store(previous - 1, Ordering::SeqCst);
    }

    pub(crate) fn has_breakpoint(&self, file: &str, line: u32) -> bool {
        self.breakpoints.lock().unwrap().has_breakpoint(file, line)
    }
}

/// Controller-facing debugger handle.
///
/// The handle is a cheap clone over shared state, so a controller can hold
/// one copy while another lives inside the stop/pump callbacks, and a resume
/// issued from a background thread is observed by the spinning hook without
/// any lock. All methods are safe to call from the pump callback while the
/// VM thread is parked in the pause loop.
#[derive(Debug, Clone, Default)]
pub struct ScriptDebugger {
    shared: Arc<DebugShared>,
}

impl Default for DebugShared {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptDebugger {
    /// Creates a detached debugger with no breakpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables interactive debugging.
    ///
    /// The engine consults this before each top-level VM entry, so toggling
    /// between frames attaches or detaches the hook without restarting
    /// anything. While enabled, the watchdog is not consulted.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether interactive debugging is enabled.
    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// Whether the VM thread is currently parked in the pause loop.
    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// The currently pending action.
    pub fn action(&self) -> DebugAction {
        self.shared.action()
    }

    /// Requests an action from the hook.
    ///
    /// Stepping kinds snapshot the current call depth, arm the step anchor
    /// and release the pause loop, so issuing a step at a stop immediately
    /// resumes execution until the step lands. `Continue` only replaces the
    /// pending action; use [`ScriptDebugger::resume`] to also release a
    /// paused target.
    pub fn set_action(&self, action: DebugAction) {
        if action.is_step() {
            self.shared
                .step_depth
                .store(self.shared.current_depth(), Ordering::SeqCst);
            self.shared.armed.store(true, Ordering::SeqCst);
            self.shared.set_action_raw(action);
            self.shared.set_paused(false);
        } else {
            self.shared.armed.store(false, Ordering::SeqCst);
            self.shared.set_action_raw(action);
        }
    }

    /// Resumes a paused target: pending action becomes `Continue` and the
    /// pause loop is released.
    pub fn resume(&self) {
        self.set_action(DebugAction::Continue);
        self.shared.set_paused(false);
    }

    /// Adds a breakpoint. Idempotent.
    pub fn add_breakpoint(&self, file: &str, line: u32) {
        self.shared.breakpoints.lock().unwrap().add(file, line);
    }

    /// Removes a breakpoint. A no-op if absent.
    pub fn remove_breakpoint(&self, file: &str, line: u32) {
        self.shared.breakpoints.lock().unwrap().remove(file, line);
    }

    /// Enables or disables a breakpoint in place. Returns whether it exists.
    pub fn set_breakpoint_enabled(&self, file: &str, line: u32, enabled: bool) -> bool {
        self.shared
            .breakpoints
            .lock()
            .unwrap()
            .set_enabled(file, line, enabled)
    }

    /// Removes every breakpoint.
    pub fn clear_breakpoints(&self) {
        self.shared.breakpoints.lock().unwrap().clear();
    }

    /// Snapshot of all breakpoints, for enumeration by a controller.
    pub fn breakpoints(&self) -> Vec<DebugBreakpoint> {
        self.shared.breakpoints.lock().unwrap().all().to_vec()
    }

    pub(crate) fn shared(&self) -> Arc<DebugShared> {
        Arc::clone(&self.shared)
    }
}
