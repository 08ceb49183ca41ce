//! Hook dispatch and the pause protocol.
//!
//! The VM invokes a single native hook for call, return and line events
//! (plus instruction-count ticks when the watchdog is armed). Everything
//! interactive debugging can do (breakpoints, pause, stepping) is
//! synthesized inside that hook: there is no OS primitive underneath that
//! could suspend the interpreter thread, so "paused" means the hook blocks
//! in a polling loop on the interpreter's own thread, keeping the host
//! alive by invoking a controller-supplied pump callback until a controller
//! action releases the flag.
//!
//! # Stepping
//!
//! A step request snapshots the call depth it was issued at and arms a
//! one-shot anchor. The next line event the stepping logic sees records its
//! location as the anchor instead of stopping; subsequent line events stop
//! once the location has moved (and, for step-over/step-out, once the depth
//! condition holds). Because the dispatch falls through to the arming check
//! after a pause loop exits, a step issued at a stop anchors at the very
//! line the controller was looking at, which is what makes step-in land on
//! the first line inside a callee rather than the second, and what keeps a
//! step from firing on the line it was issued on.

use std::cell::RefCell;
use std::fmt;
use std::time::Duration;

use mlua::VmState;

use super::state::{DebugAction, DebugShared};
use crate::watchdog::WatchdogTimer;

/// How long the pause loop sleeps per iteration when no pump is supplied.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An enabled breakpoint matched the current line.
    Breakpoint,
    /// A step request landed.
    Step,
    /// An explicit pause request was served.
    Pause,
}

impl StopReason {
    /// Stable lowercase name, suitable for protocol adapters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakpoint => "breakpoint",
            Self::Step => "step",
            Self::Pause => "pause",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callbacks a controller supplies to observe and keep the host alive.
///
/// All three are invoked on the interpreter thread, from inside the hook.
pub struct DebugCallbacks {
    /// Invoked once per stop, before the pause loop starts spinning. The
    /// interpreter call stack is intact at this point, so this is the place
    /// to capture whatever state a UI wants to show.
    pub on_stop: Box<dyn FnMut(u32, &str, StopReason)>,
    /// Invoked repeatedly while paused; expected to process the host's
    /// event queue (which is how resume/step requests reach the debugger).
    /// Must not block indefinitely. When absent, the pause loop sleeps
    /// briefly between polls instead.
    pub pump: Option<Box<dyn FnMut()>>,
    /// Polled every pause-loop iteration; returning `true` forces the pause
    /// loop to exit so the host can shut down.
    pub should_exit: Box<dyn FnMut() -> bool>,
}

impl Default for DebugCallbacks {
    fn default() -> Self {
        Self {
            on_stop: Box::new(|_, _, _| {}),
            pump: None,
            should_exit: Box::new(|| false),
        }
    }
}

impl fmt::Debug for DebugCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugCallbacks")
            .field("pump", &self.pump.is_some())
            .finish_non_exhaustive()
    }
}

impl DebugCallbacks {
    /// Callbacks with the given stop handler and defaults for the rest.
    pub fn with_on_stop(on_stop: impl FnMut(u32, &str, StopReason) + 'static) -> Self {
        Self {
            on_stop: Box::new(on_stop),
            ..Self::default()
        }
    }

    /// Sets the pump callback.
    #[must_use]
    pub fn pump(mut self, pump: impl FnMut() + 'static) -> Self {
        self.pump = Some(Box::new(pump));
        self
    }

    /// Sets the should-exit callback.
    #[must_use]
    pub fn should_exit(mut self, should_exit: impl FnMut() -> bool + 'static) -> Self {
        self.should_exit = Box::new(should_exit);
        self
    }
}

/// A VM hook event, reduced to what dispatch needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HookEvent {
    /// A function call was entered. Tail calls replace the current frame
    /// and never produce a matching return event, so they leave the depth
    /// untouched.
    Call { tail: bool },
    /// A function returned.
    Return,
    /// Execution reached a new source line.
    Line { file: String, line: u32 },
    /// Instruction-count tick; only feeds the watchdog.
    Tick,
}

/// Hook-local stepping state: the anchor recorded when a step arms.
///
/// Only the hook itself reads or writes this, so it lives outside the
/// shared atomics.
#[derive(Debug, Default)]
pub(crate) struct HookState {
    anchor: Option<(String, u32)>,
}

/// Routes one hook event. Returns `Err` to abort the VM (watchdog).
pub(crate) fn dispatch(
    shared: &DebugShared,
    callbacks: &RefCell<DebugCallbacks>,
    watchdog: &WatchdogTimer,
    state: &mut HookState,
    event: HookEvent,
) -> mlua::Result<VmState> {
    // A pump that re-enters the VM would recurse into this hook; refuse to
    // nest another pause loop under the one already on the stack.
    if shared.in_pause() {
        return Ok(VmState::Continue);
    }

    let (file, line) = match event {
        HookEvent::Call { tail } => {
            if !tail {
                shared.depth_increment();
            }
            return Ok(VmState::Continue);
        }
        HookEvent::Return => {
            shared.depth_decrement();
            return Ok(VmState::Continue);
        }
        HookEvent::Tick => {
            check_watchdog(shared, watchdog)?;
            return Ok(VmState::Continue);
        }
        HookEvent::Line { file, line } => (file, line),
    };

    check_watchdog(shared, watchdog)?;

    // An explicit pause request wins over everything else on this line.
    if shared.action() == DebugAction::Pause {
        run_pause_loop(shared, callbacks, &file, line, StopReason::Pause);
    } else if shared.has_breakpoint(&file, line) {
        // Breakpoints hit regardless of the pending action; a Continue must
        // not sail past one, and a step in flight is abandoned.
        shared.clear_step();
        run_pause_loop(shared, callbacks, &file, line, StopReason::Breakpoint);
    }

    // Whatever action is pending now may have been issued from inside the
    // pause loop above.
    let action = shared.action();
    if !action.is_step() {
        return Ok(VmState::Continue);
    }

    if shared.take_armed() {
        state.anchor = Some((file, line));
        return Ok(VmState::Continue);
    }

    let moved = state
        .anchor
        .as_ref()
        .is_none_or(|(anchor_file, anchor_line)| *anchor_line != line || anchor_file != &file);
    let depth = shared.current_depth();
    let stop = match action {
        DebugAction::StepIn => moved,
        DebugAction::StepOver => moved && depth <= shared.step_depth(),
        // Returning to the caller is a location change by construction.
        DebugAction::StepOut => depth < shared.step_depth(),
        _ => unreachable!("non-step action in step evaluation"),
    };
    if stop {
        shared.clear_step();
        run_pause_loop(shared, callbacks, &file, line, StopReason::Step);
        // A fresh step issued at this stop anchors right here.
        if shared.take_armed() {
            state.anchor = Some((file, line));
        }
    }

    Ok(VmState::Continue)
}

/// Aborts the VM if the watchdog budget is spent.
///
/// Never fires while interactive debugging is enabled: a debug session is
/// expected to sit at a stop for arbitrary real time.
fn check_watchdog(shared: &DebugShared, watchdog: &WatchdogTimer) -> mlua::Result<()> {
    if shared.is_enabled() || !watchdog.expired() {
        return Ok(());
    }
    watchdog.mark_tripped();
    Err(mlua::Error::RuntimeError(format!(
        "script exceeded its watchdog budget of {:?}",
        watchdog.budget()
    )))
}

/// Blocks the interpreter thread until a controller releases it.
///
/// The loop holds no lock: `paused` is a shared atomic flag, and the
/// callbacks are borrowed once per invocation, so pump-delivered controller
/// actions are free to mutate debugger state. The should-exit callback
/// always wins over `paused`, forcing the flag clear so shutdown can never
/// hang here.
fn run_pause_loop(
    shared: &DebugShared,
    callbacks: &RefCell<DebugCallbacks>,
    file: &str,
    line: u32,
    reason: StopReason,
) {
    shared.set_in_pause(true);
    shared.set_paused(true);
    log::debug!("paused at {file}:{line} ({reason})");

    (callbacks.borrow_mut().on_stop)(line, file, reason);

    loop {
        if (callbacks.borrow_mut().should_exit)() {
            shared.set_paused(false);
            break;
        }
        if !shared.is_paused() {
            break;
        }
        let pumped = {
            let mut callbacks = callbacks.borrow_mut();
            if let Some(pump) = callbacks.pump.as_mut() {
                pump();
                true
            } else {
                false
            }
        };
        if !pumped {
            std::thread::sleep(PAUSE_POLL_INTERVAL);
        }
    }

    shared.set_in_pause(false);
    log::debug!("resumed from {file}:{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::ScriptDebugger;
    use std::rc::Rc;

    fn line(file: &str, line: u32) -> HookEvent {
        HookEvent::Line {
            file: file.to_owned(),
            line,
        }
    }

    /// Runs a sequence of events through dispatch, recording stops and
    /// applying one scripted controller action per stop.
    fn run_events(
        debugger: &ScriptDebugger,
        events: Vec<HookEvent>,
        plan: Vec<DebugAction>,
    ) -> Vec<(String, u32, StopReason)> {
        let shared = debugger.shared();
        let stops = Rc::new(RefCell::new(Vec::new()));
        let plan = Rc::new(RefCell::new(plan.into_iter()));

        let controller = debugger.clone();
        let stops_sink = Rc::clone(&stops);
        let plan_source = Rc::clone(&plan);
        let callbacks = RefCell::new(DebugCallbacks::with_on_stop(
            move |line, file, reason| {
                stops_sink.borrow_mut().push((file.to_owned(), line, reason));
                match plan_source.borrow_mut().next() {
                    Some(DebugAction::Continue) | None => controller.resume(),
                    Some(action) => controller.set_action(action),
                }
            },
        ));

        let watchdog = WatchdogTimer::new();
        let mut state = HookState::default();
        for event in events {
            dispatch(&shared, &callbacks, &watchdog, &mut state, event)
                .expect("dispatch aborted unexpectedly");
        }
        let recorded = stops.borrow().clone();
        recorded
    }

    /// The event stream a VM would produce for
    /// `f() { g(); h(); }` with two-line bodies for `g` and `h`.
    fn call_f_events() -> Vec<HookEvent> {
        vec![
            HookEvent::Call { tail: false }, // enter f
            line("cart:/main.lua", 13),      // g()
            HookEvent::Call { tail: false }, // enter g
            line("cart:/main.lua", 2),
            line("cart:/main.lua", 3),
            HookEvent::Return, // leave g
            line("cart:/main.lua", 14), // h()
            HookEvent::Call { tail: false }, // enter h
            line("cart:/main.lua", 8),
            line("cart:/main.lua", 9),
            HookEvent::Return, // leave h
            HookEvent::Return, // leave f
        ]
    }

    #[test]
    fn depth_is_balanced_and_never_negative() {
        let debugger = ScriptDebugger::new();
        let shared = debugger.shared();
        run_events(&debugger, call_f_events(), vec![]);
        assert_eq!(shared.current_depth(), 0);

        // An unbalanced stream clamps instead of underflowing.
        run_events(
            &debugger,
            vec![HookEvent::Return, HookEvent::Return],
            vec![],
        );
        assert_eq!(shared.current_depth(), 0);
    }

    #[test]
    fn breakpoint_stops_even_while_continuing() {
        let debugger = ScriptDebugger::new();
        debugger.set_action(DebugAction::Continue);
        debugger.add_breakpoint("cart:/main.lua", 14);
        let stops = run_events(&debugger, call_f_events(), vec![DebugAction::Continue]);
        assert_eq!(
            stops,
            vec![("cart:/main.lua".to_owned(), 14, StopReason::Breakpoint)]
        );
    }

    #[test]
    fn fuzzy_breakpoint_stops_on_mounted_name() {
        let debugger = ScriptDebugger::new();
        debugger.add_breakpoint("/home/dev/game/main.lua", 13);
        let stops = run_events(&debugger, call_f_events(), vec![]);
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].1, 13);
    }

    #[test]
    fn step_over_skips_the_callee() {
        let debugger = ScriptDebugger::new();
        debugger.add_breakpoint("cart:/main.lua", 13);
        let stops = run_events(&debugger, call_f_events(), vec![DebugAction::StepOver]);
        let lines: Vec<_> = stops.iter().map(|s| (s.1, s.2)).collect();
        assert_eq!(
            lines,
            vec![(13, StopReason::Breakpoint), (14, StopReason::Step)]
        );
    }

    #[test]
    fn step_in_lands_on_first_line_of_callee() {
        let debugger = ScriptDebugger::new();
        debugger.add_breakpoint("cart:/main.lua", 13);
        let stops = run_events(&debugger, call_f_events(), vec![DebugAction::StepIn]);
        let lines: Vec<_> = stops.iter().map(|s| (s.1, s.2)).collect();
        assert_eq!(
            lines,
            vec![(13, StopReason::Breakpoint), (2, StopReason::Step)]
        );
    }

    #[test]
    fn step_out_returns_to_the_caller() {
        let debugger = ScriptDebugger::new();
        debugger.add_breakpoint("cart:/main.lua", 2);
        let stops = run_events(&debugger, call_f_events(), vec![DebugAction::StepOut]);
        let lines: Vec<_> = stops.iter().map(|s| (s.1, s.2)).collect();
        assert_eq!(
            lines,
            vec![(2, StopReason::Breakpoint), (14, StopReason::Step)]
        );
    }

    #[test]
    fn pause_request_stops_at_next_line() {
        let debugger = ScriptDebugger::new();
        debugger.set_action(DebugAction::Pause);
        let stops = run_events(&debugger, call_f_events(), vec![DebugAction::Continue]);
        assert_eq!(
            stops,
            vec![("cart:/main.lua".to_owned(), 13, StopReason::Pause)]
        );
    }

    #[test]
    fn breakpoint_abandons_step_in_flight() {
        let debugger = ScriptDebugger::new();
        debugger.add_breakpoint("cart:/main.lua", 13);
        debugger.add_breakpoint("cart:/main.lua", 2);
        // Step-over from line 13 would normally land on 14, but the
        // breakpoint inside g takes precedence and cancels the step.
        let stops = run_events(
            &debugger,
            call_f_events(),
            vec![DebugAction::StepOver, DebugAction::Continue],
        );
        let lines: Vec<_> = stops.iter().map(|s| (s.1, s.2)).collect();
        assert_eq!(
            lines,
            vec![(13, StopReason::Breakpoint), (2, StopReason::Breakpoint)]
        );
        assert_eq!(debugger.action(), DebugAction::Continue);
    }

    #[test]
    fn consecutive_steps_advance_one_line_each() {
        let debugger = ScriptDebugger::new();
        debugger.add_breakpoint("cart:/main.lua", 13);
        let stops = run_events(
            &debugger,
            call_f_events(),
            vec![DebugAction::StepIn, DebugAction::StepIn],
        );
        let lines: Vec<_> = stops.iter().map(|s| s.1).collect();
        assert_eq!(lines, vec![13, 2, 3]);
    }

    #[test]
    fn should_exit_forces_the_pause_loop_open() {
        let debugger = ScriptDebugger::new();
        debugger.add_breakpoint("cart:/main.lua", 13);
        let shared = debugger.shared();
        // No controller ever resumes; only should_exit ends the pause.
        let callbacks = RefCell::new(
            DebugCallbacks::with_on_stop(|_, _, _| {}).should_exit(|| true),
        );
        let watchdog = WatchdogTimer::new();
        let mut state = HookState::default();
        dispatch(
            &shared,
            &callbacks,
            &watchdog,
            &mut state,
            line("cart:/main.lua", 13),
        )
        .unwrap();
        assert!(!debugger.is_paused());
    }

    #[test]
    fn watchdog_aborts_only_when_debugging_is_off() {
        let debugger = ScriptDebugger::new();
        let shared = debugger.shared();
        let callbacks = RefCell::new(DebugCallbacks::default());
        let watchdog = WatchdogTimer::new();
        watchdog.configure(true, Duration::from_millis(0));
        watchdog.restart();
        std::thread::sleep(Duration::from_millis(2));

        let mut state = HookState::default();
        let result = dispatch(
            &shared,
            &callbacks,
            &watchdog,
            &mut state,
            HookEvent::Tick,
        );
        assert!(result.is_err());
        assert!(watchdog.take_tripped());

        // Same expired budget, but debugging is on: no abort.
        debugger.set_enabled(true);
        let result = dispatch(
            &shared,
            &callbacks,
            &watchdog,
            &mut state,
            line("cart:/main.lua", 1),
        );
        assert!(result.is_ok());
    }
}
