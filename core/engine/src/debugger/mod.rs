//! Interactive debug control for cartridge scripts.
//!
//! The host embeds a VM that has no support for preemption or out-of-band
//! suspension; the only integration point is a synchronous native hook
//! invoked on every line, call and return. This module builds the whole
//! debugging surface on top of that one hook.
//!
//! # Overview
//!
//! - [`ScriptDebugger`]: cheap-to-clone controller handle for breakpoints,
//!   pause/resume, stepping requests.
//! - [`BreakpointStore`]: the breakpoint set, with an exact index and a
//!   filename-only fuzzy fallback for mount/path aliasing.
//! - [`DebugCallbacks`]: the three callbacks a controller supplies: stop
//!   notification, UI pump, should-exit.
//! - `hooks::dispatch`: the hook routine itself, including the blocking
//!   pause loop that synthesizes suspension on the interpreter thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use moth_engine::{DebugAction, DebugCallbacks, ScriptEngine};
//!
//! let mut engine = ScriptEngine::new()?;
//! let debugger = engine.debugger();
//! debugger.set_enabled(true);
//! debugger.add_breakpoint("cart:/main.lua", 10);
//! engine.set_debug_callbacks(DebugCallbacks::with_on_stop(|line, file, reason| {
//!     eprintln!("stopped at {file}:{line} ({reason})");
//! }));
//!
//! // Execution pauses inside the hook when line 10 is reached; a resume
//! // issued from the pump callback (or another thread) releases it.
//! engine.call_function("main")?;
//! ```

pub mod breakpoint;
pub mod hooks;
pub mod state;

pub use breakpoint::{BreakpointStore, DebugBreakpoint};
pub use hooks::{DebugCallbacks, StopReason};
pub use state::{DebugAction, ScriptDebugger};
