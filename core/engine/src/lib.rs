//! Moth engine: a Lua cartridge runtime with first-class debug control.
//!
//! The engine embeds a sandboxed Lua 5.4 VM and runs *cartridges*:
//! directories with a manifest and an entry script exposing `boot`,
//! `update` and `draw` globals. What sets it apart is the debug subsystem:
//! the VM cannot be preempted or suspended from outside, so breakpoints,
//! pause and single-stepping are synthesized entirely inside the VM's
//! native hook, which blocks the interpreter thread in a cooperative
//! polling loop while keeping the host alive through a caller-supplied
//! pump callback.
//!
//! # Components
//!
//! - [`Cartridge`]: lifecycle state machine gating when the VM may run.
//! - [`ScriptEngine`]: VM ownership, sandbox, entry points, hook wiring.
//! - [`ScriptDebugger`]: controller handle for breakpoints and stepping.
//! - [`watchdog::WatchdogTimer`]: wall-clock budget for runaway scripts,
//!   disabled while a debug session is active.
//!
//! # Example
//!
//! ```rust,ignore
//! use moth_engine::Cartridge;
//!
//! let mut cart = Cartridge::new()?;
//! cart.load(Path::new("carts/pong"))?;
//! cart.start()?;
//! loop {
//!     cart.update(1.0 / 60.0)?;
//!     cart.draw(1.0)?;
//! }
//! ```

pub mod cartridge;
pub mod debugger;
pub mod engine;
pub mod error;
pub mod handle;
pub mod vfs;
pub mod watchdog;

pub use cartridge::{CartManifest, Cartridge, CartridgeState};
pub use debugger::{
    BreakpointStore, DebugAction, DebugBreakpoint, DebugCallbacks, ScriptDebugger, StopReason,
};
pub use engine::ScriptEngine;
pub use error::{ScriptError, ScriptResult};
pub use handle::{Handle, HandlePool};
pub use vfs::CartFs;
