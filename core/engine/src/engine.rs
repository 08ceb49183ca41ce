//! Script engine: VM ownership and hook wiring.
//!
//! [`ScriptEngine`] owns the Lua VM, the debugger handle and the watchdog,
//! and is the only place that talks to `mlua` directly. The native hook is
//! the single integration point for both debugging and the watchdog: it is
//! installed whenever either wants it, with triggers matching whichever of
//! the two is active, and every top-level entry into the VM re-checks that
//! choice so controllers can toggle debugging between frames.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use mlua::{DebugEvent, HookTriggers, Lua, Value, Variadic, VmState};

use crate::debugger::hooks::{self, DebugCallbacks, HookEvent, HookState};
use crate::debugger::ScriptDebugger;
use crate::error::{ScriptError, ScriptResult};
use crate::handle::{Handle, HandlePool};
use crate::watchdog::WatchdogTimer;

/// Entry point invoked once when a cartridge starts.
pub const ENTRY_BOOT: &str = "boot";
/// Entry point invoked once per simulation step.
pub const ENTRY_UPDATE: &str = "update";
/// Entry point invoked once per rendered frame.
pub const ENTRY_DRAW: &str = "draw";

/// How many VM instructions pass between watchdog checks when no line
/// events are requested.
const WATCHDOG_TICK_INTERVAL: u32 = 1000;

/// A script source registered with the engine.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Mount name the chunk was loaded under, e.g. `cart:/main.lua`.
    pub name: String,
    /// The source text.
    pub code: String,
}

/// Which concerns the currently installed hook serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookMode {
    Off,
    Debug,
    Watchdog,
    Full,
}

/// The embedded interpreter plus everything wired into its native hook.
pub struct ScriptEngine {
    lua: Lua,
    debugger: ScriptDebugger,
    callbacks: Rc<RefCell<DebugCallbacks>>,
    watchdog: Arc<WatchdogTimer>,
    sources: HandlePool<SourceInfo>,
    hook_mode: HookMode,
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("hook_mode", &self.hook_mode)
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

impl ScriptEngine {
    /// Creates an engine with a fresh, sandboxed VM.
    pub fn new() -> ScriptResult<Self> {
        Self::with_debugger(ScriptDebugger::new())
    }

    /// Creates an engine attached to an existing debugger handle, so
    /// breakpoints and debug settings survive a VM rebuild.
    pub fn with_debugger(debugger: ScriptDebugger) -> ScriptResult<Self> {
        let lua = Lua::new();
        install_runtime(&lua)?;
        Ok(Self {
            lua,
            debugger,
            callbacks: Rc::new(RefCell::new(DebugCallbacks::default())),
            watchdog: Arc::new(WatchdogTimer::new()),
            sources: HandlePool::new(),
            hook_mode: HookMode::Off,
        })
    }

    /// A handle to the debugger shared with this engine.
    pub fn debugger(&self) -> ScriptDebugger {
        self.debugger.clone()
    }

    /// Configures the runaway-script watchdog.
    pub fn set_watchdog(&self, enabled: bool, budget: Duration) {
        self.watchdog.configure(enabled, budget);
    }

    /// Installs the controller callbacks used while paused.
    ///
    /// Must not be called from inside the pump callback of a paused
    /// session; swap controllers only while the VM is running or idle.
    pub fn set_debug_callbacks(&mut self, callbacks: DebugCallbacks) {
        *self.callbacks.borrow_mut() = callbacks;
    }

    /// Loads and executes a chunk under the given mount name.
    ///
    /// The chunk name is what the VM reports back through the hook, so
    /// breakpoints set against the mount name match exactly.
    pub fn load_script(&mut self, name: &str, code: &str) -> ScriptResult<Handle> {
        self.refresh_hook();
        self.watchdog.restart();
        self.lua
            .load(code)
            .set_name(format!("@{name}"))
            .exec()
            .map_err(|err| self.classify(&err))?;
        log::debug!("loaded chunk {name}");
        Ok(self.sources.insert(SourceInfo {
            name: name.to_owned(),
            code: code.to_owned(),
        }))
    }

    /// Invokes the cartridge's `boot` entry point, if it defines one.
    pub fn call_boot(&mut self) -> ScriptResult<()> {
        self.call_entry(ENTRY_BOOT, None, false)
    }

    /// Invokes the cartridge's `update` entry point, if it defines one.
    pub fn call_update(&mut self, dt: f64) -> ScriptResult<()> {
        self.call_entry(ENTRY_UPDATE, Some(dt), false)
    }

    /// Invokes the cartridge's `draw` entry point, if it defines one.
    pub fn call_draw(&mut self, alpha: f64) -> ScriptResult<()> {
        self.call_entry(ENTRY_DRAW, Some(alpha), false)
    }

    /// Invokes an arbitrary global function; errors if it does not exist.
    pub fn call_function(&mut self, name: &str) -> ScriptResult<()> {
        self.call_entry(name, None, true)
    }

    /// Evaluates an expression or chunk and converts its result.
    pub fn eval<T: mlua::FromLuaMulti>(&mut self, code: &str) -> ScriptResult<T> {
        self.refresh_hook();
        self.watchdog.restart();
        self.lua.load(code).eval().map_err(|err| self.classify(&err))
    }

    /// Source text registered under a mount name.
    pub fn source_text(&self, name: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|(_, info)| info.name == name)
            .map(|(_, info)| info.code.as_str())
    }

    /// A single line of a registered source, one-based.
    pub fn source_line(&self, name: &str, line: u32) -> Option<&str> {
        let text = self.source_text(name)?;
        text.lines().nth(line.checked_sub(1)? as usize)
    }

    /// Source registered under a handle returned by
    /// [`ScriptEngine::load_script`]; `None` for stale handles.
    pub fn source(&self, handle: Handle) -> Option<&SourceInfo> {
        self.sources.get(handle)
    }

    /// All registered sources.
    pub fn sources(&self) -> impl Iterator<Item = &SourceInfo> {
        self.sources.iter().map(|(_, info)| info)
    }

    /// Discards the VM and every loaded source, keeping the debugger
    /// handle, callbacks and watchdog configuration.
    pub fn reset(&mut self) -> ScriptResult<()> {
        self.lua = Lua::new();
        install_runtime(&self.lua)?;
        self.sources.clear();
        self.hook_mode = HookMode::Off;
        Ok(())
    }

    fn call_entry(&mut self, name: &str, arg: Option<f64>, required: bool) -> ScriptResult<()> {
        let value: Value = self
            .lua
            .globals()
            .get(name)
            .map_err(|err| self.classify(&err))?;
        let func = match value {
            Value::Function(func) => func,
            Value::Nil if !required => return Ok(()),
            Value::Nil => return Err(ScriptError::MissingFunction(name.to_owned())),
            _ => return Err(ScriptError::NotCallable(name.to_owned())),
        };

        self.refresh_hook();
        self.watchdog.restart();
        let result = match arg {
            Some(arg) => func.call::<()>(arg),
            None => func.call::<()>(()),
        };
        result.map_err(|err| self.classify(&err))
    }

    /// Turns a VM error into a [`ScriptError`], recognizing aborts the
    /// watchdog raised from inside the hook.
    fn classify(&self, err: &mlua::Error) -> ScriptError {
        if self.watchdog.take_tripped() {
            return ScriptError::WatchdogTimeout {
                budget: self.watchdog.budget(),
            };
        }
        ScriptError::from_lua(err)
    }

    /// (Re)installs or removes the native hook to match what debugging and
    /// the watchdog currently need.
    fn refresh_hook(&mut self) {
        let desired = match (self.debugger.is_enabled(), self.watchdog.is_enabled()) {
            (false, false) => HookMode::Off,
            (true, false) => HookMode::Debug,
            (false, true) => HookMode::Watchdog,
            (true, true) => HookMode::Full,
        };
        if desired == self.hook_mode {
            return;
        }
        log::debug!("switching hook mode {:?} -> {:?}", self.hook_mode, desired);

        match desired {
            HookMode::Off => self.lua.remove_hook(),
            mode => {
                let mut triggers = HookTriggers::new();
                if matches!(mode, HookMode::Debug | HookMode::Full) {
                    triggers = triggers.every_line().on_calls().on_returns();
                }
                if matches!(mode, HookMode::Watchdog | HookMode::Full) {
                    triggers = triggers.every_nth_instruction(WATCHDOG_TICK_INTERVAL);
                }

                let shared = self.debugger.shared();
                let callbacks = Rc::clone(&self.callbacks);
                let watchdog = Arc::clone(&self.watchdog);
                let state = RefCell::new(HookState::default());
                self.lua.set_hook(triggers, move |_lua, dbg| {
                    let event = match dbg.event() {
                        DebugEvent::Call => HookEvent::Call { tail: false },
                        DebugEvent::TailCall => HookEvent::Call { tail: true },
                        DebugEvent::Ret => HookEvent::Return,
                        DebugEvent::Count => HookEvent::Tick,
                        DebugEvent::Line => {
                            let line = dbg.curr_line().max(0) as u32;
                            let file = dbg
                                .source()
                                .short_src
                                .map(|s| s.into_owned())
                                .unwrap_or_else(|| String::from("?"));
                            HookEvent::Line { file, line }
                        }
                        _ => return Ok(VmState::Continue),
                    };
                    hooks::dispatch(&shared, &callbacks, &watchdog, &mut state.borrow_mut(), event)
                });
            }
        }
        self.hook_mode = desired;
    }
}

/// Sandboxes a fresh VM and reroutes `print` into the log facade.
///
/// Cartridges get the pure-Lua standard library but no host escape hatches:
/// filesystem, process and loader access are removed.
fn install_runtime(lua: &Lua) -> ScriptResult<()> {
    let globals = lua.globals();
    for name in ["os", "io", "package", "require", "loadfile", "dofile", "load"] {
        globals
            .set(name, Value::Nil)
            .map_err(|err| ScriptError::from_lua(&err))?;
    }

    let print = lua
        .create_function(|_, args: Variadic<Value>| {
            let parts: Vec<String> = args.iter().map(format_value).collect();
            log::info!(target: "moth::script", "{}", parts.join("\t"));
            Ok(())
        })
        .map_err(|err| ScriptError::from_lua(&err))?;
    globals
        .set("print", print)
        .map_err(|err| ScriptError::from_lua(&err))?;
    Ok(())
}

/// Renders a script value the way `print` would.
fn format_value(value: &Value) -> String {
    match value {
        Value::Nil => String::from("nil"),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy().to_string(),
        other => format!("<{}>", other.type_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_calls_globals() {
        let mut engine = ScriptEngine::new().unwrap();
        engine
            .load_script("cart:/main.lua", "counter = 0\nfunction bump() counter = counter + 1 end")
            .unwrap();
        engine.call_function("bump").unwrap();
        engine.call_function("bump").unwrap();
        let counter: i64 = engine.eval("return counter").unwrap();
        assert_eq!(counter, 2);
    }

    #[test]
    fn missing_entry_points_are_no_ops() {
        let mut engine = ScriptEngine::new().unwrap();
        engine.load_script("cart:/main.lua", "x = 1").unwrap();
        engine.call_boot().unwrap();
        engine.call_update(0.016).unwrap();
        engine.call_draw(1.0).unwrap();
    }

    #[test]
    fn missing_function_is_an_error() {
        let mut engine = ScriptEngine::new().unwrap();
        assert!(matches!(
            engine.call_function("nope"),
            Err(ScriptError::MissingFunction(name)) if name == "nope"
        ));
    }

    #[test]
    fn non_callable_global_is_an_error() {
        let mut engine = ScriptEngine::new().unwrap();
        engine.load_script("cart:/main.lua", "update = 42").unwrap();
        assert!(matches!(
            engine.call_update(0.016),
            Err(ScriptError::NotCallable(_))
        ));
    }

    #[test]
    fn syntax_errors_are_classified() {
        let mut engine = ScriptEngine::new().unwrap();
        assert!(matches!(
            engine.load_script("cart:/main.lua", "function ("),
            Err(ScriptError::Syntax(_))
        ));
    }

    #[test]
    fn runtime_errors_are_classified() {
        let mut engine = ScriptEngine::new().unwrap();
        engine
            .load_script("cart:/main.lua", "function boom() error('kaput') end")
            .unwrap();
        match engine.call_function("boom") {
            Err(ScriptError::Runtime(message)) => assert!(message.contains("kaput")),
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn sandbox_removes_host_access() {
        let mut engine = ScriptEngine::new().unwrap();
        let os_is_nil: bool = engine.eval("return os == nil").unwrap();
        let io_is_nil: bool = engine.eval("return io == nil").unwrap();
        assert!(os_is_nil);
        assert!(io_is_nil);
    }

    #[test]
    fn sources_survive_until_reset() {
        let mut engine = ScriptEngine::new().unwrap();
        let handle = engine.load_script("cart:/main.lua", "a = 1\nb = 2").unwrap();
        assert_eq!(engine.source_line("cart:/main.lua", 2), Some("b = 2"));
        assert!(engine.source(handle).is_some());
        engine.reset().unwrap();
        assert!(engine.source(handle).is_none());
        assert_eq!(engine.source_text("cart:/main.lua"), None);
        // The VM itself was rebuilt too.
        let a_is_nil: bool = engine.eval("return a == nil").unwrap();
        assert!(a_is_nil);
    }
}
