//! Cartridge lifecycle.
//!
//! A cartridge is a directory with an optional `cart.toml` manifest and a
//! Lua entry script. [`Cartridge`] owns the engine and gates whether the
//! host main loop's `update`/`draw` calls are forwarded into the VM at all:
//! nothing reaches the interpreter unless the cartridge is in a state that
//! allows it, and nothing is ever drawn while the debugger holds the VM
//! thread parked at a stop.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::debugger::ScriptDebugger;
use crate::engine::ScriptEngine;
use crate::error::{ScriptError, ScriptResult};
use crate::vfs::CartFs;

/// Manifest file name inside a cartridge directory.
pub const MANIFEST_NAME: &str = "cart.toml";

/// Lifecycle state of a [`Cartridge`].
///
/// This is host-level state, distinct from the debugger's own paused flag:
/// a `Running` cartridge can still be suspended at a breakpoint, and a
/// `Paused` cartridge keeps drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeState {
    /// Nothing loaded.
    Unloaded,
    /// `load` is in progress.
    Loading,
    /// Sources are loaded and executed; `start` has not been called.
    Initialized,
    /// The main loop may call `update` and `draw`.
    Running,
    /// Host-paused: `update` is gated off, `draw` keeps running.
    Paused,
    /// A script or load error occurred; nothing is forwarded until the
    /// cartridge is unloaded and loaded again.
    Faulted,
    /// Stopped by the host; requires unload/load to run again.
    Stopped,
}

/// Cartridge metadata from `cart.toml`. Every field is optional; a missing
/// manifest means defaults throughout.
#[derive(Debug, Clone, Deserialize)]
pub struct CartManifest {
    /// Display name.
    pub name: Option<String>,
    /// Author credit.
    pub author: Option<String>,
    /// Free-form version string.
    pub version: Option<String>,
    /// Entry script, relative to the cartridge root.
    #[serde(default = "CartManifest::default_entry")]
    pub entry: String,
}

impl Default for CartManifest {
    fn default() -> Self {
        Self {
            name: None,
            author: None,
            version: None,
            entry: Self::default_entry(),
        }
    }
}

impl CartManifest {
    fn default_entry() -> String {
        String::from("main.lua")
    }
}

/// A loadable game cartridge and the engine that runs it.
#[derive(Debug)]
pub struct Cartridge {
    state: CartridgeState,
    engine: ScriptEngine,
    fs: Option<CartFs>,
    manifest: CartManifest,
}

impl Cartridge {
    /// Creates an empty cartridge slot with a fresh engine.
    pub fn new() -> ScriptResult<Self> {
        Ok(Self::with_engine(ScriptEngine::new()?))
    }

    /// Creates a cartridge slot around an existing engine.
    pub fn with_engine(engine: ScriptEngine) -> Self {
        Self {
            state: CartridgeState::Unloaded,
            engine,
            fs: None,
            manifest: CartManifest::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CartridgeState {
        self.state
    }

    /// The engine running this cartridge.
    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    /// Mutable access to the engine.
    pub fn engine_mut(&mut self) -> &mut ScriptEngine {
        &mut self.engine
    }

    /// Handle to the engine's debugger.
    pub fn debugger(&self) -> ScriptDebugger {
        self.engine.debugger()
    }

    /// The manifest of the loaded cartridge (defaults when none is loaded).
    pub fn manifest(&self) -> &CartManifest {
        &self.manifest
    }

    /// Display name: the manifest name, or the directory name as fallback.
    pub fn title(&self) -> String {
        if let Some(name) = &self.manifest.name {
            return name.clone();
        }
        self.fs
            .as_ref()
            .and_then(|fs| fs.root().file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("<unloaded>"))
    }

    /// Loads a cartridge directory: manifest, then the entry script.
    ///
    /// Drives `Unloaded -> Loading -> Initialized`; any failure lands in
    /// `Faulted` and is returned to the caller.
    pub fn load(&mut self, path: &Path) -> ScriptResult<()> {
        if self.state != CartridgeState::Unloaded {
            return Err(ScriptError::InvalidState(self.state));
        }
        self.set_state(CartridgeState::Loading);
        match self.load_inner(path) {
            Ok(()) => {
                self.set_state(CartridgeState::Initialized);
                Ok(())
            }
            Err(err) => {
                log::error!("cartridge load failed: {err}");
                self.set_state(CartridgeState::Faulted);
                Err(err)
            }
        }
    }

    fn load_inner(&mut self, path: &Path) -> ScriptResult<()> {
        let fs = CartFs::new(PathBuf::from(path))?;
        self.manifest = if fs.exists(MANIFEST_NAME) {
            let text = fs.read_text(MANIFEST_NAME)?;
            toml::from_str(&text).map_err(|err| ScriptError::Manifest(err.to_string()))?
        } else {
            CartManifest::default()
        };
        let entry = self.manifest.entry.clone();
        let code = fs.read_text(&entry)?;
        self.engine
            .load_script(&CartFs::mount_name(&entry), &code)?;
        self.fs = Some(fs);
        Ok(())
    }

    /// Starts a loaded cartridge: runs `boot` and enters `Running`.
    pub fn start(&mut self) -> ScriptResult<()> {
        if self.state != CartridgeState::Initialized {
            return Err(ScriptError::InvalidState(self.state));
        }
        match self.engine.call_boot() {
            Ok(()) => {
                self.set_state(CartridgeState::Running);
                Ok(())
            }
            Err(err) => {
                log::error!("boot failed: {err}");
                self.set_state(CartridgeState::Faulted);
                Err(err)
            }
        }
    }

    /// Host-level pause. Only meaningful while `Running`.
    pub fn pause(&mut self) {
        if self.state == CartridgeState::Running {
            self.set_state(CartridgeState::Paused);
        }
    }

    /// Undoes a host-level pause.
    pub fn resume(&mut self) {
        if self.state == CartridgeState::Paused {
            self.set_state(CartridgeState::Running);
        }
    }

    /// Stops a running or paused cartridge.
    pub fn stop(&mut self) {
        if matches!(self.state, CartridgeState::Running | CartridgeState::Paused) {
            self.set_state(CartridgeState::Stopped);
        }
    }

    /// Unloads everything and rebuilds the VM. Safe in any state and
    /// idempotent once `Unloaded`. Breakpoints and debug settings live on
    /// the debugger handle and survive.
    pub fn unload(&mut self) {
        if self.state == CartridgeState::Unloaded {
            return;
        }
        if let Err(err) = self.engine.reset() {
            log::error!("engine reset failed during unload: {err}");
        }
        self.fs = None;
        self.manifest = CartManifest::default();
        self.set_state(CartridgeState::Unloaded);
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// Forwards into the VM only while `Running`; anything else is a silent
    /// no-op. A script error faults the cartridge.
    pub fn update(&mut self, dt: f64) -> ScriptResult<()> {
        if self.state != CartridgeState::Running {
            return Ok(());
        }
        self.engine.call_update(dt).inspect_err(|err| {
            log::error!("update failed: {err}");
            self.set_state(CartridgeState::Faulted);
        })
    }

    /// Renders a frame with interpolation factor `alpha`.
    ///
    /// Forwards while `Running` or host-`Paused`, but never while the
    /// debugger holds the VM thread at a stop: interpreter state is being
    /// inspected right then and must not be re-entered.
    pub fn draw(&mut self, alpha: f64) -> ScriptResult<()> {
        if !matches!(self.state, CartridgeState::Running | CartridgeState::Paused) {
            return Ok(());
        }
        if self.engine.debugger().is_paused() {
            return Ok(());
        }
        self.engine.call_draw(alpha).inspect_err(|err| {
            log::error!("draw failed: {err}");
            self.set_state(CartridgeState::Faulted);
        })
    }

    fn set_state(&mut self, state: CartridgeState) {
        if self.state != state {
            log::debug!("cartridge state {:?} -> {state:?}", self.state);
            self.state = state;
        }
    }
}
