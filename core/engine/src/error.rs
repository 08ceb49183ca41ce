//! Error types shared across the engine.
//!
//! Every fallible operation in this crate returns a [`ScriptResult`]; there
//! is no ambient "last error" state anywhere. Errors coming out of the VM
//! are translated into [`ScriptError`] at the binding boundary, so callers
//! never have to handle `mlua` types directly.

use std::path::PathBuf;
use std::time::Duration;

use crate::cartridge::CartridgeState;

/// Result type for engine operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// An error raised while loading or running cartridge code.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The source failed to compile.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The script raised an error at runtime.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A single script invocation ran past the watchdog budget.
    #[error("script exceeded its watchdog budget of {budget:?}")]
    WatchdogTimeout {
        /// The budget that was exceeded.
        budget: Duration,
    },

    /// A function that was explicitly requested does not exist.
    #[error("function `{0}` is not defined")]
    MissingFunction(String),

    /// A global with the requested name exists but cannot be called.
    #[error("global `{0}` is not callable")]
    NotCallable(String),

    /// Reading cartridge content from disk failed.
    #[error("cartridge i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The cartridge manifest could not be parsed.
    #[error("invalid cartridge manifest: {0}")]
    Manifest(String),

    /// The given path does not point at a cartridge directory.
    #[error("not a cartridge directory: {}", .0.display())]
    NotACartridge(PathBuf),

    /// A mounted path tried to escape the cartridge directory.
    #[error("path escapes the cartridge: {0}")]
    PathEscape(String),

    /// The cartridge is in the wrong state for the requested operation.
    #[error("operation not valid while cartridge is {0:?}")]
    InvalidState(CartridgeState),
}

impl ScriptError {
    /// Translates an error surfaced by the VM.
    ///
    /// Callback errors are unwrapped to their root cause so that errors
    /// raised from native hooks keep their original message.
    pub(crate) fn from_lua(err: &mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => Self::Syntax(message.clone()),
            mlua::Error::RuntimeError(message) => Self::Runtime(message.clone()),
            mlua::Error::CallbackError { cause, .. } => Self::from_lua(cause),
            other => Self::Runtime(other.to_string()),
        }
    }
}
