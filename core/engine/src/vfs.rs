//! Cartridge filesystem view.
//!
//! Scripts inside a cartridge are addressed through the `cart:/` mount
//! namespace rather than by host path: the engine loads chunks under their
//! mount name, so the VM reports `cart:/main.lua` even though the file lives
//! somewhere under the cartridge directory on disk. Only the thin mapping
//! between the two lives here.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{ScriptError, ScriptResult};

/// Prefix of the cartridge mount namespace.
pub const MOUNT_PREFIX: &str = "cart:/";

/// A read-only view of a cartridge directory, addressed by mount name.
#[derive(Debug, Clone)]
pub struct CartFs {
    root: PathBuf,
}

impl CartFs {
    /// Opens a view over `root`, which must be an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> ScriptResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ScriptError::NotACartridge(root));
        }
        Ok(Self { root })
    }

    /// The cartridge directory on the host filesystem.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mount name for a cartridge-relative path, e.g. `main.lua` ->
    /// `cart:/main.lua`.
    pub fn mount_name(relative: &str) -> String {
        format!("{MOUNT_PREFIX}{relative}")
    }

    /// Resolves a mount name (or cartridge-relative path) to a host path.
    ///
    /// Absolute paths and `..` components are rejected: nothing outside the
    /// cartridge directory is reachable through this view.
    pub fn resolve(&self, name: &str) -> ScriptResult<PathBuf> {
        let relative = name.strip_prefix(MOUNT_PREFIX).unwrap_or(name);
        let path = Path::new(relative);
        for component in path.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(ScriptError::PathEscape(name.to_owned())),
            }
        }
        Ok(self.root.join(path))
    }

    /// Whether a file exists under the given mount name.
    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Reads a text file by mount name.
    pub fn read_text(&self, name: &str) -> ScriptResult<String> {
        let path = self.resolve(name)?;
        Ok(fs::read_to_string(path)?)
    }
}
