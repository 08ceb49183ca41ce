//! Breakpoint storage and matching.

use rustc_hash::{FxHashMap, FxHashSet};

/// A single source breakpoint, identified by `(file, line)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugBreakpoint {
    /// Source identifier the breakpoint was set with. May be a mount name
    /// (`cart:/main.lua`) or a host path, depending on the controller.
    pub file: String,
    /// One-based source line.
    pub line: u32,
    /// Disabled breakpoints are kept but never hit.
    pub enabled: bool,
}

/// The set of active breakpoints.
///
/// Lookups run on every line event, so the store keeps a `file -> lines`
/// index for exact hits next to the ordered list used for enumeration and
/// for the fuzzy fallback. The two structures always describe the same set
/// of `(file, line)` pairs; the index only carries enabled entries.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    by_file: FxHashMap<String, FxHashSet<u32>>,
    list: Vec<DebugBreakpoint>,
}

impl BreakpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a breakpoint. A no-op if the `(file, line)` pair already exists,
    /// even when the existing entry is disabled.
    pub fn add(&mut self, file: &str, line: u32) {
        if self.find(file, line).is_some() {
            return;
        }
        self.list.push(DebugBreakpoint {
            file: file.to_owned(),
            line,
            enabled: true,
        });
        self.by_file.entry(file.to_owned()).or_default().insert(line);
    }

    /// Removes a breakpoint. A no-op if the pair is absent.
    pub fn remove(&mut self, file: &str, line: u32) {
        let Some(index) = self.find(file, line) else {
            return;
        };
        self.list.remove(index);
        if let Some(lines) = self.by_file.get_mut(file) {
            lines.remove(&line);
            if lines.is_empty() {
                self.by_file.remove(file);
            }
        }
    }

    /// Enables or disables a breakpoint without removing it. Returns whether
    /// the pair existed.
    pub fn set_enabled(&mut self, file: &str, line: u32, enabled: bool) -> bool {
        let Some(index) = self.find(file, line) else {
            return false;
        };
        self.list[index].enabled = enabled;
        if enabled {
            self.by_file.entry(file.to_owned()).or_default().insert(line);
        } else if let Some(lines) = self.by_file.get_mut(file) {
            lines.remove(&line);
            if lines.is_empty() {
                self.by_file.remove(file);
            }
        }
        true
    }

    /// Removes every breakpoint.
    pub fn clear(&mut self) {
        self.by_file.clear();
        self.list.clear();
    }

    /// Whether an enabled breakpoint matches `(file, line)`.
    ///
    /// The exact index is consulted first. If it misses, the store falls
    /// back to comparing only the trailing filename component: the VM
    /// reports sources under the cartridge mount namespace, which rarely
    /// matches the path a controller used to set the breakpoint. The
    /// fallback is deliberately imprecise (two same-named files in
    /// different directories both match), which is accepted as the cost of
    /// breakpoints surviving the path/mount split.
    pub fn has_breakpoint(&self, file: &str, line: u32) -> bool {
        if self
            .by_file
            .get(file)
            .is_some_and(|lines| lines.contains(&line))
        {
            return true;
        }
        self.list.iter().any(|bp| {
            bp.enabled && bp.line == line && file_name(&bp.file) == file_name(file)
        })
    }

    /// All breakpoints, in insertion order.
    pub fn all(&self) -> &[DebugBreakpoint] {
        &self.list
    }

    /// Number of breakpoints, including disabled ones.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    fn find(&self, file: &str, line: u32) -> Option<usize> {
        self.list
            .iter()
            .position(|bp| bp.line == line && bp.file == file)
    }
}

/// Trailing filename component of a source identifier.
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn add_then_hit_then_remove() {
        let mut store = BreakpointStore::new();
        store.add("cart:/main.lua", 5);
        assert!(store.has_breakpoint("cart:/main.lua", 5));
        assert!(!store.has_breakpoint("cart:/main.lua", 6));
        store.remove("cart:/main.lua", 5);
        assert!(!store.has_breakpoint("cart:/main.lua", 5));
        assert!(store.is_empty());
    }

    #[test]
    fn add_is_idempotent() {
        let mut store = BreakpointStore::new();
        store.add("cart:/main.lua", 5);
        store.add("cart:/main.lua", 5);
        assert_eq!(store.len(), 1);
        // A single remove drops the pair completely.
        store.remove("cart:/main.lua", 5);
        assert!(!store.has_breakpoint("cart:/main.lua", 5));
    }

    #[test]
    fn remove_of_absent_pair_is_a_no_op() {
        let mut store = BreakpointStore::new();
        store.remove("cart:/main.lua", 5);
        store.add("cart:/main.lua", 5);
        store.remove("cart:/main.lua", 99);
        assert!(store.has_breakpoint("cart:/main.lua", 5));
    }

    #[test_case("a/main.lua", "cart:/main.lua", 5, true; "mount prefix vs relative path")]
    #[test_case("/home/dev/game/main.lua", "cart:/main.lua", 5, true; "absolute path vs mount")]
    #[test_case("C:\\game\\main.lua", "cart:/main.lua", 5, true; "windows path vs mount")]
    #[test_case("a/main.lua", "cart:/other.lua", 5, false; "different filename")]
    #[test_case("a/main.lua", "cart:/main.lua", 6, false; "different line")]
    fn fuzzy_fallback(set_as: &str, reported_as: &str, line: u32, expected: bool) {
        let mut store = BreakpointStore::new();
        store.add(set_as, 5);
        assert_eq!(store.has_breakpoint(reported_as, line), expected);
    }

    #[test]
    fn disabled_breakpoints_never_hit() {
        let mut store = BreakpointStore::new();
        store.add("cart:/main.lua", 5);
        assert!(store.set_enabled("cart:/main.lua", 5, false));
        assert!(!store.has_breakpoint("cart:/main.lua", 5));
        // The fuzzy path skips disabled entries too.
        assert!(!store.has_breakpoint("elsewhere/main.lua", 5));
        assert!(store.set_enabled("cart:/main.lua", 5, true));
        assert!(store.has_breakpoint("cart:/main.lua", 5));
    }

    #[test]
    fn set_enabled_on_absent_pair_reports_false() {
        let mut store = BreakpointStore::new();
        assert!(!store.set_enabled("cart:/main.lua", 5, false));
    }

    #[test]
    fn clear_empties_both_structures() {
        let mut store = BreakpointStore::new();
        store.add("cart:/a.lua", 1);
        store.add("cart:/b.lua", 2);
        store.clear();
        assert!(store.is_empty());
        assert!(!store.has_breakpoint("cart:/a.lua", 1));
        assert!(store.all().is_empty());
    }

    #[test]
    fn all_preserves_insertion_order() {
        let mut store = BreakpointStore::new();
        store.add("cart:/a.lua", 3);
        store.add("cart:/b.lua", 1);
        let files: Vec<_> = store.all().iter().map(|bp| bp.file.as_str()).collect();
        assert_eq!(files, vec!["cart:/a.lua", "cart:/b.lua"]);
    }
}
