//! Interactive debug controller for the CLI host.
//!
//! Translates stdin commands into calls on the engine's debugger handle.
//! The engine thread never reads stdin itself: a reader thread feeds a
//! channel, and the pump callback (invoked by the engine while it sits in
//! the pause loop) drains it. That keeps the pause loop responsive and is
//! exactly the path a resume command takes to reach the parked VM.

mod repl;

pub use repl::ReplSession;

/// Parses a `FILE:LINE` breakpoint location.
///
/// The split is on the last colon, so mount names like `cart:/main.lua:9`
/// work unquoted.
pub fn parse_location(spec: &str) -> Option<(String, u32)> {
    let (file, line) = spec.rsplit_once(':')?;
    if file.is_empty() {
        return None;
    }
    let line = line.parse().ok()?;
    Some((file.to_owned(), line))
}
