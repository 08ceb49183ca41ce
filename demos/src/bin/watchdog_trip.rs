//! Demonstrates the runaway-script watchdog.
//!
//! With debugging disabled, the hook compares elapsed wall time against the
//! configured budget and aborts the VM from native code. The abort surfaces
//! as an ordinary script error on the calling side.

use std::time::Duration;

use moth_engine::{ScriptEngine, ScriptError, ScriptResult};

fn main() -> ScriptResult<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("logger");

    let mut engine = ScriptEngine::new()?;
    engine.set_watchdog(true, Duration::from_millis(50));
    engine.load_script(
        "cart:/main.lua",
        "function spin()\n    while true do end\nend",
    )?;

    eprintln!("[vm] calling spin() with a 50ms budget");
    match engine.call_function("spin") {
        Err(ScriptError::WatchdogTimeout { budget }) => {
            eprintln!("[vm] aborted by the watchdog after {budget:?}");
            Ok(())
        }
        Err(other) => Err(other),
        Ok(()) => {
            eprintln!("[vm] spin() returned?!");
            Ok(())
        }
    }
}
