//! Demonstrates the pause/resume mechanism of the debugger.
//!
//! The VM thread parks itself inside the native hook when the pause
//! request lands, spinning on the pump callback. A second thread plays the
//! role of an external controller (a UI button, a protocol adapter) and
//! resumes the session after a delay; all it needs is a clone of the
//! debugger handle, because the pause flag is a shared atomic.

use std::thread;
use std::time::Duration;

use moth_engine::{DebugAction, DebugCallbacks, ScriptEngine, ScriptResult};

const SCRIPT: &str = "\
function work()
    local total = 0
    for i = 1, 5 do
        total = total + i
    end
    return total
end
";

fn main() -> ScriptResult<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("logger");

    let mut engine = ScriptEngine::new()?;
    let debugger = engine.debugger();
    debugger.set_enabled(true);

    // Simulates an external "Resume" press two seconds from now.
    let controller = debugger.clone();
    let resume_handle = thread::spawn(move || {
        thread::sleep(Duration::from_secs(2));
        eprintln!("[controller] resuming from another thread");
        controller.resume();
    });

    engine.set_debug_callbacks(
        DebugCallbacks::with_on_stop(|line, file, reason| {
            eprintln!("[vm] paused at {file}:{line} ({reason}), waiting for resume");
        })
        .pump(|| {
            // A real host would drain its event queue here.
            thread::sleep(Duration::from_millis(10));
        }),
    );

    engine.load_script("cart:/main.lua", SCRIPT)?;

    // Ask for a stop at the next executed line, then enter the VM.
    debugger.set_action(DebugAction::Pause);
    eprintln!("[vm] calling work(); expect a ~2s pause");
    engine.call_function("work")?;
    let total: i64 = engine.eval("return work()")?;
    eprintln!("[vm] resumed and finished; work() = {total}");

    resume_handle.join().expect("controller thread");
    Ok(())
}
