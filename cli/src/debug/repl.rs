//! The stdin debug session.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::BufRead;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use colored::Colorize;
use moth_engine::{DebugCallbacks, ScriptDebugger, ScriptEngine};

use super::parse_location;

/// How long the pump waits for a command before handing control back to
/// the pause loop.
const COMMAND_POLL: Duration = Duration::from_millis(25);

/// An attached stdin debug session.
///
/// Dropping the session does not detach the callbacks; it lives as long as
/// the run does.
pub struct ReplSession {
    quit: Arc<AtomicBool>,
    debugger: ScriptDebugger,
    commands: Rc<mpsc::Receiver<String>>,
    sources: Rc<RefCell<HashMap<String, String>>>,
}

impl ReplSession {
    /// Wires a stdin-driven controller into the engine's debug callbacks.
    pub fn attach(engine: &mut ScriptEngine, debugger: ScriptDebugger) -> Self {
        let quit = Arc::new(AtomicBool::new(false));
        let sources: Rc<RefCell<HashMap<String, String>>> = Rc::new(RefCell::new(HashMap::new()));
        let commands = Rc::new(spawn_stdin_reader());

        let stop_sources = Rc::clone(&sources);
        let on_stop = move |line: u32, file: &str, reason: moth_engine::StopReason| {
            eprintln!(
                "{} {}:{} ({})",
                "stopped at".red().bold(),
                file,
                line,
                reason.to_string().yellow()
            );
            if let Some(text) = source_line(&stop_sources.borrow(), file, line) {
                eprintln!("  {line:>4} | {text}");
            }
            eprint!("{} ", "(moth)".bold());
        };

        let pump_debugger = debugger.clone();
        let pump_quit = Arc::clone(&quit);
        let pump_commands = Rc::clone(&commands);
        let pump = move || match pump_commands.recv_timeout(COMMAND_POLL) {
            Ok(input) => handle_command(&pump_debugger, &pump_quit, input.trim()),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // stdin is gone; nothing can ever resume us.
                pump_quit.store(true, Ordering::SeqCst);
            }
        };

        let exit_quit = Arc::clone(&quit);
        engine.set_debug_callbacks(
            DebugCallbacks::with_on_stop(on_stop)
                .pump(pump)
                .should_exit(move || exit_quit.load(Ordering::SeqCst)),
        );

        Self {
            quit,
            debugger,
            commands,
            sources,
        }
    }

    /// Registers source text for context display at stops.
    pub fn add_source(&self, name: &str, code: &str) {
        self.sources
            .borrow_mut()
            .insert(name.to_owned(), code.to_owned());
    }

    /// Drains commands typed while the cartridge is running (the pump only
    /// runs while paused). Called once per frame by the host loop.
    pub fn poll(&self) {
        while let Ok(input) = self.commands.try_recv() {
            handle_command(&self.debugger, &self.quit, input.trim());
        }
    }

    /// Whether the user asked to quit the run.
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

fn source_line<'a>(
    sources: &'a HashMap<String, String>,
    file: &str,
    line: u32,
) -> Option<&'a str> {
    sources
        .get(file)?
        .lines()
        .nth((line as usize).checked_sub(1)?)
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("moth-stdin".to_owned())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .expect("failed to spawn stdin reader");
    rx
}

fn handle_command(debugger: &ScriptDebugger, quit: &AtomicBool, input: &str) {
    use moth_engine::DebugAction;

    let mut parts = input.split_whitespace();
    match parts.next() {
        Some("c" | "continue") => debugger.resume(),
        Some("s" | "step") => debugger.set_action(DebugAction::StepIn),
        Some("n" | "next") => debugger.set_action(DebugAction::StepOver),
        Some("o" | "out" | "finish") => debugger.set_action(DebugAction::StepOut),
        Some("b" | "break") => match parts.next().and_then(parse_location) {
            Some((file, line)) => {
                debugger.add_breakpoint(&file, line);
                eprintln!("breakpoint set at {file}:{line}");
                eprint!("{} ", "(moth)".bold());
            }
            None => usage("b FILE:LINE"),
        },
        Some("d" | "delete") => match parts.next().and_then(parse_location) {
            Some((file, line)) => {
                debugger.remove_breakpoint(&file, line);
                eprintln!("breakpoint removed from {file}:{line}");
                eprint!("{} ", "(moth)".bold());
            }
            None => usage("d FILE:LINE"),
        },
        Some("i" | "info") => {
            let breakpoints = debugger.breakpoints();
            if breakpoints.is_empty() {
                eprintln!("no breakpoints");
            }
            for bp in breakpoints {
                let marker = if bp.enabled { "*" } else { " " };
                eprintln!("{marker} {}:{}", bp.file, bp.line);
            }
            eprint!("{} ", "(moth)".bold());
        }
        Some("q" | "quit") => quit.store(true, Ordering::SeqCst),
        None | Some("h" | "help") => help(),
        Some(other) => {
            eprintln!("unknown command `{other}`");
            help();
        }
    }
}

fn usage(expected: &str) {
    eprintln!("usage: {expected}");
    eprint!("{} ", "(moth)".bold());
}

fn help() {
    eprintln!(
        "commands:\n  \
         c, continue      resume execution\n  \
         s, step          step into\n  \
         n, next          step over\n  \
         o, out           step out\n  \
         b FILE:LINE      set a breakpoint\n  \
         d FILE:LINE      delete a breakpoint\n  \
         i, info          list breakpoints\n  \
         q, quit          quit the run\n  \
         h, help          this text"
    );
    eprint!("{} ", "(moth)".bold());
}
